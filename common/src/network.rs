pub mod range;
pub mod token;
