use colored::Color;

pub const PRIMARY: Color = Color::BrightGreen;
pub const ACCENT: Color = Color::BrightYellow;
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;

pub const GWS: Color = Color::BrightCyan;
pub const GVS: Color = Color::BrightMagenta;
pub const REJECTED: Color = Color::Yellow;
pub const FAILED: Color = Color::Red;
