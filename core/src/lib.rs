//! Probing engine of frontscan.
//!
//! * [`scanner`]: fans addresses out over the worker [`pool`] under a shared [`context`].
//! * [`probe`]: dial, TLS handshake ([`tls`]), certificate inspection ([`cert`]) and [`classify`].
//! * [`store`]: the outcome files and the de-duplicated success map.
//! * [`bandwidth`]: optional throughput phase over previous successes.
//! * [`export`]: ranked export of the success map.

pub mod bandwidth;
pub mod cert;
pub mod classify;
pub mod context;
pub mod export;
pub mod pool;
pub mod probe;
pub mod scanner;
pub mod store;
pub mod tls;
