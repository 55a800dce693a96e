//! Service components of waypostd that sit above the library crates
//!
//! The binary wires these together with the hub server and the periodic
//! scanner; they live in a library target so integration tests can drive
//! them directly.

mod feed;

pub use feed::*;
