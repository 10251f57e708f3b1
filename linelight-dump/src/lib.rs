//! Linelight Dump library target.
//!
//! The binary entry point is in `main.rs`; configuration and console
//! presentation live here so `tests/` can reach them.

pub mod config;
pub mod console;
pub mod logging;
