//! CLI command implementations.

pub mod config;
pub mod passwd;
pub mod run;
