//! Motion loop configuration.

pub mod config;
