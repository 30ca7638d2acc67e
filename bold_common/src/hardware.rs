//! Hardware link configuration.

pub mod config;
