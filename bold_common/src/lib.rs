//! Bold Common Library
//!
//! This crate provides shared constants, joint identity and configuration
//! loading utilities for all crates of the motion workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Bus ids, limits and default timings
//! - [`joint`] - `JointId`, `BodySection`, `JointSelection`
//! - [`config`] - Configuration loading traits and the top-level `RobotConfig`
//! - [`hardware`] - `[hardware]` configuration section
//! - [`motion`] - `[motion]` configuration section
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use bold_common::prelude::*;
//!
//! let head = BodySection::Head;
//! assert!(head.joints().all(|j| j.section() == head));
//! ```

pub mod config;
pub mod consts;
pub mod hardware;
pub mod joint;
pub mod motion;
pub mod prelude;
