//! # Bold Motion Library
//!
//! Motion core of a kid-size humanoid: an 8 ms real-time loop that drives
//! twenty MX28 actuators through the CM730 sub-controller, and the
//! scheduler that decides which motion module owns which body section.
//!
//! ## Module Structure
//!
//! - [`motion_loop`] - Motion thread: commands, module steps, sync write, bulk read
//! - [`scheduler`] - Per-section arbitration of motion task requests
//! - [`module`] - `MotionModule` trait and the module registry
//! - [`body`] - Joint targets with dirty address tracking, LED targets
//! - [`state`] - Typed state store and the states the loop publishes
//! - [`hardware_init`] - Limit and alarm writes after connecting
//! - [`cycle`] - Cycle pacing, step timing, RT thread setup
//! - [`error`] - `MotionError`
//!
//! ## Threads
//!
//! ```text
//!  decision thread (~33 ms)                 motion thread (8 ms)
//! ┌────────────────────────┐              ┌──────────────────────────┐
//! │ Scheduler::request     │              │ MotionCycle::step        │
//! │ Scheduler::update ─────┼─▶ StateStore ┼─▶ modules ─▶ sync write  │
//! │ observers (Decision) ◀─┼──────────────┼── bulk read ─▶ publish   │
//! └────────────────────────┘              └──────────────────────────┘
//! ```
//!
//! The scheduler publishes [`state::MotionTaskState`]; the motion thread
//! reads it every cycle and signals module completion back through
//! [`module::ModuleHandle`].

pub mod body;
pub mod cycle;
pub mod error;
pub mod hardware_init;
pub mod module;
pub mod motion_loop;
pub mod scheduler;
pub mod state;

pub use crate::body::{BodyControl, DebugControl, JointControl};
pub use crate::error::MotionError;
pub use crate::module::{ModuleHandle, ModuleId, ModuleRegistry, MotionModule, StepOutcome};
pub use crate::motion_loop::{LoopState, MotionLoop};
pub use crate::scheduler::{MotionRequest, Priority, Scheduler, SectionRequest, TaskStatus};
pub use crate::state::{ObserverThread, StateStore};
