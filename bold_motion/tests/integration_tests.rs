//! Integration tests for Bold Motion.
//!
//! These tests run the scheduler and the motion loop together against the
//! simulated bus, covering the decision → motion → hardware round trip.

mod integration;
