//! One-shot commands for the motion thread.
//!
//! Any thread may raise them; the motion thread takes each at the start of
//! its next cycle. A later request of the same kind overwrites an earlier
//! one that was not taken yet.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

const NONE: u8 = 0;
const OFF: u8 = 1;
const ON: u8 = 2;

fn encode(on: bool) -> u8 {
    if on { ON } else { OFF }
}

fn decode(value: u8) -> Option<bool> {
    match value {
        ON => Some(true),
        OFF => Some(false),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct PendingCommands {
    power: AtomicU8,
    torque: AtomicU8,
    static_refresh: AtomicBool,
}

impl PendingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_power(&self, on: bool) {
        self.power.store(encode(on), Ordering::Release);
    }

    pub fn request_torque(&self, on: bool) {
        self.torque.store(encode(on), Ordering::Release);
    }

    pub fn request_static_refresh(&self) {
        self.static_refresh.store(true, Ordering::Release);
    }

    pub fn take_power(&self) -> Option<bool> {
        decode(self.power.swap(NONE, Ordering::AcqRel))
    }

    pub fn take_torque(&self) -> Option<bool> {
        decode(self.torque.swap(NONE, Ordering::AcqRel))
    }

    pub fn take_static_refresh(&self) -> bool {
        self.static_refresh.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_taken_once() {
        let commands = PendingCommands::new();
        assert_eq!(commands.take_power(), None);
        commands.request_power(true);
        commands.request_power(false);
        assert_eq!(commands.take_power(), Some(false));
        assert_eq!(commands.take_power(), None);

        commands.request_torque(true);
        assert_eq!(commands.take_torque(), Some(true));

        commands.request_static_refresh();
        assert!(commands.take_static_refresh());
        assert!(!commands.take_static_refresh());
    }
}
