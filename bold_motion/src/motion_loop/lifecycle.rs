//! Motion loop lifecycle: Stopped → Starting → Running → StopRequested → Stopped.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Stopped,
    /// Connecting and spawning the motion thread.
    Starting,
    Running,
    /// Stop flag raised, waiting for the thread to exit.
    StopRequested,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Stopped => "Stopped",
            LoopState::Starting => "Starting",
            LoopState::Running => "Running",
            LoopState::StopRequested => "StopRequested",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    Start,
    /// Thread reported successful RT setup.
    Started,
    /// Thread could not be spawned or set up.
    StartFailed,
    Stop,
    /// Thread joined.
    Exited,
}

/// Result of a lifecycle transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    Ok(LoopState),
    Rejected(&'static str),
}

#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    state: LoopState,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            state: LoopState::Stopped,
        }
    }

    #[inline]
    pub const fn state(&self) -> LoopState {
        self.state
    }

    pub fn handle_event(&mut self, event: LoopEvent) -> TransitionResult {
        use LoopEvent::*;
        use LoopState::*;

        let next = match (self.state, event) {
            (Stopped, Start) => Starting,
            (Starting, Started) => Running,
            (Starting, StartFailed) => Stopped,
            (Running, Stop) => StopRequested,
            (StopRequested, Exited) => Stopped,

            (Starting | Running | StopRequested, Start) => {
                return TransitionResult::Rejected("motion loop already running");
            }
            (Stopped, Stop) => return TransitionResult::Rejected("motion loop not running"),
            _ => return TransitionResult::Rejected("invalid lifecycle transition"),
        };

        self.state = next;
        TransitionResult::Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle() {
        let mut lifecycle = Lifecycle::new();
        for (event, expected) in [
            (LoopEvent::Start, LoopState::Starting),
            (LoopEvent::Started, LoopState::Running),
            (LoopEvent::Stop, LoopState::StopRequested),
            (LoopEvent::Exited, LoopState::Stopped),
        ] {
            assert_eq!(lifecycle.handle_event(event), TransitionResult::Ok(expected));
        }
    }

    #[test]
    fn failed_start_returns_to_stopped() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.handle_event(LoopEvent::Start);
        assert_eq!(
            lifecycle.handle_event(LoopEvent::StartFailed),
            TransitionResult::Ok(LoopState::Stopped)
        );
    }

    #[test]
    fn double_start_rejected() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.handle_event(LoopEvent::Start);
        lifecycle.handle_event(LoopEvent::Started);
        assert!(matches!(
            lifecycle.handle_event(LoopEvent::Start),
            TransitionResult::Rejected(_)
        ));
        assert_eq!(lifecycle.state(), LoopState::Running);
    }

    #[test]
    fn stop_when_stopped_rejected() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(
            lifecycle.handle_event(LoopEvent::Stop),
            TransitionResult::Rejected("motion loop not running")
        );
    }
}
