//! Two-state presence machine over a per-frame hand-visibility signal.

/// Machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    WaitingForHand,
    HandPresent,
}

/// Discrete event produced by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    /// Hand entered the frame (absent -> present edge).
    GestureDetected,
    /// Hand left the frame (present -> absent edge). The caller owes one
    /// capture after the settle delay.
    HandLeft,
}

/// Turns a noisy per-frame boolean into discrete presence edges.
///
/// Frames are processed strictly in arrival order. Exactly one `HandLeft`
/// is produced per presence episode; repeated booleans in either state
/// produce nothing.
#[derive(Debug)]
pub struct CaptureStateMachine {
    state: MachineState,
}

impl CaptureStateMachine {
    pub fn new() -> Self {
        Self {
            state: MachineState::WaitingForHand,
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    /// Feed one frame's presence boolean, returning the edge it caused.
    pub fn observe(&mut self, hand_present: bool) -> Option<PresenceEvent> {
        match (self.state, hand_present) {
            (MachineState::WaitingForHand, true) => {
                self.state = MachineState::HandPresent;
                Some(PresenceEvent::GestureDetected)
            }
            (MachineState::HandPresent, false) => {
                self.state = MachineState::WaitingForHand;
                Some(PresenceEvent::HandLeft)
            }
            _ => None,
        }
    }
}

impl Default for CaptureStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
