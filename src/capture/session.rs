//! Transport-free driver for one monitoring session.
//!
//! The engine owns the state machine, the pending-capture bookkeeping and
//! the capture quota, and emits discrete actions. The WebSocket handler
//! executes them: `ArmSettleTimer` becomes a tokio sleep whose elapse is
//! fed back through `on_settle_elapsed`, so the settle delay never blocks
//! frame processing.

use super::state_machine::{CaptureStateMachine, PresenceEvent};

/// Action the transport layer must carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send a status message to the client.
    Notify(String),
    /// Schedule the settle delay; call `on_settle_elapsed` when it fires.
    ArmSettleTimer,
    /// Ask the client for one fresh high-resolution frame and capture it.
    RequestCapture,
}

/// Per-session capture driver.
pub struct SessionEngine {
    machine: CaptureStateMachine,
    /// present->absent edges still owed a capture.
    pending_captures: u32,
    /// `RequestCapture` actions emitted whose hi-res frame has not
    /// arrived yet. Requests can stack up when frame latency exceeds
    /// the settle delay, so this is a count, not a flag.
    awaiting_hires: u32,
    timer_armed: bool,
    captures_taken: u32,
    /// 0 = unlimited.
    max_captures: u32,
}

impl SessionEngine {
    pub fn new(max_captures: u32) -> Self {
        Self {
            machine: CaptureStateMachine::new(),
            pending_captures: 0,
            awaiting_hires: 0,
            timer_armed: false,
            captures_taken: 0,
            max_captures,
        }
    }

    /// Feed one frame's presence boolean.
    pub fn on_frame(&mut self, hand_present: bool) -> Vec<SessionAction> {
        match self.machine.observe(hand_present) {
            Some(PresenceEvent::GestureDetected) => {
                vec![SessionAction::Notify("gesture detected".to_string())]
            }
            Some(PresenceEvent::HandLeft) => {
                self.pending_captures += 1;
                let mut actions = vec![SessionAction::Notify(
                    "hand left, settling before capture".to_string(),
                )];
                if !self.timer_armed {
                    self.timer_armed = true;
                    actions.push(SessionAction::ArmSettleTimer);
                }
                actions
            }
            None => Vec::new(),
        }
    }

    /// The settle timer fired: one owed capture becomes due. If further
    /// edges queued up meanwhile, the timer is re-armed.
    pub fn on_settle_elapsed(&mut self) -> Vec<SessionAction> {
        self.timer_armed = false;
        if self.pending_captures == 0 {
            return Vec::new();
        }
        self.pending_captures -= 1;
        self.awaiting_hires += 1;
        let mut actions = vec![SessionAction::RequestCapture];
        if self.pending_captures > 0 {
            self.timer_armed = true;
            actions.push(SessionAction::ArmSettleTimer);
        }
        actions
    }

    /// Route one incoming binary frame: true when it answers an
    /// outstanding capture request and must be persisted, false when it
    /// is an ordinary preview frame. Each call consumes at most one
    /// outstanding request.
    pub fn take_pending_hires(&mut self) -> bool {
        if self.awaiting_hires > 0 {
            self.awaiting_hires -= 1;
            true
        } else {
            false
        }
    }

    /// Record a finished capture attempt. Failed attempts do not count
    /// against the quota.
    pub fn on_capture_complete(&mut self, success: bool) {
        if success {
            self.captures_taken += 1;
        }
    }

    pub fn captures_taken(&self) -> u32 {
        self.captures_taken
    }

    /// True once the session's capture quota is used up.
    pub fn quota_reached(&self) -> bool {
        self.max_captures > 0 && self.captures_taken >= self.max_captures
    }
}
