//! Presence-transition capture: state machine, session driver, pipeline.

mod pipeline;
mod session;
mod state_machine;

pub use pipeline::{CaptureError, CapturePipeline};
pub use session::{SessionAction, SessionEngine};
