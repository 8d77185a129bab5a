//! Recording session: state machine, states and caller-facing events.

pub mod events;
pub mod machine;
pub mod state;

pub use events::{IntentId, RecorderEvent};
pub use machine::{Accepted, Effect, MergeOutcome, RecordingSession};
pub use state::{SessionState, StateKind};
