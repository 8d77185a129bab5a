//! Domain layer - Pure business logic.

// Segment stitching
pub mod av;

pub mod errors;
pub mod segment;

// Recording session state machine
pub mod session;
