//! Application layer - Services that drive the domain through ports.

pub mod finalize;
pub mod recorder;
