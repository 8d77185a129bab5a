//! Ports - Trait definitions implemented by adapters.

pub mod container;
pub mod encoder;
pub mod merge;
pub mod storage;
