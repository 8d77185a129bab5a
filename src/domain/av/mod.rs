//! Audio/Video domain modules.

pub mod merger;
pub mod track;
