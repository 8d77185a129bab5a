//! Recording session states.
//!
//! Each variant carries only what is valid in that state, so a pending
//! switch cannot outlive `AwaitingSwitchRestart` and no segment list exists
//! while `Idle`.

use super::events::IntentId;
use crate::domain::segment::{DeviceId, Segment};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Data shared by every non-idle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub id: Uuid,
    /// Finalized segments in start order; never reordered
    pub segments: Vec<Segment>,
    /// Sum of `encoded_duration_us` over `segments`
    pub cumulative_duration_us: i64,
    /// Intent that failures and completions are reported against
    pub last_intent: IntentId,
}

impl ActiveSession {
    pub fn new(intent: IntentId) -> Self {
        Self {
            id: Uuid::new_v4(),
            segments: Vec::new(),
            cumulative_duration_us: 0,
            last_intent: intent,
        }
    }

    /// Append a finalized segment and return its index.
    pub fn push(&mut self, segment: Segment) -> usize {
        self.cumulative_duration_us += segment.encoded_duration_us;
        self.segments.push(segment);
        self.segments.len() - 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Recording {
        device: DeviceId,
        session: ActiveSession,
        /// Encoder not yet started on `device` after a camera switch
        restarting: bool,
    },
    AwaitingSwitchRestart {
        next_device: DeviceId,
        session: ActiveSession,
    },
    AwaitingFinalize {
        session: ActiveSession,
    },
    Merging {
        session: ActiveSession,
    },
}

impl SessionState {
    pub fn kind(&self) -> StateKind {
        match self {
            SessionState::Idle => StateKind::Idle,
            SessionState::Recording { .. } => StateKind::Recording,
            SessionState::AwaitingSwitchRestart { .. } => StateKind::AwaitingSwitchRestart,
            SessionState::AwaitingFinalize { .. } => StateKind::AwaitingFinalize,
            SessionState::Merging { .. } => StateKind::Merging,
        }
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        match self {
            SessionState::Idle => None,
            SessionState::Recording { session, .. }
            | SessionState::AwaitingSwitchRestart { session, .. }
            | SessionState::AwaitingFinalize { session }
            | SessionState::Merging { session } => Some(session),
        }
    }
}

/// Field-less mirror of `SessionState`, for logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Idle,
    Recording,
    AwaitingSwitchRestart,
    AwaitingFinalize,
    Merging,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateKind::Idle => "idle",
            StateKind::Recording => "recording",
            StateKind::AwaitingSwitchRestart => "awaiting switch restart",
            StateKind::AwaitingFinalize => "awaiting finalize",
            StateKind::Merging => "merging",
        };
        write!(f, "{}", name)
    }
}
