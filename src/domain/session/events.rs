use crate::domain::segment::{DeviceId, PersistedHandle, Segment};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifies one accepted start/switch/stop call. Every completion or
/// failure notification names the intent it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntentId(pub u64);

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notifications published to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecorderEvent {
    /// A segment finished encoding and joined the session
    SegmentSaved {
        intent: IntentId,
        index: usize,
        segment: Segment,
    },
    /// Recording resumed on the new device after a switch
    CameraSwitched { intent: IntentId, device: DeviceId },
    /// The merged recording was handed to storage
    Saved {
        intent: IntentId,
        artifact: PersistedHandle,
    },
    /// Merge or persist failed. The segments were kept on disk.
    MergeFailed {
        intent: IntentId,
        reason: String,
        segments: Vec<Segment>,
        manifest: Option<PathBuf>,
    },
    /// The encoder failed and the whole session was dropped
    Abandoned { intent: IntentId, reason: String },
}

impl RecorderEvent {
    pub fn intent(&self) -> IntentId {
        match self {
            RecorderEvent::SegmentSaved { intent, .. }
            | RecorderEvent::CameraSwitched { intent, .. }
            | RecorderEvent::Saved { intent, .. }
            | RecorderEvent::MergeFailed { intent, .. }
            | RecorderEvent::Abandoned { intent, .. } => *intent,
        }
    }

    /// True for the notification that ends a session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecorderEvent::Saved { .. }
                | RecorderEvent::MergeFailed { .. }
                | RecorderEvent::Abandoned { .. }
        )
    }
}
