use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifies a capture device (a camera) to the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One finished, independently playable container produced by a single
/// encoder start/stop cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Container file, owned by storage until a merge consumes it
    pub path: PathBuf,
    /// Encoder-reported duration in microseconds
    pub encoded_duration_us: i64,
}

impl Segment {
    pub fn new(path: impl Into<PathBuf>, encoded_duration_us: i64) -> Self {
        Self {
            path: path.into(),
            encoded_duration_us,
        }
    }
}

/// A finished recording once storage has taken ownership of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedHandle {
    pub path: PathBuf,
}

/// Written when a session's merge or persist fails, so the kept segments can
/// be stitched again later (see the `stitch` binary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryManifest {
    pub session_id: String,
    /// Segments in merge order
    pub segments: Vec<Segment>,
    /// Output the failed attempt was writing to
    pub attempted_output: PathBuf,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_manifest_json_shape() {
        let manifest = RecoveryManifest {
            session_id: "abc".to_string(),
            segments: vec![Segment::new("/tmp/a.mp4", 1_000)],
            attempted_output: PathBuf::from("/tmp/merged.mp4"),
            reason: "boom".to_string(),
        };

        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(
            value,
            json!({
                "session_id": "abc",
                "segments": [{ "path": "/tmp/a.mp4", "encoded_duration_us": 1000 }],
                "attempted_output": "/tmp/merged.mp4",
                "reason": "boom"
            })
        );
    }

    #[test]
    fn test_device_display() {
        assert_eq!(DeviceId::new("back").to_string(), "back");
    }
}
