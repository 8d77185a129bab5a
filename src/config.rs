//! Configuration loaded from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the recorder and the merge pipeline.
#[derive(Clone, Debug)]
pub struct RecorderConfig {
    /// Directory for merged temporary output and recovery manifests
    pub work_dir: PathBuf,
    /// Directory where finished recordings are persisted
    pub library_dir: PathBuf,
    /// Muxer short name used when writing merged output
    pub container_format: String,
    /// Wait before restarting the encoder on the new device after a switch
    pub restart_delay: Duration,
    /// Wait between the last segment finalizing and the merge starting
    pub merge_settle: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            work_dir: env::temp_dir().join("camstitch"),
            library_dir: PathBuf::from("./library"),
            container_format: String::from("mp4"),
            restart_delay: Duration::from_millis(800),
            merge_settle: Duration::from_millis(300),
        }
    }
}

impl RecorderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Self {
            work_dir: env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            library_dir: env::var("LIBRARY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.library_dir),
            container_format: env::var("CONTAINER_FORMAT")
                .unwrap_or(defaults.container_format),
            restart_delay: millis_var("RESTART_DELAY_MS").unwrap_or(defaults.restart_delay),
            merge_settle: millis_var("MERGE_SETTLE_MS").unwrap_or(defaults.merge_settle),
        }
    }

    /// Same as default but without settle delays. Handy for tests and batch tools.
    pub fn immediate() -> Self {
        Self {
            restart_delay: Duration::ZERO,
            merge_settle: Duration::ZERO,
            ..Self::default()
        }
    }
}

fn millis_var(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}
