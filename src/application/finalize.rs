use crate::config::RecorderConfig;
use crate::domain::av::merger::{MergeReport, SegmentMerger};
use crate::domain::errors::MergeError;
use crate::domain::segment::{RecoveryManifest, Segment};
use crate::domain::session::MergeOutcome;
use crate::ports::container::ContainerBackend;
use crate::ports::merge::MergePort;
use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Container work is blocking, so it runs on the blocking pool.
#[async_trait]
impl<B> MergePort for SegmentMerger<B>
where
    B: ContainerBackend + Clone + Send + Sync + 'static,
{
    async fn merge(
        &self,
        segments: Vec<Segment>,
        output: PathBuf,
    ) -> Result<MergeReport, MergeError> {
        let merger = self.clone();
        tokio::task::spawn_blocking(move || merger.merge(&segments, &output))
            .await
            .map_err(|e| MergeError::Task(e.to_string()))?
    }
}

/// Where the merged output of a session is written before storage takes it.
pub fn merged_output_path(config: &RecorderConfig, session_id: Uuid) -> PathBuf {
    config
        .work_dir
        .join(format!("merged_{}.{}", session_id, config.container_format))
}

/// Merge a finished session and hand the result to storage.
///
/// Segments are never deleted here. On failure they stay where they are and
/// a recovery manifest records them.
pub async fn finalize_session<M, S>(
    merger: &M,
    storage: &S,
    config: &RecorderConfig,
    session_id: Uuid,
    segments: Vec<Segment>,
) -> MergeOutcome
where
    M: MergePort + ?Sized,
    S: StoragePort + ?Sized,
{
    if !config.merge_settle.is_zero() {
        tokio::time::sleep(config.merge_settle).await;
    }

    let output = merged_output_path(config, session_id);
    if let Err(e) = tokio::fs::create_dir_all(&config.work_dir).await {
        return failed(storage, session_id, segments, &output, e.to_string()).await;
    }

    info!(%session_id, "Starting merge of {} segments", segments.len());
    match merger.merge(segments.clone(), output.clone()).await {
        Ok(report) => info!(
            %session_id,
            verbatim = report.verbatim,
            video_end_us = report.video.map(|v| v.end_offset_us),
            audio_end_us = report.audio.map(|a| a.end_offset_us),
            "Merge finished"
        ),
        Err(e) => return failed(storage, session_id, segments, &output, e.to_string()).await,
    }

    match storage.persist(&output).await {
        Ok(handle) => MergeOutcome::Saved(handle),
        Err(e) => {
            if let Err(cleanup) = storage.delete_temporary(&output).await {
                warn!("Could not remove merged output {:?}: {}", output, cleanup);
            }
            failed(storage, session_id, segments, &output, e.to_string()).await
        }
    }
}

async fn failed<S>(
    storage: &S,
    session_id: Uuid,
    segments: Vec<Segment>,
    output: &Path,
    reason: String,
) -> MergeOutcome
where
    S: StoragePort + ?Sized,
{
    let manifest = RecoveryManifest {
        session_id: session_id.to_string(),
        segments,
        attempted_output: output.to_path_buf(),
        reason: reason.clone(),
    };
    let manifest = match storage.write_manifest(&manifest).await {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(%session_id, "Could not write recovery manifest: {}", e);
            None
        }
    };
    MergeOutcome::Failed { reason, manifest }
}

/// Delete segment temporaries. Failures are logged and otherwise ignored.
pub async fn delete_segments<S>(storage: &S, segments: &[Segment])
where
    S: StoragePort + ?Sized,
{
    let results = join_all(
        segments
            .iter()
            .map(|segment| storage.delete_temporary(&segment.path)),
    )
    .await;

    for (segment, result) in segments.iter().zip(results) {
        if let Err(e) = result {
            warn!("Could not delete segment {:?}: {}", segment.path, e);
        }
    }
}
