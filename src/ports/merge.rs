use crate::domain::av::merger::MergeReport;
use crate::domain::errors::MergeError;
use crate::domain::segment::Segment;
use async_trait::async_trait;
use std::path::PathBuf;

/// Asynchronous seam around the segment merger.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MergePort: Send + Sync {
    async fn merge(&self, segments: Vec<Segment>, output: PathBuf)
        -> Result<MergeReport, MergeError>;
}
