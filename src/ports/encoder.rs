use crate::domain::errors::EncoderError;
use crate::domain::segment::{DeviceId, Segment};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// What an encoder reports about the segment it is writing.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderEvent {
    /// Encoded duration of the current segment so far, in microseconds
    Progress(i64),
    /// The segment was closed, successfully or not
    Finalized(Result<Segment, EncoderError>),
}

/// Sink handed to the encoder for one segment. Events are queued for the
/// recorder and never handled inside the encoder's call stack.
#[derive(Debug, Clone)]
pub struct EncoderEvents {
    generation: u64,
    sender: mpsc::UnboundedSender<(u64, EncoderEvent)>,
}

impl EncoderEvents {
    pub fn new(generation: u64, sender: mpsc::UnboundedSender<(u64, EncoderEvent)>) -> Self {
        Self { generation, sender }
    }

    /// Which encoder start this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn progress(&self, encoded_duration_us: i64) {
        self.send(EncoderEvent::Progress(encoded_duration_us));
    }

    pub fn finalized(&self, result: Result<Segment, EncoderError>) {
        self.send(EncoderEvent::Finalized(result));
    }

    fn send(&self, event: EncoderEvent) {
        if self.sender.send((self.generation, event)).is_err() {
            debug!(generation = self.generation, "Recorder gone, dropping encoder event");
        }
    }
}

/// The capture/encode pipeline. One segment at a time: each
/// `start_segment` is answered by exactly one `Finalized` event once
/// `stop_segment` is called or the encoder fails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EncoderPort: Send + Sync {
    /// Begin writing a new segment from `device`.
    async fn start_segment(
        &self,
        device: &DeviceId,
        events: EncoderEvents,
    ) -> Result<(), EncoderError>;

    /// Ask the encoder to finalize the segment in flight.
    async fn stop_segment(&self) -> Result<(), EncoderError>;
}
