//! The recorder actor.
//!
//! One task owns the [`RecordingSession`]. Caller intents, encoder callbacks
//! and finalize results are all queued to it and applied one at a time, so
//! the state machine never sees two events at once.

use crate::application::finalize::{delete_segments, finalize_session};
use crate::config::RecorderConfig;
use crate::domain::errors::{EncoderError, SessionError};
use crate::domain::segment::{DeviceId, Segment};
use crate::domain::session::{
    Accepted, Effect, IntentId, MergeOutcome, RecorderEvent, RecordingSession, StateKind,
};
use crate::ports::encoder::{EncoderEvent, EncoderEvents, EncoderPort};
use crate::ports::merge::MergePort;
use crate::ports::storage::StoragePort;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

type Reply = oneshot::Sender<Result<IntentId, SessionError>>;

enum Command {
    Start { device: DeviceId, reply: Reply },
    SwitchCamera { device: DeviceId, reply: Reply },
    Stop { reply: Reply },
    Shutdown,
}

/// Caller side of a running recorder. Cheap to clone.
#[derive(Clone)]
pub struct RecorderHandle {
    commands: mpsc::UnboundedSender<Command>,
    duration: watch::Receiver<i64>,
    recording: watch::Receiver<bool>,
    events: broadcast::Sender<RecorderEvent>,
}

impl RecorderHandle {
    /// Start a new session on `device`. Rejected unless the recorder is idle.
    pub async fn start(&self, device: DeviceId) -> Result<IntentId, SessionError> {
        self.request(|reply| Command::Start { device, reply }).await
    }

    /// Finish the current segment and continue on `device`.
    pub async fn switch_camera(&self, device: DeviceId) -> Result<IntentId, SessionError> {
        self.request(|reply| Command::SwitchCamera { device, reply })
            .await
    }

    /// Finish the session. The outcome arrives later as `Saved`, `MergeFailed`
    /// or `Abandoned` carrying the returned intent.
    pub async fn stop(&self) -> Result<IntentId, SessionError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Total recorded duration of the session in microseconds.
    pub fn duration(&self) -> watch::Receiver<i64> {
        self.duration.clone()
    }

    pub fn recording(&self) -> watch::Receiver<bool> {
        self.recording.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    /// Stop the actor. A merge already in flight is allowed to finish.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    async fn request(
        &self,
        command: impl FnOnce(Reply) -> Command,
    ) -> Result<IntentId, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }
}

pub struct Recorder<E, S, M> {
    encoder: Arc<E>,
    storage: Arc<S>,
    merger: Arc<M>,
    config: RecorderConfig,
    session: RecordingSession,
    /// Bumped on every encoder start; events from older starts are dropped
    generation: u64,
    /// Token of the restart timer currently allowed to fire
    pending_restart: Option<u64>,
    restart_tokens: u64,
    encoder_events: mpsc::UnboundedSender<(u64, EncoderEvent)>,
    merges: mpsc::UnboundedSender<MergeOutcome>,
    restarts: mpsc::UnboundedSender<u64>,
    duration: watch::Sender<i64>,
    recording: watch::Sender<bool>,
    events: broadcast::Sender<RecorderEvent>,
}

impl<E, S, M> Recorder<E, S, M>
where
    E: EncoderPort + 'static,
    S: StoragePort + 'static,
    M: MergePort + 'static,
{
    /// Spawn the actor on the current runtime.
    pub fn spawn(encoder: E, storage: S, merger: M, config: RecorderConfig) -> RecorderHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (encoder_tx, encoder_rx) = mpsc::unbounded_channel();
        let (merges_tx, merges_rx) = mpsc::unbounded_channel();
        let (restarts_tx, restarts_rx) = mpsc::unbounded_channel();
        let (duration_tx, duration_rx) = watch::channel(0);
        let (recording_tx, recording_rx) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let recorder = Recorder {
            encoder: Arc::new(encoder),
            storage: Arc::new(storage),
            merger: Arc::new(merger),
            config,
            session: RecordingSession::new(),
            generation: 0,
            pending_restart: None,
            restart_tokens: 0,
            encoder_events: encoder_tx,
            merges: merges_tx,
            restarts: restarts_tx,
            duration: duration_tx,
            recording: recording_tx,
            events: events.clone(),
        };
        tokio::spawn(recorder.run(commands_rx, encoder_rx, merges_rx, restarts_rx));

        RecorderHandle {
            commands: commands_tx,
            duration: duration_rx,
            recording: recording_rx,
            events,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut encoder_events: mpsc::UnboundedReceiver<(u64, EncoderEvent)>,
        mut merges: mpsc::UnboundedReceiver<MergeOutcome>,
        mut restarts: mpsc::UnboundedReceiver<u64>,
    ) {
        info!("Recorder started");
        let mut closing = false;

        loop {
            // Callbacks describe things that already happened, so they are
            // applied before any intent queued after them.
            tokio::select! {
                biased;
                Some((generation, event)) = encoder_events.recv() => {
                    self.handle_encoder_event(generation, event).await;
                }
                Some(outcome) = merges.recv() => {
                    match self.session.on_merge_finished(outcome) {
                        Ok(effects) => self.apply(effects).await,
                        Err(e) => warn!("Ignoring merge result: {}", e),
                    }
                }
                Some(token) = restarts.recv() => self.restart_due(token).await,
                command = commands.recv(), if !closing => match command {
                    Some(Command::Shutdown) | None => closing = true,
                    Some(command) => self.handle_command(command).await,
                },
            }

            if closing && self.session.kind() != StateKind::Merging {
                break;
            }
        }

        info!("Recorder stopped in state {}", self.session.kind());
    }

    async fn handle_command(&mut self, command: Command) {
        let (result, reply) = match command {
            Command::Start { device, reply } => (self.session.start(device), reply),
            Command::SwitchCamera { device, reply } => {
                (self.session.request_camera_switch(device), reply)
            }
            Command::Stop { reply } => (self.session.request_stop(), reply),
            Command::Shutdown => return,
        };

        let answer = match result {
            Ok(Accepted { intent, effects }) => {
                self.apply(effects).await;
                Ok(intent)
            }
            Err(e) => {
                warn!("Rejected request: {}", e);
                Err(e)
            }
        };
        if reply.send(answer).is_err() {
            debug!("Caller dropped before the reply");
        }
    }

    async fn handle_encoder_event(&mut self, generation: u64, event: EncoderEvent) {
        if generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "Dropping event from a previous encoder start"
            );
            return;
        }

        match event {
            EncoderEvent::Progress(encoded_duration_us) => {
                match self.session.report_progress(encoded_duration_us) {
                    Ok(effects) => self.apply(effects).await,
                    Err(e) => debug!("Ignoring progress: {}", e),
                }
            }
            EncoderEvent::Finalized(result) => match self.session.on_segment_finalized(result) {
                Ok(effects) => self.apply(effects).await,
                Err(e) => warn!("Ignoring encoder callback: {}", e),
            },
        }
    }

    /// Carry out effects in order. An encoder failure drops the rest of the
    /// batch and applies the abandonment instead.
    async fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);

        while let Some(effect) = queue.pop_front() {
            match self.execute(effect).await {
                Ok(follow_up) => {
                    for effect in follow_up.into_iter().rev() {
                        queue.push_front(effect);
                    }
                }
                Err(error) => {
                    warn!("Encoder failed: {}", error);
                    queue.clear();
                    match self.session.on_segment_finalized(Err(error)) {
                        Ok(effects) => queue.extend(effects),
                        Err(e) => warn!("Encoder failure not applied: {}", e),
                    }
                }
            }
        }
    }

    /// Run one effect. Returns effects that must run before the rest of the
    /// batch.
    async fn execute(&mut self, effect: Effect) -> Result<Vec<Effect>, EncoderError> {
        match effect {
            Effect::StartEncoder(device) => self.start_encoder(&device).await?,
            Effect::RestartEncoder(device) => {
                if self.config.restart_delay.is_zero() {
                    self.start_encoder(&device).await?;
                    return Ok(self.restarted());
                }
                self.schedule_restart(&device);
            }
            Effect::CancelRestart => {
                if let Some(token) = self.pending_restart.take() {
                    debug!(token, "Restart cancelled");
                }
            }
            Effect::StopEncoder => self.encoder.stop_segment().await?,
            Effect::PublishDuration(us) => {
                self.duration.send_replace(us);
            }
            Effect::PublishRecording(active) => {
                self.recording.send_replace(active);
            }
            Effect::Merge {
                session_id,
                segments,
            } => self.spawn_finalize(session_id, segments),
            Effect::DeleteSegments(segments) => {
                delete_segments(self.storage.as_ref(), &segments).await
            }
            Effect::Emit(event) => {
                // No subscribers is fine.
                let _ = self.events.send(event);
            }
        }
        Ok(Vec::new())
    }

    /// Start the restart delay without blocking the actor.
    fn schedule_restart(&mut self, device: &DeviceId) {
        self.restart_tokens += 1;
        let token = self.restart_tokens;
        self.pending_restart = Some(token);
        debug!(token, %device, delay = ?self.config.restart_delay, "Restart scheduled");

        let delay = self.config.restart_delay;
        let restarts = self.restarts.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = restarts.send(token);
        });
    }

    async fn restart_due(&mut self, token: u64) {
        if self.pending_restart != Some(token) {
            debug!(token, "Ignoring cancelled restart");
            return;
        }
        self.pending_restart = None;
        let Some(device) = self.session.pending_restart().cloned() else {
            debug!(token, "No restart pending in state {}", self.session.kind());
            return;
        };

        let effects = match self.start_encoder(&device).await {
            Ok(()) => Ok(self.restarted()),
            Err(error) => {
                warn!("Encoder failed to restart: {}", error);
                self.session.on_segment_finalized(Err(error))
            }
        };
        match effects {
            Ok(effects) => self.apply(effects).await,
            Err(e) => warn!("Restart outcome not applied: {}", e),
        }
    }

    fn restarted(&mut self) -> Vec<Effect> {
        self.session.on_encoder_restarted().unwrap_or_else(|e| {
            warn!("Ignoring encoder restart: {}", e);
            Vec::new()
        })
    }

    async fn start_encoder(&mut self, device: &DeviceId) -> Result<(), EncoderError> {
        self.generation += 1;
        debug!(generation = self.generation, %device, "Starting encoder");
        let events = EncoderEvents::new(self.generation, self.encoder_events.clone());
        self.encoder.start_segment(device, events).await
    }

    fn spawn_finalize(&self, session_id: Uuid, segments: Vec<Segment>) {
        let merger = self.merger.clone();
        let storage = self.storage.clone();
        let config = self.config.clone();
        let merges = self.merges.clone();

        tokio::spawn(async move {
            let outcome = finalize_session(
                merger.as_ref(),
                storage.as_ref(),
                &config,
                session_id,
                segments,
            )
            .await;
            if merges.send(outcome).is_err() {
                warn!(%session_id, "Recorder gone before the merge finished");
            }
        });
    }
}
