//! The recording session state machine.
//!
//! Pure: every call either rejects the event (leaving the state untouched)
//! or moves to a new state and returns the effects the owner must carry out,
//! in order. Nothing here talks to an encoder or touches a file.

use super::events::{IntentId, RecorderEvent};
use super::state::{ActiveSession, SessionState, StateKind};
use crate::domain::errors::{EncoderError, SessionError};
use crate::domain::segment::{DeviceId, PersistedHandle, Segment};
use std::mem;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Work requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Begin a new segment on `device`
    StartEncoder(DeviceId),
    /// Begin a new segment on `device` after a camera switch. Once the
    /// encoder runs, the owner reports it with `on_encoder_restarted`.
    RestartEncoder(DeviceId),
    /// Drop a restart still waiting for its settle delay
    CancelRestart,
    /// Finalize the segment in flight
    StopEncoder,
    PublishDuration(i64),
    PublishRecording(bool),
    /// Stitch `segments` in order and hand the result to storage
    Merge {
        session_id: Uuid,
        segments: Vec<Segment>,
    },
    DeleteSegments(Vec<Segment>),
    Emit(RecorderEvent),
}

/// An intent the state machine took on.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub intent: IntentId,
    pub effects: Vec<Effect>,
}

/// Result of a finalize job, fed back with `on_merge_finished`.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Saved(PersistedHandle),
    Failed {
        reason: String,
        manifest: Option<PathBuf>,
    },
}

#[derive(Debug, Default)]
pub struct RecordingSession {
    state: SessionState,
    /// Last value exposed as the current recording duration
    published_duration_us: i64,
    last_intent: u64,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn kind(&self) -> StateKind {
        self.state.kind()
    }

    /// True from `start` until the last segment of the session finalizes.
    pub fn is_recording(&self) -> bool {
        matches!(
            self.state,
            SessionState::Recording { .. }
                | SessionState::AwaitingSwitchRestart { .. }
                | SessionState::AwaitingFinalize { .. }
        )
    }

    pub fn duration_us(&self) -> i64 {
        self.published_duration_us
    }

    pub fn cumulative_duration_us(&self) -> i64 {
        self.state
            .session()
            .map(|session| session.cumulative_duration_us)
            .unwrap_or(0)
    }

    pub fn segments(&self) -> &[Segment] {
        self.state
            .session()
            .map(|session| session.segments.as_slice())
            .unwrap_or(&[])
    }

    pub fn start(&mut self, device: DeviceId) -> Result<Accepted, SessionError> {
        match mem::take(&mut self.state) {
            SessionState::Idle => {
                let intent = self.next_intent();
                info!(%intent, %device, "Starting recording session");
                self.state = SessionState::Recording {
                    device: device.clone(),
                    session: ActiveSession::new(intent),
                    restarting: false,
                };
                self.published_duration_us = 0;

                Ok(Accepted {
                    intent,
                    effects: vec![
                        Effect::PublishDuration(0),
                        Effect::PublishRecording(true),
                        Effect::StartEncoder(device),
                    ],
                })
            }
            other => self.reject("start", other),
        }
    }

    pub fn report_progress(&mut self, encoded_duration_us: i64) -> Result<Vec<Effect>, SessionError> {
        match &self.state {
            SessionState::Recording { session, .. } => {
                let total = session.cumulative_duration_us + encoded_duration_us;
                Ok(self.publish_duration(total).into_iter().collect())
            }
            other => Err(SessionError::InvalidState {
                operation: "report_progress",
                state: other.kind(),
            }),
        }
    }

    /// Queue a restart on `device` and finalize the current segment. At most
    /// one switch may be pending; a second one is rejected, not queued.
    pub fn request_camera_switch(&mut self, device: DeviceId) -> Result<Accepted, SessionError> {
        match mem::take(&mut self.state) {
            SessionState::Recording {
                mut session,
                restarting: false,
                ..
            } => {
                let intent = self.next_intent();
                session.last_intent = intent;
                info!(%intent, next_device = %device, "Camera switch requested");
                self.state = SessionState::AwaitingSwitchRestart {
                    next_device: device,
                    session,
                };
                Ok(Accepted {
                    intent,
                    effects: vec![Effect::StopEncoder],
                })
            }
            pending @ (SessionState::AwaitingSwitchRestart { .. }
            | SessionState::Recording {
                restarting: true, ..
            }) => {
                self.state = pending;
                Err(SessionError::SwitchPending)
            }
            other => self.reject("request_camera_switch", other),
        }
    }

    /// Finalize the session. A pending switch is cancelled outright.
    pub fn request_stop(&mut self) -> Result<Accepted, SessionError> {
        match mem::take(&mut self.state) {
            SessionState::Recording {
                mut session,
                restarting: true,
                device,
            } => {
                let intent = self.next_intent();
                session.last_intent = intent;
                info!(%intent, cancelled_device = %device, "Stop requested before restart, merging");
                let merge = Effect::Merge {
                    session_id: session.id,
                    segments: session.segments.clone(),
                };
                self.state = SessionState::Merging { session };
                Ok(Accepted {
                    intent,
                    effects: vec![
                        Effect::CancelRestart,
                        Effect::PublishRecording(false),
                        merge,
                    ],
                })
            }
            SessionState::Recording { mut session, .. } => {
                let intent = self.next_intent();
                session.last_intent = intent;
                info!(%intent, "Stop requested");
                self.state = SessionState::AwaitingFinalize { session };
                Ok(Accepted {
                    intent,
                    effects: vec![Effect::StopEncoder],
                })
            }
            SessionState::AwaitingSwitchRestart {
                next_device,
                mut session,
            } => {
                let intent = self.next_intent();
                session.last_intent = intent;
                info!(%intent, cancelled_device = %next_device, "Stop requested, pending switch cancelled");
                self.state = SessionState::AwaitingFinalize { session };
                // The encoder is already finalizing the segment for the switch.
                Ok(Accepted {
                    intent,
                    effects: Vec::new(),
                })
            }
            other => self.reject("request_stop", other),
        }
    }

    /// Encoder completion callback for the segment in flight.
    pub fn on_segment_finalized(
        &mut self,
        result: Result<Segment, EncoderError>,
    ) -> Result<Vec<Effect>, SessionError> {
        match result {
            Ok(segment) => self.segment_saved(segment),
            Err(error) => self.segment_failed(error),
        }
    }

    /// The encoder is running on the device chosen by the last switch.
    pub fn on_encoder_restarted(&mut self) -> Result<Vec<Effect>, SessionError> {
        match &mut self.state {
            SessionState::Recording {
                device,
                session,
                restarting,
            } if *restarting => {
                *restarting = false;
                let intent = session.last_intent;
                info!(%intent, %device, "Recording resumed after camera switch");
                Ok(vec![Effect::Emit(RecorderEvent::CameraSwitched {
                    intent,
                    device: device.clone(),
                })])
            }
            _ => Err(SessionError::Unexpected("encoder restart")),
        }
    }

    /// Device a restart is waiting to start on, if any.
    pub fn pending_restart(&self) -> Option<&DeviceId> {
        match &self.state {
            SessionState::Recording {
                device,
                restarting: true,
                ..
            } => Some(device),
            _ => None,
        }
    }

    /// Completion of the finalize job started by `Effect::Merge`.
    pub fn on_merge_finished(&mut self, outcome: MergeOutcome) -> Result<Vec<Effect>, SessionError> {
        match mem::take(&mut self.state) {
            SessionState::Merging { session } => {
                let intent = session.last_intent;
                let effects = match outcome {
                    MergeOutcome::Saved(artifact) => {
                        info!(%intent, artifact = %artifact.path.display(), "Recording saved");
                        vec![
                            Effect::DeleteSegments(session.segments),
                            Effect::Emit(RecorderEvent::Saved { intent, artifact }),
                        ]
                    }
                    MergeOutcome::Failed { reason, manifest } => {
                        warn!(%intent, "Merge failed, keeping {} segments: {}", session.segments.len(), reason);
                        vec![Effect::Emit(RecorderEvent::MergeFailed {
                            intent,
                            reason,
                            segments: session.segments,
                            manifest,
                        })]
                    }
                };
                Ok(effects)
            }
            other => {
                self.state = other;
                Err(SessionError::Unexpected("merge result"))
            }
        }
    }

    fn segment_saved(&mut self, segment: Segment) -> Result<Vec<Effect>, SessionError> {
        match mem::take(&mut self.state) {
            SessionState::AwaitingSwitchRestart {
                next_device,
                mut session,
            } => {
                let intent = session.last_intent;
                let index = session.push(segment.clone());
                info!(
                    %intent,
                    index,
                    cumulative_us = session.cumulative_duration_us,
                    "Segment finalized, restarting on {}",
                    next_device
                );
                let cumulative = session.cumulative_duration_us;
                self.state = SessionState::Recording {
                    device: next_device.clone(),
                    session,
                    restarting: true,
                };

                let mut effects = vec![Effect::Emit(RecorderEvent::SegmentSaved {
                    intent,
                    index,
                    segment,
                })];
                effects.extend(self.publish_duration(cumulative));
                effects.push(Effect::RestartEncoder(next_device));
                Ok(effects)
            }
            SessionState::AwaitingFinalize { mut session } => {
                let intent = session.last_intent;
                let index = session.push(segment.clone());
                info!(%intent, index, segments = session.segments.len(), "Last segment finalized, merging");
                let cumulative = session.cumulative_duration_us;
                let merge = Effect::Merge {
                    session_id: session.id,
                    segments: session.segments.clone(),
                };
                self.state = SessionState::Merging { session };

                let mut effects = vec![Effect::Emit(RecorderEvent::SegmentSaved {
                    intent,
                    index,
                    segment,
                })];
                effects.extend(self.publish_duration(cumulative));
                effects.push(Effect::PublishRecording(false));
                effects.push(merge);
                Ok(effects)
            }
            other => {
                warn!(
                    state = %other.kind(),
                    segment = %segment.path.display(),
                    "Segment finalized with no outstanding switch or stop, ignoring"
                );
                self.state = other;
                Err(SessionError::Unexpected("segment finalized"))
            }
        }
    }

    fn segment_failed(&mut self, error: EncoderError) -> Result<Vec<Effect>, SessionError> {
        match mem::take(&mut self.state) {
            SessionState::Recording { session, .. }
            | SessionState::AwaitingSwitchRestart { session, .. }
            | SessionState::AwaitingFinalize { session } => {
                let intent = session.last_intent;
                warn!(%intent, "Encoder failed, abandoning session: {}", error);

                let mut effects = vec![Effect::PublishRecording(false)];
                if !session.segments.is_empty() {
                    effects.push(Effect::DeleteSegments(session.segments));
                }
                effects.push(Effect::Emit(RecorderEvent::Abandoned {
                    intent,
                    reason: error.to_string(),
                }));
                Ok(effects)
            }
            other => {
                warn!(state = %other.kind(), "Encoder error with no session in flight, ignoring: {}", error);
                self.state = other;
                Err(SessionError::Unexpected("encoder error"))
            }
        }
    }

    /// Put `state` back and report `operation` as invalid in it.
    fn reject<T>(&mut self, operation: &'static str, state: SessionState) -> Result<T, SessionError> {
        let kind = state.kind();
        self.state = state;
        debug!(operation, state = %kind, "Rejected intent");
        Err(SessionError::InvalidState {
            operation,
            state: kind,
        })
    }

    /// Duration never goes backwards within a session.
    fn publish_duration(&mut self, duration_us: i64) -> Option<Effect> {
        if duration_us > self.published_duration_us {
            self.published_duration_us = duration_us;
            Some(Effect::PublishDuration(duration_us))
        } else {
            None
        }
    }

    fn next_intent(&mut self) -> IntentId {
        self.last_intent += 1;
        IntentId(self.last_intent)
    }
}
