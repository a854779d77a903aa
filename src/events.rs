use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{Challenge, ChallengeOutcome, DetectionResult};
use crate::verification::SessionVerificationState;

/// Everything the engine tells its host.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "payload")]
pub enum VerificationEvent {
    Detection(DetectionResult),
    StateChanged(SessionVerificationState),
    ChallengeRequired(Challenge),
    ChallengeOutcome(ChallengeOutcome),
    CameraUnavailable { reason: String },
    SessionEnded,
}

impl VerificationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            VerificationEvent::Detection(_) => "verification-detection",
            VerificationEvent::StateChanged(_) => "verification-state-changed",
            VerificationEvent::ChallengeRequired(_) => "verification-challenge-required",
            VerificationEvent::ChallengeOutcome(_) => "verification-challenge-outcome",
            VerificationEvent::CameraUnavailable { .. } => "verification-camera-unavailable",
            VerificationEvent::SessionEnded => "verification-session-ended",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub session_id: Uuid,
    /// Strictly increasing per session, starting at 0.
    pub sequence: u64,
    pub event: VerificationEvent,
}

pub type EventReceiver = mpsc::UnboundedReceiver<EventEnvelope>;

/// Sending half of a session's event queue. Sends never block; events are
/// delivered in emission order, each once.
pub struct EventEmitter {
    session_id: Uuid,
    sequence: AtomicU64,
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl EventEmitter {
    pub fn channel(session_id: Uuid) -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                session_id,
                sequence: AtomicU64::new(0),
                tx,
            },
            rx,
        )
    }

    pub fn emit(&self, event: VerificationEvent) {
        let envelope = EventEnvelope {
            session_id: self.session_id,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            event,
        };
        if let Err(err) = self.tx.send(envelope) {
            log::trace!(
                "dropping {} for session {}: receiver gone",
                err.0.event.name(),
                self.session_id
            );
        }
    }
}

/// Callback-style consumer of a session's events. All methods default to
/// no-ops.
pub trait VerificationObserver: Send + 'static {
    fn on_detection(&mut self, _result: &DetectionResult) {}
    fn on_state_changed(&mut self, _state: &SessionVerificationState) {}
    fn on_challenge_required(&mut self, _challenge: &Challenge) {}
    fn on_challenge_outcome(&mut self, _outcome: &ChallengeOutcome) {}
    fn on_camera_unavailable(&mut self, _reason: &str) {}
    fn on_session_ended(&mut self) {}
}

/// Feeds `observer` until the emitter side closes. Returns the observer so
/// callers can inspect it afterwards.
pub async fn dispatch_events<O: VerificationObserver>(mut rx: EventReceiver, mut observer: O) -> O {
    while let Some(envelope) = rx.recv().await {
        match &envelope.event {
            VerificationEvent::Detection(result) => observer.on_detection(result),
            VerificationEvent::StateChanged(state) => observer.on_state_changed(state),
            VerificationEvent::ChallengeRequired(challenge) => observer.on_challenge_required(challenge),
            VerificationEvent::ChallengeOutcome(outcome) => observer.on_challenge_outcome(outcome),
            VerificationEvent::CameraUnavailable { reason } => observer.on_camera_unavailable(reason),
            VerificationEvent::SessionEnded => observer.on_session_ended(),
        }
    }
    observer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<&'static str>,
    }

    impl VerificationObserver for Recorder {
        fn on_state_changed(&mut self, _state: &SessionVerificationState) {
            self.seen.push("state");
        }

        fn on_camera_unavailable(&mut self, _reason: &str) {
            self.seen.push("camera");
        }

        fn on_session_ended(&mut self) {
            self.seen.push("ended");
        }
    }

    #[tokio::test]
    async fn envelopes_are_sequenced_and_dispatched_in_order() {
        let session_id = Uuid::new_v4();
        let (emitter, mut rx) = EventEmitter::channel(session_id);

        emitter.emit(VerificationEvent::StateChanged(SessionVerificationState::new()));
        emitter.emit(VerificationEvent::CameraUnavailable { reason: "denied".into() });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(first.session_id, session_id);
        assert_eq!(rx.recv().await.unwrap().sequence, 1);

        emitter.emit(VerificationEvent::StateChanged(SessionVerificationState::new()));
        emitter.emit(VerificationEvent::CameraUnavailable { reason: "denied".into() });
        emitter.emit(VerificationEvent::SessionEnded);
        drop(emitter);

        let recorder = dispatch_events(rx, Recorder::default()).await;
        assert_eq!(recorder.seen, vec!["state", "camera", "ended"]);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(VerificationEvent::CameraUnavailable { reason: "no device".into() }).unwrap();
        assert_eq!(json["kind"], "cameraUnavailable");
        assert_eq!(json["payload"]["reason"], "no device");
        assert_eq!(VerificationEvent::SessionEnded.name(), "verification-session-ended");
    }

    #[test]
    fn emitting_after_receiver_drop_is_harmless() {
        let (emitter, rx) = EventEmitter::channel(Uuid::new_v4());
        drop(rx);
        emitter.emit(VerificationEvent::SessionEnded);
    }
}
