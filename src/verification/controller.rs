use std::sync::{Arc, Mutex, MutexGuard, Weak};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::challenge::{ChallengeGenerator, ChallengeProtocol};
use crate::error::{VerificationError, VerificationResult};
use crate::events::{EventEmitter, EventReceiver, VerificationEvent};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::models::{Challenge, ChallengeAnswer, ChallengeOutcome, ChallengeTrigger};
use crate::perception::{CameraDevice, PerceptionAdapter};
use crate::sensing::{DetectionController, DetectionStatus, SensingEvent};
use crate::settings::VerificationSettings;

use super::policy::ChallengePolicy;
use super::state::SessionVerificationState;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    /// Created, `begin_verification` not called yet.
    Pending,
    Active,
    /// The session opted out; permanently verified, no sensing.
    Exempt,
    Ended,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSnapshot {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub state: SessionVerificationState,
    pub detection_status: DetectionStatus,
    pub camera_available: bool,
    pub active_challenge: Option<Challenge>,
    pub metrics: MetricsSnapshot,
}

struct SessionCore {
    phase: SessionPhase,
    state: SessionVerificationState,
    protocol: ChallengeProtocol,
    policy: ChallengePolicy,
    check_rng: StdRng,
    camera_available: bool,
    countdown: Option<JoinHandle<()>>,
    runtime: Option<Handle>,
}

struct Inner {
    session_id: Uuid,
    settings: VerificationSettings,
    core: Mutex<SessionCore>,
    detection: tokio::sync::Mutex<DetectionController>,
    metrics: MetricsCollector,
    emitter: EventEmitter,
    random_checks: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.random_checks).take() {
            handle.abort();
        }
        if let Some(handle) = lock(&self.core).countdown.take() {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn seeded_rngs(seed: Option<u64>) -> (StdRng, StdRng) {
    match seed {
        Some(seed) => (
            StdRng::seed_from_u64(seed),
            StdRng::seed_from_u64(seed.wrapping_add(1)),
        ),
        None => (StdRng::from_entropy(), StdRng::from_entropy()),
    }
}

/// Verification for one focus session: runs detection, applies each tick
/// to the session state, raises challenges and reports every step on the
/// session's event channel.
///
/// Writes to the session state are serialized by a single lock and by the
/// pending-challenge gate: while a challenge is open, ticks are still
/// reported but do not touch the state.
#[derive(Clone)]
pub struct VerificationController {
    inner: Arc<Inner>,
}

impl VerificationController {
    pub fn new(
        camera: CameraDevice,
        adapter: PerceptionAdapter,
        settings: VerificationSettings,
    ) -> (Self, EventReceiver) {
        let (challenge_rng, check_rng) = seeded_rngs(settings.rng_seed);
        Self::with_rngs(camera, adapter, settings, challenge_rng, check_rng)
    }

    /// Like [`new`](Self::new) with explicit generators for challenge
    /// content and random-check rolls.
    pub fn with_rngs(
        camera: CameraDevice,
        adapter: PerceptionAdapter,
        settings: VerificationSettings,
        challenge_rng: StdRng,
        check_rng: StdRng,
    ) -> (Self, EventReceiver) {
        let settings = settings.normalized();
        let session_id = Uuid::new_v4();
        let (emitter, events) = EventEmitter::channel(session_id);
        let metrics = MetricsCollector::new();

        let core = SessionCore {
            phase: SessionPhase::Pending,
            state: SessionVerificationState::new(),
            protocol: ChallengeProtocol::new(ChallengeGenerator::new(challenge_rng, settings.difficulty)),
            policy: ChallengePolicy::from_settings(&settings),
            check_rng,
            camera_available: true,
            countdown: None,
            runtime: None,
        };

        let inner = Inner {
            session_id,
            detection: tokio::sync::Mutex::new(DetectionController::new(camera, adapter, metrics.clone())),
            settings,
            core: Mutex::new(core),
            metrics,
            emitter,
            random_checks: Mutex::new(None),
        };

        (
            Self {
                inner: Arc::new(inner),
            },
            events,
        )
    }

    fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    fn core(&self) -> MutexGuard<'_, SessionCore> {
        lock(&self.inner.core)
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn state(&self) -> SessionVerificationState {
        self.core().state.clone()
    }

    pub fn active_challenge(&self) -> Option<Challenge> {
        self.core().protocol.active().cloned()
    }

    pub async fn snapshot(&self) -> VerificationSnapshot {
        let detection_status = self.inner.detection.lock().await.status();
        let metrics = self.inner.metrics.get_snapshot().await;
        let core = self.core();

        VerificationSnapshot {
            session_id: self.inner.session_id,
            phase: core.phase,
            state: core.state.clone(),
            detection_status,
            camera_available: core.camera_available,
            active_challenge: core.protocol.active().cloned(),
            metrics,
        }
    }

    /// Starts verification. A session that does not require it is verified
    /// for good and never touches the camera. A missing or denied camera is
    /// reported once as a `CameraUnavailable` event; the session then stays
    /// unverified and the host decides whether to continue.
    pub async fn begin_verification(
        &self,
        session_requires_verification: bool,
    ) -> VerificationResult<VerificationSnapshot> {
        {
            let mut core = self.core();
            match core.phase {
                SessionPhase::Pending => {}
                SessionPhase::Ended => return Err(VerificationError::SessionEnded),
                SessionPhase::Active | SessionPhase::Exempt => return Err(VerificationError::AlreadyRunning),
            }

            if !session_requires_verification {
                core.phase = SessionPhase::Exempt;
                core.state = SessionVerificationState::permanently_verified();
                self.inner
                    .emitter
                    .emit(VerificationEvent::StateChanged(core.state.clone()));
                log_info!("session {} does not require verification", self.inner.session_id);
            } else {
                core.phase = SessionPhase::Active;
                core.runtime = Some(Handle::current());
                self.inner
                    .emitter
                    .emit(VerificationEvent::StateChanged(core.state.clone()));
            }
        }

        if !session_requires_verification {
            return Ok(self.snapshot().await);
        }

        let weak = Arc::downgrade(&self.inner);
        let started = self
            .inner
            .detection
            .lock()
            .await
            .start(&self.inner.settings, move |event| {
                if let Some(inner) = weak.upgrade() {
                    VerificationController::from_inner(inner).handle_sensing_event(event);
                }
            });

        match started {
            Ok(()) => log_info!("verification started for session {}", self.inner.session_id),
            Err(VerificationError::CameraUnavailable(reason)) => {
                let mut core = self.core();
                self.camera_unavailable_locked(&mut core, reason);
            }
            Err(err) => return Err(err),
        }

        self.spawn_random_checks();
        Ok(self.snapshot().await)
    }

    /// Host-initiated challenge.
    pub fn request_challenge(&self) -> VerificationResult<Challenge> {
        let mut core = self.core();
        self.issue_challenge_locked(&mut core, ChallengeTrigger::Manual)
    }

    pub fn submit_answer(&self, answer: ChallengeAnswer) -> VerificationResult<ChallengeOutcome> {
        let mut core = self.core();
        ensure_active(&core)?;

        let outcome = core.protocol.submit(&answer, Instant::now())?;
        if let Some(countdown) = core.countdown.take() {
            countdown.abort();
        }
        self.finish_challenge_locked(&mut core, outcome.clone());
        Ok(outcome)
    }

    /// Explicit timeout from the host (e.g. the user dismissed the prompt).
    pub fn report_timeout(&self) -> VerificationResult<ChallengeOutcome> {
        let mut core = self.core();
        ensure_active(&core)?;

        let outcome = core.protocol.force_timeout()?;
        if let Some(countdown) = core.countdown.take() {
            countdown.abort();
        }
        self.finish_challenge_locked(&mut core, outcome.clone());
        Ok(outcome)
    }

    /// Stops sensing, drops any open challenge without an outcome and tears
    /// down the session state. Idempotent.
    pub async fn end_session(&self) -> Result<()> {
        {
            let mut core = self.core();
            if core.phase == SessionPhase::Ended {
                return Ok(());
            }
            core.phase = SessionPhase::Ended;

            if let Some(abandoned) = core.protocol.abandon() {
                log_info!("abandoning challenge {} at session end", abandoned.id);
            }
            if let Some(countdown) = core.countdown.take() {
                countdown.abort();
            }
            core.state = SessionVerificationState::new();
        }

        if let Some(handle) = lock(&self.inner.random_checks).take() {
            handle.abort();
        }

        let stopped = self.inner.detection.lock().await.stop().await;
        self.inner.emitter.emit(VerificationEvent::SessionEnded);
        log_info!("verification ended for session {}", self.inner.session_id);
        stopped
    }

    fn handle_sensing_event(&self, event: SensingEvent) {
        let mut core = self.core();
        if core.phase != SessionPhase::Active {
            return;
        }

        match event {
            SensingEvent::Detection(result) => {
                let score = result.verification_score;
                self.inner.emitter.emit(VerificationEvent::Detection(result));

                let transition = core.state.apply_score(score);
                if transition.changed_state() {
                    self.inner
                        .emitter
                        .emit(VerificationEvent::StateChanged(core.state.clone()));
                }

                if core.policy.low_score_triggered(&core.state) {
                    log_warn!(
                        "{} consecutive low-score ticks; challenging session {}",
                        core.state.consecutive_low_ticks,
                        self.inner.session_id
                    );
                    if let Err(err) = self.issue_challenge_locked(&mut core, ChallengeTrigger::SustainedLowScore) {
                        log_warn!("low-score challenge for session {} not issued: {err}", self.inner.session_id);
                    }
                }
            }
            SensingEvent::CameraLost(reason) => self.camera_unavailable_locked(&mut core, reason),
        }
    }

    fn camera_unavailable_locked(&self, core: &mut SessionCore, reason: String) {
        if !core.camera_available {
            return;
        }
        log_warn!("camera unavailable for session {}: {reason}", self.inner.session_id);
        core.camera_available = false;
        core.state.mark_sensing_lost();
        self.inner
            .emitter
            .emit(VerificationEvent::CameraUnavailable { reason });
        self.inner
            .emitter
            .emit(VerificationEvent::StateChanged(core.state.clone()));
    }

    fn issue_challenge_locked(
        &self,
        core: &mut SessionCore,
        trigger: ChallengeTrigger,
    ) -> VerificationResult<Challenge> {
        ensure_active(core)?;
        if !core.state.open_challenge() {
            return Err(VerificationError::ChallengeAlreadyPending);
        }

        let now = Instant::now();
        let challenge = match core.protocol.issue(trigger, now) {
            Ok(challenge) => challenge,
            Err(err) => {
                core.state.challenge_pending = false;
                return Err(err);
            }
        };
        let deadline = core
            .protocol
            .deadline()
            .unwrap_or_else(|| now + std::time::Duration::from_millis(challenge.time_limit_ms()));

        self.inner
            .emitter
            .emit(VerificationEvent::ChallengeRequired(challenge.clone()));
        self.inner
            .emitter
            .emit(VerificationEvent::StateChanged(core.state.clone()));

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let challenge_id = challenge.id;
        let countdown = async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                VerificationController::from_inner(inner).expire_challenge(challenge_id);
            }
        };
        let handle = match &core.runtime {
            Some(runtime) => runtime.spawn(countdown),
            None => tokio::spawn(countdown),
        };
        if let Some(previous) = core.countdown.replace(handle) {
            previous.abort();
        }

        Ok(challenge)
    }

    fn expire_challenge(&self, challenge_id: Uuid) {
        let mut core = self.core();
        if let Some(outcome) = core.protocol.expire(challenge_id, Instant::now()) {
            core.countdown = None;
            self.finish_challenge_locked(&mut core, outcome);
        }
    }

    fn finish_challenge_locked(&self, core: &mut SessionCore, outcome: ChallengeOutcome) {
        core.state.close_challenge(outcome.passed);
        log_info!(
            "challenge {} resolved for session {}: passed={} timed_out={} warnings={}",
            outcome.challenge_id,
            self.inner.session_id,
            outcome.passed,
            outcome.timed_out,
            core.state.warning_count
        );
        self.inner
            .emitter
            .emit(VerificationEvent::ChallengeOutcome(outcome));
        self.inner
            .emitter
            .emit(VerificationEvent::StateChanged(core.state.clone()));
    }

    fn spawn_random_checks(&self) {
        let period = self.inner.settings.random_check_interval();
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !VerificationController::from_inner(inner).run_random_check() {
                    break;
                }
            }
        });

        if let Some(previous) = lock(&self.inner.random_checks).replace(handle) {
            previous.abort();
        }
    }

    /// One roll of the periodic random check. Returns false once the
    /// session has ended.
    fn run_random_check(&self) -> bool {
        let mut guard = self.core();
        let core = &mut *guard;
        match core.phase {
            SessionPhase::Ended => return false,
            SessionPhase::Active => {}
            SessionPhase::Pending | SessionPhase::Exempt => return true,
        }
        if core.state.challenge_pending {
            return true;
        }

        let hit = core.policy.roll_random_check(&mut core.check_rng);
        log_debug!("random check for session {}: hit={hit}", self.inner.session_id);
        if hit {
            if let Err(err) = self.issue_challenge_locked(core, ChallengeTrigger::RandomCheck) {
                log_warn!("random check for session {} not issued: {err}", self.inner.session_id);
            }
        }
        true
    }
}

fn ensure_active(core: &SessionCore) -> VerificationResult<()> {
    match core.phase {
        SessionPhase::Active => Ok(()),
        SessionPhase::Ended => Err(VerificationError::SessionEnded),
        SessionPhase::Pending | SessionPhase::Exempt => Err(VerificationError::NotActive),
    }
}
