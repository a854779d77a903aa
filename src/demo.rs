//! Deterministic camera and model backends for the demo binary and tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use image::{Rgb, RgbImage};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::events::{dispatch_events, VerificationObserver};
use crate::models::{BoundingBox, Challenge, ChallengeOutcome, DetectionResult};
use crate::perception::{
    CameraDevice, DetectedObject, FaceLandmarker, FaceLandmarks, Frame, FrameSource, ModelLoader, ObjectDetector,
    PerceptionAdapter, Point,
};
use crate::settings::VerificationSettings;
use crate::verification::{SessionVerificationState, VerificationController};

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;

/// Frame source that paints solid frames. `moving` alternates between a dark
/// and a bright frame so every consecutive pair differs.
pub struct SyntheticCamera {
    moving: bool,
    deny_open: bool,
    fail_after: Option<usize>,
    delivered: usize,
}

impl SyntheticCamera {
    pub fn steady() -> Self {
        Self {
            moving: false,
            deny_open: false,
            fail_after: None,
            delivered: 0,
        }
    }

    pub fn moving() -> Self {
        Self {
            moving: true,
            ..Self::steady()
        }
    }

    /// A camera the OS refuses to open.
    pub fn denied() -> Self {
        Self {
            deny_open: true,
            ..Self::steady()
        }
    }

    /// Delivers `frames` frames, then reports the device as disconnected.
    pub fn failing_after(mut self, frames: usize) -> Self {
        self.fail_after = Some(frames);
        self
    }
}

impl FrameSource for SyntheticCamera {
    fn open(&mut self) -> Result<()> {
        if self.deny_open {
            bail!("camera permission denied");
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if let Some(limit) = self.fail_after {
            if self.delivered >= limit {
                bail!("camera disconnected");
            }
        }

        let shade = if self.moving && self.delivered % 2 == 1 { 220 } else { 40 };
        self.delivered += 1;
        Ok(Frame::new(RgbImage::from_pixel(
            FRAME_WIDTH,
            FRAME_HEIGHT,
            Rgb([shade, shade, shade]),
        )))
    }

    fn close(&mut self) {
        self.delivered = 0;
    }
}

/// What the scripted models "see".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scene {
    /// One face, looking straight at the screen.
    Attentive,
    /// One face turned well past the attention limit.
    LookingAway,
    Absent,
}

struct Script {
    scene: Mutex<Scene>,
    phone: AtomicBool,
    fail_load: AtomicBool,
    fail_inference: AtomicBool,
    loads: AtomicUsize,
}

/// Model loader whose face and object models report a scripted scene.
/// Clones share the script, so tests can change the scene mid-session.
#[derive(Clone)]
pub struct ScriptedModels {
    script: Arc<Script>,
}

impl ScriptedModels {
    pub fn new(scene: Scene) -> Self {
        Self {
            script: Arc::new(Script {
                scene: Mutex::new(scene),
                phone: AtomicBool::new(false),
                fail_load: AtomicBool::new(false),
                fail_inference: AtomicBool::new(false),
                loads: AtomicUsize::new(0),
            }),
        }
    }

    pub fn attentive() -> Self {
        Self::new(Scene::Attentive)
    }

    pub fn absent() -> Self {
        Self::new(Scene::Absent)
    }

    /// Adds a cell phone to the scene.
    pub fn with_phone(self) -> Self {
        self.set_phone(true);
        self
    }

    pub fn scene(&self) -> Scene {
        match self.script.scene.lock() {
            Ok(scene) => *scene,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_scene(&self, scene: Scene) {
        match self.script.scene.lock() {
            Ok(mut guard) => *guard = scene,
            Err(poisoned) => *poisoned.into_inner() = scene,
        }
    }

    pub fn set_phone(&self, present: bool) {
        self.script.phone.store(present, Ordering::SeqCst);
    }

    pub fn set_load_failure(&self, fail: bool) {
        self.script.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn set_inference_failure(&self, fail: bool) {
        self.script.fail_inference.store(fail, Ordering::SeqCst);
    }

    /// Successful model loads so far, both models counted.
    pub fn load_count(&self) -> usize {
        self.script.loads.load(Ordering::SeqCst)
    }

    fn check_load(&self) -> Result<()> {
        if self.script.fail_load.load(Ordering::SeqCst) {
            bail!("model weights not found");
        }
        self.script.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn check_inference(&self) -> Result<()> {
        if self.script.fail_inference.load(Ordering::SeqCst) {
            bail!("inference backend crashed");
        }
        Ok(())
    }
}

impl ModelLoader for ScriptedModels {
    fn load_face_landmarker(&self) -> Result<Arc<dyn FaceLandmarker>> {
        self.check_load()?;
        Ok(Arc::new(self.clone()))
    }

    fn load_object_detector(&self) -> Result<Arc<dyn ObjectDetector>> {
        self.check_load()?;
        Ok(Arc::new(self.clone()))
    }
}

impl FaceLandmarker for ScriptedModels {
    fn estimate_faces(&self, frame: &Frame) -> Result<Vec<FaceLandmarks>> {
        self.check_inference()?;

        let center_x = frame.image.width() as f32 / 2.0;
        let eye_y = frame.image.height() as f32 / 3.0;
        let left_eye = Point::new(center_x - 12.0, eye_y);
        let right_eye = Point::new(center_x + 12.0, eye_y);

        let nose_x = match self.scene() {
            Scene::Attentive => center_x,
            Scene::LookingAway => center_x + 45.0,
            Scene::Absent => return Ok(Vec::new()),
        };

        Ok(vec![FaceLandmarks::from_key_points(
            1.0,
            Point::new(nose_x, eye_y + 10.0),
            left_eye,
            right_eye,
        )])
    }
}

impl ObjectDetector for ScriptedModels {
    fn detect_objects(&self, frame: &Frame) -> Result<Vec<DetectedObject>> {
        self.check_inference()?;

        let mut objects = Vec::new();
        if self.scene() != Scene::Absent {
            objects.push(DetectedObject {
                label: "person".into(),
                confidence: 0.97,
                bounding_box: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: frame.image.width() as f32,
                    height: frame.image.height() as f32,
                },
            });
        }
        if self.script.phone.load(Ordering::SeqCst) {
            objects.push(DetectedObject {
                label: "cell phone".into(),
                confidence: 0.9,
                bounding_box: BoundingBox {
                    x: 4.0,
                    y: 30.0,
                    width: 10.0,
                    height: 14.0,
                },
            });
        }
        Ok(objects)
    }
}

/// Logs every event and hands challenges back to the demo driver.
struct LoggingObserver {
    challenges: mpsc::UnboundedSender<Challenge>,
    delivered: usize,
}

impl VerificationObserver for LoggingObserver {
    fn on_detection(&mut self, result: &DetectionResult) {
        self.delivered += 1;
        debug!(
            "detection: score={} face={} looking={} distractions={} source={:?}",
            result.verification_score,
            result.face_detected,
            result.looking_at_screen,
            result.distractions.len(),
            result.source
        );
    }

    fn on_state_changed(&mut self, state: &SessionVerificationState) {
        self.delivered += 1;
        info!(
            "state: verified={} warnings={} pending={} last_score={}",
            state.is_verified, state.warning_count, state.challenge_pending, state.last_score
        );
    }

    fn on_challenge_required(&mut self, challenge: &Challenge) {
        self.delivered += 1;
        info!(
            "challenge ({}, {:?}, {}s): {}",
            challenge.kind.as_str(),
            challenge.trigger,
            challenge.time_limit_seconds,
            challenge.prompt
        );
        let _ = self.challenges.send(challenge.clone());
    }

    fn on_challenge_outcome(&mut self, outcome: &ChallengeOutcome) {
        self.delivered += 1;
        info!(
            "challenge outcome: passed={} timed_out={} in {}ms",
            outcome.passed, outcome.timed_out, outcome.response_time_ms
        );
    }

    fn on_camera_unavailable(&mut self, reason: &str) {
        self.delivered += 1;
        warn!("camera unavailable: {reason}");
    }

    fn on_session_ended(&mut self) {
        self.delivered += 1;
        info!("session ended");
    }
}

/// Runs one verified session against the synthetic backends: the user is
/// attentive, then turns away, then leaves. Challenges are answered
/// correctly as soon as they arrive.
pub async fn run_demo_session(settings: VerificationSettings) -> Result<()> {
    let camera = CameraDevice::new("synthetic", SyntheticCamera::moving());
    let models = ScriptedModels::attentive();
    let adapter = PerceptionAdapter::new(Arc::new(models.clone()));
    let tick = settings.detection_interval();

    let (controller, events) = VerificationController::new(camera, adapter, settings);
    let (challenge_tx, mut challenge_rx) = mpsc::unbounded_channel();
    let observer = tokio::spawn(dispatch_events(
        events,
        LoggingObserver {
            challenges: challenge_tx,
            delivered: 0,
        },
    ));

    info!("demo session {}", controller.session_id());
    controller.begin_verification(true).await?;

    let script: [(Scene, u32); 3] = [(Scene::Attentive, 4), (Scene::LookingAway, 4), (Scene::Absent, 4)];
    for (scene, ticks) in script {
        info!("scene: {scene:?}");
        models.set_scene(scene);
        let phase_end = tokio::time::Instant::now() + tick * ticks;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(phase_end) => break,
                Some(challenge) = challenge_rx.recv() => {
                    if let Err(err) = controller.submit_answer(challenge.expected_answer.clone()) {
                        warn!("could not answer challenge {}: {err}", challenge.id);
                    }
                }
            }
        }
    }

    let snapshot = controller.snapshot().await;
    info!("final snapshot: {}", serde_json::to_string_pretty(&snapshot)?);

    controller.end_session().await?;
    drop(controller);

    let observer = observer.await.context("event observer task failed")?;
    info!("{} events delivered", observer.delivered);
    Ok(())
}
