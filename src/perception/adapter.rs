use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use log::{info, warn};
use tokio::sync::watch;

use crate::error::{VerificationError, VerificationResult};

use super::camera::Frame;
use super::models::{DetectedObject, FaceLandmarks, FaceLandmarker, ModelLoader, ObjectDetector};

/// Output of both models for one frame.
#[derive(Debug, Clone, Default)]
pub struct RawPerception {
    pub faces: Vec<FaceLandmarks>,
    pub objects: Vec<DetectedObject>,
}

#[derive(Clone)]
struct LoadedModels {
    face: Arc<dyn FaceLandmarker>,
    objects: Arc<dyn ObjectDetector>,
}

/// `None` while the load runs, then the load's result.
type LoadSignal = watch::Receiver<Option<Result<(), String>>>;

enum LoadState {
    Idle,
    Loading(LoadSignal),
    Ready(LoadedModels),
}

struct ModelSlot {
    /// Bumped by `release_models`; a load started under an older generation
    /// is discarded when it lands.
    generation: u64,
    state: LoadState,
}

/// Uniform "infer one frame" front for the face-landmark and object models.
///
/// Weights are loaded on first use by a task the adapter owns, so a caller
/// that gives up (an expired tick budget) never cancels the load. Every
/// caller waits on the same load, and the result is cached until
/// [`release_models`](Self::release_models).
#[derive(Clone)]
pub struct PerceptionAdapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    loader: Arc<dyn ModelLoader>,
    slot: Mutex<ModelSlot>,
}

impl AdapterInner {
    fn slot(&self) -> MutexGuard<'_, ModelSlot> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PerceptionAdapter {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                loader,
                slot: Mutex::new(ModelSlot {
                    generation: 0,
                    state: LoadState::Idle,
                }),
            }),
        }
    }

    pub fn models_loaded(&self) -> bool {
        matches!(self.inner.slot().state, LoadState::Ready(_))
    }

    /// Drops the cached models. A load still in flight is discarded when it
    /// finishes; the next `infer` loads again.
    pub fn release_models(&self) {
        let mut slot = self.inner.slot();
        slot.generation += 1;
        if !matches!(slot.state, LoadState::Idle) {
            info!("perception models released");
        }
        slot.state = LoadState::Idle;
    }

    /// Runs both models on `frame`. Any load or inference failure comes back
    /// as `ModelUnavailable`.
    pub async fn infer(&self, frame: Arc<Frame>) -> VerificationResult<RawPerception> {
        let models = self.models().await?;

        let (faces, objects) = tokio::task::spawn_blocking(move || {
            let faces = models.face.estimate_faces(&frame)?;
            let objects = models.objects.detect_objects(&frame)?;
            Ok::<_, anyhow::Error>((faces, objects))
        })
        .await
        .map_err(|err| VerificationError::ModelUnavailable(format!("inference worker join failed: {err}")))?
        .map_err(|err| VerificationError::ModelUnavailable(format!("inference failed: {err:#}")))?;

        Ok(RawPerception { faces, objects })
    }

    async fn models(&self) -> VerificationResult<LoadedModels> {
        let mut signal = {
            let mut slot = self.inner.slot();
            match &slot.state {
                LoadState::Ready(models) => return Ok(models.clone()),
                LoadState::Loading(signal) => signal.clone(),
                LoadState::Idle => {
                    let signal = self.spawn_load(slot.generation);
                    slot.state = LoadState::Loading(signal.clone());
                    signal
                }
            }
        };

        let outcome = signal
            .wait_for(|outcome| outcome.is_some())
            .await
            .map(|outcome| outcome.clone())
            .map_err(|_| VerificationError::ModelUnavailable("model loader stopped".into()))?;

        match outcome {
            Some(Err(reason)) => Err(VerificationError::ModelUnavailable(reason)),
            _ => match &self.inner.slot().state {
                LoadState::Ready(models) => Ok(models.clone()),
                _ => Err(VerificationError::ModelUnavailable("models were released".into())),
            },
        }
    }

    fn spawn_load(&self, generation: u64) -> LoadSignal {
        let (done, signal) = watch::channel(None);
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let loader = Arc::clone(&inner.loader);
            let loaded = tokio::task::spawn_blocking(move || -> anyhow::Result<LoadedModels> {
                let face = loader.load_face_landmarker().context("face model")?;
                let objects = loader.load_object_detector().context("object model")?;
                Ok(LoadedModels { face, objects })
            })
            .await;

            let outcome = {
                let mut slot = inner.slot();
                let current = slot.generation == generation;
                match loaded {
                    Ok(Ok(models)) if current => {
                        info!("perception models loaded");
                        slot.state = LoadState::Ready(models);
                        Ok(())
                    }
                    Ok(Ok(_)) => Err("models were released while loading".to_string()),
                    Ok(Err(err)) => {
                        warn!("perception models failed to load: {err:#}");
                        if current {
                            slot.state = LoadState::Idle;
                        }
                        Err(format!("{err:#}"))
                    }
                    Err(err) => {
                        if current {
                            slot.state = LoadState::Idle;
                        }
                        Err(format!("model loader join failed: {err}"))
                    }
                }
            };
            let _ = done.send(Some(outcome));
        });

        signal
    }
}
