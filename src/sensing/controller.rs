use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{VerificationError, VerificationResult};
use crate::metrics::MetricsCollector;
use crate::perception::{CameraDevice, PerceptionAdapter};
use crate::settings::VerificationSettings;

use super::loop_worker::{detection_loop, LoopConfig, SensingEvent};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DetectionStatus {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Owns one detection loop and the dispatcher that forwards its events.
///
/// The loop holds the camera lease; stopping (or dropping) the controller
/// cancels the loop, which releases the device.
pub struct DetectionController {
    camera: CameraDevice,
    adapter: PerceptionAdapter,
    metrics: MetricsCollector,
    status: DetectionStatus,
    handle: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl DetectionController {
    pub fn new(camera: CameraDevice, adapter: PerceptionAdapter, metrics: MetricsCollector) -> Self {
        Self {
            camera,
            adapter,
            metrics,
            status: DetectionStatus::Idle,
            handle: None,
            dispatcher: None,
            cancel_token: None,
        }
    }

    pub fn status(&self) -> DetectionStatus {
        match (&self.status, &self.handle) {
            (DetectionStatus::Running, Some(handle)) if handle.is_finished() => DetectionStatus::Stopped,
            (status, _) => *status,
        }
    }

    /// Acquires the camera and starts ticking every `detection_interval_ms`.
    /// `on_event` runs on a separate task, in tick order, so a slow callback
    /// never holds up sampling. On `CameraUnavailable` the controller stays
    /// `Idle`.
    pub fn start<F>(&mut self, settings: &VerificationSettings, on_event: F) -> VerificationResult<()>
    where
        F: Fn(SensingEvent) + Send + Sync + 'static,
    {
        if self.handle.is_some() {
            return Err(VerificationError::AlreadyRunning);
        }

        let lease = self.camera.acquire().map_err(|err| match err {
            VerificationError::CameraBusy => {
                VerificationError::CameraUnavailable(format!("camera '{}' is held by another session", self.camera.name()))
            }
            other => other,
        })?;

        let cancel_token = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let config = LoopConfig {
            interval: settings.detection_interval(),
            inference_timeout: settings.inference_timeout(),
            distraction_labels: settings.distraction_labels.clone(),
            min_distraction_confidence: settings.min_distraction_confidence,
        };

        let handle = tokio::spawn(detection_loop(
            lease,
            self.adapter.clone(),
            self.metrics.clone(),
            config,
            tx,
            cancel_token.clone(),
        ));
        let dispatcher = tokio::spawn(dispatch_sensing_events(rx, cancel_token.clone(), on_event));

        self.handle = Some(handle);
        self.dispatcher = Some(dispatcher);
        self.cancel_token = Some(cancel_token);
        self.status = DetectionStatus::Running;
        Ok(())
    }

    /// Cancels the loop, waits for it to release the camera, drops any
    /// undelivered ticks and unloads the models. Safe to call any number of
    /// times.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let loop_result = match self.handle.take() {
            Some(handle) => handle.await.context("detection loop task failed to join"),
            None => Ok(()),
        };

        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher
                .await
                .context("detection dispatcher task failed to join")?;
        }

        self.adapter.release_models();

        if self.status == DetectionStatus::Running {
            info!("detection stopped");
            self.status = DetectionStatus::Stopped;
        }

        loop_result
    }
}

impl Drop for DetectionController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}

async fn dispatch_sensing_events<F>(
    mut rx: mpsc::UnboundedReceiver<SensingEvent>,
    cancel_token: CancellationToken,
    on_event: F,
) where
    F: Fn(SensingEvent),
{
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) if !cancel_token.is_cancelled() => on_event(event),
                _ => break,
            },
        }
    }
}
