use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::metrics::{MetricsCollector, TickMetrics};
use crate::models::{DetectionResult, DetectionSource};
use crate::perception::{CameraLease, Frame, MotionEstimator, PerceptionAdapter, RawPerception};
use crate::scoring::{compute_verification_score, estimate_head_pose, fallback_score, filter_distractions};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Face confidence reported by a fallback tick that saw motion. Motion says
/// someone is there, not how sure a face model would be.
const FALLBACK_FACE_CONFIDENCE: f32 = 0.5;

/// What the loop hands to its dispatcher.
#[derive(Debug, Clone)]
pub enum SensingEvent {
    Detection(DetectionResult),
    /// The camera stopped producing frames; the loop has exited and the
    /// device is released.
    CameraLost(String),
}

pub(crate) struct LoopConfig {
    pub interval: Duration,
    pub inference_timeout: Duration,
    pub distraction_labels: Vec<String>,
    pub min_distraction_confidence: f32,
}

/// Samples the camera on a fixed wall-clock cadence until `cancel_token`
/// fires. Ticks are not chained to inference: a slow tick skips the missed
/// slots instead of shifting the schedule.
pub(crate) async fn detection_loop(
    mut camera: CameraLease,
    adapter: PerceptionAdapter,
    metrics: MetricsCollector,
    config: LoopConfig,
    events: mpsc::UnboundedSender<SensingEvent>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut motion = MotionEstimator::new();

    log_info!("detection loop started ({}ms interval)", config.interval.as_millis());

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("detection loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let frame = match camera.next_frame() {
                    Ok(frame) => Arc::new(frame),
                    Err(err) => {
                        log_error!("camera stopped delivering frames: {err}");
                        let _ = events.send(SensingEvent::CameraLost(err.to_string()));
                        break;
                    }
                };

                let result = tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        log_info!("detection loop stopped mid-inference; discarding tick");
                        break;
                    }
                    result = perform_detection(&adapter, &metrics, &config, &mut motion, frame) => result,
                };

                if events.send(SensingEvent::Detection(result)).is_err() {
                    log_warn!("detection receiver dropped; stopping loop");
                    break;
                }
            }
        }
    }

    drop(camera);
}

async fn perform_detection(
    adapter: &PerceptionAdapter,
    metrics: &MetricsCollector,
    config: &LoopConfig,
    motion: &mut MotionEstimator,
    frame: Arc<Frame>,
) -> DetectionResult {
    let inference_start = Instant::now();
    let inference = tokio::time::timeout(config.inference_timeout, adapter.infer(Arc::clone(&frame))).await;
    let inference_ms = inference_start.elapsed().as_millis() as u64;

    let (result, timed_out) = match inference {
        Ok(Ok(raw)) => {
            motion.remember(&frame);
            (
                from_perception(raw, &config.distraction_labels, config.min_distraction_confidence),
                false,
            )
        }
        Ok(Err(err)) => {
            log_warn!("falling back to motion scoring: {err}");
            (motion_fallback(motion, &frame), false)
        }
        Err(_) => {
            log_warn!(
                "inference exceeded {}ms; falling back to motion scoring",
                config.inference_timeout.as_millis()
            );
            (motion_fallback(motion, &frame), true)
        }
    };

    log_debug!(
        "tick: score={} source={:?} face={} looking={} distractions={} ({}ms)",
        result.verification_score,
        result.source,
        result.face_detected,
        result.looking_at_screen,
        result.distractions.len(),
        inference_ms
    );

    metrics
        .record_tick(TickMetrics {
            timestamp: result.timestamp,
            source: result.source,
            score: result.verification_score,
            inference_ms,
            timed_out,
        })
        .await;

    result
}

pub(crate) fn from_perception(
    raw: RawPerception,
    distraction_labels: &[String],
    min_distraction_confidence: f32,
) -> DetectionResult {
    let face = raw.faces.first();
    let face_detected = face.is_some();
    let face_confidence = face.map(|f| f.confidence.clamp(0.0, 1.0)).unwrap_or(0.0);
    let head_pose = estimate_head_pose(&raw.faces);
    let looking_at_screen = head_pose.map(|pose| pose.looking_at_screen).unwrap_or(false);
    let distractions = filter_distractions(&raw.objects, distraction_labels, min_distraction_confidence);
    let verification_score =
        compute_verification_score(face_detected, face_confidence, looking_at_screen, distractions.len());

    DetectionResult {
        face_detected,
        face_confidence,
        looking_at_screen,
        head_pose,
        distractions,
        verification_score,
        source: DetectionSource::Model,
        timestamp: Utc::now(),
    }
}

pub(crate) fn motion_fallback(motion: &mut MotionEstimator, frame: &Frame) -> DetectionResult {
    let has_motion = motion.detect_motion(frame);

    DetectionResult {
        face_detected: has_motion,
        face_confidence: if has_motion { FALLBACK_FACE_CONFIDENCE } else { 0.0 },
        looking_at_screen: has_motion,
        head_pose: None,
        distractions: Vec::new(),
        verification_score: fallback_score(has_motion),
        source: DetectionSource::MotionFallback,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use crate::perception::{DetectedObject, FaceLandmarks, Point};
    use crate::scoring::distractions::DEFAULT_DISTRACTION_LABELS;
    use image::{Rgb, RgbImage};

    fn labels() -> Vec<String> {
        DEFAULT_DISTRACTION_LABELS.iter().map(|s| s.to_string()).collect()
    }

    fn object(label: &str, confidence: f32) -> DetectedObject {
        DetectedObject {
            label: label.into(),
            confidence,
            bounding_box: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0,
            },
        }
    }

    fn facing_face(confidence: f32) -> FaceLandmarks {
        FaceLandmarks::from_key_points(
            confidence,
            Point::new(130.0, 100.0),
            Point::new(100.0, 100.0),
            Point::new(160.0, 100.0),
        )
    }

    #[test]
    fn attentive_user_without_distractions_scores_100() {
        let raw = RawPerception {
            faces: vec![facing_face(1.0)],
            objects: vec![object("person", 0.99)],
        };
        let result = from_perception(raw, &labels(), 0.5);
        assert!(result.face_detected);
        assert!(result.looking_at_screen);
        assert_eq!(result.verification_score, 100);
        assert_eq!(result.source, DetectionSource::Model);
    }

    #[test]
    fn absent_user_with_phone_and_book_scores_0() {
        let raw = RawPerception {
            faces: Vec::new(),
            objects: vec![object("cell phone", 0.9), object("book", 0.8)],
        };
        let result = from_perception(raw, &labels(), 0.5);
        assert!(!result.face_detected);
        assert!(!result.looking_at_screen);
        assert_eq!(result.head_pose, None);
        assert_eq!(result.distractions.len(), 2);
        assert_eq!(result.verification_score, 0);
    }

    #[test]
    fn fallback_never_reports_distractions() {
        let mut motion = MotionEstimator::new();
        let still = Frame::new(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])));
        let moved = Frame::new(RgbImage::from_pixel(8, 8, Rgb([255, 255, 255])));

        let first = motion_fallback(&mut motion, &still);
        assert!(!first.face_detected);
        assert_eq!(first.verification_score, 20);
        assert!(first.distractions.is_empty());

        let second = motion_fallback(&mut motion, &moved);
        assert!(second.face_detected);
        assert_eq!(second.verification_score, 70);
        assert!(second.distractions.is_empty());
        assert!(second.is_fallback());
    }
}
