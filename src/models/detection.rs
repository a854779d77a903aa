use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Both yaw and pitch must stay strictly inside this many degrees for the
/// user to count as looking at the screen.
pub const ATTENTION_LIMIT_DEG: f32 = 30.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeadPose {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub looking_at_screen: bool,
}

impl HeadPose {
    pub fn new(yaw: f32, pitch: f32, roll: f32) -> Self {
        Self {
            yaw,
            pitch,
            roll,
            looking_at_screen: yaw.abs() < ATTENTION_LIMIT_DEG && pitch.abs() < ATTENTION_LIMIT_DEG,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Distraction {
    pub object_label: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

/// Which pipeline produced a tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DetectionSource {
    Model,
    MotionFallback,
}

/// One tick of the detection loop. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub face_detected: bool,
    pub face_confidence: f32,
    pub looking_at_screen: bool,
    pub head_pose: Option<HeadPose>,
    pub distractions: Vec<Distraction>,
    pub verification_score: u8,
    pub source: DetectionSource,
    pub timestamp: DateTime<Utc>,
}

impl DetectionResult {
    pub fn is_fallback(&self) -> bool {
        self.source == DetectionSource::MotionFallback
    }
}
