use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::BoundingBox;

use super::camera::Frame;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Face-mesh output for one face, in frame pixel coordinates.
/// Keypoint indices follow the 468-point face mesh topology.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    pub confidence: f32,
    pub keypoints: Vec<Point>,
}

impl FaceLandmarks {
    pub const MESH_SIZE: usize = 468;
    pub const NOSE_TIP: usize = 1;
    pub const LEFT_EYE: usize = 33;
    pub const RIGHT_EYE: usize = 263;

    /// Mesh with only the keypoints head pose reads filled in.
    pub fn from_key_points(confidence: f32, nose_tip: Point, left_eye: Point, right_eye: Point) -> Self {
        let mut keypoints = vec![Point::default(); Self::MESH_SIZE];
        keypoints[Self::NOSE_TIP] = nose_tip;
        keypoints[Self::LEFT_EYE] = left_eye;
        keypoints[Self::RIGHT_EYE] = right_eye;
        Self {
            confidence,
            keypoints,
        }
    }

    pub fn nose_tip(&self) -> Option<Point> {
        self.keypoints.get(Self::NOSE_TIP).copied()
    }

    pub fn left_eye(&self) -> Option<Point> {
        self.keypoints.get(Self::LEFT_EYE).copied()
    }

    pub fn right_eye(&self) -> Option<Point> {
        self.keypoints.get(Self::RIGHT_EYE).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

/// Pretrained face-landmark estimator. Inference may block for hundreds of
/// milliseconds and is always run off the async executor.
pub trait FaceLandmarker: Send + Sync + 'static {
    fn estimate_faces(&self, frame: &Frame) -> Result<Vec<FaceLandmarks>>;
}

/// Pretrained general object detector.
pub trait ObjectDetector: Send + Sync + 'static {
    fn detect_objects(&self, frame: &Frame) -> Result<Vec<DetectedObject>>;
}

/// Loads model weights. Called lazily on first inference; a failed load is
/// retried on the next tick.
pub trait ModelLoader: Send + Sync + 'static {
    fn load_face_landmarker(&self) -> Result<Arc<dyn FaceLandmarker>>;
    fn load_object_detector(&self) -> Result<Arc<dyn ObjectDetector>>;
}
