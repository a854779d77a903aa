pub mod adapter;
pub mod camera;
pub mod models;
pub mod motion;

pub use adapter::{PerceptionAdapter, RawPerception};
pub use camera::{CameraDevice, CameraLease, Frame, FrameSource};
pub use models::{DetectedObject, FaceLandmarker, FaceLandmarks, ModelLoader, ObjectDetector, Point};
pub use motion::MotionEstimator;
