pub mod controller;
pub mod loop_worker;

pub use controller::{DetectionController, DetectionStatus};
pub use loop_worker::SensingEvent;
