use image::RgbImage;

use super::camera::Frame;

/// A channel must move by more than this much for its pixel to count as changed.
pub const PIXEL_DELTA_THRESHOLD: u8 = 30;

/// Share of changed pixels needed to report presence.
pub const MIN_CHANGED_RATIO: f32 = 0.05;

/// Frame-differencing presence detector used when the models are down.
#[derive(Debug, Default)]
pub struct MotionEstimator {
    previous: Option<RgbImage>,
}

impl MotionEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `frame` as the reference for the next comparison without
    /// scoring it. Model ticks call this so a later fallback tick diffs
    /// against the most recent frame.
    pub fn remember(&mut self, frame: &Frame) {
        self.previous = Some(frame.image.clone());
    }

    /// Compares `frame` with the previous one and keeps it as the new
    /// reference. The first frame, or a frame whose size differs from the
    /// reference, reports no motion.
    pub fn detect_motion(&mut self, frame: &Frame) -> bool {
        let has_motion = self
            .previous
            .as_ref()
            .and_then(|previous| changed_ratio(previous, &frame.image))
            .map(|ratio| ratio >= MIN_CHANGED_RATIO)
            .unwrap_or(false);

        self.previous = Some(frame.image.clone());
        has_motion
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Fraction of pixels where any RGB channel moved by more than
/// [`PIXEL_DELTA_THRESHOLD`]. `None` when the frames differ in size.
pub fn changed_ratio(previous: &RgbImage, current: &RgbImage) -> Option<f32> {
    if previous.dimensions() != current.dimensions() {
        return None;
    }

    let total = previous.width() as usize * previous.height() as usize;
    if total == 0 {
        return Some(0.0);
    }

    let changed = previous
        .pixels()
        .zip(current.pixels())
        .filter(|(a, b)| {
            a.0.iter()
                .zip(b.0.iter())
                .any(|(x, y)| x.abs_diff(*y) > PIXEL_DELTA_THRESHOLD)
        })
        .count();

    Some(changed as f32 / total as f32)
}
