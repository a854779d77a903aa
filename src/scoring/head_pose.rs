use crate::models::HeadPose;
use crate::perception::{FaceLandmarks, Point};

/// Nose-to-eye-center offset (pixels) that maps to `MAX_ANGLE_SCALE` degrees.
const OFFSET_SCALE_PX: f32 = 50.0;
const MAX_ANGLE_SCALE: f32 = 45.0;
const ANGLE_CLAMP: f32 = 45.0;

/// Head pose from the first detected face, or `None` when no face (or a
/// truncated mesh) is present.
///
/// This is an affine approximation: yaw and pitch scale linearly with the
/// nose offset from the eye midpoint, and roll is the eye-line angle. It
/// does not solve a 3D pose; the precision is enough to tell "facing the
/// screen" from "turned away".
pub fn estimate_head_pose(faces: &[FaceLandmarks]) -> Option<HeadPose> {
    let face = faces.first()?;
    Some(pose_from_key_points(
        face.nose_tip()?,
        face.left_eye()?,
        face.right_eye()?,
    ))
}

pub fn pose_from_key_points(nose: Point, left_eye: Point, right_eye: Point) -> HeadPose {
    let eye_center = left_eye.midpoint(right_eye);

    let yaw = ((nose.x - eye_center.x) / OFFSET_SCALE_PX * MAX_ANGLE_SCALE).clamp(-ANGLE_CLAMP, ANGLE_CLAMP);
    let pitch = ((nose.y - eye_center.y) / OFFSET_SCALE_PX * MAX_ANGLE_SCALE).clamp(-ANGLE_CLAMP, ANGLE_CLAMP);
    let roll = (right_eye.y - left_eye.y)
        .atan2(right_eye.x - left_eye.x)
        .to_degrees();

    HeadPose::new(yaw, pitch, roll)
}
