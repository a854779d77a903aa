use serde::Serialize;

pub const PRESENCE_WEIGHT: f32 = 40.0;
pub const ATTENTION_WEIGHT: f32 = 40.0;
/// Full distraction allowance; each distracting object costs
/// `DISTRACTION_PENALTY` of it.
pub const DISTRACTION_ALLOWANCE: f32 = 20.0;
pub const DISTRACTION_PENALTY: f32 = 10.0;

/// Score reported by a motion-fallback tick that saw movement.
pub const FALLBACK_MOTION_SCORE: u8 = 70;
/// Score reported by a motion-fallback tick that saw nothing.
pub const FALLBACK_STILL_SCORE: u8 = 20;

/// Per-term contribution to a verification score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub presence: f32,
    pub attention: f32,
    pub distraction: f32,
    pub score: u8,
}

/// Weighted presence + attention + distraction allowance.
///
/// Depends on this tick's inputs only; any smoothing belongs to the caller.
pub fn score_breakdown(
    face_detected: bool,
    face_confidence: f32,
    looking_at_screen: bool,
    distraction_count: usize,
) -> ScoreBreakdown {
    let presence = if face_detected {
        PRESENCE_WEIGHT * face_confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let attention = if looking_at_screen { ATTENTION_WEIGHT } else { 0.0 };
    let penalty = (DISTRACTION_PENALTY * distraction_count as f32).min(DISTRACTION_ALLOWANCE);
    let distraction = DISTRACTION_ALLOWANCE - penalty;

    let score = (presence + attention + distraction).round().clamp(0.0, 100.0) as u8;

    ScoreBreakdown {
        presence,
        attention,
        distraction,
        score,
    }
}

pub fn compute_verification_score(
    face_detected: bool,
    face_confidence: f32,
    looking_at_screen: bool,
    distraction_count: usize,
) -> u8 {
    score_breakdown(face_detected, face_confidence, looking_at_screen, distraction_count).score
}

pub fn fallback_score(has_motion: bool) -> u8 {
    if has_motion {
        FALLBACK_MOTION_SCORE
    } else {
        FALLBACK_STILL_SCORE
    }
}
