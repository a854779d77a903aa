pub mod distractions;
pub mod head_pose;
pub mod scorer;

pub use distractions::filter_distractions;
pub use head_pose::estimate_head_pose;
pub use scorer::{compute_verification_score, fallback_score, score_breakdown, ScoreBreakdown};
