pub mod challenge;
pub mod detection;

pub use challenge::{Challenge, ChallengeAnswer, ChallengeKind, ChallengeOutcome, ChallengeTrigger};
pub use detection::{BoundingBox, DetectionResult, DetectionSource, Distraction, HeadPose};
