use thiserror::Error;

/// Failures the verification engine distinguishes between.
///
/// A missing camera reaches the host as an event, not a returned error.
/// `ModelUnavailable` stays inside the detection loop and turns into a
/// motion-fallback tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("camera already held by another detection loop")]
    CameraBusy,

    #[error("perception model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("detection loop already running")]
    AlreadyRunning,

    #[error("no challenge is pending")]
    NoChallengePending,

    #[error("a challenge is already pending")]
    ChallengeAlreadyPending,

    #[error("verification is not active for this session")]
    NotActive,

    #[error("verification session has ended")]
    SessionEnded,
}

pub type VerificationResult<T> = Result<T, VerificationError>;
