pub mod controller;
pub mod policy;
pub mod state;

pub use controller::{SessionPhase, VerificationController, VerificationSnapshot};
pub use policy::ChallengePolicy;
pub use state::{ScoreTransition, SessionVerificationState};
