pub mod generator;
pub mod grading;
pub mod protocol;

pub use generator::{enabled_kinds, ChallengeGenerator};
pub use grading::grade;
pub use protocol::ChallengeProtocol;
