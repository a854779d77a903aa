use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ChallengeKind {
    Math,
    Pattern,
    Typing,
    Memory,
}

impl ChallengeKind {
    pub const ALL: [ChallengeKind; 4] = [
        ChallengeKind::Math,
        ChallengeKind::Pattern,
        ChallengeKind::Typing,
        ChallengeKind::Memory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::Math => "math",
            ChallengeKind::Pattern => "pattern",
            ChallengeKind::Typing => "typing",
            ChallengeKind::Memory => "memory",
        }
    }

    /// Math and Typing are graded as free text; Pattern and Memory as an
    /// ordered pick from `option_set`.
    pub fn expects_selection(&self) -> bool {
        matches!(self, ChallengeKind::Pattern | ChallengeKind::Memory)
    }
}

/// What the user submitted, or what the generator expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum ChallengeAnswer {
    Text(String),
    Selection(Vec<String>),
}

/// Why a challenge was raised.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChallengeTrigger {
    RandomCheck,
    SustainedLowScore,
    Manual,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: Uuid,
    pub kind: ChallengeKind,
    pub prompt: String,
    #[serde(skip_serializing)]
    pub expected_answer: ChallengeAnswer,
    pub option_set: Option<Vec<String>>,
    /// Memory challenges hide their sequence after this many seconds.
    pub reveal_seconds: Option<u32>,
    pub time_limit_seconds: u32,
    pub trigger: ChallengeTrigger,
    pub issued_at: DateTime<Utc>,
}

impl Challenge {
    pub fn time_limit_ms(&self) -> u64 {
        u64::from(self.time_limit_seconds) * 1000
    }
}

/// Reported exactly once per challenge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeOutcome {
    pub challenge_id: Uuid,
    pub passed: bool,
    pub response_time_ms: u64,
    pub kind: ChallengeKind,
    pub timed_out: bool,
}
