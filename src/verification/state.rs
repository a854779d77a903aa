use serde::{Deserialize, Serialize};

/// Score at or above which a tick verifies the session.
pub const VERIFIED_THRESHOLD: u8 = 60;
/// Score below which a tick also counts as a warning.
pub const WARNING_THRESHOLD: u8 = 50;

/// What a single detection tick did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTransition {
    /// A challenge is pending or sensing is off; the tick changed nothing.
    Suppressed,
    Verified { changed: bool },
    Unverified { changed: bool, warned: bool },
}

impl ScoreTransition {
    pub fn changed_state(&self) -> bool {
        match self {
            ScoreTransition::Suppressed => false,
            ScoreTransition::Verified { changed } => *changed,
            ScoreTransition::Unverified { changed, warned } => *changed || *warned,
        }
    }
}

/// Verification state of one focus session. Detection ticks and challenge
/// outcomes are the only writers, and ticks are ignored while a challenge is
/// pending, so the two never interleave.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionVerificationState {
    pub is_verified: bool,
    pub warning_count: u32,
    pub last_score: u8,
    pub challenge_pending: bool,
    /// Sessions that opted out of verification are verified for good.
    pub sensing_required: bool,
    pub consecutive_low_ticks: u32,
    pub challenges_passed: u32,
    pub challenges_failed: u32,
}

impl Default for SessionVerificationState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionVerificationState {
    pub fn new() -> Self {
        Self {
            is_verified: false,
            warning_count: 0,
            last_score: 0,
            challenge_pending: false,
            sensing_required: true,
            consecutive_low_ticks: 0,
            challenges_passed: 0,
            challenges_failed: 0,
        }
    }

    pub fn permanently_verified() -> Self {
        Self {
            is_verified: true,
            sensing_required: false,
            ..Self::new()
        }
    }

    pub fn apply_score(&mut self, score: u8) -> ScoreTransition {
        if self.challenge_pending || !self.sensing_required {
            return ScoreTransition::Suppressed;
        }

        self.last_score = score;
        let was_verified = self.is_verified;

        if score >= VERIFIED_THRESHOLD {
            self.is_verified = true;
            self.consecutive_low_ticks = 0;
            return ScoreTransition::Verified {
                changed: !was_verified,
            };
        }

        self.is_verified = false;
        let warned = score < WARNING_THRESHOLD;
        if warned {
            self.warning_count += 1;
            self.consecutive_low_ticks += 1;
        } else {
            self.consecutive_low_ticks = 0;
        }

        ScoreTransition::Unverified {
            changed: was_verified,
            warned,
        }
    }

    /// Marks a challenge as outstanding. Returns false if one already is.
    pub fn open_challenge(&mut self) -> bool {
        if self.challenge_pending {
            return false;
        }
        self.challenge_pending = true;
        self.consecutive_low_ticks = 0;
        true
    }

    /// Clears the pending gate. A pass does not mark the session verified;
    /// the next tick decides that.
    pub fn close_challenge(&mut self, passed: bool) {
        self.challenge_pending = false;
        if passed {
            self.challenges_passed += 1;
        } else {
            self.challenges_failed += 1;
            self.warning_count += 1;
        }
    }

    /// The camera is gone; nothing can vouch for the user any more.
    pub fn mark_sensing_lost(&mut self) {
        if self.sensing_required {
            self.is_verified = false;
        }
    }
}
