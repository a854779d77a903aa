use rand::Rng;

use crate::settings::VerificationSettings;

use super::state::SessionVerificationState;

/// When a session asks for a challenge, beyond what the score alone does.
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengePolicy {
    pub random_check_probability: f64,
    /// `None` disables the sustained-low-score trigger.
    pub low_score_challenge_ticks: Option<u32>,
}

impl Default for ChallengePolicy {
    fn default() -> Self {
        Self::from_settings(&VerificationSettings::default())
    }
}

impl ChallengePolicy {
    pub fn from_settings(settings: &VerificationSettings) -> Self {
        Self {
            random_check_probability: settings.random_check_probability.clamp(0.0, 1.0),
            low_score_challenge_ticks: settings.low_score_challenge_ticks.filter(|ticks| *ticks > 0),
        }
    }

    pub fn roll_random_check<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.gen_bool(self.random_check_probability.clamp(0.0, 1.0))
    }

    pub fn low_score_triggered(&self, state: &SessionVerificationState) -> bool {
        match self.low_score_challenge_ticks {
            Some(ticks) => !state.challenge_pending && state.consecutive_low_ticks >= ticks,
            None => false,
        }
    }
}
