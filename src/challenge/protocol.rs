use log::info;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{VerificationError, VerificationResult};
use crate::models::{Challenge, ChallengeAnswer, ChallengeOutcome, ChallengeTrigger};

use super::generator::ChallengeGenerator;
use super::grading::grade;

struct ActiveChallenge {
    challenge: Challenge,
    issued: Instant,
    deadline: Instant,
}

/// At most one outstanding challenge. Every challenge ends exactly once, by
/// answer, by countdown expiry or by an explicit timeout; whichever resolves
/// it first wins and later signals find nothing pending.
///
/// Time is passed in by the caller so the session can drive it from the
/// tokio clock.
pub struct ChallengeProtocol {
    generator: ChallengeGenerator,
    active: Option<ActiveChallenge>,
}

impl ChallengeProtocol {
    pub fn new(generator: ChallengeGenerator) -> Self {
        Self {
            generator,
            active: None,
        }
    }

    pub fn active(&self) -> Option<&Challenge> {
        self.active.as_ref().map(|active| &active.challenge)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|active| active.deadline)
    }

    pub fn issue(&mut self, trigger: ChallengeTrigger, now: Instant) -> VerificationResult<Challenge> {
        if self.active.is_some() {
            return Err(VerificationError::ChallengeAlreadyPending);
        }

        let challenge = self.generator.generate(trigger);
        let deadline = now + Duration::from_millis(challenge.time_limit_ms());
        info!(
            "challenge {} issued: {} ({}s, {:?})",
            challenge.id,
            challenge.kind.as_str(),
            challenge.time_limit_seconds,
            trigger
        );

        self.active = Some(ActiveChallenge {
            challenge: challenge.clone(),
            issued: now,
            deadline,
        });
        Ok(challenge)
    }

    /// Grades `answer`. An answer arriving at or after the deadline counts
    /// as a timeout, even if it is correct.
    pub fn submit(&mut self, answer: &ChallengeAnswer, now: Instant) -> VerificationResult<ChallengeOutcome> {
        let active = self.active.take().ok_or(VerificationError::NoChallengePending)?;

        if now >= active.deadline {
            return Ok(timeout_outcome(&active.challenge));
        }

        let passed = grade(&active.challenge, answer);
        let response_time_ms = now.duration_since(active.issued).as_millis() as u64;
        info!(
            "challenge {} answered: passed={passed} in {response_time_ms}ms",
            active.challenge.id
        );

        Ok(ChallengeOutcome {
            challenge_id: active.challenge.id,
            passed,
            response_time_ms: response_time_ms.min(active.challenge.time_limit_ms()),
            kind: active.challenge.kind,
            timed_out: false,
        })
    }

    /// Countdown expiry for challenge `id`. Stale timers (the challenge was
    /// already resolved, or replaced) and early wake-ups resolve nothing.
    pub fn expire(&mut self, id: Uuid, now: Instant) -> Option<ChallengeOutcome> {
        let due = self
            .active
            .as_ref()
            .is_some_and(|active| active.challenge.id == id && now >= active.deadline);
        if !due {
            return None;
        }
        self.active
            .take()
            .map(|active| timeout_outcome(&active.challenge))
    }

    /// Host-signalled timeout, regardless of the remaining countdown.
    pub fn force_timeout(&mut self) -> VerificationResult<ChallengeOutcome> {
        self.active
            .take()
            .map(|active| timeout_outcome(&active.challenge))
            .ok_or(VerificationError::NoChallengePending)
    }

    /// Drops the outstanding challenge without an outcome (session teardown).
    pub fn abandon(&mut self) -> Option<Challenge> {
        self.active.take().map(|active| active.challenge)
    }
}

fn timeout_outcome(challenge: &Challenge) -> ChallengeOutcome {
    info!("challenge {} timed out", challenge.id);
    ChallengeOutcome {
        challenge_id: challenge.id,
        passed: false,
        response_time_ms: challenge.time_limit_ms(),
        kind: challenge.kind,
        timed_out: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChallengeKind;

    fn protocol() -> ChallengeProtocol {
        // difficulty 1: Math (15s) or Typing (20s)
        ChallengeProtocol::new(ChallengeGenerator::seeded(9, 1))
    }

    fn expected(challenge: &Challenge) -> ChallengeAnswer {
        challenge.expected_answer.clone()
    }

    #[test]
    fn only_one_challenge_at_a_time() {
        let mut protocol = protocol();
        let now = Instant::now();
        protocol.issue(ChallengeTrigger::Manual, now).unwrap();
        assert_eq!(
            protocol.issue(ChallengeTrigger::Manual, now).unwrap_err(),
            VerificationError::ChallengeAlreadyPending
        );
    }

    #[test]
    fn correct_answer_passes_with_elapsed_time() {
        let mut protocol = protocol();
        let now = Instant::now();
        let challenge = protocol.issue(ChallengeTrigger::Manual, now).unwrap();

        let outcome = protocol
            .submit(&expected(&challenge), now + Duration::from_millis(4200))
            .unwrap();
        assert!(outcome.passed);
        assert!(!outcome.timed_out);
        assert_eq!(outcome.response_time_ms, 4200);
        assert_eq!(outcome.kind, challenge.kind);
        assert!(protocol.active().is_none());
    }

    #[test]
    fn wrong_answer_fails() {
        let mut protocol = protocol();
        let now = Instant::now();
        protocol.issue(ChallengeTrigger::Manual, now).unwrap();
        let outcome = protocol
            .submit(&ChallengeAnswer::Text("definitely wrong".into()), now + Duration::from_secs(1))
            .unwrap();
        assert!(!outcome.passed);
        assert!(!outcome.timed_out);
    }

    #[test]
    fn expiry_reports_full_time_limit_once() {
        let mut protocol = protocol();
        let now = Instant::now();
        let challenge = protocol.issue(ChallengeTrigger::RandomCheck, now).unwrap();
        let limit = Duration::from_secs(challenge.time_limit_seconds.into());

        assert!(protocol.expire(challenge.id, now + limit - Duration::from_millis(1)).is_none());

        let outcome = protocol.expire(challenge.id, now + limit).unwrap();
        assert!(!outcome.passed);
        assert!(outcome.timed_out);
        assert_eq!(outcome.response_time_ms, challenge.time_limit_ms());

        assert!(protocol.expire(challenge.id, now + limit).is_none());
        assert_eq!(
            protocol.submit(&expected(&challenge), now + limit).unwrap_err(),
            VerificationError::NoChallengePending
        );
    }

    #[test]
    fn late_correct_answer_loses_to_timeout() {
        let mut protocol = protocol();
        let now = Instant::now();
        let challenge = protocol.issue(ChallengeTrigger::Manual, now).unwrap();
        let late = now + Duration::from_secs(challenge.time_limit_seconds.into());

        let outcome = protocol.submit(&expected(&challenge), late).unwrap();
        assert!(!outcome.passed);
        assert!(outcome.timed_out);
        assert_eq!(outcome.response_time_ms, challenge.time_limit_ms());
    }

    #[test]
    fn stale_timer_does_not_resolve_newer_challenge() {
        let mut protocol = protocol();
        let now = Instant::now();
        let first = protocol.issue(ChallengeTrigger::Manual, now).unwrap();
        protocol.submit(&expected(&first), now).unwrap();

        let second = protocol.issue(ChallengeTrigger::Manual, now).unwrap();
        assert!(protocol.expire(first.id, now + Duration::from_secs(60)).is_none());
        assert_eq!(protocol.active().map(|c| c.id), Some(second.id));
    }

    #[test]
    fn forced_timeout_and_abandon() {
        let mut protocol = protocol();
        let now = Instant::now();
        let challenge = protocol.issue(ChallengeTrigger::Manual, now).unwrap();
        let outcome = protocol.force_timeout().unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.response_time_ms, challenge.time_limit_ms());
        assert_eq!(protocol.force_timeout().unwrap_err(), VerificationError::NoChallengePending);

        protocol.issue(ChallengeTrigger::Manual, now).unwrap();
        assert!(protocol.abandon().is_some());
        assert!(protocol.deadline().is_none());
    }

    #[test]
    fn fifteen_second_math_challenge_times_out_at_15000ms() {
        let mut protocol = protocol();
        let now = Instant::now();
        let challenge = loop {
            let c = protocol.issue(ChallengeTrigger::Manual, now).unwrap();
            if c.kind == ChallengeKind::Math {
                break c;
            }
            protocol.abandon();
        };
        assert_eq!(challenge.time_limit_seconds, 15);

        let outcome = protocol.expire(challenge.id, now + Duration::from_secs(16)).unwrap();
        assert_eq!(outcome.response_time_ms, 15000);
        assert!(!outcome.passed);
    }
}
