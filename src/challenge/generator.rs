use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::models::{Challenge, ChallengeAnswer, ChallengeKind, ChallengeTrigger};

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;

/// Countdown never drops below this, whatever the difficulty.
pub const MIN_TIME_LIMIT_SECS: u32 = 10;
const TIME_LIMIT_STEP_SECS: u32 = 2;

/// Memory sequences stay on screen this long before the host hides them.
const MEMORY_REVEAL_SECS: u32 = 5;
const MEMORY_DECOYS: usize = 4;

const TYPING_PHRASES: [&str; 8] = [
    "focus mode",
    "deep work",
    "stay on task",
    "one thing at a time",
    "protect your attention",
    "finish what you started",
    "quiet mind steady hands",
    "progress over perfection",
];

const PATTERN_SYMBOLS: [&str; 6] = ["red", "blue", "green", "yellow", "purple", "orange"];

const MEMORY_WORDS: [&str; 12] = [
    "anchor", "comet", "maple", "harbor", "velvet", "prism", "lantern", "summit", "ember",
    "canyon", "willow", "quartz",
];

/// Kinds available at `difficulty`. Math and Typing are always on; Pattern
/// unlocks at 2 and Memory at 3.
pub fn enabled_kinds(difficulty: u8) -> Vec<ChallengeKind> {
    let difficulty = difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
    ChallengeKind::ALL
        .into_iter()
        .filter(|kind| difficulty >= unlock_level(*kind))
        .collect()
}

fn unlock_level(kind: ChallengeKind) -> u8 {
    match kind {
        ChallengeKind::Math | ChallengeKind::Typing => 1,
        ChallengeKind::Pattern => 2,
        ChallengeKind::Memory => 3,
    }
}

pub fn time_limit_secs(kind: ChallengeKind, difficulty: u8) -> u32 {
    let base: u32 = match kind {
        ChallengeKind::Math => 15,
        ChallengeKind::Typing | ChallengeKind::Pattern => 20,
        ChallengeKind::Memory => 30,
    };
    let steps = u32::from(difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY) - MIN_DIFFICULTY);
    base.saturating_sub(steps * TIME_LIMIT_STEP_SECS)
        .max(MIN_TIME_LIMIT_SECS)
}

/// Builds randomized challenges from an injected generator so a seeded
/// session replays the same sequence.
pub struct ChallengeGenerator {
    rng: StdRng,
    difficulty: u8,
}

impl ChallengeGenerator {
    pub fn new(rng: StdRng, difficulty: u8) -> Self {
        Self {
            rng,
            difficulty: difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY),
        }
    }

    pub fn seeded(seed: u64, difficulty: u8) -> Self {
        Self::new(StdRng::seed_from_u64(seed), difficulty)
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    /// Picks a kind uniformly from the enabled set and builds it.
    pub fn generate(&mut self, trigger: ChallengeTrigger) -> Challenge {
        let kinds = enabled_kinds(self.difficulty);
        let kind = kinds
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(ChallengeKind::Math);
        self.generate_kind(kind, trigger)
    }

    pub fn generate_kind(&mut self, kind: ChallengeKind, trigger: ChallengeTrigger) -> Challenge {
        let (prompt, expected_answer, option_set, reveal_seconds) = match kind {
            ChallengeKind::Math => {
                let (prompt, answer) = self.math_problem();
                (prompt, ChallengeAnswer::Text(answer), None, None)
            }
            ChallengeKind::Typing => {
                let phrase = TYPING_PHRASES
                    .choose(&mut self.rng)
                    .copied()
                    .unwrap_or(TYPING_PHRASES[0]);
                (
                    format!("Type the phrase: \"{phrase}\""),
                    ChallengeAnswer::Text(phrase.to_string()),
                    None,
                    None,
                )
            }
            ChallengeKind::Pattern => {
                let (prompt, sequence, options) = self.pattern_sequence();
                (prompt, ChallengeAnswer::Selection(sequence), Some(options), None)
            }
            ChallengeKind::Memory => {
                let (prompt, sequence, options) = self.memory_sequence();
                (
                    prompt,
                    ChallengeAnswer::Selection(sequence),
                    Some(options),
                    Some(MEMORY_REVEAL_SECS),
                )
            }
        };

        Challenge {
            id: Uuid::new_v4(),
            kind,
            prompt,
            expected_answer,
            option_set,
            reveal_seconds,
            time_limit_seconds: time_limit_secs(kind, self.difficulty),
            trigger,
            issued_at: Utc::now(),
        }
    }

    fn math_problem(&mut self) -> (String, String) {
        let max_operand = 10 * i64::from(self.difficulty);
        let allow_multiply = self.difficulty >= 3;
        let op = self.rng.gen_range(0..if allow_multiply { 3 } else { 2 });

        match op {
            0 => {
                let a = self.rng.gen_range(1..=max_operand);
                let b = self.rng.gen_range(1..=max_operand);
                (format!("What is {a} + {b}?"), (a + b).to_string())
            }
            1 => {
                let a = self.rng.gen_range(1..=max_operand);
                let b = self.rng.gen_range(1..=a);
                (format!("What is {a} - {b}?"), (a - b).to_string())
            }
            _ => {
                let a = self.rng.gen_range(2..=12);
                let b = self.rng.gen_range(2..=12);
                (format!("What is {a} × {b}?"), (a * b).to_string())
            }
        }
    }

    fn pattern_sequence(&mut self) -> (String, Vec<String>, Vec<String>) {
        let length = 3 + usize::from(self.difficulty / 2);
        let sequence: Vec<String> = (0..length)
            .filter_map(|_| PATTERN_SYMBOLS.choose(&mut self.rng))
            .map(|s| s.to_string())
            .collect();

        let mut options: Vec<String> = PATTERN_SYMBOLS.iter().map(|s| s.to_string()).collect();
        options.shuffle(&mut self.rng);

        (
            format!("Repeat the pattern in order: {}", sequence.join(" → ")),
            sequence,
            options,
        )
    }

    fn memory_sequence(&mut self) -> (String, Vec<String>, Vec<String>) {
        let length = usize::from(self.difficulty) + 1;
        let picked: Vec<&str> = MEMORY_WORDS
            .choose_multiple(&mut self.rng, length + MEMORY_DECOYS)
            .copied()
            .collect();
        let sequence: Vec<String> = picked.iter().take(length).map(|s| s.to_string()).collect();

        let mut options: Vec<String> = picked.iter().map(|s| s.to_string()).collect();
        options.shuffle(&mut self.rng);

        (
            format!("Memorize these words in order: {}", sequence.join(", ")),
            sequence,
            options,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn kinds_unlock_with_difficulty() {
        assert_eq!(enabled_kinds(1), vec![ChallengeKind::Math, ChallengeKind::Typing]);
        assert_eq!(
            enabled_kinds(2),
            vec![ChallengeKind::Math, ChallengeKind::Pattern, ChallengeKind::Typing]
        );
        assert_eq!(enabled_kinds(3).len(), 4);
        assert_eq!(enabled_kinds(0), enabled_kinds(1));
        assert_eq!(enabled_kinds(200).len(), 4);
    }

    #[test]
    fn time_limits_stay_within_bounds() {
        for kind in ChallengeKind::ALL {
            for difficulty in MIN_DIFFICULTY..=MAX_DIFFICULTY {
                let secs = time_limit_secs(kind, difficulty);
                assert!((10..=30).contains(&secs), "{kind:?} at {difficulty}: {secs}");
            }
        }
        assert_eq!(time_limit_secs(ChallengeKind::Math, 1), 15);
        assert_eq!(time_limit_secs(ChallengeKind::Memory, 1), 30);
        assert_eq!(time_limit_secs(ChallengeKind::Math, 5), 10);
    }

    #[test]
    fn same_seed_same_challenges() {
        let mut a = ChallengeGenerator::seeded(42, 5);
        let mut b = ChallengeGenerator::seeded(42, 5);
        for _ in 0..20 {
            let x = a.generate(ChallengeTrigger::RandomCheck);
            let y = b.generate(ChallengeTrigger::RandomCheck);
            assert_eq!(x.kind, y.kind);
            assert_eq!(x.prompt, y.prompt);
            assert_eq!(x.expected_answer, y.expected_answer);
        }
    }

    #[test]
    fn selection_uniformly_covers_enabled_kinds() {
        let mut generator = ChallengeGenerator::seeded(7, 1);
        let kinds: HashSet<_> = (0..50)
            .map(|_| generator.generate(ChallengeTrigger::Manual).kind)
            .collect();
        assert_eq!(kinds, HashSet::from([ChallengeKind::Math, ChallengeKind::Typing]));
    }

    #[test]
    fn math_answer_matches_prompt() {
        let mut generator = ChallengeGenerator::seeded(3, 4);
        for _ in 0..30 {
            let challenge = generator.generate_kind(ChallengeKind::Math, ChallengeTrigger::Manual);
            let parts: Vec<&str> = challenge
                .prompt
                .trim_start_matches("What is ")
                .trim_end_matches('?')
                .split(' ')
                .collect();
            let a: i64 = parts[0].parse().unwrap();
            let b: i64 = parts[2].parse().unwrap();
            let expected = match parts[1] {
                "+" => a + b,
                "-" => a - b,
                "×" => a * b,
                other => panic!("unexpected operator {other}"),
            };
            assert_eq!(challenge.expected_answer, ChallengeAnswer::Text(expected.to_string()));
            assert!(expected >= 0);
        }
    }

    #[test]
    fn memory_options_contain_sequence_and_decoys() {
        let mut generator = ChallengeGenerator::seeded(11, 3);
        let challenge = generator.generate_kind(ChallengeKind::Memory, ChallengeTrigger::Manual);
        let ChallengeAnswer::Selection(sequence) = &challenge.expected_answer else {
            panic!("memory expects a selection");
        };
        let options = challenge.option_set.as_ref().unwrap();
        assert_eq!(sequence.len(), 4);
        assert_eq!(options.len(), 4 + MEMORY_DECOYS);
        assert!(sequence.iter().all(|word| options.contains(word)));
        assert_eq!(challenge.reveal_seconds, Some(MEMORY_REVEAL_SECS));
    }

    #[test]
    fn pattern_offers_every_symbol() {
        let mut generator = ChallengeGenerator::seeded(5, 2);
        let challenge = generator.generate_kind(ChallengeKind::Pattern, ChallengeTrigger::Manual);
        let options = challenge.option_set.unwrap();
        assert_eq!(options.len(), PATTERN_SYMBOLS.len());
        let ChallengeAnswer::Selection(sequence) = challenge.expected_answer else {
            panic!("pattern expects a selection");
        };
        assert_eq!(sequence.len(), 4);
    }
}
