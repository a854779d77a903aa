use crate::models::{Challenge, ChallengeAnswer};

/// Free-text answers match case-insensitively after trimming the ends;
/// selections must match the generated sequence item for item. An answer
/// of the wrong shape is simply wrong.
pub fn grade(challenge: &Challenge, answer: &ChallengeAnswer) -> bool {
    match (&challenge.expected_answer, answer) {
        (ChallengeAnswer::Text(expected), ChallengeAnswer::Text(given)) => {
            normalize_text(expected) == normalize_text(given)
        }
        (ChallengeAnswer::Selection(expected), ChallengeAnswer::Selection(given)) => expected == given,
        _ => false,
    }
}

fn normalize_text(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::generator::ChallengeGenerator;
    use crate::models::{ChallengeKind, ChallengeTrigger};

    fn challenge(kind: ChallengeKind, expected: ChallengeAnswer) -> Challenge {
        let mut challenge = ChallengeGenerator::seeded(1, 3).generate_kind(kind, ChallengeTrigger::Manual);
        challenge.expected_answer = expected;
        challenge
    }

    fn text(value: &str) -> ChallengeAnswer {
        ChallengeAnswer::Text(value.into())
    }

    fn selection(values: &[&str]) -> ChallengeAnswer {
        ChallengeAnswer::Selection(values.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn typing_ignores_case_and_surrounding_whitespace() {
        let typing = challenge(ChallengeKind::Typing, text("focus mode"));
        assert!(grade(&typing, &text(" FOCUS MODE ")));
        assert!(grade(&typing, &text("Focus Mode\n")));
        assert!(!grade(&typing, &text("focus  mode")));
        assert!(!grade(&typing, &text("focus")));
    }

    #[test]
    fn math_compares_trimmed_text() {
        let math = challenge(ChallengeKind::Math, text("42"));
        assert!(grade(&math, &text(" 42")));
        assert!(!grade(&math, &text("42.0")));
    }

    #[test]
    fn selections_must_match_in_order() {
        let pattern = challenge(ChallengeKind::Pattern, selection(&["red", "blue", "red"]));
        assert!(grade(&pattern, &selection(&["red", "blue", "red"])));
        assert!(!grade(&pattern, &selection(&["blue", "red", "red"])));
        assert!(!grade(&pattern, &selection(&["red", "blue"])));
        assert!(!grade(&pattern, &selection(&["Red", "blue", "red"])));
    }

    #[test]
    fn wrong_answer_shape_fails() {
        let memory = challenge(ChallengeKind::Memory, selection(&["anchor"]));
        assert!(!grade(&memory, &text("anchor")));

        let math = challenge(ChallengeKind::Math, text("3"));
        assert!(!grade(&math, &selection(&["3"])));
    }
}
