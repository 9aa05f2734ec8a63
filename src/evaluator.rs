use crate::error::{Error, Result};

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    Incorrect,
}

/// What a single input change added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Evaluation {
    pub added: usize,
    pub correct: usize,
    pub incorrect: usize,
}

/// Running totals for a session. Only characters appended past the
/// previous input are ever counted, so the totals never go down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputEvaluator {
    chars_typed: usize,
    correct_chars: usize,
    errors: usize,
}

impl InputEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&mut self, target: &str, previous: &str, input: &str) -> Result<Evaluation> {
        let target_len = target.chars().count();
        let len = input.chars().count();
        if len > target_len {
            return Err(Error::InputRejected { len, target_len });
        }

        let from = previous.chars().count();
        let mut evaluation = Evaluation::default();
        for (typed, expected) in input.chars().zip(target.chars()).skip(from) {
            evaluation.added += 1;
            if typed == expected {
                evaluation.correct += 1;
            } else {
                evaluation.incorrect += 1;
            }
        }

        self.chars_typed += evaluation.added;
        self.correct_chars += evaluation.correct;
        self.errors += evaluation.incorrect;
        Ok(evaluation)
    }

    pub fn chars_typed(&self) -> usize {
        self.chars_typed
    }

    pub fn correct_chars(&self) -> usize {
        self.correct_chars
    }

    pub fn errors(&self) -> usize {
        self.errors
    }
}

/// Per-character correctness of `input` against `target`, for display.
pub fn outcomes(target: &str, input: &str) -> Vec<Outcome> {
    input
        .chars()
        .zip(target.chars())
        .map(|(typed, expected)| {
            if typed == expected {
                Outcome::Correct
            } else {
                Outcome::Incorrect
            }
        })
        .collect()
}
