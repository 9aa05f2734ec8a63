use crate::error::{Error, Result};
use crate::session::SentenceAttempt;
use include_dir::{include_dir, Dir};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::path::Path;

static SENTENCE_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/sentence_sets");

#[derive(Deserialize, Clone, Debug)]
pub struct SentenceSet {
    pub name: String,
    pub sentences: Vec<String>,
}

impl SentenceSet {
    /// Loads one of the sets embedded in the binary.
    pub fn builtin(name: &str) -> Result<Self> {
        let file = SENTENCE_DIR
            .get_file(format!("{name}.json"))
            .ok_or_else(|| Error::UnknownSentenceSet(name.to_string()))?;
        let text = file
            .contents_utf8()
            .ok_or_else(|| Error::UnknownSentenceSet(name.to_string()))?;
        Self::parse(text)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> Result<Self> {
        let mut set: SentenceSet = serde_json::from_str(text)?;
        set.sentences.retain(|s| !s.trim().is_empty());
        if set.sentences.is_empty() {
            return Err(Error::EmptySentenceSet(set.name));
        }
        Ok(set)
    }

    pub fn builtin_names() -> Vec<String> {
        let mut names: Vec<String> = SENTENCE_DIR
            .files()
            .filter_map(|f| f.path().file_stem())
            .filter_map(|s| s.to_str())
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }
}

/// How sentences are ordered for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceOrder {
    AsGiven,
    /// Fisher-Yates with this seed.
    Seeded(u64),
    /// Fisher-Yates with a seed drawn once per session.
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Incomplete,
    /// Moved on; more sentences remain.
    Next,
    /// That was the last sentence.
    Finished,
}

#[derive(Debug, Clone)]
pub struct SentenceSequencer {
    sentences: Vec<String>,
    index: usize,
}

impl SentenceSequencer {
    pub fn new(sentences: Vec<String>, order: SentenceOrder) -> Self {
        let mut sentences: Vec<String> = sentences
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        let seed = match order {
            SentenceOrder::AsGiven => None,
            SentenceOrder::Seeded(seed) => Some(seed),
            SentenceOrder::Random => Some(rand::thread_rng().gen()),
        };
        if let Some(seed) = seed {
            let mut rng = StdRng::seed_from_u64(seed);
            sentences.shuffle(&mut rng);
        }
        Self {
            sentences,
            index: 0,
        }
    }

    pub fn current_target(&self) -> Option<&str> {
        self.sentences.get(self.index).map(String::as_str)
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.sentences.len().saturating_sub(self.index)
    }

    pub fn completed(&self) -> usize {
        self.index.min(self.sentences.len())
    }

    pub fn sentences(&self) -> &[String] {
        &self.sentences
    }

    /// Completion is by length only: a full-length input with mistakes still
    /// completes the sentence. The attempt is returned for the caller to keep.
    pub fn advance_if_complete(&mut self, input: &str) -> (Advance, Option<SentenceAttempt>) {
        let Some(target) = self.current_target() else {
            return (Advance::Finished, None);
        };
        if input.chars().count() < target.chars().count() {
            return (Advance::Incomplete, None);
        }
        let attempt = SentenceAttempt::new(target, input, false);
        self.index += 1;
        let advance = if self.index >= self.sentences.len() {
            Advance::Finished
        } else {
            Advance::Next
        };
        (advance, Some(attempt))
    }

    /// Attempt for the sentence in progress when time ran out.
    pub fn finish_partial(&self, input: &str) -> Option<SentenceAttempt> {
        if input.is_empty() {
            return None;
        }
        self.current_target()
            .map(|target| SentenceAttempt::new(target, input, true))
    }
}
