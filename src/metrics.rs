use serde::{Deserialize, Serialize};

/// Elapsed time never counts as less than this, so the first seconds of
/// typing do not produce absurd rates.
pub const MIN_ELAPSED_MINUTES: f64 = 0.1;
pub const CHARS_PER_WORD: f64 = 5.0;

/// Which elapsed-time basis rates are computed from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum RateMode {
    /// Monotonic milliseconds since the first keystroke.
    #[default]
    HighResolution,
    /// Whole seconds consumed from the countdown.
    Coarse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rates {
    pub cpm: u32,
    pub wpm: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub elapsed_secs: f64,
    pub chars_typed: usize,
    pub correct_chars: usize,
    pub errors: usize,
    pub cpm: u32,
    pub wpm: u32,
    pub accuracy: f64,
}

fn floored_minutes(minutes: f64) -> f64 {
    minutes.max(MIN_ELAPSED_MINUTES)
}

pub fn compute_rates(correct_chars: usize, elapsed_ms: f64) -> Rates {
    if elapsed_ms <= 0.0 {
        return Rates::default();
    }
    let minutes = floored_minutes(elapsed_ms / 60_000.0);
    let correct = correct_chars as f64;
    Rates {
        cpm: (correct / minutes).round() as u32,
        wpm: ((correct / CHARS_PER_WORD) / minutes).round() as u32,
    }
}

pub fn compute_coarse_rates(correct_chars: usize, elapsed_secs: u64) -> Rates {
    if elapsed_secs == 0 {
        return Rates::default();
    }
    let minutes = floored_minutes(elapsed_secs as f64 / 60.0);
    let cpm = (correct_chars as f64 / minutes).round();
    Rates {
        cpm: cpm as u32,
        wpm: (cpm / CHARS_PER_WORD).round() as u32,
    }
}

pub fn accuracy(correct_chars: usize, chars_typed: usize) -> f64 {
    if chars_typed == 0 {
        return 0.0;
    }
    ((correct_chars as f64 / chars_typed as f64) * 100.0).round()
}

/// Inputs to a snapshot; the lifecycle fills these from its own state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Totals {
    pub chars_typed: usize,
    pub correct_chars: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCalculator {
    mode: RateMode,
}

impl MetricsCalculator {
    pub fn new(mode: RateMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> RateMode {
        self.mode
    }

    /// `elapsed_ms` is `None` until the first keystroke; `countdown_secs`
    /// is what the coarse basis uses.
    pub fn snapshot(&self, totals: Totals, elapsed_ms: Option<f64>, countdown_secs: u64) -> MetricsSnapshot {
        let rates = match (self.mode, elapsed_ms) {
            (_, None) => Rates::default(),
            (RateMode::HighResolution, Some(ms)) => compute_rates(totals.correct_chars, ms),
            (RateMode::Coarse, Some(_)) => compute_coarse_rates(totals.correct_chars, countdown_secs),
        };
        MetricsSnapshot {
            elapsed_secs: elapsed_ms.map_or(0.0, |ms| ms / 1000.0),
            chars_typed: totals.chars_typed,
            correct_chars: totals.correct_chars,
            errors: totals.errors,
            cpm: rates.cpm,
            wpm: rates.wpm,
            accuracy: accuracy(totals.correct_chars, totals.chars_typed),
        }
    }
}
