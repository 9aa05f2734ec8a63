use crate::export::SessionSummary;
use crate::session::Mode;
use itertools::Itertools;
use std::fmt;

/// Edit distance over chars (insert, delete, substitute all cost one).
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != *cb);
            row[j + 1] = substitute.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Per-session measures derived from an exported summary.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptAnalysis {
    pub mode: Mode,
    pub wpm: f64,
    pub accuracy: f64,
    pub errors: usize,
    pub duration: f64,
    /// Keystrokes per typed character.
    pub kspc: f64,
    /// Minimum string distance over expected length, in percent.
    pub msd_error_rate: f64,
    /// Backspaces plus errors left in the final text.
    pub eks: f64,
}

impl AttemptAnalysis {
    pub fn from_summary(summary: &SessionSummary) -> Self {
        let typed_chars: usize = summary
            .sentences_typed
            .iter()
            .map(|s| s.typed.chars().count())
            .sum();
        let expected_chars: usize = summary
            .sentences_typed
            .iter()
            .map(|s| s.expected.chars().count())
            .sum();
        let distance: usize = summary
            .sentences_typed
            .iter()
            .map(|s| levenshtein(&s.typed, &s.expected))
            .sum();
        let backspaces = summary
            .key_log
            .iter()
            .filter(|k| k.key == "Backspace")
            .count();

        let kspc = if typed_chars == 0 {
            0.0
        } else {
            summary.key_log.len() as f64 / typed_chars as f64
        };
        let msd_error_rate = if expected_chars == 0 {
            0.0
        } else {
            distance as f64 / expected_chars as f64 * 100.0
        };

        Self {
            mode: summary.mode,
            wpm: f64::from(summary.wpm),
            accuracy: summary.accuracy,
            errors: summary.errors,
            duration: summary.duration,
            kspc,
            msd_error_rate,
            eks: (backspaces + distance) as f64,
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1); needs at least two values.
fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl MetricStats {
    fn of(values: &[f64]) -> Self {
        Self {
            mean: mean(values).unwrap_or_default(),
            std_dev: std_dev(values).unwrap_or_default(),
        }
    }
}

impl fmt::Display for MetricStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} ± {:.2}", self.mean, self.std_dev)
    }
}

/// Mean and spread of each measure across the sessions of one mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSummary {
    pub mode: Mode,
    pub sessions: usize,
    pub wpm: MetricStats,
    pub accuracy: MetricStats,
    pub kspc: MetricStats,
    pub msd_error_rate: MetricStats,
    pub eks: MetricStats,
}

impl fmt::Display for ConditionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (n={})", self.mode, self.sessions)?;
        writeln!(f, "  wpm       {}", self.wpm)?;
        writeln!(f, "  accuracy  {}", self.accuracy)?;
        writeln!(f, "  kspc      {}", self.kspc)?;
        writeln!(f, "  msd err%  {}", self.msd_error_rate)?;
        write!(f, "  eks       {}", self.eks)
    }
}

fn mode_rank(mode: Mode) -> u8 {
    match mode {
        Mode::Stationary => 0,
        Mode::Walking => 1,
        Mode::Stairs => 2,
    }
}

/// Groups sessions by mode, in stationary, walking, stairs order.
pub fn summarize_by_mode(analyses: &[AttemptAnalysis]) -> Vec<ConditionSummary> {
    analyses
        .iter()
        .into_group_map_by(|a| a.mode)
        .into_iter()
        .sorted_by_key(|(mode, _)| mode_rank(*mode))
        .map(|(mode, group)| {
            let column = |f: fn(&AttemptAnalysis) -> f64| group.iter().map(|a| f(a)).collect_vec();
            ConditionSummary {
                mode,
                sessions: group.len(),
                wpm: MetricStats::of(&column(|a| a.wpm)),
                accuracy: MetricStats::of(&column(|a| a.accuracy)),
                kspc: MetricStats::of(&column(|a| a.kspc)),
                msd_error_rate: MetricStats::of(&column(|a| a.msd_error_rate)),
                eks: MetricStats::of(&column(|a| a.eks)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::TypedPair;
    use crate::session::KeyRecord;

    fn key(k: &str) -> KeyRecord {
        KeyRecord {
            timestamp: 0.0,
            wall_ms: 0,
            key: k.into(),
            sentence_index: 0,
            value_after: String::new(),
        }
    }

    fn summary(mode: Mode, wpm: u32, pairs: &[(&str, &str)], keys: &[&str]) -> SessionSummary {
        SessionSummary {
            mode,
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            duration: 60.0,
            wpm,
            accuracy: 90.0,
            total_characters_typed: 0,
            correct_characters: 0,
            errors: 0,
            sentences_completed: pairs.len(),
            total_sentences: pairs.len(),
            completed: true,
            sentences_typed: pairs
                .iter()
                .map(|(t, e)| TypedPair {
                    typed: t.to_string(),
                    expected: e.to_string(),
                })
                .collect(),
            key_log: keys.iter().map(|k| key(k)).collect(),
        }
    }

    #[test]
    fn mean_and_spread() {
        assert_eq!(mean(&[]), None);
        assert_eq!(std_dev(&[]), None);
        assert_eq!(std_dev(&[42.0]), None);
        assert_eq!(mean(&[15., 7., 55., 12., 4.]), Some(18.6));
        assert_eq!(std_dev(&[5.0, 5.0, 5.0]), Some(0.0));
        assert_eq!(std_dev(&[-10.0, -5.0, -15.0]), Some(5.0));
        assert_eq!(MetricStats::of(&[40.0, 60.0]).to_string(), "50.00 ± 14.14");
        assert_eq!(MetricStats::of(&[40.0]).to_string(), "40.00 ± 0.00");
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("héllo", "hello"), 1);
    }

    #[test]
    fn kspc_msd_and_eks() {
        // typed "cx" for "cd" after one correction
        let s = summary(
            Mode::Walking,
            30,
            &[("ab", "ab"), ("cx", "cd")],
            &["a", "b", "c", "y", "Backspace", "x"],
        );
        let a = AttemptAnalysis::from_summary(&s);
        assert_eq!(a.kspc, 6.0 / 4.0);
        assert_eq!(a.msd_error_rate, 25.0);
        assert_eq!(a.eks, 2.0);
    }

    #[test]
    fn empty_summary_yields_zeros() {
        let a = AttemptAnalysis::from_summary(&summary(Mode::Stairs, 0, &[], &[]));
        assert_eq!(a.kspc, 0.0);
        assert_eq!(a.msd_error_rate, 0.0);
        assert_eq!(a.eks, 0.0);
    }

    #[test]
    fn groups_by_mode_in_fixed_order() {
        let analyses = [
            summary(Mode::Stairs, 20, &[("ab", "ab")], &["a", "b"]),
            summary(Mode::Stationary, 40, &[("ab", "ab")], &["a", "b"]),
            summary(Mode::Stationary, 60, &[("ab", "ab")], &["a", "b"]),
        ]
        .iter()
        .map(AttemptAnalysis::from_summary)
        .collect_vec();

        let groups = summarize_by_mode(&analyses);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].mode, Mode::Stationary);
        assert_eq!(groups[0].sessions, 2);
        assert_eq!(groups[0].wpm.mean, 50.0);
        assert!((groups[0].wpm.std_dev - 200f64.sqrt()).abs() < 1e-10);
        assert_eq!(groups[1].wpm.std_dev, 0.0);
        assert_eq!(groups[1].mode, Mode::Stairs);
        assert_eq!(groups[1].kspc.mean, 1.0);
        assert!(groups[0].to_string().starts_with("stationary (n=2)"));
    }
}
