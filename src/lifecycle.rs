use crate::error::Result;
use crate::evaluator::{self, Evaluation, InputEvaluator, Outcome};
use crate::export::{SessionSummary, TypedPair};
use crate::metrics::{MetricsCalculator, MetricsSnapshot, RateMode, Totals};
use crate::sentences::{Advance, SentenceOrder, SentenceSequencer};
use crate::session::{KeyRecord, LifecycleState, Mode, Session, SessionContext};
use crate::timer::{TickOutcome, TickToken, TimerController};

/// Everything needed to build a fresh session; kept around for reset.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub sentences: Vec<String>,
    pub order: SentenceOrder,
    pub duration_secs: u64,
    pub mode: Mode,
    pub rate_mode: RateMode,
}

impl LifecycleConfig {
    pub fn new(sentences: Vec<String>, duration_secs: u64) -> Self {
        Self {
            sentences,
            order: SentenceOrder::AsGiven,
            duration_secs,
            mode: Mode::default(),
            rate_mode: RateMode::default(),
        }
    }
}

/// Result of feeding a new input value.
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    /// The session is over; nothing changed.
    Ignored,
    Accepted {
        evaluation: Evaluation,
        advance: Advance,
        /// Present when this input started the countdown.
        started: Option<TickToken>,
        /// Present when this input ended the session.
        ended: Option<LifecycleState>,
    },
}

/// idle -> running -> completed | expired
#[derive(Debug)]
pub struct SessionLifecycle {
    config: LifecycleConfig,
    session: Session,
    sequencer: SentenceSequencer,
    evaluator: InputEvaluator,
    timer: TimerController,
    metrics: MetricsCalculator,
    input: String,
}

impl SessionLifecycle {
    pub fn new(config: LifecycleConfig, ctx: &SessionContext) -> Self {
        let session = Session::new(ctx, config.duration_secs, config.mode);
        Self::with_session(config, session)
    }

    pub fn with_session(config: LifecycleConfig, session: Session) -> Self {
        Self {
            sequencer: SentenceSequencer::new(config.sentences.clone(), config.order),
            timer: TimerController::new(config.duration_secs),
            metrics: MetricsCalculator::new(config.rate_mode),
            evaluator: InputEvaluator::new(),
            input: String::new(),
            session,
            config,
        }
    }

    /// Fresh idle lifecycle with a new session. The old session's persisted
    /// events are untouched.
    pub fn reset(&mut self, ctx: &SessionContext) {
        // the timer survives so tokens handed out before the reset stay stale
        let mut timer = self.timer.clone();
        timer.reset();
        *self = Self {
            timer,
            ..Self::new(self.config.clone(), ctx)
        };
    }

    pub fn state(&self) -> LifecycleState {
        self.session.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn sequencer(&self) -> &SentenceSequencer {
        &self.sequencer
    }

    pub fn timer(&self) -> &TimerController {
        &self.timer
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn current_target(&self) -> Option<&str> {
        self.sequencer.current_target()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.current_target()
            .map(|t| evaluator::outcomes(t, &self.input))
            .unwrap_or_default()
    }

    /// Feeds the whole current value of the input box.
    pub fn on_input(&mut self, value: &str, ctx: &SessionContext) -> Result<InputOutcome> {
        if self.state().is_terminal() {
            return Ok(InputOutcome::Ignored);
        }
        let Some(target) = self.sequencer.current_target() else {
            return Ok(InputOutcome::Ignored);
        };
        let evaluation = self.evaluator.evaluate(target, &self.input, value)?;

        let mut started = None;
        if self.state() == LifecycleState::Idle {
            started = self.timer.start();
            self.session.state = LifecycleState::Running;
            self.session.first_key_ms = Some(ctx.clock.monotonic_ms());
        }

        self.input = value.to_string();
        let (advance, attempt) = self.sequencer.advance_if_complete(&self.input);
        if let Some(attempt) = attempt {
            self.session.attempts.push(attempt);
            self.input.clear();
        }

        let mut ended = None;
        if advance == Advance::Finished {
            self.timer.stop();
            self.end(LifecycleState::Completed, ctx);
            ended = Some(LifecycleState::Completed);
        }

        Ok(InputOutcome::Accepted {
            evaluation,
            advance,
            started,
            ended,
        })
    }

    /// Adds a key to the session's key log. Returns false once the session
    /// is over.
    pub fn record_key(&mut self, key: &str, value_after: &str, ctx: &SessionContext) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        let timestamp = ctx.clock.monotonic_ms();
        let timestamp = self
            .session
            .key_log
            .last()
            .map_or(timestamp, |last| timestamp.max(last.timestamp));
        self.session.key_log.push(KeyRecord {
            timestamp,
            wall_ms: ctx.clock.wall().timestamp_millis(),
            key: key.to_string(),
            sentence_index: self.sequencer.current_index(),
            value_after: value_after.to_string(),
        });
        true
    }

    pub fn on_tick(&mut self, token: TickToken, ctx: &SessionContext) -> TickOutcome {
        let outcome = self.timer.tick(token);
        if outcome == TickOutcome::Expired {
            if let Some(partial) = self.sequencer.finish_partial(&self.input) {
                self.session.attempts.push(partial);
            }
            self.end(LifecycleState::Expired, ctx);
        }
        outcome
    }

    fn end(&mut self, state: LifecycleState, ctx: &SessionContext) {
        self.session.state = state;
        self.session.ended_ms = Some(ctx.clock.monotonic_ms());
    }

    fn totals(&self) -> Totals {
        Totals {
            chars_typed: self.evaluator.chars_typed(),
            correct_chars: self.evaluator.correct_chars(),
            errors: self.evaluator.errors(),
        }
    }

    /// Elapsed active time; frozen once the session has ended.
    pub fn elapsed_ms(&self, now_ms: f64) -> Option<f64> {
        let first = self.session.first_key_ms?;
        let end = self.session.ended_ms.unwrap_or(now_ms);
        Some((end - first).max(0.0))
    }

    pub fn snapshot(&self, now_ms: f64) -> MetricsSnapshot {
        self.metrics
            .snapshot(self.totals(), self.elapsed_ms(now_ms), self.timer.elapsed_secs())
    }

    pub fn summary(&self, ctx: &SessionContext) -> SessionSummary {
        let snapshot = self.snapshot(ctx.clock.monotonic_ms());
        SessionSummary {
            mode: self.session.mode,
            timestamp: crate::clock::iso_millis(self.session.started_at),
            duration: (snapshot.elapsed_secs * 100.0).round() / 100.0,
            wpm: snapshot.wpm,
            accuracy: snapshot.accuracy,
            total_characters_typed: snapshot.chars_typed,
            correct_characters: snapshot.correct_chars,
            errors: snapshot.errors,
            sentences_completed: self.sequencer.completed(),
            total_sentences: self.sequencer.len(),
            completed: self.state() == LifecycleState::Completed,
            sentences_typed: self
                .session
                .attempts
                .iter()
                .map(|a| TypedPair {
                    typed: a.typed.clone(),
                    expected: a.expected.clone(),
                })
                .collect(),
            key_log: self.session.key_log.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn setup(sentences: &[&str], secs: u64) -> (SessionLifecycle, SessionContext, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let ctx = SessionContext::new(clock.clone());
        let config = LifecycleConfig::new(sentences.iter().map(|s| s.to_string()).collect(), secs);
        (SessionLifecycle::new(config, &ctx), ctx, clock)
    }

    #[test]
    fn first_input_starts_running() {
        let (mut lc, ctx, _) = setup(&["hello"], 60);
        assert_eq!(lc.state(), LifecycleState::Idle);
        let out = lc.on_input("h", &ctx).unwrap();
        assert_matches!(out, InputOutcome::Accepted { started: Some(_), ended: None, .. });
        assert_eq!(lc.state(), LifecycleState::Running);
        assert!(lc.timer().is_running());

        let out = lc.on_input("he", &ctx).unwrap();
        assert_matches!(out, InputOutcome::Accepted { started: None, .. });
    }

    #[test]
    fn rejected_input_changes_nothing() {
        let (mut lc, ctx, _) = setup(&["ab", "cd"], 60);
        let err = lc.on_input("abc", &ctx);
        assert_matches!(err, Err(Error::InputRejected { .. }));
        assert_eq!(lc.state(), LifecycleState::Idle);
        assert_eq!(lc.input(), "");
        assert!(!lc.timer().is_running());
    }

    #[test]
    fn mismatched_full_length_final_sentence_completes() {
        let (mut lc, ctx, _) = setup(&["ab"], 60);
        lc.on_input("a", &ctx).unwrap();
        let out = lc.on_input("ax", &ctx).unwrap();
        assert_matches!(
            out,
            InputOutcome::Accepted {
                advance: Advance::Finished,
                ended: Some(LifecycleState::Completed),
                ..
            }
        );
        assert_eq!(lc.state(), LifecycleState::Completed);
        assert!(!lc.timer().is_running());
        let attempt = &lc.session().attempts[0];
        assert_eq!(attempt.typed, "ax");
        assert_eq!(attempt.expected, "ab");
    }

    #[test]
    fn expiry_freezes_metrics_and_ignores_input() {
        let (mut lc, ctx, clock) = setup(&["hello world"], 2);
        let token = match lc.on_input("he", &ctx).unwrap() {
            InputOutcome::Accepted { started, .. } => started.unwrap(),
            other => panic!("unexpected {other:?}"),
        };
        clock.advance_ms(1000);
        assert_eq!(lc.on_tick(token, &ctx), TickOutcome::Running { remaining: 1 });
        clock.advance_ms(1000);
        assert_eq!(lc.on_tick(token, &ctx), TickOutcome::Expired);
        assert_eq!(lc.state(), LifecycleState::Expired);
        assert_eq!(lc.timer().remaining_secs(), 0);

        let before = lc.snapshot(clock.monotonic_ms());
        assert_eq!(lc.on_input("hel", &ctx).unwrap(), InputOutcome::Ignored);
        clock.advance_ms(5000);
        let after = lc.snapshot(clock.monotonic_ms());
        assert_eq!(before, after);
        assert_eq!(after.chars_typed, 2);

        // partial attempt recorded on expiry
        assert_eq!(lc.session().attempts.len(), 1);
        assert_eq!(lc.session().attempts[0].typed, "he");
        assert!(!lc.record_key("l", "hel", &ctx));
    }

    #[test]
    fn reset_builds_a_new_idle_session() {
        let (mut lc, ctx, _) = setup(&["ab", "cd"], 60);
        lc.on_input("ab", &ctx).unwrap();
        let old_id = lc.session().local_id().clone();

        lc.reset(&ctx);
        assert_eq!(lc.state(), LifecycleState::Idle);
        assert_ne!(lc.session().local_id(), &old_id);
        assert!(lc.session().attempts.is_empty());
        assert_eq!(lc.timer().remaining_secs(), 60);
        assert_eq!(lc.current_target(), Some("ab"));
    }

    #[test]
    fn ticks_from_before_a_reset_do_not_reach_the_new_session() {
        let (mut lc, ctx, _) = setup(&["hello"], 60);
        let started = |out: InputOutcome| match out {
            InputOutcome::Accepted {
                started: Some(token),
                ..
            } => token,
            other => panic!("expected a start, got {other:?}"),
        };
        let old = started(lc.on_input("h", &ctx).unwrap());
        lc.reset(&ctx);
        let new = started(lc.on_input("h", &ctx).unwrap());

        assert_ne!(old, new);
        assert_eq!(lc.on_tick(old, &ctx), TickOutcome::Ignored);
        assert_eq!(lc.timer().remaining_secs(), 60);
        assert_eq!(lc.on_tick(new, &ctx), TickOutcome::Running { remaining: 59 });
    }

    #[test]
    fn key_log_timestamps_never_go_backwards() {
        let (mut lc, ctx, clock) = setup(&["abc"], 60);
        lc.record_key("a", "a", &ctx);
        clock.advance_ms(120);
        lc.record_key("b", "ab", &ctx);
        let log = &lc.session().key_log;
        assert_eq!(log.len(), 2);
        assert!(log[1].timestamp >= log[0].timestamp);
        assert_eq!(log[1].value_after, "ab");
        assert_eq!(log[1].sentence_index, 0);
    }
}
