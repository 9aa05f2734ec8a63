use std::sync::{Arc, Mutex};

/// Identifies the tick source a tick came from. Ticks from any source
/// other than the current one are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickToken {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Ignored,
    Running { remaining: u64 },
    Expired,
}

/// One-second countdown that starts on the first keystroke.
#[derive(Debug, Clone)]
pub struct TimerController {
    duration_secs: u64,
    remaining_secs: u64,
    generation: u64,
    running: bool,
}

impl TimerController {
    pub fn new(duration_secs: u64) -> Self {
        let duration_secs = duration_secs.max(1);
        Self {
            duration_secs,
            remaining_secs: duration_secs,
            generation: 0,
            running: false,
        }
    }

    /// Returns a token for a new tick source, or `None` if already running
    /// or already run down.
    pub fn start(&mut self) -> Option<TickToken> {
        if self.running || self.remaining_secs == 0 {
            return None;
        }
        self.generation += 1;
        self.running = true;
        Some(self.active_token_unchecked())
    }

    pub fn tick(&mut self, token: TickToken) -> TickOutcome {
        if !self.running || token.generation != self.generation {
            return TickOutcome::Ignored;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.halt();
            TickOutcome::Expired
        } else {
            TickOutcome::Running {
                remaining: self.remaining_secs,
            }
        }
    }

    /// The session finished before the countdown did.
    pub fn stop(&mut self) {
        self.halt();
    }

    pub fn reset(&mut self) {
        self.halt();
        self.remaining_secs = self.duration_secs;
    }

    pub fn active_token(&self) -> Option<TickToken> {
        self.running.then(|| self.active_token_unchecked())
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.duration_secs - self.remaining_secs
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn halt(&mut self) {
        if self.running {
            // leaves any outstanding token stale
            self.generation += 1;
        }
        self.running = false;
    }

    fn active_token_unchecked(&self) -> TickToken {
        TickToken {
            generation: self.generation,
        }
    }
}

/// Produces one tick per second for a token until cancelled.
pub trait TickScheduler: Send {
    /// Cancels whatever was scheduled before, then schedules `token`.
    fn schedule(&mut self, token: TickToken);
    fn cancel(&mut self);
}

/// Scheduler that never ticks on its own; tests deliver ticks by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualTicks {
    state: Arc<Mutex<ManualTicksState>>,
}

#[derive(Debug, Default)]
struct ManualTicksState {
    current: Option<TickToken>,
    scheduled: usize,
    cancelled: usize,
}

impl ManualTicks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<TickToken> {
        self.state.lock().ok().and_then(|s| s.current)
    }

    pub fn scheduled_count(&self) -> usize {
        self.state.lock().map(|s| s.scheduled).unwrap_or(0)
    }

    pub fn cancelled_count(&self) -> usize {
        self.state.lock().map(|s| s.cancelled).unwrap_or(0)
    }
}

impl TickScheduler for ManualTicks {
    fn schedule(&mut self, token: TickToken) {
        self.cancel();
        if let Ok(mut s) = self.state.lock() {
            s.current = Some(token);
            s.scheduled += 1;
        }
    }

    fn cancel(&mut self) {
        if let Ok(mut s) = self.state.lock() {
            if s.current.take().is_some() {
                s.cancelled += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_is_idempotent() {
        let mut timer = TimerController::new(60);
        let token = timer.start().unwrap();
        assert!(timer.start().is_none());

        for _ in 0..5 {
            timer.tick(token);
        }
        assert_eq!(timer.remaining_secs(), 55);
    }

    #[test]
    fn runs_down_to_expiry_and_stops() {
        let mut timer = TimerController::new(3);
        let token = timer.start().unwrap();
        assert_eq!(timer.tick(token), TickOutcome::Running { remaining: 2 });
        assert_eq!(timer.tick(token), TickOutcome::Running { remaining: 1 });
        assert_eq!(timer.tick(token), TickOutcome::Expired);
        assert!(!timer.is_running());
        assert_eq!(timer.tick(token), TickOutcome::Ignored);
        assert_eq!(timer.remaining_secs(), 0);
        assert!(timer.start().is_none());
    }

    #[test]
    fn stale_tokens_are_ignored_after_reset() {
        let mut timer = TimerController::new(10);
        let old = timer.start().unwrap();
        timer.tick(old);
        timer.reset();
        assert_eq!(timer.remaining_secs(), 10);

        let new = timer.start().unwrap();
        assert_ne!(old, new);
        assert_eq!(timer.tick(old), TickOutcome::Ignored);
        assert_eq!(timer.tick(new), TickOutcome::Running { remaining: 9 });
    }

    #[test]
    fn stop_freezes_remaining() {
        let mut timer = TimerController::new(10);
        let token = timer.start().unwrap();
        timer.tick(token);
        timer.stop();
        assert_eq!(timer.tick(token), TickOutcome::Ignored);
        assert_eq!(timer.remaining_secs(), 9);
        assert_eq!(timer.elapsed_secs(), 1);
        assert!(timer.active_token().is_none());
    }

    #[test]
    fn zero_duration_is_clamped() {
        let timer = TimerController::new(0);
        assert_eq!(timer.duration_secs(), 1);
    }

    #[test]
    fn manual_ticks_keeps_one_source() {
        let mut ticks = ManualTicks::new();
        let mut timer = TimerController::new(5);
        let token = timer.start().unwrap();
        ticks.schedule(token);
        ticks.schedule(token);
        assert_eq!(ticks.current(), Some(token));
        assert_eq!(ticks.scheduled_count(), 2);
        assert_eq!(ticks.cancelled_count(), 1);
        ticks.cancel();
        assert!(ticks.current().is_none());
    }
}
