use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyModifiers};

use crate::engine::{Fact, KeyPress};
use crate::remote::RemoteOutcome;
use crate::timer::{TickScheduler, TickToken};

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    FocusGained,
    FocusLost,
    /// Produced by helper threads (countdown ticks, remote outcomes).
    Fact(Fact),
    /// Redraw heartbeat; nothing arrived within the interval.
    Tick,
}

/// Source of app events (keyboard, resize, countdown, remote...)
pub trait AppEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError>;
}

/// Every producer thread shares one queue; the main thread drains it.
pub struct ChannelEventSource {
    tx: Sender<AppEvent>,
    rx: Receiver<AppEvent>,
}

impl ChannelEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<AppEvent> {
        self.tx.clone()
    }

    /// Starts the crossterm reader thread feeding this queue.
    pub fn with_terminal_reader(self) -> Self {
        spawn_terminal_reader(self.sender());
        self
    }
}

impl Default for ChannelEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AppEventSource for ChannelEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

pub fn spawn_terminal_reader(tx: Sender<AppEvent>) {
    thread::spawn(move || loop {
        let forwarded = match event::read() {
            Ok(CtEvent::Key(key)) => tx.send(AppEvent::Key(key)),
            Ok(CtEvent::Resize(_, _)) => tx.send(AppEvent::Resize),
            Ok(CtEvent::FocusGained) => tx.send(AppEvent::FocusGained),
            Ok(CtEvent::FocusLost) => tx.send(AppEvent::FocusLost),
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(target: "runtime", error = %e, "terminal_read_failed");
                break;
            }
        };
        if forwarded.is_err() {
            break;
        }
    });
}

/// Browser-style `key`/`code` names for a terminal key event.
pub fn key_press(event: &KeyEvent) -> KeyPress {
    let (key, code) = match event.code {
        KeyCode::Char(' ') => (" ".to_string(), Some("Space".to_string())),
        KeyCode::Char(c) if c.is_ascii_alphabetic() => {
            (c.to_string(), Some(format!("Key{}", c.to_ascii_uppercase())))
        }
        KeyCode::Char(c) if c.is_ascii_digit() => (c.to_string(), Some(format!("Digit{c}"))),
        KeyCode::Char(c) => (c.to_string(), None),
        KeyCode::Backspace => ("Backspace".to_string(), Some("Backspace".to_string())),
        KeyCode::Enter => ("Enter".to_string(), Some("Enter".to_string())),
        KeyCode::Tab => ("Tab".to_string(), Some("Tab".to_string())),
        KeyCode::Delete => ("Delete".to_string(), Some("Delete".to_string())),
        KeyCode::Left => ("ArrowLeft".to_string(), Some("ArrowLeft".to_string())),
        KeyCode::Right => ("ArrowRight".to_string(), Some("ArrowRight".to_string())),
        KeyCode::Up => ("ArrowUp".to_string(), Some("ArrowUp".to_string())),
        KeyCode::Down => ("ArrowDown".to_string(), Some("ArrowDown".to_string())),
        other => (format!("{other:?}"), None),
    };
    KeyPress {
        key,
        code,
        ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
        alt: event.modifiers.contains(KeyModifiers::ALT),
        meta: event.modifiers.contains(KeyModifiers::SUPER) || event.modifiers.contains(KeyModifiers::META),
    }
}

/// Forwards remote outcomes into the queue as facts.
pub fn remote_notifier(tx: Sender<AppEvent>) -> impl Fn(RemoteOutcome) + Send + 'static {
    move |outcome| {
        let _ = tx.send(AppEvent::Fact(Fact::Remote(outcome)));
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Countdown ticks from a sleeping thread. Each schedule gets its own
/// cancel flag, so a cancelled thread exits at its next wake-up.
pub struct ThreadTickScheduler {
    tx: Sender<AppEvent>,
    period: Duration,
    cancel: Option<Arc<AtomicBool>>,
}

impl ThreadTickScheduler {
    pub fn new(tx: Sender<AppEvent>) -> Self {
        Self::with_period(tx, Duration::from_secs(1))
    }

    pub fn with_period(tx: Sender<AppEvent>, period: Duration) -> Self {
        Self {
            tx,
            period,
            cancel: None,
        }
    }
}

impl TickScheduler for ThreadTickScheduler {
    fn schedule(&mut self, token: TickToken) {
        self.cancel();
        let cancelled = Arc::new(AtomicBool::new(false));
        self.cancel = Some(cancelled.clone());
        let tx = self.tx.clone();
        let period = self.period;
        thread::spawn(move || loop {
            thread::sleep(period);
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            if tx.send(AppEvent::Fact(Fact::Tick(token))).is_err() {
                break;
            }
        });
    }

    fn cancel(&mut self) {
        if let Some(flag) = self.cancel.take() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

impl Drop for ThreadTickScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Test event source for unit tests
pub struct TestEventSource {
    rx: Receiver<AppEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl AppEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event at a time
pub struct Runner<E: AppEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: AppEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to the redraw interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> AppEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => AppEvent::Tick,
        }
    }
}
