use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::event_log::EventLog;
use crate::export;
use crate::lifecycle::{InputOutcome, LifecycleConfig, SessionLifecycle};
use crate::metrics::MetricsSnapshot;
use crate::remote::{RemoteOutcome, RemoteRequest, RemoteSync};
use crate::session::{LifecycleState, SessionContext};
use crate::status::StatusLine;
use crate::storage::{self, LocalStore};
use crate::telemetry::{Button, EventKind, SyncStatus, TelemetryEvent};
use crate::timer::{TickOutcome, TickScheduler, TickToken};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const NO_PRINCIPAL: &str = "no principal yet";

/// A raw key press as the terminal reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    pub code: Option<String>,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyPress {
    pub fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            code: None,
            ctrl: false,
            alt: false,
            meta: false,
        }
    }
}

/// Everything the engine reacts to. Facts are handled strictly one at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum Fact {
    Focus,
    Blur,
    Key(KeyPress),
    /// New full value of the input box.
    Input(String),
    Button(Button),
    Tick(TickToken),
    Remote(RemoteOutcome),
    Participant(String),
}

pub struct Engine {
    ctx: SessionContext,
    lifecycle: SessionLifecycle,
    log: EventLog,
    store: Arc<dyn LocalStore>,
    remote: RemoteSync,
    ticks: Box<dyn TickScheduler>,
    status: StatusLine,
    export_dir: PathBuf,
    pending_key: Option<String>,
}

impl Engine {
    pub fn new(
        config: LifecycleConfig,
        store: Arc<dyn LocalStore>,
        clock: Arc<dyn Clock>,
        remote: RemoteSync,
        ticks: Box<dyn TickScheduler>,
        export_dir: PathBuf,
    ) -> Self {
        let participant = storage::load_participant(store.as_ref());
        let ctx = SessionContext::new(clock).with_participant(participant);
        let lifecycle = SessionLifecycle::new(config, &ctx);
        let log = EventLog::new(store.clone());

        let mut status = StatusLine::new();
        if let Some(last) = log.latest() {
            status.push(format!("Last event: {} at {}", last.tag(), last.iso), ctx.clock.wall());
        }

        Self {
            ctx,
            lifecycle,
            log,
            store,
            remote,
            ticks,
            status,
            export_dir,
            pending_key: None,
        }
    }

    pub fn ctx(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.lifecycle.snapshot(self.ctx.clock.monotonic_ms())
    }

    /// Asks the remote for an anonymous principal. The answer arrives later
    /// as a `Fact::Remote`.
    pub fn sign_in(&mut self) {
        if let Err(e) = self.remote.submit(RemoteRequest::SignIn) {
            self.say(format!("offline: {}", e.status_text()));
        }
    }

    /// Only local storage failures come back as errors.
    pub fn handle(&mut self, fact: Fact) -> Result<()> {
        match fact {
            Fact::Focus => self.record(EventKind::TypingFocus),
            Fact::Blur => self.record(EventKind::TypingBlur),
            Fact::Key(press) => self.on_key(press),
            Fact::Input(value) => self.on_input(value),
            Fact::Button(button) => self.on_button(button),
            Fact::Tick(token) => self.on_tick(token),
            Fact::Remote(outcome) => self.on_remote(outcome),
            Fact::Participant(name) => self.on_participant(name),
        }
    }

    fn say(&mut self, text: impl AsRef<str>) {
        self.status.push(text, self.ctx.clock.wall());
    }

    fn on_key(&mut self, press: KeyPress) -> Result<()> {
        let sentence_index = self.lifecycle.sequencer().current_index();
        self.pending_key = Some(press.key.clone());
        self.record(EventKind::TypingKeydown {
            key: press.key,
            code: press.code,
            ctrl: press.ctrl,
            alt: press.alt,
            meta: press.meta,
            sentence_index,
        })
    }

    fn on_input(&mut self, value: String) -> Result<()> {
        let key = self
            .pending_key
            .take()
            .unwrap_or_else(|| "Unidentified".to_string());
        self.lifecycle.record_key(&key, &value, &self.ctx);
        if value == self.lifecycle.input() {
            return Ok(());
        }

        let sentence_index = self.lifecycle.sequencer().current_index();
        let outcome = match self.lifecycle.on_input(&value, &self.ctx) {
            Ok(outcome) => outcome,
            Err(e @ Error::InputRejected { .. }) => {
                tracing::debug!(target: "engine", error = %e, "input_rejected");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let InputOutcome::Accepted { started, ended, .. } = outcome else {
            return Ok(());
        };

        if let Some(token) = started {
            self.ticks.schedule(token);
            self.announce()?;
        }
        self.record(EventKind::TypingInput {
            length: value.chars().count(),
            sentence_index,
        })?;
        if ended.is_some() {
            self.finish()?;
        }
        Ok(())
    }

    fn on_button(&mut self, button: Button) -> Result<()> {
        self.record(EventKind::ButtonPress { button })?;
        match button {
            Button::Start => {
                if !self.lifecycle.state().is_terminal() {
                    self.announce()?;
                }
            }
            Button::Reset => {
                self.ticks.cancel();
                self.pending_key = None;
                self.lifecycle.reset(&self.ctx);
                tracing::info!(
                    target: "engine",
                    session = %self.lifecycle.session().local_id(),
                    "session_reset"
                );
                self.say("Session reset");
            }
            Button::ExportLog => self.export_log(),
            Button::ExportSummary => self.export_summary(),
        }
        Ok(())
    }

    fn on_tick(&mut self, token: TickToken) -> Result<()> {
        match self.lifecycle.on_tick(token, &self.ctx) {
            TickOutcome::Expired => self.finish(),
            TickOutcome::Running { .. } => Ok(()),
            TickOutcome::Ignored => {
                tracing::trace!(target: "engine", "stale_tick");
                Ok(())
            }
        }
    }

    fn on_participant(&mut self, name: String) -> Result<()> {
        storage::save_participant(self.store.as_ref(), &name)?;
        let name = name.trim().to_string();
        self.ctx.participant = (!name.is_empty()).then_some(name);
        let message = match &self.ctx.participant {
            Some(name) => format!("Participant: {name}"),
            None => "Participant cleared".to_string(),
        };
        self.say(message);
        Ok(())
    }

    fn on_remote(&mut self, outcome: RemoteOutcome) -> Result<()> {
        match outcome {
            RemoteOutcome::SignedIn(principal) => {
                self.say(format!("Signed in anonymously: {}", principal.short()));
                self.ctx.principal = Some(principal);
            }
            RemoteOutcome::AuthFailed(reason) => {
                self.say(format!("↳ sign-in failed: {reason}"));
            }
            RemoteOutcome::SessionCreated {
                local_id,
                server_id,
            } => {
                let session = self.lifecycle.session_mut();
                if session.local_id() == &local_id && session.reconcile(server_id.clone()) {
                    self.say(format!("↳ session started id: {server_id}"));
                } else {
                    tracing::debug!(
                        target: "engine",
                        %local_id,
                        %server_id,
                        "session_created_for_old_session"
                    );
                }
            }
            RemoteOutcome::SessionCreateFailed { local_id, reason } => {
                tracing::warn!(target: "engine", %local_id, %reason, "session_create_failed");
                self.say(format!("↳ online session failed: {reason}"));
            }
            RemoteOutcome::EventSynced {
                event_id,
                remote_id,
            } => {
                self.log.annotate(
                    &event_id,
                    SyncStatus::Synced {
                        remote_id: remote_id.clone(),
                    },
                )?;
                self.say(format!("↳ saved online id: {remote_id}"));
            }
            RemoteOutcome::EventSyncFailed { event_id, reason } => {
                self.sync_failed(&event_id, reason)?;
            }
        }
        Ok(())
    }

    /// Emits session-start and the one remote creation attempt, once per session.
    fn announce(&mut self) -> Result<()> {
        if !self.lifecycle.session_mut().announce() {
            return Ok(());
        }
        let (mode, duration_secs) = {
            let config = self.lifecycle.config();
            (config.mode, config.duration_secs)
        };
        let total_sentences = self.lifecycle.sequencer().len();
        self.record(EventKind::SessionStart {
            mode,
            duration_secs,
            total_sentences,
        })?;
        self.say("local ok");

        let Some(principal) = self.ctx.principal.clone() else {
            return Ok(());
        };
        if !self.remote.is_enabled() || !self.lifecycle.session_mut().claim_remote_create() {
            return Ok(());
        }
        let session = self.lifecycle.session();
        let doc = json!({
            "localSessionId": session.local_id(),
            "participantName": self.ctx.participant,
            "mode": session.mode,
            "durationSecs": session.duration_secs,
            "totalSentences": total_sentences,
            "startedAt": crate::clock::iso_millis(session.started_at),
        });
        let request = RemoteRequest::CreateSession {
            local_id: session.local_id().clone(),
            principal,
            doc,
        };
        if let Err(e) = self.remote.submit(request) {
            self.say(format!("↳ online session failed: {}", e.status_text()));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.ticks.cancel();
        let state = self.lifecycle.state();
        let snapshot = self.snapshot();
        let sequencer = self.lifecycle.sequencer();
        let (sentences_completed, total_sentences) = (sequencer.completed(), sequencer.len());
        self.record(EventKind::SessionEnd {
            state,
            wpm: snapshot.wpm,
            cpm: snapshot.cpm,
            accuracy: snapshot.accuracy,
            chars_typed: snapshot.chars_typed,
            correct_chars: snapshot.correct_chars,
            errors: snapshot.errors,
            sentences_completed,
            total_sentences,
            elapsed_secs: snapshot.elapsed_secs,
        })?;
        tracing::info!(
            target: "engine",
            session = %self.lifecycle.session().reference(),
            %state,
            wpm = snapshot.wpm,
            accuracy = snapshot.accuracy,
            "session_ended"
        );
        let verb = if state == LifecycleState::Completed {
            "completed"
        } else {
            "time up"
        };
        self.say(format!(
            "Session {verb}: {} wpm, {}% accuracy",
            snapshot.wpm, snapshot.accuracy
        ));
        Ok(())
    }

    /// Appends locally, then hands the event to the remote mirror.
    fn record(&mut self, kind: EventKind) -> Result<()> {
        let now = self.ctx.clock.wall();
        let id = self.log.next_id(now.timestamp_millis());
        let event = TelemetryEvent::new(
            id,
            kind,
            self.lifecycle.session().reference().clone(),
            self.ctx.participant.clone(),
            self.ctx.clock.as_ref(),
        );
        self.log.append(event.clone())?;
        tracing::debug!(target: "engine", id = %event.id, kind = event.tag(), "event_recorded");
        self.mirror(&event)
    }

    fn mirror(&mut self, event: &TelemetryEvent) -> Result<()> {
        if !self.remote.is_enabled() {
            return Ok(());
        }
        let Some(principal) = self.ctx.principal.clone() else {
            return self.sync_failed(&event.id, NO_PRINCIPAL.to_string());
        };
        let request = RemoteRequest::RecordEvent {
            event_id: event.id.clone(),
            principal,
            participant: self.ctx.participant.clone(),
            payload: event.remote_payload(),
        };
        match self.remote.submit(request) {
            Ok(()) => Ok(()),
            Err(e) => self.sync_failed(&event.id, e.status_text()),
        }
    }

    fn sync_failed(&mut self, event_id: &str, reason: String) -> Result<()> {
        tracing::warn!(target: "remote", event_id, %reason, "event_sync_failed");
        self.say(format!("↳ online save failed: {reason}"));
        self.log
            .annotate(event_id, SyncStatus::Failed { reason })
            .map(|_| ())
    }

    fn export_log(&mut self) {
        let events = self.log.read_all();
        match export::export_events(&events, &self.export_dir, self.ctx.clock.wall()) {
            Ok(Some(path)) => self.say(format!("Exported {} events to {}", events.len(), path.display())),
            Ok(None) => self.say("No events to export yet."),
            Err(e) => self.say(format!("Export failed: {e}")),
        }
    }

    fn export_summary(&mut self) {
        let summary = self.lifecycle.summary(&self.ctx);
        let now = self.ctx.clock.wall();
        let written = export::export_summary(&summary, &self.export_dir, now).and_then(|json| {
            export::export_key_log_csv(&summary, &self.export_dir, now).map(|csv| (json, csv))
        });
        match written {
            Ok((json, csv)) => self.say(format!(
                "Exported summary to {} and {}",
                json.display(),
                csv.display()
            )),
            Err(e) => self.say(format!("Export failed: {e}")),
        }
    }
}
