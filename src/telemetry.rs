use crate::clock::{iso_millis, Clock};
use crate::session::{LifecycleState, Mode, SessionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Button {
    Start,
    Reset,
    ExportLog,
    ExportSummary,
}

/// Type-specific part of an event, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventKind {
    #[serde(rename_all = "camelCase")]
    SessionStart {
        mode: Mode,
        duration_secs: u64,
        total_sentences: usize,
    },
    TypingFocus,
    TypingBlur,
    #[serde(rename_all = "camelCase")]
    TypingKeydown {
        key: String,
        code: Option<String>,
        ctrl: bool,
        alt: bool,
        meta: bool,
        sentence_index: usize,
    },
    /// Only the length is logged, never the text.
    #[serde(rename_all = "camelCase")]
    TypingInput { length: usize, sentence_index: usize },
    ButtonPress { button: Button },
    #[serde(rename_all = "camelCase")]
    SessionEnd {
        state: LifecycleState,
        wpm: u32,
        cpm: u32,
        accuracy: f64,
        chars_typed: usize,
        correct_chars: usize,
        errors: usize,
        sentences_completed: usize,
        total_sentences: usize,
        elapsed_secs: f64,
    },
}

impl EventKind {
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::SessionStart { .. } => "session-start",
            EventKind::TypingFocus => "typing-focus",
            EventKind::TypingBlur => "typing-blur",
            EventKind::TypingKeydown { .. } => "typing-keydown",
            EventKind::TypingInput { .. } => "typing-input",
            EventKind::ButtonPress { .. } => "button-press",
            EventKind::SessionEnd { .. } => "session-end",
        }
    }
}

/// Remote mirroring state of one local event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum SyncStatus {
    #[default]
    Pending,
    #[serde(rename_all = "camelCase")]
    Synced { remote_id: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub id: String,
    /// Epoch milliseconds.
    pub ts: i64,
    pub iso: String,
    /// Monotonic milliseconds.
    pub perf: f64,
    pub session_id: SessionId,
    pub participant_name: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(default)]
    pub sync: SyncStatus,
}

impl TelemetryEvent {
    pub fn new(
        id: String,
        kind: EventKind,
        session_id: SessionId,
        participant_name: Option<String>,
        clock: &dyn Clock,
    ) -> Self {
        let wall = clock.wall();
        Self {
            id,
            ts: wall.timestamp_millis(),
            iso: iso_millis(wall),
            perf: clock.monotonic_ms(),
            session_id,
            participant_name,
            kind,
            sync: SyncStatus::Pending,
        }
    }

    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    /// Payload handed to the remote store; sync state stays local.
    pub fn remote_payload(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.remove("sync");
        }
        value
    }
}
