use crate::clock::Clock;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `{epoch_millis}_{6 base36 chars}`
    pub fn generate(epoch_millis: i64) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..6)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        Self(format!("{epoch_millis}_{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Posture the test is taken in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    #[default]
    Stationary,
    Walking,
    Stairs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LifecycleState {
    Idle,
    Running,
    Completed,
    Expired,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Completed | LifecycleState::Expired)
    }
}

/// One sentence's final typed text next to what was expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceAttempt {
    pub typed: String,
    pub expected: String,
    pub completed: bool,
    pub errors: usize,
}

impl SentenceAttempt {
    pub fn new(expected: &str, typed: &str, expired: bool) -> Self {
        let completed = typed.chars().count() >= expected.chars().count() || expired;
        Self {
            typed: typed.to_string(),
            expected: expected.to_string(),
            completed,
            errors: positional_errors(expected, typed),
        }
    }
}

/// Mismatched positions plus characters never typed.
pub fn positional_errors(expected: &str, typed: &str) -> usize {
    let mismatches = expected
        .chars()
        .zip(typed.chars())
        .filter(|(e, t)| e != t)
        .count();
    let missing = expected
        .chars()
        .count()
        .saturating_sub(typed.chars().count());
    mismatches + missing
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    /// Monotonic milliseconds.
    pub timestamp: f64,
    #[serde(default)]
    pub wall_ms: i64,
    pub key: String,
    pub sentence_index: usize,
    pub value_after: String,
}

/// Anonymous identity handed out by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: String,
}

impl Principal {
    pub fn short(&self) -> &str {
        let end = self
            .uid
            .char_indices()
            .nth(6)
            .map_or(self.uid.len(), |(i, _)| i);
        &self.uid[..end]
    }
}

/// State that used to live in module globals, threaded explicitly instead.
pub struct SessionContext {
    pub principal: Option<Principal>,
    pub participant: Option<String>,
    pub clock: Arc<dyn Clock>,
}

impl SessionContext {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            principal: None,
            participant: None,
            clock,
        }
    }

    pub fn with_participant(mut self, participant: Option<String>) -> Self {
        self.participant = participant
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        self
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("principal", &self.principal)
            .field("participant", &self.participant)
            .finish_non_exhaustive()
    }
}

/// One bounded attempt at the exercise.
#[derive(Debug, Clone)]
pub struct Session {
    local_id: SessionId,
    authoritative_id: Option<SessionId>,
    pub started_at: DateTime<Utc>,
    pub participant: Option<String>,
    pub state: LifecycleState,
    pub duration_secs: u64,
    pub mode: Mode,
    pub attempts: Vec<SentenceAttempt>,
    pub key_log: Vec<KeyRecord>,
    pub first_key_ms: Option<f64>,
    pub ended_ms: Option<f64>,
    announced: bool,
    remote_create_attempted: bool,
}

impl Session {
    pub fn new(ctx: &SessionContext, duration_secs: u64, mode: Mode) -> Self {
        let started_at = ctx.clock.wall();
        Self::with_id(
            SessionId::generate(started_at.timestamp_millis()),
            ctx,
            duration_secs,
            mode,
        )
    }

    pub fn with_id(id: SessionId, ctx: &SessionContext, duration_secs: u64, mode: Mode) -> Self {
        Self {
            local_id: id,
            authoritative_id: None,
            started_at: ctx.clock.wall(),
            participant: ctx.participant.clone(),
            state: LifecycleState::Idle,
            duration_secs,
            mode,
            attempts: Vec::new(),
            key_log: Vec::new(),
            first_key_ms: None,
            ended_ms: None,
            announced: false,
            remote_create_attempted: false,
        }
    }

    pub fn local_id(&self) -> &SessionId {
        &self.local_id
    }

    pub fn authoritative_id(&self) -> Option<&SessionId> {
        self.authoritative_id.as_ref()
    }

    /// Id new events should reference.
    pub fn reference(&self) -> &SessionId {
        self.authoritative_id.as_ref().unwrap_or(&self.local_id)
    }

    /// Swaps in the server id. Happens at most once per session.
    pub fn reconcile(&mut self, server_id: SessionId) -> bool {
        if self.authoritative_id.is_some() {
            return false;
        }
        self.authoritative_id = Some(server_id);
        true
    }

    /// True the first time only.
    pub fn announce(&mut self) -> bool {
        !std::mem::replace(&mut self.announced, true)
    }

    pub fn is_announced(&self) -> bool {
        self.announced
    }

    /// True the first time only; guards the single remote creation attempt.
    pub fn claim_remote_create(&mut self) -> bool {
        !std::mem::replace(&mut self.remote_create_attempted, true)
    }
}
