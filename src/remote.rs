use crate::clock::iso_millis;
use crate::error::{Error, Result};
use crate::session::{Principal, SessionId};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

/// Field the store stamps with its own clock on every write.
pub const SERVER_TIMESTAMP_FIELD: &str = "ts_server";

/// Passive hierarchical document store:
/// `users/<uid>` profile plus `sessions` and `events` sub-collections.
/// Calls block; `RemoteSync` runs them off the typing thread.
pub trait RemoteStore: Send + 'static {
    fn sign_in_anonymously(&mut self) -> Result<Principal>;
    /// Returns the id the store assigned.
    fn create_session(&mut self, principal: &Principal, doc: &Value) -> Result<String>;
    /// Merges `name` and `updatedAt` into the profile document.
    fn upsert_profile(&mut self, principal: &Principal, name: &str) -> Result<()>;
    fn create_event(&mut self, principal: &Principal, doc: &Value) -> Result<String>;
}

fn stamped(doc: &Value) -> Value {
    let mut doc = doc.clone();
    if let Some(map) = doc.as_object_mut() {
        map.insert(SERVER_TIMESTAMP_FIELD.to_string(), json!(iso_millis(Utc::now())));
    }
    doc
}

fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

#[derive(Debug, Default)]
struct MemoryState {
    online: bool,
    refuse_sign_in: bool,
    principal: Option<Principal>,
    profiles: Map<String, Value>,
    sessions: Vec<(String, String, Value)>,
    events: Vec<(String, String, Value)>,
}

/// Shared in-memory store. Clones see the same documents, so a test can keep
/// one handle while `RemoteSync` owns another.
#[derive(Debug, Clone)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                online: true,
                ..MemoryState::default()
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    pub fn refuse_sign_in(&self, refuse: bool) {
        self.lock().refuse_sign_in = refuse;
    }

    pub fn sessions(&self) -> Vec<(String, Value)> {
        self.lock()
            .sessions
            .iter()
            .map(|(_, id, doc)| (id.clone(), doc.clone()))
            .collect()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.lock()
            .events
            .iter()
            .map(|(_, id, doc)| (id.clone(), doc.clone()))
            .collect()
    }

    pub fn profile(&self, uid: &str) -> Option<Value> {
        self.lock().profiles.get(uid).cloned()
    }

    fn check_online(state: &MemoryState) -> Result<()> {
        if state.online {
            Ok(())
        } else {
            Err(Error::RemoteUnavailable("network unreachable".into()))
        }
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn sign_in_anonymously(&mut self) -> Result<Principal> {
        let mut state = self.lock();
        if state.refuse_sign_in {
            return Err(Error::AuthFailure("anonymous sign-in disabled".into()));
        }
        Self::check_online(&state).map_err(|e| Error::AuthFailure(e.status_text()))?;
        if let Some(p) = &state.principal {
            return Ok(p.clone());
        }
        let principal = Principal {
            uid: format!("anon-{}", state.profiles.len() + 1),
        };
        state.principal = Some(principal.clone());
        Ok(principal)
    }

    fn create_session(&mut self, principal: &Principal, doc: &Value) -> Result<String> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        let id = format!("S{}", state.sessions.len() + 1);
        state
            .sessions
            .push((principal.uid.clone(), id.clone(), stamped(doc)));
        Ok(id)
    }

    fn upsert_profile(&mut self, principal: &Principal, name: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        let entry = state
            .profiles
            .entry(principal.uid.clone())
            .or_insert_with(|| json!({}));
        if let Some(map) = entry.as_object_mut() {
            map.insert("name".into(), json!(name));
            map.insert("updatedAt".into(), json!(iso_millis(Utc::now())));
        }
        Ok(())
    }

    fn create_event(&mut self, principal: &Principal, doc: &Value) -> Result<String> {
        let mut state = self.lock();
        Self::check_online(&state)?;
        let id = format!("E{}", state.events.len() + 1);
        state
            .events
            .push((principal.uid.clone(), id.clone(), stamped(doc)));
        Ok(id)
    }
}

/// Mirrors the document tree onto a directory:
/// `users/<uid>/profile.json`, `users/<uid>/{sessions,events}/<id>.json`.
#[derive(Debug, Clone)]
pub struct DirRemoteStore {
    root: PathBuf,
}

impl DirRemoteStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn user_dir(&self, principal: &Principal) -> PathBuf {
        self.root.join("users").join(&principal.uid)
    }

    fn unavailable(e: impl std::fmt::Display) -> Error {
        Error::RemoteUnavailable(e.to_string())
    }

    fn write_doc(path: &Path, doc: &Value) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Self::unavailable)?;
        }
        let bytes = serde_json::to_vec_pretty(doc)?;
        fs::write(path, bytes).map_err(Self::unavailable)
    }

    fn add_doc(&self, principal: &Principal, collection: &str, doc: &Value) -> Result<String> {
        let id = auto_id();
        let path = self
            .user_dir(principal)
            .join(collection)
            .join(format!("{id}.json"));
        Self::write_doc(&path, &stamped(doc))?;
        Ok(id)
    }
}

impl RemoteStore for DirRemoteStore {
    fn sign_in_anonymously(&mut self) -> Result<Principal> {
        let path = self.root.join("anonymous_uid");
        match fs::read_to_string(&path) {
            Ok(uid) if !uid.trim().is_empty() => Ok(Principal {
                uid: uid.trim().to_string(),
            }),
            _ => {
                fs::create_dir_all(&self.root).map_err(|e| Error::AuthFailure(e.to_string()))?;
                let uid = auto_id();
                fs::write(&path, &uid).map_err(|e| Error::AuthFailure(e.to_string()))?;
                Ok(Principal { uid })
            }
        }
    }

    fn create_session(&mut self, principal: &Principal, doc: &Value) -> Result<String> {
        self.add_doc(principal, "sessions", doc)
    }

    fn upsert_profile(&mut self, principal: &Principal, name: &str) -> Result<()> {
        let path = self.user_dir(principal).join("profile.json");
        let mut profile = fs::read(&path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}));
        if let Some(map) = profile.as_object_mut() {
            map.insert("name".into(), json!(name));
            map.insert("updatedAt".into(), json!(iso_millis(Utc::now())));
        }
        Self::write_doc(&path, &profile)
    }

    fn create_event(&mut self, principal: &Principal, doc: &Value) -> Result<String> {
        self.add_doc(principal, "events", doc)
    }
}

/// Work handed to the sync worker.
#[derive(Debug, Clone)]
pub enum RemoteRequest {
    SignIn,
    CreateSession {
        local_id: SessionId,
        principal: Principal,
        doc: Value,
    },
    RecordEvent {
        event_id: String,
        principal: Principal,
        participant: Option<String>,
        payload: Value,
    },
}

/// Typed result of one remote attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    SignedIn(Principal),
    AuthFailed(String),
    SessionCreated { local_id: SessionId, server_id: SessionId },
    SessionCreateFailed { local_id: SessionId, reason: String },
    EventSynced { event_id: String, remote_id: String },
    EventSyncFailed { event_id: String, reason: String },
}

fn run_request<R: RemoteStore>(store: &mut R, request: RemoteRequest) -> RemoteOutcome {
    match request {
        RemoteRequest::SignIn => match store.sign_in_anonymously() {
            Ok(p) => RemoteOutcome::SignedIn(p),
            Err(e) => RemoteOutcome::AuthFailed(e.status_text()),
        },
        RemoteRequest::CreateSession {
            local_id,
            principal,
            doc,
        } => match store.create_session(&principal, &doc) {
            Ok(id) => RemoteOutcome::SessionCreated {
                local_id,
                server_id: SessionId::new(id),
            },
            Err(e) => RemoteOutcome::SessionCreateFailed {
                local_id,
                reason: e.status_text(),
            },
        },
        RemoteRequest::RecordEvent {
            event_id,
            principal,
            participant,
            payload,
        } => {
            let result = participant
                .as_deref()
                .map_or(Ok(()), |name| store.upsert_profile(&principal, name))
                .and_then(|_| store.create_event(&principal, &payload));
            match result {
                Ok(remote_id) => RemoteOutcome::EventSynced {
                    event_id,
                    remote_id,
                },
                Err(e) => RemoteOutcome::EventSyncFailed {
                    event_id,
                    reason: e.status_text(),
                },
            }
        }
    }
}

/// Best-effort uploader. Requests run in order on one worker thread; each
/// outcome is handed to `notify`. Nothing is retried.
pub struct RemoteSync {
    tx: Option<Sender<RemoteRequest>>,
}

impl RemoteSync {
    pub fn spawn<R, F>(mut store: R, notify: F) -> Self
    where
        R: RemoteStore,
        F: Fn(RemoteOutcome) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<RemoteRequest>();
        thread::spawn(move || {
            for request in rx {
                let outcome = run_request(&mut store, request);
                tracing::debug!(target: "remote", ?outcome, "remote_outcome");
                notify(outcome);
            }
        });
        Self { tx: Some(tx) }
    }

    /// Offline: every submission is refused.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queues `request`; never waits for the remote.
    pub fn submit(&self, request: RemoteRequest) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::RemoteUnavailable("offline mode".into()))?;
        tx.send(request)
            .map_err(|_| Error::RemoteUnavailable("sync worker stopped".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;
    use tempfile::tempdir;

    fn principal() -> Principal {
        Principal { uid: "u1".into() }
    }

    #[test]
    fn memory_store_assigns_ids_and_server_timestamps() {
        let mut store = MemoryRemoteStore::new();
        let p = store.sign_in_anonymously().unwrap();
        let id = store.create_session(&p, &json!({"a": 1})).unwrap();
        assert_eq!(id, "S1");
        let (sid, doc) = &store.sessions()[0];
        assert_eq!(sid, "S1");
        assert!(doc.get(SERVER_TIMESTAMP_FIELD).is_some());
    }

    #[test]
    fn memory_store_offline_fails() {
        let mut store = MemoryRemoteStore::new();
        store.set_online(false);
        assert_matches!(
            store.create_event(&principal(), &json!({})),
            Err(Error::RemoteUnavailable(_))
        );
        assert_matches!(store.sign_in_anonymously(), Err(Error::AuthFailure(_)));
    }

    #[test]
    fn record_event_upserts_profile_first() {
        let mut store = MemoryRemoteStore::new();
        let out = run_request(
            &mut store,
            RemoteRequest::RecordEvent {
                event_id: "evt-1".into(),
                principal: principal(),
                participant: Some("P03".into()),
                payload: json!({"type": "typing-focus"}),
            },
        );
        assert_matches!(out, RemoteOutcome::EventSynced { ref event_id, .. } if event_id == "evt-1");
        assert_eq!(store.profile("u1").unwrap()["name"], "P03");
        assert_eq!(store.events().len(), 1);
    }

    #[test]
    fn dir_store_mirrors_tree() {
        let dir = tempdir().unwrap();
        let mut store = DirRemoteStore::new(dir.path());
        let p = store.sign_in_anonymously().unwrap();
        assert_eq!(store.sign_in_anonymously().unwrap(), p);

        let sid = store.create_session(&p, &json!({"mode": "walking"})).unwrap();
        store.upsert_profile(&p, "P01").unwrap();
        store.upsert_profile(&p, "P02").unwrap();
        let eid = store.create_event(&p, &json!({"type": "typing-blur"})).unwrap();

        let user = dir.path().join("users").join(&p.uid);
        assert!(user.join("sessions").join(format!("{sid}.json")).exists());
        let event: Value =
            serde_json::from_slice(&fs::read(user.join("events").join(format!("{eid}.json"))).unwrap())
                .unwrap();
        assert_eq!(event["type"], "typing-blur");
        assert!(event.get(SERVER_TIMESTAMP_FIELD).is_some());
        let profile: Value = serde_json::from_slice(&fs::read(user.join("profile.json")).unwrap()).unwrap();
        assert_eq!(profile["name"], "P02");
    }

    #[test]
    fn worker_reports_outcomes() {
        let store = MemoryRemoteStore::new();
        let (tx, rx) = mpsc::channel();
        let sync = RemoteSync::spawn(store, move |o| {
            let _ = tx.send(o);
        });
        sync.submit(RemoteRequest::SignIn).unwrap();
        let out = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_matches!(out, RemoteOutcome::SignedIn(_));
    }

    #[test]
    fn disabled_sync_refuses() {
        let sync = RemoteSync::disabled();
        assert!(!sync.is_enabled());
        assert_matches!(
            sync.submit(RemoteRequest::SignIn),
            Err(Error::RemoteUnavailable(_))
        );
    }
}
