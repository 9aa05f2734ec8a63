use crate::error::{Error, Result};
use crate::storage::{LocalStore, EVENTS_KEY};
use crate::telemetry::{SyncStatus, TelemetryEvent};
use serde_json::Value;
use std::sync::Arc;

/// Append-only, most-recent-first event log persisted in one store slot.
pub struct EventLog {
    store: Arc<dyn LocalStore>,
    next_seq: u64,
}

impl EventLog {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        let mut log = Self { store, next_seq: 0 };
        log.next_seq = log.raw_entries().len() as u64;
        log
    }

    /// Fresh id for an event about to be appended.
    pub fn next_id(&mut self, ts: i64) -> String {
        self.next_seq += 1;
        format!("evt-{ts}-{}", self.next_seq)
    }

    /// Persists `event` before returning. Entries this build cannot parse
    /// are written back untouched.
    pub fn append(&mut self, event: TelemetryEvent) -> Result<()> {
        let mut entries = self.raw_entries();
        entries.insert(0, serde_json::to_value(&event)?);
        self.write(&entries)
    }

    /// Rewrites the sync state of one entry. Returns false if it is gone.
    pub fn annotate(&mut self, event_id: &str, status: SyncStatus) -> Result<bool> {
        let mut entries = self.raw_entries();
        let Some(entry) = entries
            .iter_mut()
            .find(|e| e.get("id").and_then(Value::as_str) == Some(event_id))
            .and_then(Value::as_object_mut)
        else {
            return Ok(false);
        };
        entry.insert("sync".into(), serde_json::to_value(&status)?);
        self.write(&entries)?;
        Ok(true)
    }

    /// Never fails: missing or unreadable storage reads as empty.
    pub fn read_all(&self) -> Vec<TelemetryEvent> {
        match self.try_read_all() {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(target: "event_log", error = %e, "event_log_unreadable");
                Vec::new()
            }
        }
    }

    /// Like `read_all` but reports a slot that is not a JSON array.
    /// Individual malformed entries are skipped either way.
    pub fn try_read_all(&self) -> Result<Vec<TelemetryEvent>> {
        let entries = self.try_raw_entries()?;
        let total = entries.len();
        let events: Vec<TelemetryEvent> = entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        if events.len() < total {
            tracing::warn!(
                target: "event_log",
                skipped = total - events.len(),
                "event_log_entries_skipped"
            );
        }
        Ok(events)
    }

    pub fn latest(&self) -> Option<TelemetryEvent> {
        self.read_all().into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.read_all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn try_raw_entries(&self) -> Result<Vec<Value>> {
        let Some(raw) = self.store.get(EVENTS_KEY)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).map_err(|e| Error::StorageCorrupt(e.to_string()))
    }

    /// A slot that is not a JSON array starts over empty.
    fn raw_entries(&self) -> Vec<Value> {
        self.try_raw_entries().unwrap_or_else(|e| {
            tracing::warn!(target: "event_log", error = %e, "event_log_unreadable");
            Vec::new()
        })
    }

    fn write(&self, entries: &[Value]) -> Result<()> {
        let text = serde_json::to_string(entries)?;
        self.store.set(EVENTS_KEY, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::SessionId;
    use crate::storage::MemoryStore;
    use crate::telemetry::EventKind;
    use assert_matches::assert_matches;

    fn event(log: &mut EventLog, clock: &ManualClock, kind: EventKind) -> TelemetryEvent {
        let id = log.next_id(0);
        TelemetryEvent::new(id, kind, SessionId::new("L1"), None, clock)
    }

    #[test]
    fn appends_most_recent_first() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at_epoch();
        let mut log = EventLog::new(store);

        let first = event(&mut log, &clock, EventKind::TypingFocus);
        log.append(first.clone()).unwrap();
        clock.advance_ms(10);
        let second = event(&mut log, &clock, EventKind::TypingBlur);
        log.append(second.clone()).unwrap();

        let all = log.read_all();
        assert_eq!(all, vec![second.clone(), first]);
        assert_eq!(log.latest(), Some(second));
    }

    #[test]
    fn corrupt_slot_reads_empty_and_is_recovered_by_append() {
        let store = Arc::new(MemoryStore::new());
        store.set(EVENTS_KEY, "{not json").unwrap();
        let clock = ManualClock::at_epoch();
        let mut log = EventLog::new(store.clone());

        assert!(log.read_all().is_empty());
        assert_matches!(log.try_read_all(), Err(Error::StorageCorrupt(_)));

        let e = event(&mut log, &clock, EventKind::TypingFocus);
        log.append(e).unwrap();
        assert_eq!(log.len(), 1);
        assert!(log.try_read_all().is_ok());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at_epoch();
        let mut log = EventLog::new(store.clone());
        let good = event(&mut log, &clock, EventKind::TypingFocus);
        let text = format!("[{}, {{\"bogus\": true}}]", serde_json::to_string(&good).unwrap());
        store.set(EVENTS_KEY, &text).unwrap();

        assert_eq!(log.read_all(), vec![good]);
    }

    #[test]
    fn unknown_entries_survive_append_and_annotate() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                EVENTS_KEY,
                r#"[{"type":"start-button-pressed","ts":1700000000000,"sessionId":"old"}]"#,
            )
            .unwrap();
        let clock = ManualClock::at_epoch();
        let mut log = EventLog::new(store.clone());

        let focus = event(&mut log, &clock, EventKind::TypingFocus);
        log.append(focus.clone()).unwrap();
        log.annotate(&focus.id, SyncStatus::Failed { reason: "offline".into() })
            .unwrap();

        let raw: Vec<serde_json::Value> =
            serde_json::from_str(&store.get(EVENTS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[1]["type"], "start-button-pressed");
        assert_eq!(raw[0]["sync"]["state"], "failed");

        let parsed = log.read_all();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, focus.id);
    }

    #[test]
    fn annotate_touches_only_the_target() {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::at_epoch();
        let mut log = EventLog::new(store);
        let a = event(&mut log, &clock, EventKind::TypingFocus);
        let b = event(&mut log, &clock, EventKind::TypingBlur);
        log.append(a.clone()).unwrap();
        log.append(b.clone()).unwrap();

        let synced = SyncStatus::Synced {
            remote_id: "R1".into(),
        };
        assert!(log.annotate(&a.id, synced.clone()).unwrap());
        assert!(!log.annotate("evt-missing", synced.clone()).unwrap());

        let all = log.read_all();
        assert_eq!(all[0].sync, SyncStatus::Pending);
        assert_eq!(all[1].sync, synced);
    }

    #[test]
    fn ids_continue_after_reopen() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let clock = ManualClock::at_epoch();
        let mut log = EventLog::new(store.clone());
        let e = event(&mut log, &clock, EventKind::TypingFocus);
        let first_id = e.id.clone();
        log.append(e).unwrap();

        let mut reopened = EventLog::new(store);
        assert_ne!(reopened.next_id(0), first_id);
    }
}
