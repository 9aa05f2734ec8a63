use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use typetrail::clock::ManualClock;
use typetrail::engine::{Engine, Fact, KeyPress};
use typetrail::lifecycle::LifecycleConfig;
use typetrail::remote::{MemoryRemoteStore, RemoteOutcome, RemoteSync, SERVER_TIMESTAMP_FIELD};
use typetrail::session::SessionId;
use typetrail::storage::MemoryStore;
use typetrail::telemetry::{Button, SyncStatus};
use typetrail::timer::ManualTicks;

fn engine_with(remote: RemoteSync) -> Engine {
    Engine::new(
        LifecycleConfig::new(vec!["ab".into(), "cd".into()], 60),
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::at_epoch()),
        remote,
        Box::new(ManualTicks::new()),
        std::env::temp_dir(),
    )
}

fn connected(store: &MemoryRemoteStore) -> (Engine, Receiver<RemoteOutcome>) {
    let (tx, rx) = mpsc::channel();
    let remote = RemoteSync::spawn(store.clone(), move |outcome| {
        let _ = tx.send(outcome);
    });
    (engine_with(remote), rx)
}

/// Feeds the next `n` worker outcomes back into the engine.
fn deliver(engine: &mut Engine, rx: &Receiver<RemoteOutcome>, n: usize) -> Vec<RemoteOutcome> {
    (0..n)
        .map(|_| {
            let outcome = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("remote outcome");
            engine.handle(Fact::Remote(outcome.clone())).unwrap();
            outcome
        })
        .collect()
}

fn type_text(engine: &mut Engine, text: &str) {
    for c in text.chars() {
        let mut value = engine.lifecycle().input().to_string();
        value.push(c);
        engine.handle(Fact::Key(KeyPress::plain(c.to_string()))).unwrap();
        engine.handle(Fact::Input(value)).unwrap();
    }
}

#[test]
fn without_principal_events_stay_local_and_fail_remotely() {
    let store = MemoryRemoteStore::new();
    let (mut engine, rx) = connected(&store);

    engine.handle(Fact::Button(Button::Start)).unwrap();
    type_text(&mut engine, "ab");

    let events = engine.log().read_all();
    assert!(!events.is_empty());
    for event in &events {
        assert!(!event.session_id.as_str().is_empty());
        assert_matches!(&event.sync, SyncStatus::Failed { reason } if reason == "no principal yet");
    }
    assert!(store.events().is_empty());
    assert!(store.sessions().is_empty());
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn offline_mode_leaves_events_pending() {
    let mut engine = engine_with(RemoteSync::disabled());
    engine.sign_in();
    engine.handle(Fact::Focus).unwrap();
    type_text(&mut engine, "a");

    assert!(engine
        .log()
        .read_all()
        .iter()
        .all(|e| e.sync == SyncStatus::Pending));
    assert!(engine.status().lines()[0].contains("offline"));
}

#[test]
fn server_session_id_is_used_once_known() {
    let store = MemoryRemoteStore::new();
    let (mut engine, rx) = connected(&store);

    engine.sign_in();
    let signed_in = deliver(&mut engine, &rx, 1);
    assert_matches!(&signed_in[0], RemoteOutcome::SignedIn(p) if p.uid == "anon-1");
    assert!(engine.ctx().principal.is_some());

    engine.handle(Fact::Button(Button::Start)).unwrap();
    let local = engine.lifecycle().session().local_id().clone();
    let outcomes = deliver(&mut engine, &rx, 3);
    assert_matches!(&outcomes[0], RemoteOutcome::EventSynced { remote_id, .. } if remote_id == "E1");
    assert_matches!(&outcomes[1], RemoteOutcome::EventSynced { remote_id, .. } if remote_id == "E2");
    assert_matches!(
        &outcomes[2],
        RemoteOutcome::SessionCreated { local_id, server_id }
            if *local_id == local && server_id.as_str() == "S1"
    );

    let before = engine.log().read_all();
    assert_eq!(before.len(), 2);
    assert!(before.iter().all(|e| e.session_id == local));
    assert!(before
        .iter()
        .all(|e| matches!(e.sync, SyncStatus::Synced { .. })));

    engine.handle(Fact::Focus).unwrap();
    assert_eq!(
        engine.log().latest().unwrap().session_id,
        SessionId::new("S1")
    );

    let sessions = store.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].1["localSessionId"], local.as_str());
    assert!(sessions[0].1.get(SERVER_TIMESTAMP_FIELD).is_some());
    assert!(store
        .events()
        .iter()
        .all(|(_, doc)| doc.get("sync").is_none()));
    assert!(engine
        .status()
        .lines()
        .iter()
        .any(|l| l.ends_with("↳ session started id: S1")));
}

#[test]
fn creation_landing_after_reset_is_ignored() {
    let store = MemoryRemoteStore::new();
    let (mut engine, rx) = connected(&store);
    engine.sign_in();
    deliver(&mut engine, &rx, 1);

    engine.handle(Fact::Button(Button::Start)).unwrap();
    let old = engine.lifecycle().session().local_id().clone();
    engine.handle(Fact::Button(Button::Reset)).unwrap();
    assert_ne!(engine.lifecycle().session().local_id(), &old);

    // button, session-start, session doc, reset button
    let outcomes = deliver(&mut engine, &rx, 4);
    assert_matches!(&outcomes[2], RemoteOutcome::SessionCreated { local_id, .. } if *local_id == old);
    assert!(engine.lifecycle().session().authoritative_id().is_none());

    engine.handle(Fact::Focus).unwrap();
    assert_eq!(
        &engine.log().latest().unwrap().session_id,
        engine.lifecycle().session().local_id()
    );
}

#[test]
fn unreachable_remote_marks_events_failed_but_keeps_them() {
    let store = MemoryRemoteStore::new();
    let (mut engine, rx) = connected(&store);
    engine.sign_in();
    deliver(&mut engine, &rx, 1);

    store.set_online(false);
    engine.handle(Fact::Blur).unwrap();
    let outcomes = deliver(&mut engine, &rx, 1);
    assert_matches!(&outcomes[0], RemoteOutcome::EventSyncFailed { .. });

    let events = engine.log().read_all();
    assert_eq!(events.len(), 1);
    assert_matches!(events[0].sync, SyncStatus::Failed { .. });
    assert!(engine.status().lines()[0].contains("online save failed"));
}

#[test]
fn refused_sign_in_is_reported() {
    let store = MemoryRemoteStore::new();
    store.refuse_sign_in(true);
    let (mut engine, rx) = connected(&store);
    engine.sign_in();
    let outcomes = deliver(&mut engine, &rx, 1);
    assert_matches!(&outcomes[0], RemoteOutcome::AuthFailed(_));
    assert!(engine.ctx().principal.is_none());
    assert!(engine.status().lines()[0].contains("sign-in failed"));
}
