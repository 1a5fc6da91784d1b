//! Restart survival over the `SQLite` backend.
//!
//! The engine must pick a dialogue up exactly where it was after the
//! process (here: the engine value and its connections) goes away.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use permiso_core::config::EngineConfig;
use permiso_core::extract::PatternExtractor;
use permiso_core::fields::FieldKey;
use permiso_core::identity::UserId;
use permiso_core::session::{DialogueState, FormContext};
use permiso_engine::{Engine, InboundMessage, KvStore, MessageSink, Outcome, RecordingSink, SessionStore, SqliteStore};

fn identity() -> UserId {
    UserId::parse("5219998887766").unwrap()
}

fn engine_over(path: &std::path::Path) -> (Engine, Arc<RecordingSink>) {
    let backend: Arc<dyn KvStore> = Arc::new(SqliteStore::open(path).unwrap());
    let sink = Arc::new(RecordingSink::new());
    let engine = Engine::new(
        backend,
        Arc::new(PatternExtractor),
        Arc::clone(&sink) as Arc<dyn MessageSink>,
        EngineConfig::default(),
    );
    (engine, sink)
}

async fn drive(engine: &Engine, step: i64, text: &str) -> Outcome {
    engine
        .handle_message(InboundMessage {
            identity: identity(),
            raw_text: text.to_string(),
            message_id: format!("wamid.p{step}"),
            received_at: Utc::now() + TimeDelta::seconds(step * 2),
        })
        .await
}

#[tokio::test]
async fn dialogue_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("permiso.db");

    {
        let (engine, _sink) = engine_over(&path);
        for (s, text) in [
            (1, "hola"),
            (2, "1"),
            (3, "1"),
            (4, "acepto"),
            (5, "María López Hernández"),
        ] {
            assert_eq!(drive(&engine, s, text).await, Outcome::Replied, "step {s}");
        }
    }

    // "Restart": a fresh engine over the same database.
    let (engine, sink) = engine_over(&path);
    let backend: Arc<dyn KvStore> = Arc::new(SqliteStore::open(&path).unwrap());
    let sessions = SessionStore::new(backend, &EngineConfig::default().session);

    let session = sessions.load(&identity()).await;
    assert_eq!(session.state, DialogueState::Form(FormContext::NewPermit));
    assert!(session.completed.contains(&FieldKey::NombreCompleto));

    // The dialogue continues with the next missing field.
    assert_eq!(drive(&engine, 10, "LOHM850101MDFPRR08").await, Outcome::Replied);
    let session = sessions.load(&identity()).await;
    assert!(session.completed.contains(&FieldKey::CurpRfc));
    let last = sink.sent().last().unwrap().1.render();
    assert!(last.contains("correo"));
}

#[tokio::test]
async fn provider_markers_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("permiso.db");

    {
        let (engine, _sink) = engine_over(&path);
        assert_eq!(drive(&engine, 1, "hola").await, Outcome::Replied);
    }

    // The same provider message id after a restart is still a duplicate.
    let (engine, sink) = engine_over(&path);
    assert_eq!(drive(&engine, 1, "hola").await, Outcome::DuplicateDropped);
    assert_eq!(sink.count(), 0);
}
