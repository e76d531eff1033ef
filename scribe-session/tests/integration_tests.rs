//! Integration tests for scribe-session
//!
//! These tests exercise a session end to end against an on-disk store,
//! including restoring a document across sessions.

use scribe_core::config::StorageFormat;
use scribe_core::{Config, Engine, KeyEvent, Point, Selection};
use scribe_session::{EditorSession, FileStore, KeyOutcome, Store};
use tempfile::TempDir;

/// Helper to open a session over a temp directory
/// Returns (EditorSession, TempDir) - keep the dir alive for the duration of the test
fn create_test_session(config: &Config) -> (EditorSession<FileStore>, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let session = reopen(config, &dir);
    (session, dir)
}

fn reopen(config: &Config, dir: &TempDir) -> EditorSession<FileStore> {
    let engine = Engine::new(config).expect("Failed to build engine");
    EditorSession::open(engine, FileStore::new(dir.path())).expect("Failed to open session")
}

fn type_keys(session: &mut EditorSession<FileStore>, keys: &[&str]) -> Vec<KeyOutcome> {
    keys.iter()
        .map(|key| session.handle_key(&KeyEvent::parse(key)).expect("key failed"))
        .collect()
}

#[test]
fn integration_session_starts_with_default_paragraph() {
    let (session, dir) = create_test_session(&Config::default());
    assert_eq!(session.to_html(), "<p>A line of text in a paragraph.</p>");
    // Nothing is written until something changes
    assert!(!dir.path().join("content").exists());
}

#[test]
fn integration_typing_persists_and_restores() {
    let config = Config::default();
    let (mut session, dir) = create_test_session(&config);

    let outcomes = type_keys(&mut session, &["!", "&", "?"]);
    assert_eq!(
        outcomes,
        vec![KeyOutcome::Inserted, KeyOutcome::Handled, KeyOutcome::Inserted]
    );
    let expected = "<p>A line of text in a paragraph.!and?</p>";
    assert_eq!(session.to_html(), expected);
    assert_eq!(session.revision(), 3);

    let stored = std::fs::read_to_string(dir.path().join("content")).unwrap();
    assert_eq!(stored, expected);

    let restored = reopen(&config, &dir);
    assert_eq!(restored.to_html(), expected);
    assert_eq!(restored.tree(), session.tree());
}

#[test]
fn integration_bold_then_code_block() {
    let (mut session, _dir) = create_test_session(&Config::default());
    let all = Selection::all(session.tree());
    session.select(all).unwrap();

    type_keys(&mut session, &["ctrl+b"]);
    assert_eq!(
        session.to_html(),
        "<p><strong>A line of text in a paragraph.</strong></p>"
    );

    type_keys(&mut session, &["ctrl+`"]);
    assert_eq!(
        session.to_html(),
        "<pre><code><strong>A line of text in a paragraph.</strong></code></pre>"
    );
}

#[test]
fn integration_json_storage_format() {
    let mut config = Config::default();
    config.session.format = StorageFormat::Json;
    config.session.storage_key = "draft".to_string();
    let (mut session, dir) = create_test_session(&config);

    session
        .select(Selection::collapsed(Point::new(vec![0, 0], 0)))
        .unwrap();
    type_keys(&mut session, &[">"]);

    let store = FileStore::new(dir.path());
    let blob = store.get("draft").unwrap().expect("draft was stored");
    assert!(blob.starts_with("{\"document\""));

    let restored = reopen(&config, &dir);
    assert_eq!(restored.tree().text(), ">A line of text in a paragraph.");
}

#[test]
fn integration_corrupt_blob_falls_back_to_default() {
    let config = Config::default();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("content"), "{\"document\":").unwrap();

    let session = reopen(&config, &dir);
    assert_eq!(session.tree().text(), "A line of text in a paragraph.");
}
