//! Editor session: the current revision, its selection and persistence

use anyhow::{Context, Result};
use log::{debug, warn};
use std::sync::Arc;

use scribe_core::ops;
use scribe_core::{DocumentTree, Engine, KeyEvent, Selection};

use crate::store::Store;

/// What happened to a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// A pipeline handler produced a new revision
    Handled,
    /// No handler wanted it; the character was inserted literally
    Inserted,
    /// Nothing changed
    Ignored,
}

/// One open document
pub struct EditorSession<S: Store> {
    engine: Engine,
    store: S,
    tree: Arc<DocumentTree>,
    selection: Selection,
    /// Incremented each time a new revision is installed
    revision: u64,
}

impl<S: Store> EditorSession<S> {
    /// Open the document stored under the configured key
    ///
    /// A missing or unreadable blob yields the default document.
    pub fn open(engine: Engine, store: S) -> Result<Self> {
        let key = engine.config().session.storage_key.clone();
        let blob = store
            .get(&key)
            .with_context(|| format!("Failed to read stored document {key:?}"))?;

        let tree = match blob {
            Some(blob) => engine.initial_tree(Some(&blob)).or_else(|err| {
                warn!("stored document {key:?} could not be restored: {err}");
                engine.initial_tree(None)
            })?,
            None => engine.initial_tree(None)?,
        };
        let selection = Selection::end_of(&tree);

        Ok(Self {
            engine,
            store,
            tree,
            selection,
            revision: 0,
        })
    }

    pub fn tree(&self) -> &Arc<DocumentTree> {
        &self.tree
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Move the selection; both ends must resolve in the current tree
    pub fn select(&mut self, selection: Selection) -> Result<()> {
        if !self.tree.is_empty() {
            self.tree.resolve(&selection.anchor)?;
            self.tree.resolve(&selection.focus)?;
        }
        self.selection = selection;
        Ok(())
    }

    /// Current document as HTML
    pub fn to_html(&self) -> String {
        self.engine.serialize(&self.tree)
    }

    /// Run a key event through the pipeline and install the result
    ///
    /// On error the current revision is left untouched.
    pub fn handle_key(&mut self, event: &KeyEvent) -> Result<KeyOutcome> {
        let dispatch = self.engine.dispatch(event, &self.tree, &self.selection)?;
        if dispatch.is_handled() {
            self.install(dispatch.tree, dispatch.selection)?;
            return Ok(KeyOutcome::Handled);
        }

        match literal_char(event) {
            Some(text) if !self.tree.is_empty() => {
                let (tree, cursor) = ops::insert_text(
                    &self.tree,
                    self.selection.start(),
                    text,
                    self.engine.schema(),
                )?;
                self.install(Arc::new(tree), Selection::collapsed(cursor))?;
                Ok(KeyOutcome::Inserted)
            }
            _ => {
                debug!("{} ignored", event);
                Ok(KeyOutcome::Ignored)
            }
        }
    }

    /// Write the current revision to the store
    pub fn persist(&mut self) -> Result<()> {
        let blob = self.engine.persist(&self.tree)?;
        self.write(&blob)
    }

    fn install(&mut self, tree: Arc<DocumentTree>, selection: Selection) -> Result<()> {
        let blob = self.engine.persist(&tree)?;
        self.write(&blob)?;

        self.tree = tree;
        self.selection = selection;
        self.revision += 1;
        debug!("installed revision {}", self.revision);
        Ok(())
    }

    fn write(&mut self, blob: &str) -> Result<()> {
        let key = &self.engine.config().session.storage_key;
        self.store
            .set(key, blob)
            .with_context(|| format!("Failed to store document {key:?}"))
    }
}

/// The text a key types when no binding claims it
fn literal_char(event: &KeyEvent) -> Option<&str> {
    if event.ctrl_like {
        return None;
    }
    let mut chars = event.key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_control() => Some(event.key.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use scribe_core::{Config, Point};

    fn open(blob: Option<&str>) -> EditorSession<MemoryStore> {
        let store = match blob {
            Some(blob) => MemoryStore::new().with_entry("content", blob),
            None => MemoryStore::new(),
        };
        EditorSession::open(Engine::new(&Config::default()).unwrap(), store).unwrap()
    }

    #[test]
    fn test_literal_char() {
        assert_eq!(literal_char(&KeyEvent::plain("a")), Some("a"));
        assert_eq!(literal_char(&KeyEvent::plain("é")), Some("é"));
        assert_eq!(literal_char(&KeyEvent::ctrl("a")), None);
        assert_eq!(literal_char(&KeyEvent::plain("Enter")), None);
        assert_eq!(literal_char(&KeyEvent::plain("\t")), None);
    }

    #[test]
    fn test_first_run_uses_default_document() {
        let session = open(None);
        assert_eq!(session.tree().text(), "A line of text in a paragraph.");
        assert_eq!(session.selection(), &Selection::end_of(session.tree()));
        assert_eq!(session.revision(), 0);
    }

    #[test]
    fn test_unrestorable_blob_falls_back_to_default() {
        let session = open(Some("{not json"));
        assert_eq!(session.tree().text(), "A line of text in a paragraph.");
    }

    #[test]
    fn test_handled_key_persists() -> Result<()> {
        let mut session = open(Some("<p>Hello</p>"));
        let all = Selection::all(session.tree());
        session.select(all)?;

        assert_eq!(session.handle_key(&KeyEvent::ctrl("b"))?, KeyOutcome::Handled);
        assert_eq!(session.revision(), 1);
        assert_eq!(
            session.store().get("content")?.as_deref(),
            Some("<p><strong>Hello</strong></p>")
        );
        Ok(())
    }

    #[test]
    fn test_unbound_printable_is_inserted() -> Result<()> {
        let mut session = open(Some("<p>ab</p>"));
        session.select(Selection::collapsed(Point::new(vec![0, 0], 1)))?;

        assert_eq!(session.handle_key(&KeyEvent::plain("x"))?, KeyOutcome::Inserted);
        assert_eq!(session.to_html(), "<p>axb</p>");
        assert_eq!(session.selection(), &Selection::collapsed(Point::new(vec![0, 0], 2)));
        Ok(())
    }

    #[test]
    fn test_unbound_chord_is_ignored() -> Result<()> {
        let mut session = open(Some("<p>ab</p>"));
        let before = Arc::clone(session.tree());

        assert_eq!(session.handle_key(&KeyEvent::ctrl("k"))?, KeyOutcome::Ignored);
        assert!(Arc::ptr_eq(session.tree(), &before));
        assert_eq!(session.store().get("content")?.as_deref(), Some("<p>ab</p>"));
        Ok(())
    }

    #[test]
    fn test_failed_command_keeps_revision() -> Result<()> {
        let mut config = Config::default();
        config.schema.blocks[0].locked = true;
        let store = MemoryStore::new().with_entry("content", "<p>fixed</p>");
        let mut session = EditorSession::open(Engine::new(&config)?, store)?;
        let all = Selection::all(session.tree());
        session.select(all)?;
        let before = Arc::clone(session.tree());

        assert!(session.handle_key(&KeyEvent::ctrl("b")).is_err());
        assert!(Arc::ptr_eq(session.tree(), &before));
        assert_eq!(session.revision(), 0);
        Ok(())
    }

    #[test]
    fn test_select_rejects_unknown_path() {
        let mut session = open(Some("<p>ab</p>"));
        let bad = Selection::collapsed(Point::new(vec![3, 0], 0));
        assert!(session.select(bad).is_err());
    }
}
