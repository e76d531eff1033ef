//! Key binding dispatch
//!
//! A [`CommandPipeline`] is an ordered list of handlers. Each handler either
//! handles a key event, producing a new revision, or defers to the next one.
//! The first handler that handles the event wins.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::doc::DocumentTree;
use crate::error::Result;
use crate::ops;
use crate::schema::Schema;
use crate::selection::Selection;

/// Platform-independent key event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
    /// Ctrl on most platforms, Cmd on macOS
    #[serde(default)]
    pub ctrl_like: bool,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>, ctrl_like: bool) -> Self {
        Self {
            key: key.into(),
            ctrl_like,
        }
    }

    pub fn plain(key: impl Into<String>) -> Self {
        Self::new(key, false)
    }

    pub fn ctrl(key: impl Into<String>) -> Self {
        Self::new(key, true)
    }

    /// Parse notation like `ctrl+b`, `mod+\`` or `&`
    pub fn parse(spec: &str) -> Self {
        for prefix in ["ctrl+", "cmd+", "mod+"] {
            if let Some(key) = spec.strip_prefix(prefix) {
                if !key.is_empty() {
                    return Self::ctrl(key);
                }
            }
        }
        Self::plain(spec)
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl_like {
            write!(f, "ctrl+{}", self.key)
        } else {
            f.write_str(&self.key)
        }
    }
}

/// Outcome of a single handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Stop here and install this revision
    Handled {
        tree: DocumentTree,
        selection: Selection,
    },
    /// Let the next handler try
    Defer,
}

/// A pluggable unit of the pipeline
pub trait Handler: Send + Sync {
    fn handle(&self, event: &KeyEvent, tree: &DocumentTree, selection: &Selection)
        -> Result<Decision>;
}

impl<F> Handler for F
where
    F: Fn(&KeyEvent, &DocumentTree, &Selection) -> Result<Decision> + Send + Sync,
{
    fn handle(
        &self,
        event: &KeyEvent,
        tree: &DocumentTree,
        selection: &Selection,
    ) -> Result<Decision> {
        self(event, tree, selection)
    }
}

/// What a hotkey does when it fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotkeyAction {
    /// Toggle a mark over the selection
    Mark(String),
    /// Toggle the kind of the selected blocks
    Block(String),
    /// Insert literal text instead of the key
    Insert(String),
}

/// Data-driven key binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotkey {
    pub key: String,
    #[serde(default)]
    pub modifier: bool,
    pub action: HotkeyAction,
}

impl Hotkey {
    pub fn mark(key: impl Into<String>, mark: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            modifier: true,
            action: HotkeyAction::Mark(mark.into()),
        }
    }

    pub fn block(key: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            modifier: true,
            action: HotkeyAction::Block(kind.into()),
        }
    }

    pub fn insert(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            modifier: false,
            action: HotkeyAction::Insert(text.into()),
        }
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.modifier == event.ctrl_like && self.key.eq_ignore_ascii_case(&event.key)
    }

    fn same_trigger(&self, other: &Hotkey) -> bool {
        self.modifier == other.modifier && self.key.eq_ignore_ascii_case(&other.key)
    }

    fn apply(
        &self,
        tree: &DocumentTree,
        selection: &Selection,
        schema: &Schema,
    ) -> Result<Decision> {
        let (tree, selection) = match &self.action {
            HotkeyAction::Mark(mark) => (
                ops::toggle_mark(tree, selection, mark, schema)?,
                selection.clone(),
            ),
            HotkeyAction::Block(kind) => (
                ops::set_block_type(tree, selection, kind, schema)?,
                selection.clone(),
            ),
            HotkeyAction::Insert(text) => {
                let (tree, cursor) = ops::insert_text(tree, selection.start(), text, schema)?;
                (tree, Selection::collapsed(cursor))
            }
        };
        Ok(Decision::Handled { tree, selection })
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifier {
            write!(f, "ctrl+{}", self.key)
        } else {
            f.write_str(&self.key)
        }
    }
}

/// A binding that can never fire because an earlier one has the same trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowedBinding {
    pub index: usize,
    pub shadowed_by: usize,
    pub binding: Hotkey,
}

/// Find bindings made unreachable by an earlier binding on the same trigger
pub fn find_shadowed(hotkeys: &[Hotkey]) -> Vec<ShadowedBinding> {
    hotkeys
        .iter()
        .enumerate()
        .filter_map(|(index, binding)| {
            hotkeys[..index]
                .iter()
                .position(|earlier| earlier.same_trigger(binding))
                .map(|shadowed_by| ShadowedBinding {
                    index,
                    shadowed_by,
                    binding: binding.clone(),
                })
        })
        .collect()
}

struct HotkeyHandler {
    binding: Hotkey,
    schema: Arc<Schema>,
}

impl Handler for HotkeyHandler {
    fn handle(
        &self,
        event: &KeyEvent,
        tree: &DocumentTree,
        selection: &Selection,
    ) -> Result<Decision> {
        if !self.binding.matches(event) {
            return Ok(Decision::Defer);
        }
        self.binding.apply(tree, selection, &self.schema)
    }
}

/// Whether the pipeline consumed the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Handled,
    /// No handler wanted the event; the caller takes its default action
    Deferred,
}

/// Result of running an event through the pipeline
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub tree: Arc<DocumentTree>,
    pub selection: Selection,
    pub status: DispatchStatus,
}

impl Dispatch {
    pub fn is_handled(&self) -> bool {
        self.status == DispatchStatus::Handled
    }
}

/// Ordered list of handlers; the first one to handle an event wins
#[derive(Default)]
pub struct CommandPipeline {
    handlers: Vec<Box<dyn Handler>>,
}

impl CommandPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// One handler per binding, in binding order
    pub fn from_hotkeys(hotkeys: &[Hotkey], schema: Arc<Schema>) -> Self {
        for shadowed in find_shadowed(hotkeys) {
            warn!(
                "hotkey #{} ({}) is unreachable: #{} is bound to the same key",
                shadowed.index, shadowed.binding, shadowed.shadowed_by
            );
        }

        let mut pipeline = Self::new();
        for binding in hotkeys {
            pipeline.push(HotkeyHandler {
                binding: binding.clone(),
                schema: Arc::clone(&schema),
            });
        }
        pipeline
    }

    /// Append a handler after the existing ones
    pub fn push(&mut self, handler: impl Handler + 'static) -> &mut Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run `event` through the handlers
    ///
    /// A deferred event hands back the very same tree.
    pub fn dispatch(
        &self,
        event: &KeyEvent,
        tree: &Arc<DocumentTree>,
        selection: &Selection,
    ) -> Result<Dispatch> {
        for (idx, handler) in self.handlers.iter().enumerate() {
            match handler.handle(event, tree, selection)? {
                Decision::Handled { tree, selection } => {
                    debug!("{} handled by handler #{}", event, idx);
                    return Ok(Dispatch {
                        tree: Arc::new(tree),
                        selection,
                        status: DispatchStatus::Handled,
                    });
                }
                Decision::Defer => {}
            }
        }

        debug!("{} deferred", event);
        Ok(Dispatch {
            tree: Arc::clone(tree),
            selection: selection.clone(),
            status: DispatchStatus::Deferred,
        })
    }
}

impl fmt::Debug for CommandPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandPipeline")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::{Block, Text};
    use crate::selection::Point;

    fn hello() -> Arc<DocumentTree> {
        Arc::new(
            DocumentTree::from_blocks(
                vec![Block::with_text("paragraph", Text::plain("Hello"))],
                &Schema::default(),
            )
            .unwrap(),
        )
    }

    fn pipeline(hotkeys: &[Hotkey]) -> CommandPipeline {
        CommandPipeline::from_hotkeys(hotkeys, Arc::new(Schema::default()))
    }

    #[test]
    fn test_parse_key_event() {
        assert_eq!(KeyEvent::parse("ctrl+b"), KeyEvent::ctrl("b"));
        assert_eq!(KeyEvent::parse("mod+`"), KeyEvent::ctrl("`"));
        assert_eq!(KeyEvent::parse("&"), KeyEvent::plain("&"));
        assert_eq!(KeyEvent::parse("ctrl+"), KeyEvent::plain("ctrl+"));
        assert_eq!(KeyEvent::parse("ctrl++"), KeyEvent::ctrl("+"));
    }

    #[test]
    fn test_hotkey_requires_exact_modifier() {
        let bold = Hotkey::mark("b", "bold");
        assert!(bold.matches(&KeyEvent::ctrl("b")));
        assert!(bold.matches(&KeyEvent::ctrl("B")));
        assert!(!bold.matches(&KeyEvent::plain("b")));

        let amp = Hotkey::insert("&", "and");
        assert!(amp.matches(&KeyEvent::plain("&")));
        assert!(!amp.matches(&KeyEvent::ctrl("&")));
    }

    #[test]
    fn test_unmatched_key_defers_with_same_tree() {
        let tree = hello();
        let sel = Selection::all(&tree);
        let result = pipeline(&[Hotkey::mark("b", "bold")])
            .dispatch(&KeyEvent::plain("x"), &tree, &sel)
            .unwrap();
        assert_eq!(result.status, DispatchStatus::Deferred);
        assert!(Arc::ptr_eq(&result.tree, &tree));
    }

    #[test]
    fn test_first_match_wins() {
        let tree = hello();
        let sel = Selection::all(&tree);
        let hotkeys = [Hotkey::mark("b", "bold"), Hotkey::mark("b", "italic")];

        let result = pipeline(&hotkeys)
            .dispatch(&KeyEvent::ctrl("b"), &tree, &sel)
            .unwrap();
        let leaf = &result.tree.text_at(&[0, 0]).unwrap().leaves()[0];
        assert!(leaf.marks.contains("bold"));
        assert!(!leaf.marks.contains("italic"));
    }

    #[test]
    fn test_find_shadowed_flags_duplicate_trigger() {
        let hotkeys = [
            Hotkey::mark("b", "bold"),
            Hotkey::mark("i", "italic"),
            Hotkey::block("B", "code"),
            Hotkey::insert("b", "bee"),
        ];
        let shadowed = find_shadowed(&hotkeys);
        assert_eq!(shadowed.len(), 1);
        assert_eq!(shadowed[0].index, 2);
        assert_eq!(shadowed[0].shadowed_by, 0);
    }

    #[test]
    fn test_insert_binding_replaces_key() {
        let tree = hello();
        let sel = Selection::end_of(&tree);
        let result = pipeline(&[Hotkey::insert("&", "and")])
            .dispatch(&KeyEvent::plain("&"), &tree, &sel)
            .unwrap();
        assert!(result.is_handled());
        assert_eq!(result.tree.text(), "Helloand");
        assert!(!result.tree.text().contains('&'));
        assert_eq!(result.selection, Selection::collapsed(Point::new(vec![0, 0], 8)));
    }

    #[test]
    fn test_closure_handlers_run_in_order() {
        let tree = hello();
        let sel = Selection::all(&tree);
        let mut pipeline = CommandPipeline::new();
        pipeline
            .push(|_: &KeyEvent, _: &DocumentTree, _: &Selection| -> Result<Decision> {
                Ok(Decision::Defer)
            })
            .push(|event: &KeyEvent, tree: &DocumentTree, sel: &Selection| -> Result<Decision> {
                if event.key != "x" {
                    return Ok(Decision::Defer);
                }
                let (tree, cursor) =
                    ops::insert_text(tree, sel.end(), "!", &Schema::default())?;
                Ok(Decision::Handled {
                    tree,
                    selection: Selection::collapsed(cursor),
                })
            });
        assert_eq!(pipeline.len(), 2);

        let result = pipeline
            .dispatch(&KeyEvent::plain("x"), &tree, &sel)
            .unwrap();
        assert_eq!(result.tree.text(), "Hello!");
    }

    #[test]
    fn test_failing_handler_surfaces_error() {
        let tree = hello();
        let sel = Selection::all(&tree);
        let result = pipeline(&[Hotkey::block("q", "quote")]).dispatch(
            &KeyEvent::ctrl("q"),
            &tree,
            &sel,
        );
        assert!(result.unwrap_err().is_schema());
    }

    #[test]
    fn test_hotkey_toml_shape() {
        let hotkey: Hotkey = toml::from_str("key = \"b\"\nmodifier = true\naction = { mark = \"bold\" }\n").unwrap();
        assert_eq!(hotkey, Hotkey::mark("b", "bold"));
    }
}
