//! Scribe Core - Rich-text document engine
//!
//! This crate contains the editor engine, independent of any front end:
//! - Immutable document tree validated against a configurable schema
//! - Mutation operations (insert text, toggle marks, set block types)
//! - Ordered key-command pipeline driven by data hotkeys
//! - Rule-based HTML codec, tree JSON and Markdown import
//! - Configuration management

pub mod codec;
pub mod command;
pub mod config;
pub mod doc;
pub mod engine;
pub mod error;
pub mod html;
pub mod json;
#[cfg(feature = "markdown")]
pub mod markdown;
pub mod ops;
pub mod schema;
pub mod selection;

// Re-export commonly used types
pub use codec::{Codec, Rule};
pub use command::{CommandPipeline, Decision, Dispatch, DispatchStatus, Handler, Hotkey, KeyEvent};
pub use config::Config;
pub use doc::{Block, DocumentTree, Leaf, Text};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use schema::Schema;
pub use selection::{Point, Selection};
