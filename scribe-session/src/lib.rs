//! Scribe Session - Editing state around the core engine
//!
//! This crate holds what an editor front end needs beyond the pure engine:
//! - The current document revision and selection
//! - Key handling with literal-character fallback
//! - Persistence of each revision to a key/value store

pub mod session;
pub mod store;

// Re-export main types
pub use session::{EditorSession, KeyOutcome};
pub use store::{FileStore, MemoryStore, Store};
