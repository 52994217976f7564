//! Compliance script model and retrieval

pub mod schema;
pub mod store;

pub use schema::{Line, Script, Section};
pub use store::{FileScriptStore, HttpScriptStore, ScriptError, ScriptStore};
