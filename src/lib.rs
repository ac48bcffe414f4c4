//! Right-click a canvas node, send its text to a local completion endpoint,
//! and watch the answer appear in a new node underneath.

pub mod canvas;
pub mod config;
pub mod error;
pub mod interception;
pub mod llm;
pub mod node;
pub mod plugin;

pub use error::{PluginError, Result};
pub use plugin::LlmInstructionPlugin;
