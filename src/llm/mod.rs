pub mod client;
pub mod provider;
pub mod sse;
pub mod template;
pub mod types;

pub use client::{ClientOptions, CompletionClient};
pub use provider::{CompletionProvider, ProgressFn};
pub use types::*;
