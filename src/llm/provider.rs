use async_trait::async_trait;

use super::types::{GenerationOutcome, GenerationRequest};

/// Progress callback receiving each streamed text fragment in arrival order
pub type ProgressFn<'a> = &'a mut (dyn FnMut(&str) + Send);

/// A completion backend. Implementations never return errors: every failure
/// is folded into [`GenerationOutcome::Failure`].
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Run one request to its terminal outcome, streaming fragments into
    /// `on_progress` when the request asks for it
    async fn generate(
        &self,
        request: &GenerationRequest,
        on_progress: ProgressFn<'_>,
    ) -> GenerationOutcome;
}
