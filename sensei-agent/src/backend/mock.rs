//! Mock generation backend for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::traits::*;

/// Mock backend for testing.
///
/// Configurable response content, a failure budget for exercising the
/// fallback chain, and call counting.
pub struct MockGenerator {
    model_id: String,
    available: AtomicBool,
    response_content: String,
    /// Fail this many calls before succeeding
    failures_remaining: AtomicU32,
    call_count: AtomicU32,
}

impl MockGenerator {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            response_content: "Mock problem".to_string(),
            failures_remaining: AtomicU32::new(0),
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the response content.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.response_content = content.into();
        self
    }

    /// Fail the first `n` generate calls with a request error.
    pub fn failing_first(self, n: u32) -> Self {
        self.failures_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Number of generate calls made.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GeneratorError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(GeneratorError::Unavailable(
                "Mock backend disabled".to_string(),
            ));
        }

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(GeneratorError::RequestFailed(format!(
                "Scripted failure from {}",
                self.model_id
            )));
        }

        let prompt_tokens: u32 = request
            .messages
            .iter()
            .map(|m| m.content.len() as u32 / 4)
            .sum();

        let completion_tokens = self.response_content.len() as u32 / 4;

        Ok(GenerationResponse {
            content: self.response_content.clone(),
            finish_reason: FinishReason::Stop,
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
            },
        })
    }

    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<crate::stream::ChunkStream, GeneratorError> {
        let response = self.generate(request).await?;
        Ok(crate::stream::ChunkStream::from_complete(response))
    }
}
