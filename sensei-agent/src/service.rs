//! GenerationService - the fallback chain's only consumer.
//!
//! Walks an ordered candidate chain, attempting the generation call
//! against each candidate until one succeeds. Only exhaustion surfaces an
//! error, carrying the last underlying failure.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::audit::{AttemptOutcome, AttemptRecord, GenerationAuditLog};
use crate::backend::openai::OpenAiGenerator;
use crate::backend::traits::{ContentGenerator, GenerationRequest, GenerationResponse, GeneratorError};
use crate::chain::{CandidateConfig, ChainPreference, FallbackChain};
use crate::stream::ChunkStream;

/// Error types for the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Every candidate in the chain failed
    #[error("All {attempts} generation candidates failed, last error: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: GeneratorError,
    },

    /// The chain had no candidates at all
    #[error("All generation attempts failed: no candidates available")]
    AllCandidatesFailed,
}

/// Maps a fallback-chain candidate to a concrete backend.
///
/// Production wires [`HttpGeneratorFactory`]; tests substitute scripted
/// mocks without touching the retry loop.
pub trait GeneratorFactory: Send + Sync {
    /// Get a backend bound to the given candidate.
    fn generator_for(&self, candidate: &CandidateConfig) -> Arc<dyn ContentGenerator>;
}

/// Factory producing OpenAI-compatible HTTP backends per candidate.
pub struct HttpGeneratorFactory {
    endpoint_template: String,
    api_key: Option<String>,
}

impl HttpGeneratorFactory {
    /// Create a factory. `endpoint_template` contains a `{region}`
    /// placeholder.
    pub fn new(endpoint_template: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint_template: endpoint_template.into(),
            api_key,
        }
    }
}

impl GeneratorFactory for HttpGeneratorFactory {
    fn generator_for(&self, candidate: &CandidateConfig) -> Arc<dyn ContentGenerator> {
        Arc::new(OpenAiGenerator::for_candidate(
            candidate,
            &self.endpoint_template,
            self.api_key.clone(),
        ))
    }
}

/// A successful non-streaming generation, with provenance.
#[derive(Debug)]
pub struct GenerationOutcome {
    /// The generated response
    pub response: GenerationResponse,
    /// Model that served the request
    pub model: String,
    /// Region that served the request
    pub region: String,
    /// How many candidates were tried (1 = first candidate succeeded)
    pub attempts: usize,
}

/// A successfully started streaming generation.
pub struct StreamOutcome {
    /// The chunk stream
    pub stream: ChunkStream,
    /// Model serving the stream
    pub model: String,
    /// Region serving the stream
    pub region: String,
    /// How many candidates were tried before the stream started
    pub attempts: usize,
}

/// Orchestrates generation calls across the fallback chain.
pub struct GenerationService {
    factory: Arc<dyn GeneratorFactory>,
    audit: Arc<GenerationAuditLog>,
}

impl GenerationService {
    /// Create a service with the given backend factory.
    pub fn new(factory: Arc<dyn GeneratorFactory>) -> Self {
        Self {
            factory,
            audit: Arc::new(GenerationAuditLog::new()),
        }
    }

    /// Create with a shared audit log.
    pub fn with_audit(mut self, audit: Arc<GenerationAuditLog>) -> Self {
        self.audit = audit;
        self
    }

    /// Access the audit log.
    pub fn audit(&self) -> &Arc<GenerationAuditLog> {
        &self.audit
    }

    /// Generate content, retrying across the chain for the preference.
    ///
    /// On success returns immediately; no further candidates are tried.
    /// On exhaustion the last observed error is surfaced.
    pub async fn generate(
        &self,
        request: GenerationRequest,
        preference: ChainPreference,
    ) -> Result<GenerationOutcome, ServiceError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut chain = FallbackChain::for_preference(preference);
        let mut last_error: Option<GeneratorError> = None;

        while let Some(candidate) = chain.next_config() {
            let attempt = chain.attempt_count();
            let generator = self.factory.generator_for(&candidate);

            debug!(
                request_id = %request_id,
                model = %candidate.model,
                region = %candidate.region,
                attempt,
                "Attempting generation"
            );

            let started_at = chrono::Utc::now();
            let start = std::time::Instant::now();
            let result = generator.generate(request.clone()).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(response) => {
                    self.audit
                        .record(AttemptRecord {
                            entry_id: uuid::Uuid::new_v4().to_string(),
                            request_id,
                            model: candidate.model.clone(),
                            region: candidate.region.clone(),
                            attempt,
                            outcome: AttemptOutcome::Succeeded,
                            usage: Some(response.usage),
                            started_at,
                            duration_ms,
                        })
                        .await;

                    return Ok(GenerationOutcome {
                        response,
                        model: candidate.model,
                        region: candidate.region,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    warn!(
                        request_id = %request_id,
                        model = %candidate.model,
                        region = %candidate.region,
                        attempt,
                        error = %e,
                        "Generation attempt failed, trying next candidate"
                    );

                    self.audit
                        .record(AttemptRecord {
                            entry_id: uuid::Uuid::new_v4().to_string(),
                            request_id: request_id.clone(),
                            model: candidate.model.clone(),
                            region: candidate.region.clone(),
                            attempt,
                            outcome: AttemptOutcome::Failed(e.to_string()),
                            usage: None,
                            started_at,
                            duration_ms,
                        })
                        .await;

                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) => Err(ServiceError::Exhausted {
                attempts: chain.attempt_count(),
                last,
            }),
            None => Err(ServiceError::AllCandidatesFailed),
        }
    }

    /// Generate content as a stream, retrying across the chain.
    ///
    /// Fallback applies only to failures before the stream starts; once a
    /// stream is returned, a mid-stream failure propagates to the caller
    /// and any partial output already emitted stands.
    pub async fn generate_stream(
        &self,
        request: GenerationRequest,
        preference: ChainPreference,
    ) -> Result<StreamOutcome, ServiceError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut chain = FallbackChain::for_preference(preference);
        let mut last_error: Option<GeneratorError> = None;

        while let Some(candidate) = chain.next_config() {
            let attempt = chain.attempt_count();
            let generator = self.factory.generator_for(&candidate);

            let started_at = chrono::Utc::now();
            let start = std::time::Instant::now();
            let result = generator.generate_stream(request.clone()).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(stream) => {
                    self.audit
                        .record(AttemptRecord {
                            entry_id: uuid::Uuid::new_v4().to_string(),
                            request_id,
                            model: candidate.model.clone(),
                            region: candidate.region.clone(),
                            attempt,
                            outcome: AttemptOutcome::Succeeded,
                            usage: None,
                            started_at,
                            duration_ms,
                        })
                        .await;

                    return Ok(StreamOutcome {
                        stream,
                        model: candidate.model,
                        region: candidate.region,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    warn!(
                        request_id = %request_id,
                        model = %candidate.model,
                        region = %candidate.region,
                        attempt,
                        error = %e,
                        "Stream start failed, trying next candidate"
                    );

                    self.audit
                        .record(AttemptRecord {
                            entry_id: uuid::Uuid::new_v4().to_string(),
                            request_id: request_id.clone(),
                            model: candidate.model.clone(),
                            region: candidate.region.clone(),
                            attempt,
                            outcome: AttemptOutcome::Failed(e.to_string()),
                            usage: None,
                            started_at,
                            duration_ms,
                        })
                        .await;

                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(last) => Err(ServiceError::Exhausted {
                attempts: chain.attempt_count(),
                last,
            }),
            None => Err(ServiceError::AllCandidatesFailed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockGenerator;

    /// Factory that hands the same shared mock to every candidate.
    struct SharedMockFactory {
        mock: Arc<MockGenerator>,
    }

    impl GeneratorFactory for SharedMockFactory {
        fn generator_for(&self, _candidate: &CandidateConfig) -> Arc<dyn ContentGenerator> {
            Arc::clone(&self.mock) as Arc<dyn ContentGenerator>
        }
    }

    fn service_with(mock: MockGenerator) -> (GenerationService, Arc<MockGenerator>) {
        let mock = Arc::new(mock);
        let service = GenerationService::new(Arc::new(SharedMockFactory {
            mock: Arc::clone(&mock),
        }));
        (service, mock)
    }

    #[tokio::test]
    async fn test_first_candidate_succeeds() {
        let (service, mock) = service_with(MockGenerator::new("m").with_response("problem text"));

        let outcome = service
            .generate(GenerationRequest::user("go"), ChainPreference::Fast)
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.model, "sensei-flash-preview");
        assert_eq!(outcome.response.content, "problem text");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_to_second_candidate() {
        let (service, mock) = service_with(MockGenerator::new("m").failing_first(1));

        let outcome = service
            .generate(GenerationRequest::user("go"), ChainPreference::Fast)
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.region, "us-central1");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error() {
        // Fast chain has 3 candidates; fail all of them.
        let (service, mock) = service_with(MockGenerator::new("m").failing_first(100));

        let err = service
            .generate(GenerationRequest::user("go"), ChainPreference::Fast)
            .await
            .unwrap_err();

        match err {
            ServiceError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, GeneratorError::RequestFailed(_)));
            }
            other => panic!("Unexpected error: {other:?}"),
        }
        assert_eq!(mock.call_count(), 3);

        // All attempts are in the audit log.
        assert_eq!(service.audit().len().await, 3);
    }

    #[tokio::test]
    async fn test_stream_fallback_before_first_chunk() {
        let (service, mock) =
            service_with(MockGenerator::new("m").with_response("stream body").failing_first(1));

        let outcome = service
            .generate_stream(GenerationRequest::user("go"), ChainPreference::Fast)
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
        assert_eq!(mock.call_count(), 2);

        let collected = outcome.stream.collect().await;
        assert_eq!(collected.content, "stream body");
    }
}
