//! Sensei Agent - content generation with multi-model fallback.
//!
//! Provides the generation boundary of the tutoring engine:
//! - Trait-based generation backends (OpenAI-compatible HTTP, mock)
//! - An ordered (model, region) fallback chain with an explicit cursor
//! - A retry service that walks the chain until one candidate succeeds
//! - Chunked streaming with drop-to-cancel semantics
//! - An audit trail of every attempt
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           GenerationService             │
//! │   (walks the FallbackChain, retries)    │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌──────────────┐      ┌──────────────┐
//! │ FallbackChain│      │ContentGenera-│
//! │ (candidates) │      │tor (per      │
//! │              │      │ candidate)   │
//! └──────────────┘      └──────────────┘
//! ```

pub mod audit;
pub mod backend;
pub mod chain;
pub mod service;
pub mod stream;

// Re-export main types for convenience
pub use backend::traits::{
    ContentGenerator, GenerationRequest, GenerationResponse, GeneratorError, TokenUsage,
};
pub use chain::{CandidateConfig, ChainPreference, FallbackChain, ThinkingDepth};
pub use service::{
    GenerationOutcome, GenerationService, GeneratorFactory, HttpGeneratorFactory, ServiceError,
    StreamOutcome,
};
pub use stream::{ChunkStream, StreamChunk};
