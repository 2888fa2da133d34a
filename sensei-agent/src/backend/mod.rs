//! Content-generation backend abstraction layer.
//!
//! Trait-based interface over the model endpoints the engine calls:
//! - OpenAI-compatible HTTP (any region/model candidate)
//! - Mock backend for testing

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockGenerator;
pub use openai::OpenAiGenerator;
pub use traits::{ContentGenerator, GenerationRequest, GenerationResponse, GeneratorError};
