//! LLM integration for task-finalizer.
//!
//! The finalizer only needs one narrow capability: send a short message
//! exchange, optionally constrained to a JSON schema, and get text back.
//! [`LlmProvider`] is that seam; [`LiteLlmClient`] is the bundled
//! OpenAI-compatible implementation.
//!
//! ```ignore
//! use task_finalizer::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new(
//!     "",
//!     vec![Message::system("You are helpful"), Message::user("Hello")],
//! )
//! .with_temperature(0.0);
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, JsonSchemaSpec, LiteLlmClient, LlmProvider,
    Message, ResponseFormat, Usage, DEFAULT_MODEL, OPENROUTER_API_BASE,
};
