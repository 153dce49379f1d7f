//! Task finalization.
//!
//! Given an objective and the tasks performed towards it, the finalizer asks
//! a language model for one decision: either the objective is met and a
//! Markdown report is returned, or it is not and a list of fresh tasks is
//! returned instead.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use task_finalizer::finalizer::{FinalizationRequest, FinalizerAgent, Task};
//! use task_finalizer::llm::LiteLlmClient;
//!
//! let client = Arc::new(LiteLlmClient::from_env()?);
//! let agent = FinalizerAgent::with_defaults(client);
//!
//! let request = FinalizationRequest::new("Write a blog post about the weather in London.")
//!     .with_task(Task::completed("research", "gather historical data", "..."));
//! let result = agent.finalize(&request).await?;
//! ```

pub mod agent;
pub mod error;
pub mod prompt;
pub mod schema;
pub mod types;

pub use agent::{FinalizerAgent, FinalizerConfig};
pub use error::{FinalizerError, FinalizerResult};
pub use prompt::{PromptBuilder, RenderedPrompt, DEFAULT_SYSTEM_PROMPT, FINALIZER_USER_TEMPLATE};
pub use schema::{decode_reply, encode_result, response_format, result_schema, RESULT_SCHEMA_NAME};
pub use types::{AgentRunInput, Decision, FinalizationRequest, FinalizationResult, Operation, Task};
