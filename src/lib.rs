//! task-finalizer: decides whether an objective has been met.
//!
//! Given an objective and the tasks performed towards it, the finalizer asks
//! an LLM for either a Markdown final report or a list of new tasks.

pub mod cli;
pub mod config;
pub mod error;
pub mod finalizer;
pub mod llm;
pub mod utils;

// Re-export commonly used types
pub use config::{DeploymentConfig, LlmConfig, StructuredOutput};
pub use error::{ConfigError, LlmError};
pub use finalizer::{
    AgentRunInput, Decision, FinalizationRequest, FinalizationResult, FinalizerAgent,
    FinalizerConfig, FinalizerError, FinalizerResult, Operation, Task,
};
