//! Finalizer agent: one inference call per finalization.
//!
//! The agent renders the prompt, asks the model for a [`FinalizationResult`]
//! and decodes the reply. It holds no mutable state, so one instance can
//! serve any number of concurrent finalizations.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DeploymentConfig, StructuredOutput};
use crate::error::LlmError;
use crate::llm::{GenerationRequest, LlmProvider};

use super::error::{FinalizerError, FinalizerResult};
use super::prompt::{PromptBuilder, RenderedPrompt};
use super::schema;
use super::types::{AgentRunInput, FinalizationRequest, FinalizationResult, Operation};

/// Runtime settings for the finalizer agent.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizerConfig {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Output token cap.
    pub max_tokens: u32,
    /// System prompt override.
    pub system_prompt: Option<String>,
    /// Whether to attach the schema constraint.
    pub structured_output: StructuredOutput,
}

impl Default for FinalizerConfig {
    fn default() -> Self {
        Self::from(&DeploymentConfig::default())
    }
}

impl From<&DeploymentConfig> for FinalizerConfig {
    fn from(deployment: &DeploymentConfig) -> Self {
        Self {
            model: deployment.llm_config.model.clone(),
            temperature: deployment.llm_config.temperature,
            max_tokens: deployment.llm_config.max_tokens,
            system_prompt: deployment.system_prompt.clone(),
            structured_output: deployment.structured_output,
        }
    }
}

impl FinalizerConfig {
    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the temperature for generation.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the maximum tokens for responses.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_structured_output(mut self, mode: StructuredOutput) -> Self {
        self.structured_output = mode;
        self
    }

    /// Builds the provider request for an already rendered prompt.
    ///
    /// The schema constraint is attached only in `JsonSchema` mode.
    pub fn generation_request(&self, prompt: RenderedPrompt) -> GenerationRequest {
        let request = GenerationRequest::new(&self.model, prompt.into_messages())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        match self.structured_output {
            StructuredOutput::JsonSchema => request.with_response_format(schema::response_format()),
            StructuredOutput::PromptOnly => request,
        }
    }
}

/// Agent that turns completed tasks into a report or a new task list.
pub struct FinalizerAgent {
    llm_client: Arc<dyn LlmProvider>,
    prompt_builder: PromptBuilder,
    config: FinalizerConfig,
}

impl std::fmt::Debug for FinalizerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalizerAgent")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FinalizerAgent {
    /// Agent name constant for identification.
    pub const AGENT_NAME: &'static str = "task_finalizer";

    /// Creates a new finalizer agent with the given LLM client and configuration.
    pub fn new(llm_client: Arc<dyn LlmProvider>, config: FinalizerConfig) -> Self {
        let prompt_builder = PromptBuilder::from_optional(config.system_prompt.as_deref());
        Self {
            llm_client,
            prompt_builder,
            config,
        }
    }

    /// Creates a new finalizer agent with default configuration.
    pub fn with_defaults(llm_client: Arc<dyn LlmProvider>) -> Self {
        Self::new(llm_client, FinalizerConfig::default())
    }

    /// Creates an agent from a loaded deployment.
    pub fn from_deployment(llm_client: Arc<dyn LlmProvider>, deployment: &DeploymentConfig) -> Self {
        Self::new(llm_client, FinalizerConfig::from(deployment))
    }

    /// Returns the agent configuration.
    pub fn config(&self) -> &FinalizerConfig {
        &self.config
    }

    /// Renders the prompts for `request` without calling the model.
    pub fn render_prompt(&self, request: &FinalizationRequest) -> FinalizerResult<RenderedPrompt> {
        self.prompt_builder.render(request)
    }

    /// Decides whether the objective is met and returns the report or new tasks.
    ///
    /// Exactly one inference call is made. Nothing is retried.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the request fails validation (no call is made)
    /// - `InferenceTransport` if the provider fails or returns no reply text
    /// - `Decode` if the reply does not satisfy the result contract
    pub async fn finalize(
        &self,
        request: &FinalizationRequest,
    ) -> FinalizerResult<FinalizationResult> {
        let run_id = Uuid::new_v4();
        let prompt = self.prompt_builder.render(request)?;

        info!(
            %run_id,
            agent = Self::AGENT_NAME,
            tasks = request.tasks.len(),
            completed = request.tasks.iter().filter(|t| t.done).count(),
            has_context = request.effective_context().is_some(),
            model = %self.config.model,
            "Finalizing objective"
        );
        debug!(
            %run_id,
            system_chars = prompt.system.len(),
            user_chars = prompt.user.len(),
            "Rendered finalization prompt"
        );

        let generation = self.config.generation_request(prompt);
        let response = self.llm_client.generate(generation).await?;

        debug!(
            %run_id,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "Received finalization reply"
        );

        let content = response.first_content().ok_or_else(|| {
            FinalizerError::InferenceTransport(LlmError::ParseError(
                "No content in LLM response".to_string(),
            ))
        })?;

        match schema::decode_reply(content) {
            Ok(result) => {
                info!(
                    %run_id,
                    objective_met = result.objective_met,
                    report_chars = result.final_report.len(),
                    new_tasks = result.new_tasks.len(),
                    "Finalization complete"
                );
                Ok(result)
            }
            Err(err) => {
                warn!(%run_id, error = %err, "Finalization reply rejected");
                Err(err)
            }
        }
    }

    /// Executes a run document by dispatching on its operation.
    pub async fn run(&self, input: &AgentRunInput) -> FinalizerResult<FinalizationResult> {
        match input.tool_name {
            Operation::GenerateTasks => self.finalize(&input.tool_input_data).await,
        }
    }

    /// Finalizes independent requests concurrently.
    ///
    /// At most `max_concurrent` inference calls are in flight at once (a
    /// value of 0 is treated as 1). Results are returned in input order; one
    /// failure does not affect the others.
    pub async fn finalize_batch(
        &self,
        requests: &[FinalizationRequest],
        max_concurrent: usize,
    ) -> Vec<FinalizerResult<FinalizationResult>> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        let futures = requests.iter().map(|request| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore.acquire().await;
                self.finalize(request).await
            }
        });

        let results = futures::future::join_all(futures).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            total = results.len(),
            failed,
            max_concurrent,
            "Batch finalization complete"
        );

        results
    }
}
