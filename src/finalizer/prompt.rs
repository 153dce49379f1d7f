//! Prompt assembly for the finalizer.
//!
//! Rendering is pure: the same request always produces the same two strings.

use tera::{Context, Tera};

use crate::llm::Message;

use super::error::{FinalizerError, FinalizerResult};
use super::types::{FinalizationRequest, Task};

/// System prompt used when the deployment does not provide one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a meticulous project lead reviewing the work \
of a team of agents. Given an objective and the tasks performed so far, you decide whether the \
objective has been met. When it has, you write a comprehensive final report in Markdown. When it \
has not, you propose the tasks that still need to be performed. You always answer with a single \
JSON object matching the requested schema.";

/// User prompt template. `objective` and `tasks` are its only variables.
pub const FINALIZER_USER_TEMPLATE: &str = r#"You are given the following objective: {{ objective }}

Your colleagues have accomplished the following tasks with the following results:

{{ tasks }}

<INSTRUCTIONS>
1. Study the results of the tasks and decide whether the objective has been met.
2. Only prepare the final report if the objective has been met.
3. If the objective has not been met, do not write a report. Instead propose the new tasks that need to be performed to meet it.
4. The final report must be in MARKDOWN format.
5. The final report should be very detailed and exhaustive: it must encompass every task that has been performed and the contribution of each completed task.
6. Respond with a single JSON object with exactly these fields:
   - "final_report": string, the Markdown report ("" if the objective has not been met)
   - "new_tasks": array of objects with "name", "description", "done" and "result" ([] if the objective has been met); every new task has "done": false and "result": ""
   - "objective_met": boolean
</INSTRUCTIONS>"#;

const NO_TASKS_LINE: &str = "No tasks have been performed yet.";

/// The two rendered prompt strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

impl RenderedPrompt {
    /// The two-message exchange sent to the model: system, then user.
    pub fn into_messages(self) -> Vec<Message> {
        vec![Message::system(self.system), Message::user(self.user)]
    }
}

/// Renders finalization prompts.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl PromptBuilder {
    /// Creates a builder that passes `system_prompt` through verbatim.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    /// Uses the configured system prompt, or the default when there is none.
    pub fn from_optional(system_prompt: Option<&str>) -> Self {
        match system_prompt {
            Some(prompt) if !prompt.trim().is_empty() => Self::new(prompt),
            _ => Self::default(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Renders the system and user prompts for `request`.
    ///
    /// # Errors
    ///
    /// `FinalizerError::InvalidRequest` if the request fails validation; an
    /// empty objective is rejected rather than rendered as a placeholder.
    pub fn render(&self, request: &FinalizationRequest) -> FinalizerResult<RenderedPrompt> {
        request.validate()?;

        let mut context = Context::new();
        context.insert("objective", &request.objective);
        context.insert("tasks", &render_tasks(&request.tasks));

        // Autoescape off: the objective and task text go in verbatim.
        let mut user = Tera::one_off(FINALIZER_USER_TEMPLATE, &context, false)
            .map_err(|e| FinalizerError::InvalidRequest(format!("prompt rendering failed: {e}")))?;

        if let Some(extra) = request.effective_context() {
            user.push_str("\n\n<CONTEXT>\n");
            user.push_str(extra);
            user.push_str("\n</CONTEXT>");
        }

        Ok(RenderedPrompt {
            system: self.system_prompt.clone(),
            user,
        })
    }
}

/// Renders tasks as numbered blocks, in order, keeping every field verbatim.
pub fn render_tasks(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return NO_TASKS_LINE.to_string();
    }

    tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            format!(
                "Task {}: {}\nDescription: {}\nDone: {}\nResult: {}",
                i + 1,
                task.name,
                task.description,
                task.done,
                task.result
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
