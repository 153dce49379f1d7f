//! Data model for finalization: tasks, requests, results and the run input.

use serde::{Deserialize, Serialize};

use super::error::{FinalizerError, FinalizerResult};

/// One unit of work produced and executed elsewhere.
///
/// Tasks are read-only here: the finalizer renders them into the prompt and
/// never mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Short identifier, e.g. "research".
    pub name: String,
    /// What the task is supposed to accomplish.
    pub description: String,
    /// Whether the task has been executed.
    #[serde(default)]
    pub done: bool,
    /// Output produced by the task, empty if none.
    #[serde(default)]
    pub result: String,
}

impl Task {
    /// A task that has not been executed yet.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            done: false,
            result: String::new(),
        }
    }

    /// A task that has been executed and produced `result`.
    pub fn completed(
        name: impl Into<String>,
        description: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            done: true,
            result: result.into(),
        }
    }

    /// True when this task is in the shape expected of a proposed task.
    pub fn is_pending(&self) -> bool {
        !self.done && self.result.is_empty()
    }
}

/// Input to a finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationRequest {
    /// The overall goal the tasks were working towards.
    pub objective: String,
    /// Tasks in caller order; the order is kept in the rendered prompt.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Optional extra guidance for the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl FinalizationRequest {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            tasks: Vec::new(),
            context: None,
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// The context, if it has any non-whitespace content.
    pub fn effective_context(&self) -> Option<&str> {
        self.context.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Rejects requests the model cannot meaningfully act on.
    ///
    /// # Errors
    ///
    /// `FinalizerError::InvalidRequest` when the objective is blank or a task
    /// is missing its name or description.
    pub fn validate(&self) -> FinalizerResult<()> {
        if self.objective.trim().is_empty() {
            return Err(FinalizerError::InvalidRequest(
                "objective must not be empty".to_string(),
            ));
        }

        for (index, task) in self.tasks.iter().enumerate() {
            if task.name.trim().is_empty() {
                return Err(FinalizerError::InvalidRequest(format!(
                    "task #{} has an empty name",
                    index + 1
                )));
            }
            if task.description.trim().is_empty() {
                return Err(FinalizerError::InvalidRequest(format!(
                    "task '{}' has an empty description",
                    task.name
                )));
            }
        }

        Ok(())
    }
}

/// Output of a finalization.
///
/// Exactly one of `final_report` / `new_tasks` carries content, selected by
/// `objective_met`. [`FinalizationResult::validate`] checks that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationResult {
    /// Markdown report, set only when the objective is met.
    #[serde(default)]
    pub final_report: String,
    /// Follow-up tasks, set only when the objective is not met.
    #[serde(default)]
    pub new_tasks: Vec<Task>,
    /// The decision flag. Required on the wire.
    pub objective_met: bool,
}

/// Borrowed view of the decision carried by a [`FinalizationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision<'a> {
    /// The objective is met; here is the report.
    Report(&'a str),
    /// The objective is not met; these tasks come next.
    NewTasks(&'a [Task]),
}

impl FinalizationResult {
    /// A result declaring the objective met.
    pub fn report(final_report: impl Into<String>) -> Self {
        Self {
            final_report: final_report.into(),
            new_tasks: Vec::new(),
            objective_met: true,
        }
    }

    /// A result asking for more work.
    pub fn continue_with(new_tasks: Vec<Task>) -> Self {
        Self {
            final_report: String::new(),
            new_tasks,
            objective_met: false,
        }
    }

    pub fn decision(&self) -> Decision<'_> {
        if self.objective_met {
            Decision::Report(&self.final_report)
        } else {
            Decision::NewTasks(&self.new_tasks)
        }
    }

    /// Checks the report/new-tasks invariant.
    ///
    /// Returns a human-readable reason on violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.objective_met {
            if self.final_report.trim().is_empty() {
                return Err("objective_met is true but final_report is empty".to_string());
            }
            if !self.new_tasks.is_empty() {
                return Err(format!(
                    "objective_met is true but {} new task(s) were proposed",
                    self.new_tasks.len()
                ));
            }
            return Ok(());
        }

        if !self.final_report.trim().is_empty() {
            return Err("objective_met is false but a final_report was written".to_string());
        }
        if self.new_tasks.is_empty() {
            return Err("objective_met is false but no new tasks were proposed".to_string());
        }
        for task in &self.new_tasks {
            if task.name.trim().is_empty() {
                return Err("a proposed task has an empty name".to_string());
            }
            if !task.is_pending() {
                return Err(format!(
                    "proposed task '{}' must have done=false and an empty result",
                    task.name
                ));
            }
        }

        Ok(())
    }
}

/// The operations a run input can select.
///
/// Only one exists; the enum replaces the by-name method lookup a run input
/// used to drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Decide between a final report and new tasks.
    #[default]
    #[serde(alias = "finalize")]
    GenerateTasks,
}

/// A run document: which operation to perform, and on what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRunInput {
    #[serde(default)]
    pub tool_name: Operation,
    pub tool_input_data: FinalizationRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_deserialize_defaults() {
        let task: Task =
            serde_json::from_str(r#"{"name": "research", "description": "gather data"}"#)
                .expect("should parse");
        assert_eq!(task, Task::new("research", "gather data"));
        assert!(task.is_pending());
    }

    #[test]
    fn test_request_validation() {
        assert!(FinalizationRequest::new("Write a post").validate().is_ok());

        let blank = FinalizationRequest::new("   ");
        assert!(matches!(
            blank.validate(),
            Err(FinalizerError::InvalidRequest(_))
        ));

        let unnamed = FinalizationRequest::new("Write a post").with_task(Task::new("", "x"));
        assert!(matches!(
            unnamed.validate(),
            Err(FinalizerError::InvalidRequest(msg)) if msg.contains("#1")
        ));

        let undescribed =
            FinalizationRequest::new("Write a post").with_task(Task::new("research", ""));
        assert!(matches!(
            undescribed.validate(),
            Err(FinalizerError::InvalidRequest(msg)) if msg.contains("research")
        ));
    }

    #[test]
    fn test_effective_context() {
        let request = FinalizationRequest::new("o");
        assert_eq!(request.effective_context(), None);
        assert_eq!(request.clone().with_context("").effective_context(), None);
        assert_eq!(request.clone().with_context(" \n\t").effective_context(), None);
        assert_eq!(
            request.with_context("Focus on 1900-2000").effective_context(),
            Some("Focus on 1900-2000")
        );
    }

    #[test]
    fn test_request_omits_absent_context_on_wire() {
        let json = serde_json::to_string(&FinalizationRequest::new("o")).expect("serialize");
        assert!(!json.contains("context"));
    }

    #[test]
    fn test_result_validate_accepts_well_formed() {
        assert!(FinalizationResult::report("# Done").validate().is_ok());
        assert!(FinalizationResult::continue_with(vec![Task::new("a", "b")])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_result_validate_rejects_violations() {
        let mut met_with_tasks = FinalizationResult::report("# Done");
        met_with_tasks.new_tasks.push(Task::new("a", "b"));
        assert!(met_with_tasks.validate().is_err());

        let met_without_report = FinalizationResult {
            objective_met: true,
            ..Default::default()
        };
        assert!(met_without_report.validate().is_err());

        let unmet_without_tasks = FinalizationResult::default();
        assert!(unmet_without_tasks.validate().is_err());

        let mut unmet_with_report = FinalizationResult::continue_with(vec![Task::new("a", "b")]);
        unmet_with_report.final_report = "# Partial".to_string();
        assert!(unmet_with_report.validate().is_err());

        let finished_task = FinalizationResult::continue_with(vec![Task::completed("a", "b", "c")]);
        assert!(finished_task.validate().is_err());
    }

    #[test]
    fn test_decision_view() {
        let report = FinalizationResult::report("# Done");
        assert_eq!(report.decision(), Decision::Report("# Done"));

        let tasks = vec![Task::new("a", "b")];
        let more = FinalizationResult::continue_with(tasks.clone());
        assert_eq!(more.decision(), Decision::NewTasks(&tasks));
    }

    #[test]
    fn test_run_input_operation_names() {
        let input: AgentRunInput = serde_json::from_str(
            r#"{"tool_name": "generate_tasks", "tool_input_data": {"objective": "o"}}"#,
        )
        .expect("should parse");
        assert_eq!(input.tool_name, Operation::GenerateTasks);

        let aliased: AgentRunInput = serde_json::from_str(
            r#"{"tool_name": "finalize", "tool_input_data": {"objective": "o"}}"#,
        )
        .expect("alias should parse");
        assert_eq!(aliased.tool_name, Operation::GenerateTasks);

        let defaulted: AgentRunInput =
            serde_json::from_str(r#"{"tool_input_data": {"objective": "o"}}"#)
                .expect("default should parse");
        assert_eq!(defaulted.tool_name, Operation::GenerateTasks);

        let unknown = serde_json::from_str::<AgentRunInput>(
            r#"{"tool_name": "delete_everything", "tool_input_data": {"objective": "o"}}"#,
        );
        assert!(unknown.is_err());
    }
}
