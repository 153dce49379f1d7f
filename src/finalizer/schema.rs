//! Response contract: the JSON schema sent to the model and the decoder for
//! its replies.

use serde_json::{json, Value};

use crate::llm::ResponseFormat;
use crate::utils::json_extraction::extract_json_objects;

use super::error::{FinalizerError, FinalizerResult};
use super::types::FinalizationResult;

/// Name given to the schema in the `response_format` constraint.
pub const RESULT_SCHEMA_NAME: &str = "task_finalizer";

/// Top-level fields of a [`FinalizationResult`] on the wire.
const RESULT_FIELDS: [&str; 3] = ["final_report", "new_tasks", "objective_met"];

/// JSON schema of a proposed task.
fn task_schema() -> Value {
    json!({
        "type": "object",
        "title": "Task",
        "description": "A task to be performed.",
        "properties": {
            "name": {
                "type": "string",
                "description": "The name of the task to be performed."
            },
            "description": {
                "type": "string",
                "description": "The description of the task to be performed."
            },
            "done": {
                "type": "boolean",
                "description": "The status of the task. True if the task is done, False otherwise."
            },
            "result": {
                "type": "string",
                "description": "The result of the task."
            }
        },
        "required": ["name", "description", "done", "result"],
        "additionalProperties": false
    })
}

/// JSON schema of [`FinalizationResult`].
///
/// Every property is listed as required so strict structured-output
/// backends accept it; the decoder is more lenient (see [`decode_reply`]).
pub fn result_schema() -> Value {
    json!({
        "type": "object",
        "title": "TaskFinalizer",
        "description": "Either a final report (objective met) or new tasks (objective not met).",
        "properties": {
            "final_report": {
                "type": "string",
                "description": "The final report of the tasks, in Markdown. Empty unless the objective has been met."
            },
            "new_tasks": {
                "type": "array",
                "description": "A list of new tasks to be performed. Empty if the objective has been met.",
                "items": task_schema()
            },
            "objective_met": {
                "type": "boolean",
                "description": "True if the objective has been met, False otherwise."
            }
        },
        "required": ["final_report", "new_tasks", "objective_met"],
        "additionalProperties": false
    })
}

/// The `response_format` constraint attached to finalization requests.
pub fn response_format() -> ResponseFormat {
    ResponseFormat::json_schema(RESULT_SCHEMA_NAME, result_schema())
}

/// Serializes a result in the wire shape.
pub fn encode_result(result: &FinalizationResult) -> serde_json::Result<String> {
    serde_json::to_string(result)
}

/// Decodes a model reply into a validated [`FinalizationResult`].
///
/// The reply may be bare JSON, JSON in a Markdown fence or JSON after some
/// prose. When it holds several objects, the last one carrying a result
/// field is the answer, wherever the others sit; objects with no result
/// field (a stray task, an unrelated example) are passed over. That answer
/// is decoded strictly: `objective_met` must be present, while
/// `final_report` and `new_tasks` default to empty. The report/new-tasks
/// invariant is then enforced.
///
/// # Errors
///
/// `FinalizerError::Decode` carrying the whole raw reply when no object can
/// be extracted, the answer does not match the shape, or the invariant is
/// violated.
pub fn decode_reply(raw: &str) -> FinalizerResult<FinalizationResult> {
    let mut objects =
        extract_json_objects(raw).map_err(|e| FinalizerError::decode(raw, e.to_string()))?;

    let answer = objects
        .iter()
        .rposition(|object| RESULT_FIELDS.iter().any(|field| object.get(field).is_some()))
        .or_else(|| objects.len().checked_sub(1))
        .map(|index| objects.swap_remove(index))
        .ok_or_else(|| FinalizerError::decode(raw, "no JSON object found in reply"))?;

    let result: FinalizationResult = serde_json::from_value(answer)
        .map_err(|e| FinalizerError::decode(raw, format!("reply does not match schema: {e}")))?;

    result
        .validate()
        .map_err(|reason| FinalizerError::decode(raw, reason))?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finalizer::types::Task;

    fn decode_reason(raw: &str) -> String {
        match decode_reply(raw) {
            Err(FinalizerError::Decode { raw: kept, reason }) => {
                assert_eq!(kept, raw, "decode error must carry the raw reply");
                reason
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_schema_shape() {
        let schema = result_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["objective_met"]["type"], "boolean");
        assert_eq!(schema["properties"]["new_tasks"]["items"]["title"], "Task");
        let required: Vec<&str> = schema["required"]
            .as_array()
            .expect("required array")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(required, vec!["final_report", "new_tasks", "objective_met"]);
    }

    #[test]
    fn test_response_format_wraps_schema() {
        let value = serde_json::to_value(response_format()).expect("serialize");
        assert_eq!(value["type"], "json_schema");
        assert_eq!(value["json_schema"]["name"], RESULT_SCHEMA_NAME);
        assert_eq!(value["json_schema"]["schema"], result_schema());
    }

    #[test]
    fn test_decode_report() {
        let raw = r##"{"final_report": "# London Weather", "new_tasks": [], "objective_met": true}"##;
        let result = decode_reply(raw).expect("decode");
        assert_eq!(result, FinalizationResult::report("# London Weather"));
    }

    #[test]
    fn test_decode_new_tasks_with_defaults() {
        let raw = r#"{"new_tasks": [{"name": "research", "description": "gather data"}], "objective_met": false}"#;
        let result = decode_reply(raw).expect("decode");
        assert_eq!(
            result,
            FinalizationResult::continue_with(vec![Task::new("research", "gather data")])
        );
    }

    #[test]
    fn test_decode_fenced_reply() {
        let raw = "Here you go:\n```json\n{\"final_report\": \"# Done\", \"objective_met\": true}\n```";
        assert!(decode_reply(raw).expect("decode").objective_met);
    }

    #[test]
    fn test_round_trip() {
        for result in [
            FinalizationResult::report("# Report\n\n- point one\n- \"quoted\" point"),
            FinalizationResult::continue_with(vec![
                Task::new("research", "gather data"),
                Task::new("draft", "write the post"),
            ]),
        ] {
            let encoded = encode_result(&result).expect("encode");
            assert_eq!(decode_reply(&encoded).expect("decode"), result);
        }
    }

    #[test]
    fn test_later_correction_wins_over_leading_object() {
        let raw = r##"{"final_report": "# Draft", "new_tasks": [], "objective_met": true}

Correction, the objective is not met: {"final_report": "", "new_tasks": [{"name": "verify", "description": "check the sources"}], "objective_met": false}"##;
        let result = decode_reply(raw).expect("decode");
        assert_eq!(
            result,
            FinalizationResult::continue_with(vec![Task::new("verify", "check the sources")])
        );
    }

    #[test]
    fn test_bare_answer_wins_over_fenced_example() {
        let raw = r##"A finished objective looks like:
```json
{"final_report": "# Example", "new_tasks": [], "objective_met": true}
```
My answer: {"new_tasks": [{"name": "research", "description": "gather data"}], "objective_met": false}"##;
        let result = decode_reply(raw).expect("decode");
        assert!(!result.objective_met);
        assert_eq!(result.new_tasks, vec![Task::new("research", "gather data")]);
    }

    #[test]
    fn test_trailing_non_result_object_is_passed_over() {
        let raw = r##"{"final_report": "# Done", "new_tasks": [], "objective_met": true}
For reference, a task looks like {"name": "x", "description": "y"}."##;
        let result = decode_reply(raw).expect("decode");
        assert_eq!(result, FinalizationResult::report("# Done"));
    }

    #[test]
    fn test_malformed_answer_is_not_replaced_by_earlier_object() {
        let raw = r##"{"final_report": "# Example", "new_tasks": [], "objective_met": true}
Actual answer: {"final_report": "", "new_tasks": []}"##;
        assert!(decode_reason(raw).contains("objective_met"));
    }

    #[test]
    fn test_degenerate_reply_fails_fast() {
        let raw = "{".repeat(40_000);
        let started = std::time::Instant::now();
        assert!(decode_reason(&raw).contains("truncated"));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_invariant_violation_is_decode_error() {
        let raw = r##"{"final_report": "# Done", "new_tasks": [{"name": "x", "description": "y", "done": false, "result": ""}], "objective_met": true}"##;
        assert!(decode_reason(raw).contains("new task"));
    }

    #[test]
    fn test_unmet_without_tasks_is_decode_error() {
        let raw = r#"{"final_report": "", "new_tasks": [], "objective_met": false}"#;
        assert!(decode_reason(raw).contains("no new tasks"));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(decode_reason("I think we're done here!").contains("No JSON object"));
        assert!(decode_reason("{\"final_report\": \"# cut off").contains("truncated"));
    }

    #[test]
    fn test_missing_objective_met_is_decode_error() {
        let reason = decode_reason(r##"{"final_report": "# Done", "new_tasks": []}"##);
        assert!(reason.contains("objective_met"));
    }

    #[test]
    fn test_wrong_types_are_decode_error() {
        let reason = decode_reason(r##"{"final_report": "# Done", "objective_met": "yes"}"##);
        assert!(reason.contains("does not match schema"));
    }
}
