//! Task records exchanged between the three roles
//!
//! The same JSON record shape is used everywhere: as the elements of
//! the planner's `task_plans` wrapper, as the executor's input and
//! output, and as the evaluator's input and output. Every field has a
//! default so partial model output is repaired rather than rejected;
//! only an element that is not a JSON object at all is fatal.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of a task plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStep {
    /// Step ordinal/identifier
    #[serde(default)]
    pub step: String,
    /// Task description
    #[serde(default)]
    pub task: String,
    /// Execution result, empty until produced
    #[serde(default)]
    pub task_result: String,
    /// Whether the evaluator judged the step complete
    #[serde(default)]
    pub is_complete: bool,
    /// Why the step is not complete, empty when no error
    #[serde(default)]
    pub error_message: String,
}

impl TaskStep {
    /// Create a fresh step
    #[must_use]
    pub fn new(step: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            task: task.into(),
            task_result: String::new(),
            is_complete: false,
            error_message: String::new(),
        }
    }

    /// Serialize as the wire JSON handed to a role
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Parse a wire record, defaulting any missing field.
    ///
    /// # Errors
    /// Returns [`Error::Format`] if the text is not a JSON object.
    pub fn parse(text: &str) -> Result<Self> {
        let value = parse_step_record("record", text).map_err(Error::Format)?;
        serde_json::from_value(value).map_err(|e| Error::Format(e.to_string()))
    }

    /// Copy of this step with only the error message replaced
    #[must_use]
    pub fn with_error(&self, reason: impl Into<String>) -> Self {
        let mut step = self.clone();
        step.error_message = reason.into();
        step
    }

    /// Overwrite all fields from an executor output record.
    ///
    /// `step` and `task` fall back to the current values so a terse
    /// executor reply cannot lose the step identity; `is_complete` is
    /// provisional and re-derived by the evaluator.
    #[must_use]
    pub fn absorb_executor(&self, value: &Value) -> Self {
        Self {
            step: get_str(value, "step").unwrap_or_else(|| self.step.clone()),
            task: get_str(value, "task").unwrap_or_else(|| self.task.clone()),
            task_result: get_str(value, "task_result").unwrap_or_default(),
            is_complete: get_bool(value, "is_complete"),
            error_message: get_str(value, "error_message").unwrap_or_default(),
        }
    }

    /// Overwrite fields from a failed evaluation, so the next attempt
    /// sees why the previous one failed.
    #[must_use]
    pub fn absorb_evaluator_failure(&self, value: &Value) -> Self {
        Self {
            step: get_str(value, "step").unwrap_or_else(|| self.step.clone()),
            task: get_str(value, "task").unwrap_or_else(|| self.task.clone()),
            task_result: get_str(value, "task_result")
                .unwrap_or_else(|| self.task_result.clone()),
            is_complete: false,
            error_message: get_str(value, "error_message")
                .unwrap_or_else(|| "no reason provided".to_string()),
        }
    }

    /// Build a final record from an evaluator output, falling back to
    /// the current step for missing identity fields.
    #[must_use]
    pub fn from_value(value: &Value, current: &Self) -> Self {
        Self {
            step: get_str(value, "step").unwrap_or_else(|| current.step.clone()),
            task: get_str(value, "task").unwrap_or_else(|| current.task.clone()),
            task_result: get_str(value, "task_result").unwrap_or_default(),
            is_complete: get_bool(value, "is_complete"),
            error_message: get_str(value, "error_message").unwrap_or_default(),
        }
    }
}

fn get_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

fn get_bool(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Parse a role's output as a JSON object, with the role name in the
/// failure reason.
pub fn parse_step_record(role: &str, text: &str) -> std::result::Result<Value, String> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| format!("{role} output is not valid JSON: {e}"))?;
    if !value.is_object() {
        return Err(format!("{role} output is not a JSON object"));
    }
    Ok(value)
}

/// Extract the planner's `task_plans` list.
///
/// Returns `None` for anything that should be treated as a chat
/// request: unparseable JSON, a non-object wrapper, or a missing or
/// empty `task_plans` list.
#[must_use]
pub fn parse_task_plans(plan_text: &str) -> Option<Vec<Value>> {
    let value: Value = serde_json::from_str(plan_text.trim()).ok()?;
    let plans = value.as_object()?.get("task_plans")?.as_array()?;
    if plans.is_empty() {
        return None;
    }
    Some(plans.clone())
}

/// Coerce raw plan elements into well-formed steps.
///
/// Missing fields default (`step` to its 1-based position); an element
/// that is not a JSON object aborts the entire plan.
pub fn normalize_plan(elements: &[Value]) -> Result<Vec<TaskStep>> {
    let mut steps = Vec::with_capacity(elements.len());

    for (i, element) in elements.iter().enumerate() {
        if !element.is_object() {
            return Err(Error::Format(format!(
                "task {} is not a structured record",
                i + 1
            )));
        }

        let step = get_str(element, "step").unwrap_or_else(|| (i + 1).to_string());
        steps.push(TaskStep {
            step,
            task: get_str(element, "task").unwrap_or_default(),
            task_result: get_str(element, "task_result").unwrap_or_default(),
            is_complete: get_bool(element, "is_complete"),
            error_message: get_str(element, "error_message").unwrap_or_default(),
        });
    }

    Ok(steps)
}

/// Outcome of one step in the final summary
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Step ordinal/identifier
    pub step: String,
    /// Task description
    pub task: String,
    /// Whether the step completed
    pub completed: bool,
    /// Last known failure reason, empty when completed
    pub error_message: String,
}

/// Final summary of a plan run
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    /// True iff every step completed
    pub all_complete: bool,
    /// Per-step outcomes, in plan order
    pub steps: Vec<StepReport>,
}

impl PlanSummary {
    /// Build a summary from resolved steps
    #[must_use]
    pub fn from_steps(steps: &[TaskStep]) -> Self {
        let reports: Vec<StepReport> = steps
            .iter()
            .map(|s| StepReport {
                step: s.step.clone(),
                task: s.task.clone(),
                completed: s.is_complete,
                error_message: if s.is_complete {
                    String::new()
                } else if s.error_message.is_empty() {
                    "unknown error".to_string()
                } else {
                    s.error_message.clone()
                },
            })
            .collect();

        Self {
            all_complete: reports.iter().all(|r| r.completed),
            steps: reports,
        }
    }

    /// Every unresolved step
    #[must_use]
    pub fn failures(&self) -> Vec<&StepReport> {
        self.steps.iter().filter(|r| !r.completed).collect()
    }
}
