//! Role bindings
//!
//! Binds the discovered skill set to the three fixed roles. The
//! planner and evaluator never get tools; the executor gets every
//! scripted skill as a structured tool call and every direct-run skill
//! wrapped as a single opaque tool. Bindings are immutable containers,
//! re-derived whenever the registry changes.

use crate::prompts::{EVALUATOR_PROMPT, EXECUTOR_PROMPT, PLANNER_PROMPT};
use metis_llm::ToolDefinition;
use metis_skills::{ExecutionMode, Skill};
use std::sync::Arc;

/// A role's fixed context
#[derive(Debug, Clone)]
pub struct Role {
    /// Role name, for logging
    pub name: String,
    /// Fixed instructions (system prompt)
    pub instructions: String,
}

impl Role {
    fn new(name: &str, instructions: String) -> Self {
        Self {
            name: name.to_string(),
            instructions,
        }
    }
}

/// How an executor tool maps back onto a skill
#[derive(Clone)]
pub enum ToolBinding {
    /// Structured tool call into the skill's handler
    Scripted(Arc<Skill>),
    /// Opaque tool forwarding to a dedicated single-skill sub-context
    Direct(Arc<Skill>),
}

impl ToolBinding {
    /// The bound skill
    #[must_use]
    pub fn skill(&self) -> &Arc<Skill> {
        match self {
            Self::Scripted(skill) | Self::Direct(skill) => skill,
        }
    }
}

/// A tool bound into the executor's tool set
#[derive(Clone)]
pub struct BoundTool {
    /// Declaration handed to the completion service
    pub definition: ToolDefinition,
    /// Dispatch target
    pub binding: ToolBinding,
}

/// The three bound roles plus the executor's tool set
pub struct RoleBindings {
    /// Plan-or-chat decider; no tools
    pub planner: Role,
    /// Step executor; owns the tool set
    pub executor: Role,
    /// Step judge; no tools
    pub evaluator: Role,
    tools: Vec<BoundTool>,
}

impl RoleBindings {
    /// Bind the skill set to the three roles
    #[must_use]
    pub fn bind(skills: &[Arc<Skill>]) -> Self {
        let mut tools = Vec::new();
        let mut unavailable = Vec::new();

        for skill in skills {
            match skill.mode {
                ExecutionMode::Scripted => {
                    let parameters = skill
                        .handler()
                        .map(|h| h.args_schema())
                        .unwrap_or_else(|| serde_json::json!({"type": "object"}));
                    tools.push(BoundTool {
                        definition: ToolDefinition::new(
                            &skill.name,
                            skill.tool_description(),
                            parameters,
                        ),
                        binding: ToolBinding::Scripted(Arc::clone(skill)),
                    });
                }
                ExecutionMode::DirectRun => {
                    tools.push(BoundTool {
                        definition: direct_run_definition(skill),
                        binding: ToolBinding::Direct(Arc::clone(skill)),
                    });
                }
                ExecutionMode::Unimplemented => {
                    unavailable.push(skill.summary_line());
                }
            }
        }

        let mut executor_instructions = EXECUTOR_PROMPT.to_string();
        if !unavailable.is_empty() {
            executor_instructions.push_str("\nThe following skills are not yet available:\n");
            for line in &unavailable {
                executor_instructions.push_str(line);
                executor_instructions.push('\n');
            }
        }

        Self {
            planner: Role::new("planner", PLANNER_PROMPT.to_string()),
            executor: Role::new("executor", executor_instructions),
            evaluator: Role::new("evaluator", EVALUATOR_PROMPT.to_string()),
            tools,
        }
    }

    /// Tool declarations for the executor's completion requests
    #[must_use]
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    /// Look up a bound tool by name
    #[must_use]
    pub fn find_tool(&self, name: &str) -> Option<&BoundTool> {
        self.tools.iter().find(|t| t.definition.name == name)
    }

    /// Number of tools bound to the executor
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

/// Opaque declaration for a direct-run skill: a single free-text input
/// forwarded to the skill's sub-context.
fn direct_run_definition(skill: &Skill) -> ToolDefinition {
    ToolDefinition::new(
        &skill.name,
        skill.tool_description(),
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "What you need this skill to do"
                }
            },
            "required": ["input"]
        }),
    )
}

/// System prompt for a direct-run skill's dedicated sub-context
#[must_use]
pub fn direct_run_instructions(skill: &Skill) -> String {
    format!(
        "You are an assistant with the skill {}. You can {}.",
        skill.name, skill.description
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn skill(name: &str, mode: ExecutionMode) -> Arc<Skill> {
        Arc::new(Skill::new(
            name,
            format!("{name} description"),
            "",
            mode,
            SystemTime::UNIX_EPOCH,
            None,
        ))
    }

    #[test]
    fn test_bind_splits_modes() {
        let skills = vec![
            skill("direct", ExecutionMode::DirectRun),
            skill("pending", ExecutionMode::Unimplemented),
        ];

        let bindings = RoleBindings::bind(&skills);

        assert_eq!(bindings.tool_count(), 1);
        assert!(bindings.find_tool("direct").is_some());
        assert!(bindings.find_tool("pending").is_none());
        assert!(bindings
            .executor
            .instructions
            .contains("not yet available"));
        assert!(bindings.executor.instructions.contains("pending"));
    }

    #[test]
    fn test_planner_and_evaluator_have_no_tools() {
        let bindings = RoleBindings::bind(&[skill("direct", ExecutionMode::DirectRun)]);

        assert_eq!(bindings.planner.name, "planner");
        assert_eq!(bindings.evaluator.name, "evaluator");
        // Tools live on the executor only
        assert_eq!(bindings.tool_definitions().len(), 1);
    }

    #[test]
    fn test_direct_run_tool_takes_free_text_input() {
        let bindings = RoleBindings::bind(&[skill("travel", ExecutionMode::DirectRun)]);
        let tool = bindings.find_tool("travel").unwrap();

        assert_eq!(tool.definition.parameters["type"], "object");
        assert!(tool.definition.parameters["properties"]["input"].is_object());
        assert!(matches!(tool.binding, ToolBinding::Direct(_)));
    }

    #[test]
    fn test_direct_run_instructions_name_the_skill() {
        let s = skill("travel", ExecutionMode::DirectRun);
        let instructions = direct_run_instructions(&s);
        assert!(instructions.contains("travel"));
        assert!(instructions.contains("travel description"));
    }

    #[test]
    fn test_no_unavailable_section_when_all_bound() {
        let bindings = RoleBindings::bind(&[skill("direct", ExecutionMode::DirectRun)]);
        assert!(!bindings
            .executor
            .instructions
            .contains("not yet available"));
    }
}
