//! Skill type and execution modes

use crate::handler::SkillHandler;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// How a skill is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Backed by a handler; invoked as a structured tool call
    Scripted,
    /// No handler; delegated to a dedicated single-skill sub-context
    DirectRun,
    /// No handler and flagged for future scripted execution; advertised
    /// as unavailable, never invocable
    Unimplemented,
}

impl ExecutionMode {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scripted => "scripted",
            Self::DirectRun => "direct_run",
            Self::Unimplemented => "unimplemented",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A discovered skill
#[derive(Clone)]
pub struct Skill {
    /// Unique skill name (from the manifest)
    pub name: String,
    /// What the skill does
    pub description: String,
    /// Guidance on when the skill should be used
    pub when_to_use: String,
    /// How the skill is executed
    pub mode: ExecutionMode,
    /// Latest modification time across the skill directory's files
    pub source_mtime: SystemTime,
    handler: Option<Arc<dyn SkillHandler>>,
}

impl Skill {
    /// Create a skill record
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        when_to_use: impl Into<String>,
        mode: ExecutionMode,
        source_mtime: SystemTime,
        handler: Option<Arc<dyn SkillHandler>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            when_to_use: when_to_use.into(),
            mode,
            source_mtime,
            handler,
        }
    }

    /// The bound handler, for scripted skills
    #[must_use]
    pub fn handler(&self) -> Option<&Arc<dyn SkillHandler>> {
        self.handler.as_ref()
    }

    /// Whether the skill can be invoked at all
    #[must_use]
    pub fn is_invocable(&self) -> bool {
        !matches!(self.mode, ExecutionMode::Unimplemented)
    }

    /// One-line summary for role instructions
    #[must_use]
    pub fn summary_line(&self) -> String {
        let desc = self.description.replace('\n', " ");
        format!("- {}: {}", self.name, desc.trim())
    }

    /// Description offered to the model alongside the tool declaration
    #[must_use]
    pub fn tool_description(&self) -> String {
        if self.when_to_use.is_empty() {
            self.description.clone()
        } else {
            format!("{}\nwhen to use: {}", self.description, self.when_to_use)
        }
    }
}

impl std::fmt::Debug for Skill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Skill")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("when_to_use", &self.when_to_use)
            .field("mode", &self.mode)
            .field("source_mtime", &self.source_mtime)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
