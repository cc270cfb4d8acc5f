//! Compiled-in skill handler contract
//!
//! A scripted skill is backed by a handler implementing the two-method
//! [`SkillHandler`] contract: an async `invoke` that receives the
//! serialized tool-call arguments and returns a string result, and an
//! `args_schema` describing the accepted arguments as JSON Schema.
//! Handlers register in a [`HandlerSet`] keyed by skill name; the
//! registry binds them to manifests during a scan.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use std::collections::HashMap;
use std::sync::Arc;

/// Context passed to a handler invocation
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    /// Name of the skill being invoked
    pub skill_name: String,
    /// Session the invocation belongs to, when known
    pub session_id: Option<String>,
}

impl HandlerContext {
    /// Create a context for the given skill
    #[must_use]
    pub fn new(skill_name: impl Into<String>) -> Self {
        Self {
            skill_name: skill_name.into(),
            session_id: None,
        }
    }

    /// Attach a session id
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Trait for compiled-in skill handlers
#[async_trait::async_trait]
pub trait SkillHandler: Send + Sync {
    /// Invoke the handler with the serialized tool-call arguments.
    ///
    /// The result is a string, typically itself a serialized JSON
    /// payload, returned verbatim as the tool result.
    async fn invoke(&self, args: &str, ctx: &HandlerContext) -> Result<String>;

    /// JSON Schema describing the accepted arguments
    fn args_schema(&self) -> serde_json::Value;
}

/// Derive a JSON Schema value from a typed argument struct
#[must_use]
pub fn schema_for<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

/// Check that a handler's argument schema declares a JSON object.
///
/// # Errors
/// Returns [`Error::Configuration`] otherwise — the skill is excluded
/// from the scan, which continues.
pub fn validate_args_schema(skill_name: &str, schema: &serde_json::Value) -> Result<()> {
    let is_object = schema
        .get("type")
        .and_then(|t| t.as_str())
        .map(|t| t == "object")
        .unwrap_or(false);

    if !is_object {
        return Err(Error::Configuration(format!(
            "skill '{skill_name}': argument schema must describe a JSON object"
        )));
    }
    Ok(())
}

/// Set of registered handlers, keyed by skill name
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<String, Arc<dyn SkillHandler>>,
}

impl HandlerSet {
    /// Create an empty handler set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a skill name.
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn SkillHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Look up a handler by skill name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn SkillHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Check whether a handler is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("HandlerSet").field("names", &names).finish()
    }
}
