//! Metis Core - role bindings, orchestration engine, and sessions
//!
//! The engine drives one user request through the three fixed roles:
//! the planner classifies the request as chat or a task plan, then each
//! plan step runs through a bounded executor/evaluator retry loop.
//! Progress is published as an ordered event sequence; presentation
//! surfaces are pure consumers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod events;
pub mod prompts;
pub mod roles;
pub mod session;
pub mod task;

pub use engine::{Engine, EngineConfig, RunOutcome, MAX_ATTEMPTS, RETRY_DELAY};
pub use error::{Error, Result};
pub use events::{EngineEvent, EventBus};
pub use roles::{BoundTool, Role, RoleBindings, ToolBinding};
pub use session::{
    resolve_session, MemorySessionStore, SessionOptions, SessionStore, SqliteSessionStore,
    DEFAULT_SESSION_ID,
};
pub use task::{
    normalize_plan, parse_task_plans, PlanSummary, StepReport, TaskStep,
};
