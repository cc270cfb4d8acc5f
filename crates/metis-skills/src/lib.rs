//! Metis Skills - capability discovery and registration
//!
//! A skill is a directory containing a `SKILL.md` manifest and,
//! optionally, a compiled-in handler bound by name. The registry scans
//! a skill tree, validates each manifest, classifies every skill into
//! an execution mode, and caches results by modification time so
//! unchanged skills are not re-resolved.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builtins;
pub mod error;
pub mod handler;
pub mod manifest;
pub mod registry;
pub mod skill;

pub use error::{Error, Result};
pub use handler::{HandlerContext, HandlerSet, SkillHandler};
pub use manifest::SkillManifest;
pub use registry::{ScanReport, SkillRegistry};
pub use skill::{ExecutionMode, Skill};
