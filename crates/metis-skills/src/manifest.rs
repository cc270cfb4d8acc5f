//! SKILL.md manifest parsing
//!
//! A manifest is a YAML metadata block delimited by `---` lines at the
//! top of `SKILL.md`. Only `name` is required; everything else has a
//! sensible default.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Parsed skill manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillManifest {
    /// Unique skill name
    pub name: String,
    /// What the skill does
    pub description: String,
    /// Free-text guidance on when the skill should be used
    pub when_to_use: String,
    /// Flagged for future scripted execution (no handler yet)
    pub run_by_script: bool,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    when_to_use: String,
    #[serde(default)]
    run_by_script: bool,
}

impl SkillManifest {
    /// Parse a manifest from the contents of a SKILL.md file.
    ///
    /// # Errors
    /// Returns [`Error::Manifest`] if the metadata header is missing,
    /// unterminated, not valid YAML, or lacks a non-empty `name`.
    pub fn parse(content: &str) -> Result<Self> {
        if !content.trim_start().starts_with("---") {
            return Err(Error::Manifest("missing metadata header".to_string()));
        }

        let mut parts = content.splitn(3, "---");
        let _before = parts.next();
        let yaml = parts
            .next()
            .ok_or_else(|| Error::Manifest("missing metadata header".to_string()))?;
        if parts.next().is_none() {
            return Err(Error::Manifest("unterminated metadata header".to_string()));
        }

        let raw: RawManifest = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Manifest(format!("invalid metadata: {e}")))?;

        let name = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::Manifest("missing 'name' field".to_string()))?;

        Ok(Self {
            name,
            description: raw.description,
            when_to_use: raw.when_to_use,
            run_by_script: raw.run_by_script,
        })
    }

    /// Load and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_manifest() {
        let content = r#"---
name: get_weather
description: Look up the current weather for a location
when_to_use: The user asks about the weather
run_by_script: false
---

# Weather skill

Body text is ignored by the parser.
"#;
        let manifest = SkillManifest::parse(content).unwrap();
        assert_eq!(manifest.name, "get_weather");
        assert_eq!(
            manifest.description,
            "Look up the current weather for a location"
        );
        assert_eq!(manifest.when_to_use, "The user asks about the weather");
        assert!(!manifest.run_by_script);
    }

    #[test]
    fn test_parse_defaults() {
        let content = "---\nname: minimal\n---\n";
        let manifest = SkillManifest::parse(content).unwrap();
        assert_eq!(manifest.name, "minimal");
        assert_eq!(manifest.description, "");
        assert_eq!(manifest.when_to_use, "");
        assert!(!manifest.run_by_script);
    }

    #[test]
    fn test_missing_header() {
        let err = SkillManifest::parse("# Just a readme\n").unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
    }

    #[test]
    fn test_unterminated_header() {
        let err = SkillManifest::parse("---\nname: broken\n").unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
    }

    #[test]
    fn test_missing_name() {
        let err = SkillManifest::parse("---\ndescription: no name here\n---\n").unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = SkillManifest::parse("---\nname: \"\"\n---\n").unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = SkillManifest::parse("---\nname: [unclosed\n---\n").unwrap_err();
        assert!(matches!(err, Error::Manifest(_)));
    }

    #[test]
    fn test_run_by_script_flag() {
        let content = "---\nname: future_skill\nrun_by_script: true\n---\n";
        let manifest = SkillManifest::parse(content).unwrap();
        assert!(manifest.run_by_script);
    }
}
