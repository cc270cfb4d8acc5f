//! Skill registry with mtime-based caching
//!
//! The registry walks a skill tree, loads every directory that carries
//! a `SKILL.md` manifest, and caches the result keyed by directory
//! name. A cache entry stays valid while its stored modification time
//! is at least as new as every file in the skill directory, so
//! unchanged skills are served without re-resolving their handler or
//! argument schema. `scan` is the sole mutator; readers only ever see
//! complete entries.

use crate::error::{Error, Result};
use crate::handler::{validate_args_schema, HandlerSet};
use crate::manifest::SkillManifest;
use crate::skill::{ExecutionMode, Skill};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Manifest file name expected in every skill directory
pub const MANIFEST_FILE: &str = "SKILL.md";

#[derive(Clone)]
struct CacheEntry {
    skill: Arc<Skill>,
    mtime: SystemTime,
}

/// What a scan did, for observability
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Skill names (re)loaded from disk
    pub loaded: Vec<String>,
    /// Skill names served from cache
    pub cached: Vec<String>,
    /// Directory names evicted because their manifest disappeared
    pub evicted: Vec<String>,
    /// Directory names skipped or excluded during this scan
    pub skipped: Vec<String>,
}

/// Registry of discovered skills
pub struct SkillRegistry {
    handlers: HandlerSet,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl SkillRegistry {
    /// Create a registry with the given handler set
    #[must_use]
    pub fn new(handlers: HandlerSet) -> Self {
        Self {
            handlers,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Scan a skill tree and return every valid skill.
    ///
    /// With `force_reload` set, cache validity checks are bypassed and
    /// every skill directory is loaded from disk.
    ///
    /// # Errors
    /// Only filesystem failure on the root itself is fatal; a broken
    /// skill directory is skipped with a warning and the scan continues.
    pub async fn scan(&self, root: &Path, force_reload: bool) -> Result<Vec<Arc<Skill>>> {
        let (skills, _report) = self.scan_with_report(root, force_reload).await?;
        Ok(skills)
    }

    /// Scan and also return a report of what was loaded vs cached.
    pub async fn scan_with_report(
        &self,
        root: &Path,
        force_reload: bool,
    ) -> Result<(Vec<Arc<Skill>>, ScanReport)> {
        let mut report = ScanReport::default();

        if !root.is_dir() {
            warn!(root = %root.display(), "skill directory does not exist");
            self.cache.write().await.clear();
            return Ok((Vec::new(), report));
        }

        let mut dirs = find_skill_dirs(root);
        dirs.sort();

        // Work against a snapshot so readers are never blocked on
        // filesystem access; the rebuilt map is swapped in at the end.
        let prev: HashMap<String, CacheEntry> = self.cache.read().await.clone();
        let mut next: HashMap<String, CacheEntry> = HashMap::new();
        let mut seen_names: HashSet<String> = HashSet::new();

        for dir in dirs {
            let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()).map(String::from)
            else {
                continue;
            };

            let mtime = match latest_mtime(&dir) {
                Ok(mtime) => mtime,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "cannot stat skill directory, skipping");
                    report.skipped.push(dir_name);
                    continue;
                }
            };

            if !force_reload {
                if let Some(entry) = prev.get(&dir_name) {
                    if entry.mtime >= mtime {
                        let name = entry.skill.name.clone();
                        if seen_names.insert(name.clone()) {
                            report.cached.push(name);
                            next.insert(dir_name, entry.clone());
                        } else {
                            warn!(dir = %dir.display(), skill = %name, "duplicate skill name, skipping");
                            report.skipped.push(dir_name);
                        }
                        continue;
                    }
                    debug!(dir = %dir.display(), "skill directory changed, reloading");
                }
            }

            match self.load_skill(&dir, mtime) {
                Ok(skill) => {
                    if !seen_names.insert(skill.name.clone()) {
                        warn!(dir = %dir.display(), skill = %skill.name, "duplicate skill name, skipping");
                        report.skipped.push(dir_name);
                        continue;
                    }
                    report.loaded.push(skill.name.clone());
                    next.insert(
                        dir_name,
                        CacheEntry {
                            skill: Arc::new(skill),
                            mtime,
                        },
                    );
                }
                Err(Error::Manifest(reason)) => {
                    warn!(dir = %dir.display(), %reason, "invalid manifest, skipping skill directory");
                    report.skipped.push(dir_name);
                }
                Err(Error::Configuration(reason)) => {
                    warn!(dir = %dir.display(), %reason, "misconfigured handler, excluding skill");
                    report.skipped.push(dir_name);
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "failed to load skill, skipping");
                    report.skipped.push(dir_name);
                }
            }
        }

        report.evicted = prev
            .keys()
            .filter(|k| !next.contains_key(*k))
            .cloned()
            .collect();
        report.evicted.sort();

        let mut skills: Vec<Arc<Skill>> = next.values().map(|e| Arc::clone(&e.skill)).collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));

        *self.cache.write().await = next;

        info!(
            loaded = ?report.loaded,
            cached = ?report.cached,
            evicted = ?report.evicted,
            "skill scan complete"
        );

        Ok((skills, report))
    }

    fn load_skill(&self, dir: &Path, mtime: SystemTime) -> Result<Skill> {
        let manifest = SkillManifest::load(&dir.join(MANIFEST_FILE))?;

        let (mode, handler) = match self.handlers.get(&manifest.name) {
            Some(handler) => {
                validate_args_schema(&manifest.name, &handler.args_schema())?;
                (ExecutionMode::Scripted, Some(handler))
            }
            None if manifest.run_by_script => (ExecutionMode::Unimplemented, None),
            None => (ExecutionMode::DirectRun, None),
        };

        Ok(Skill::new(
            manifest.name,
            manifest.description,
            manifest.when_to_use,
            mode,
            mtime,
            handler,
        ))
    }

    /// Immutable snapshot of every cached skill, sorted by name
    pub async fn snapshot(&self) -> Vec<Arc<Skill>> {
        let cache = self.cache.read().await;
        let mut skills: Vec<Arc<Skill>> = cache.values().map(|e| Arc::clone(&e.skill)).collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    /// Look up a cached skill by name
    pub async fn get(&self, name: &str) -> Option<Arc<Skill>> {
        let cache = self.cache.read().await;
        cache
            .values()
            .find(|e| e.skill.name == name)
            .map(|e| Arc::clone(&e.skill))
    }

    /// Number of cached skills
    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Collect every directory under `root` that carries a manifest.
///
/// Unreadable subdirectories are silently skipped; discovery is never
/// fatal.
fn find_skill_dirs(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        if dir != root && dir.join(MANIFEST_FILE).is_file() {
            found.push(dir.clone());
        }

        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            }
        }
    }

    found
}

/// Latest modification time across a skill directory and its files
fn latest_mtime(dir: &Path) -> std::io::Result<SystemTime> {
    let mut latest = std::fs::metadata(dir)?.modified()?;
    let mut stack = vec![dir.to_path_buf()];

    while let Some(d) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&d) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                if modified > latest {
                    latest = modified;
                }
            }
        }
    }

    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{schema_for, HandlerContext, SkillHandler};
    use filetime::FileTime;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct PingArgs {
        #[allow(dead_code)]
        target: String,
    }

    struct PingHandler {
        schema_calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl SkillHandler for PingHandler {
        async fn invoke(&self, _args: &str, _ctx: &HandlerContext) -> Result<String> {
            Ok("pong".to_string())
        }

        fn args_schema(&self) -> serde_json::Value {
            self.schema_calls.fetch_add(1, Ordering::SeqCst);
            schema_for::<PingArgs>()
        }
    }

    struct BadSchemaHandler;

    #[async_trait::async_trait]
    impl SkillHandler for BadSchemaHandler {
        async fn invoke(&self, _args: &str, _ctx: &HandlerContext) -> Result<String> {
            Ok(String::new())
        }

        fn args_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "string"})
        }
    }

    fn write_skill(root: &Path, dir: &str, frontmatter: &str) -> PathBuf {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(MANIFEST_FILE), frontmatter).unwrap();
        path
    }

    fn touch_later(path: &Path) {
        let meta = std::fs::metadata(path).unwrap();
        let mtime = FileTime::from_last_modification_time(&meta);
        let bumped = FileTime::from_unix_time(mtime.unix_seconds() + 5, 0);
        filetime::set_file_mtime(path, bumped).unwrap();
    }

    fn ping_registry() -> (SkillRegistry, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handlers = HandlerSet::new();
        handlers.register(
            "ping",
            Arc::new(PingHandler {
                schema_calls: Arc::clone(&calls),
            }),
        );
        (SkillRegistry::new(handlers), calls)
    }

    #[tokio::test]
    async fn test_scan_classifies_execution_modes() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "ping", "---\nname: ping\ndescription: ping things\n---\n");
        write_skill(
            tmp.path(),
            "travel",
            "---\nname: travel\ndescription: plan a trip\n---\n",
        );
        write_skill(
            tmp.path(),
            "flights",
            "---\nname: flights\nrun_by_script: true\n---\n",
        );

        let (registry, _) = ping_registry();
        let skills = registry.scan(tmp.path(), false).await.unwrap();

        assert_eq!(skills.len(), 3);
        let by_name: HashMap<&str, ExecutionMode> =
            skills.iter().map(|s| (s.name.as_str(), s.mode)).collect();
        assert_eq!(by_name["ping"], ExecutionMode::Scripted);
        assert_eq!(by_name["travel"], ExecutionMode::DirectRun);
        assert_eq!(by_name["flights"], ExecutionMode::Unimplemented);
    }

    #[tokio::test]
    async fn test_directory_without_manifest_is_not_a_skill() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("notes")).unwrap();
        std::fs::write(tmp.path().join("notes").join("README.md"), "hello").unwrap();

        let (registry, _) = ping_registry();
        let skills = registry.scan(tmp.path(), false).await.unwrap();
        assert!(skills.is_empty());
    }

    #[tokio::test]
    async fn test_manifest_without_name_is_skipped() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "anon", "---\ndescription: nameless\n---\n");
        write_skill(tmp.path(), "ok", "---\nname: ok\n---\n");

        let (registry, _) = ping_registry();
        let (skills, report) = registry.scan_with_report(tmp.path(), false).await.unwrap();

        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "ok");
        assert_eq!(report.skipped, vec!["anon".to_string()]);
    }

    #[tokio::test]
    async fn test_bad_handler_schema_excludes_only_that_skill() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "broken", "---\nname: broken\n---\n");
        write_skill(tmp.path(), "fine", "---\nname: fine\n---\n");

        let mut handlers = HandlerSet::new();
        handlers.register("broken", Arc::new(BadSchemaHandler));
        let registry = SkillRegistry::new(handlers);

        let skills = registry.scan(tmp.path(), false).await.unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "fine");
    }

    #[tokio::test]
    async fn test_unchanged_rescan_hits_cache() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "ping", "---\nname: ping\n---\n");

        let (registry, calls) = ping_registry();
        registry.scan(tmp.path(), false).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let (skills, report) = registry.scan_with_report(tmp.path(), false).await.unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.cached, vec!["ping".to_string()]);
        assert!(report.loaded.is_empty());
    }

    #[tokio::test]
    async fn test_touched_manifest_forces_reload() {
        let tmp = TempDir::new().unwrap();
        let dir = write_skill(tmp.path(), "ping", "---\nname: ping\n---\n");

        let (registry, calls) = ping_registry();
        registry.scan(tmp.path(), false).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        touch_later(&dir.join(MANIFEST_FILE));

        let (_, report) = registry.scan_with_report(tmp.path(), false).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.loaded, vec!["ping".to_string()]);
    }

    #[tokio::test]
    async fn test_force_reload_bypasses_cache() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "ping", "---\nname: ping\n---\n");

        let (registry, calls) = ping_registry();
        registry.scan(tmp.path(), false).await.unwrap();
        registry.scan(tmp.path(), true).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deleted_directory_is_evicted() {
        let tmp = TempDir::new().unwrap();
        let dir = write_skill(tmp.path(), "ping", "---\nname: ping\n---\n");
        write_skill(tmp.path(), "other", "---\nname: other\n---\n");

        let (registry, _) = ping_registry();
        registry.scan(tmp.path(), false).await.unwrap();
        assert_eq!(registry.cached_count().await, 2);

        std::fs::remove_dir_all(&dir).unwrap();

        let (skills, report) = registry.scan_with_report(tmp.path(), false).await.unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "other");
        assert_eq!(report.evicted, vec!["ping".to_string()]);
        assert_eq!(registry.cached_count().await, 1);
        assert!(registry.get("ping").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_names_keep_first() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "a_dir", "---\nname: twin\n---\n");
        write_skill(tmp.path(), "b_dir", "---\nname: twin\n---\n");

        let (registry, _) = ping_registry();
        let skills = registry.scan(tmp.path(), false).await.unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "twin");
    }

    #[tokio::test]
    async fn test_missing_root_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let (registry, _) = ping_registry();
        let skills = registry
            .scan(&tmp.path().join("nope"), false)
            .await
            .unwrap();
        assert!(skills.is_empty());
    }

    #[tokio::test]
    async fn test_nested_skill_directories_are_found() {
        let tmp = TempDir::new().unwrap();
        write_skill(
            &tmp.path().join("group"),
            "inner",
            "---\nname: inner\n---\n",
        );

        let (registry, _) = ping_registry();
        let skills = registry.scan(tmp.path(), false).await.unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "inner");
    }
}
