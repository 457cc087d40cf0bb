//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every section is `#[serde(default)]`, so a hand-written `settings.toml`
//! only needs the keys it wants to override.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Settings for the external sound-change engine process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path (or `$PATH` name) of the engine executable.
    pub binary: PathBuf,
    /// Substring of a stdout line that signals the output file is complete.
    pub completion_marker: String,
    /// Seconds to wait for the completion marker before killing the engine.
    pub timeout_secs: u64,
    /// Number of trailing stderr lines kept for error reports.
    pub stderr_tail_lines: usize,
}

impl EngineConfig {
    /// The completion deadline as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("lexurgy"),
            completion_marker: "Wrote the final forms".into(),
            timeout_secs: 30,
            stderr_tail_lines: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// StagingConfig
// ---------------------------------------------------------------------------

/// Where and how engine inputs are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Parent directory for per-run staging directories.  `None` uses the
    /// system temp dir.
    pub root: Option<PathBuf>,
    /// File name of the staged word list.
    pub input_file: String,
    /// File name of the staged rule text.
    pub rules_file: String,
    /// Suffix the engine appends to the input stem when naming its output.
    pub output_suffix: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            root: None,
            input_file: "input.wli".into(),
            rules_file: "sc.lsc".into(),
            output_suffix: "_ev".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

/// Rule store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON store file.  `None` uses [`AppPaths::store_file`].
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// The configured path, or the platform default.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppPaths::new().store_file)
    }
}

// ---------------------------------------------------------------------------
// OrchestratorConfig
// ---------------------------------------------------------------------------

/// Settings for the apply workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Extra attempts after an engine or I/O failure (0 disables retries).
    pub retries: u32,
    /// Fail when the engine returns a different number of lines than it was
    /// given.
    pub verify_line_count: bool,
    /// Upper bound on engine processes running at the same time.
    pub max_concurrent_runs: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retries: 1,
            verify_line_count: true,
            max_concurrent_runs: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use conlang_sc::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// External engine settings.
    pub engine: EngineConfig,
    /// Staging directory settings.
    pub staging: StagingConfig,
    /// Rule store settings.
    pub store: StoreConfig,
    /// Apply workflow settings.
    pub orchestrator: OrchestratorConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("config: {} missing, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.engine.binary, loaded.engine.binary);
        assert_eq!(
            original.engine.completion_marker,
            loaded.engine.completion_marker
        );
        assert_eq!(original.engine.timeout_secs, loaded.engine.timeout_secs);
        assert_eq!(original.staging.root, loaded.staging.root);
        assert_eq!(original.staging.input_file, loaded.staging.input_file);
        assert_eq!(original.staging.rules_file, loaded.staging.rules_file);
        assert_eq!(original.store.path, loaded.store.path);
        assert_eq!(original.orchestrator.retries, loaded.orchestrator.retries);
        assert_eq!(
            original.orchestrator.verify_line_count,
            loaded.orchestrator.verify_line_count
        );
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");

        assert_eq!(config.engine.binary, PathBuf::from("lexurgy"));
        assert_eq!(config.orchestrator.retries, 1);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.engine.completion_marker, "Wrote the final forms");
        assert_eq!(cfg.engine.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.engine.stderr_tail_lines, 20);
        assert_eq!(cfg.staging.input_file, "input.wli");
        assert_eq!(cfg.staging.rules_file, "sc.lsc");
        assert_eq!(cfg.staging.output_suffix, "_ev");
        assert!(cfg.staging.root.is_none());
        assert!(cfg.store.path.is_none());
        assert!(cfg.orchestrator.verify_line_count);
        assert_eq!(cfg.orchestrator.max_concurrent_runs, 4);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[engine]\nbinary = \"/opt/lexurgy/bin/lexurgy\"\ntimeout_secs = 5\n",
        )
        .expect("write");

        let cfg = AppConfig::load_from(&path).expect("load");

        assert_eq!(cfg.engine.binary, PathBuf::from("/opt/lexurgy/bin/lexurgy"));
        assert_eq!(cfg.engine.timeout_secs, 5);
        assert_eq!(cfg.engine.completion_marker, "Wrote the final forms");
        assert_eq!(cfg.staging.input_file, "input.wli");
        assert_eq!(cfg.orchestrator.retries, 1);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.engine.binary = PathBuf::from("/usr/local/bin/lexurgy");
        cfg.engine.timeout_secs = 90;
        cfg.staging.root = Some(PathBuf::from("/var/tmp/sc"));
        cfg.store.path = Some(PathBuf::from("/srv/conlang/rules.json"));
        cfg.orchestrator.retries = 0;
        cfg.orchestrator.verify_line_count = false;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.engine.binary, PathBuf::from("/usr/local/bin/lexurgy"));
        assert_eq!(loaded.engine.timeout_secs, 90);
        assert_eq!(loaded.staging.root, Some(PathBuf::from("/var/tmp/sc")));
        assert_eq!(
            loaded.store.resolved_path(),
            PathBuf::from("/srv/conlang/rules.json")
        );
        assert_eq!(loaded.orchestrator.retries, 0);
        assert!(!loaded.orchestrator.verify_line_count);
    }
}
