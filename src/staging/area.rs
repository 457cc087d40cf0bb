//! [`StagingArea`] — one engine run's private working directory.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;

use crate::config::StagingConfig;

// ---------------------------------------------------------------------------
// StagingError
// ---------------------------------------------------------------------------

/// Errors raised while preparing engine inputs or reading its output.
#[derive(Debug, Error)]
pub enum StagingError {
    /// A staging path could not be created, written or read.
    #[error("staging I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine did not leave an output file behind.
    #[error("engine output {0} does not exist")]
    OutputMissing(PathBuf),
}

impl StagingError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| StagingError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Output naming convention
// ---------------------------------------------------------------------------

/// Name of the file the engine writes for a given input file name:
/// `<stem><suffix>.<ext>`, e.g. `input.wli` → `input_ev.wli`.
///
/// ```
/// use conlang_sc::staging::derived_output_name;
///
/// assert_eq!(derived_output_name("input.wli", "_ev"), "input_ev.wli");
/// assert_eq!(derived_output_name("words", "_ev"), "words_ev");
/// ```
pub fn derived_output_name(input_file: &str, suffix: &str) -> String {
    let path = Path::new(input_file);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    }
}

// ---------------------------------------------------------------------------
// StagingArea
// ---------------------------------------------------------------------------

/// A uniquely named directory holding one engine run's inputs and output.
///
/// Dropping the area deletes the directory and everything in it.
///
/// ```rust,no_run
/// use conlang_sc::config::StagingConfig;
/// use conlang_sc::staging::StagingArea;
///
/// # async fn example() -> Result<(), conlang_sc::staging::StagingError> {
/// let area = StagingArea::create(&StagingConfig::default())?;
/// area.stage_rules("e => a").await?;
/// area.stage_input(&["test".to_string()]).await?;
/// // ... run the engine with area.path() as its working directory ...
/// let words = area.collect_output().await?;
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    input_file: String,
    rules_file: String,
    output_file: String,
}

impl StagingArea {
    /// Create a fresh directory under `config.root` (or the system temp dir).
    pub fn create(config: &StagingConfig) -> Result<Self, StagingError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sc-");

        let dir = match config.root.as_deref() {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(StagingError::io(root))?;
                builder.tempdir_in(root).map_err(StagingError::io(root))?
            }
            None => builder
                .tempdir()
                .map_err(StagingError::io(&std::env::temp_dir()))?,
        };

        log::debug!("staging: created {}", dir.path().display());

        Ok(Self {
            dir,
            input_file: config.input_file.clone(),
            rules_file: config.rules_file.clone(),
            output_file: derived_output_name(&config.input_file, &config.output_suffix),
        })
    }

    /// The staging directory; the engine's working directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_path(&self) -> PathBuf {
        self.dir.path().join(&self.input_file)
    }

    pub fn rules_path(&self) -> PathBuf {
        self.dir.path().join(&self.rules_file)
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.path().join(&self.output_file)
    }

    /// File names relative to [`path`](Self::path), as passed on the
    /// engine's command line.
    pub fn rules_file(&self) -> &str {
        &self.rules_file
    }

    pub fn input_file(&self) -> &str {
        &self.input_file
    }

    /// Write the word list one word per line (joined with `\n`, no trailing
    /// newline; an empty list yields an empty file).
    pub async fn stage_input(&self, words: &[String]) -> Result<PathBuf, StagingError> {
        let path = self.input_path();
        tokio::fs::write(&path, words.join("\n"))
            .await
            .map_err(StagingError::io(&path))?;
        Ok(path)
    }

    /// Write the rule text verbatim.
    pub async fn stage_rules(&self, content: &str) -> Result<PathBuf, StagingError> {
        let path = self.rules_path();
        tokio::fs::write(&path, content)
            .await
            .map_err(StagingError::io(&path))?;
        Ok(path)
    }

    /// Read the engine's output file and split it into lines (`\n` or
    /// `\r\n`).
    pub async fn collect_output(&self) -> Result<Vec<String>, StagingError> {
        let path = self.output_path();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StagingError::OutputMissing(path));
            }
            Err(e) => return Err(StagingError::io(&path)(e)),
        };
        Ok(raw.lines().map(str::to_owned).collect())
    }

    /// Remove the directory now, reporting failures instead of ignoring them
    /// as `Drop` does.
    pub fn close(self) -> Result<(), StagingError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(StagingError::io(&path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
