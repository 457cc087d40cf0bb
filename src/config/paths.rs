//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\conlang-sc\
//!   macOS:   ~/Library/Application Support/conlang-sc/
//!   Linux:   ~/.config/conlang-sc/
//!
//! Data dir (rule store):
//!   Windows: %LOCALAPPDATA%\conlang-sc\
//!   macOS:   ~/Library/Application Support/conlang-sc/
//!   Linux:   ~/.local/share/conlang-sc/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for persisted data.
    pub data_dir: PathBuf,
    /// Full path to the JSON rule store, `rules.json`.
    pub store_file: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "conlang-sc";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let store_file = data_dir.join("rules.json");

        Self {
            config_dir,
            settings_file,
            data_dir,
            store_file,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
