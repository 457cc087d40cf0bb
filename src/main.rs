//! Command-line entry point for the sound-change service.
//!
//! # Startup sequence
//!
//! 1. Parse arguments.
//! 2. Initialise logging (`RUST_LOG`, default `info`).
//! 3. Load [`AppConfig`] (`--config` or the platform `settings.toml`).
//! 4. Open the JSON rule store.
//! 5. Create the [`tokio`] runtime and run the sub-command.  Ctrl-C cancels
//!    a running `apply` and kills the engine process.
//!
//! JSON input files may be given as `-` to read from stdin; results are
//! printed to stdout as pretty JSON.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use conlang_sc::{
    config::AppConfig,
    pipeline::{ApplicationRequest, SoundChangeOrchestrator},
    rules::{JsonRuleStore, LanguageDraft, RuleSetDraft, RuleStore},
    ScError,
};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "conlang-sc", version, about = "Store and apply sound-change rule-sets")]
struct Cli {
    /// Settings file (defaults to the platform config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply rule-sets to word lists: `[{"word_list": [...], "sound_changes_id": n}]`.
    Apply {
        requests: PathBuf,
        /// Check that this user owns every referenced rule-set first.
        #[arg(long)]
        user: Option<String>,
    },
    /// Insert or replace rule-sets: `[{"id"?, "name"?, "content", "role"?, "language_id"}]`.
    Upsert {
        rulesets: PathBuf,
        #[arg(long)]
        user: Option<String>,
    },
    /// List the rule-sets of one language.
    List {
        language_id: u64,
        #[arg(long)]
        role: Option<String>,
    },
    /// List the rule-sets of every language a user owns.
    ListUser {
        user_id: String,
        #[arg(long)]
        role: Option<String>,
    },
    /// Show one rule-set.
    Get { id: u64 },
    /// Create a language.
    AddLanguage {
        name: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a language and all of its rule-sets.
    DeleteLanguage { id: u64 },
    /// Write the effective settings (defaults filled in) to the settings file.
    InitConfig,
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            match e.downcast_ref::<ScError>() {
                Some(sc) if sc.is_client_error() => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // 2. Configuration
    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        }),
    };

    if let Command::InitConfig = cli.command {
        match cli.config.as_deref() {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        log::info!("settings written");
        return Ok(());
    }

    // 3. Rule store
    let store_path = config.store.resolved_path();
    let store = Arc::new(JsonRuleStore::open(&store_path).map_err(ScError::from)?);
    log::debug!("using rule store {}", store_path.display());

    match cli.command {
        Command::Apply { requests, user } => {
            let requests: Vec<ApplicationRequest> = read_json(&requests)?;
            let orchestrator = SoundChangeOrchestrator::from_config(store, &config);

            // 4. Tokio runtime
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to create tokio runtime")?;

            let result = rt.block_on(async {
                let cancel = CancellationToken::new();
                let on_interrupt = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        log::warn!("interrupted, cancelling sound-change run");
                        on_interrupt.cancel();
                    }
                });

                match user.as_deref() {
                    Some(user) => {
                        orchestrator
                            .apply_for_user(user, &requests, &cancel)
                            .await
                    }
                    None => orchestrator.apply_with_cancel(&requests, &cancel).await,
                }
            })?;
            print_json(&result)
        }
        Command::Upsert { rulesets, user } => {
            let drafts: Vec<RuleSetDraft> = read_json(&rulesets)?;
            if let Some(user) = user.as_deref() {
                let ids: Vec<u64> = drafts.iter().filter_map(|d| d.id).collect();
                store.verify_ownership(user, &ids).map_err(ScError::from)?;
            }
            let saved = store.upsert_many(drafts).map_err(ScError::from)?;
            print_json(&saved)
        }
        Command::List { language_id, role } => {
            let rule_sets = store
                .list(language_id, role.as_deref())
                .map_err(ScError::from)?;
            print_json(&rule_sets)
        }
        Command::ListUser { user_id, role } => {
            let rule_sets = store
                .list_for_user(&user_id, role.as_deref())
                .map_err(ScError::from)?;
            print_json(&rule_sets)
        }
        Command::Get { id } => print_json(&store.get(id).map_err(ScError::from)?),
        Command::AddLanguage {
            name,
            user,
            description,
        } => {
            let draft = LanguageDraft {
                description,
                ..LanguageDraft::new(name, user)
            };
            print_json(&store.upsert_language(draft).map_err(ScError::from)?)
        }
        Command::DeleteLanguage { id } => {
            store.delete_language(id).map_err(ScError::from)?;
            log::info!("deleted language {id}");
            Ok(())
        }
        Command::InitConfig => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// JSON I/O helpers
// ---------------------------------------------------------------------------

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_apply_with_user() {
        let cli = Cli::parse_from(["conlang-sc", "apply", "req.json", "--user", "alice"]);
        match cli.command {
            Command::Apply { requests, user } => {
                assert_eq!(requests, PathBuf::from("req.json"));
                assert_eq!(user.as_deref(), Some("alice"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_list_with_role_and_global_config() {
        let cli = Cli::parse_from([
            "conlang-sc",
            "list",
            "3",
            "--role",
            "spelling",
            "--config",
            "/etc/conlang-sc.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/conlang-sc.toml")));
        match cli.command {
            Command::List { language_id, role } => {
                assert_eq!(language_id, 3);
                assert_eq!(role.as_deref(), Some("spelling"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_init_config() {
        let cli = Cli::parse_from(["conlang-sc", "init-config", "--config", "/tmp/sc.toml"]);
        assert!(matches!(cli.command, Command::InitConfig));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/sc.toml")));
    }

    #[test]
    fn read_json_parses_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        std::fs::write(&path, r#"[{"word_list": ["test"], "sound_changes_id": 1}]"#).unwrap();

        let requests: Vec<ApplicationRequest> = read_json(&path).unwrap();
        assert_eq!(requests, [ApplicationRequest::new(1, ["test"])]);
    }
}
