//! Command runner
//!
//! Entry point for running the `config-settings` commands.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::change::ChangeConfig;
use crate::cli::{Cli, Command, SettingsArgs};
use crate::logging::init_logging;
use crate::paths;
use crate::settings::{SettingsCache, SettingsChangeEvent, SettingsLocation, SettingsStore, SettingsWatcher};
use crate::tracing::ResultTraceExt;
use crate::types::{DEFAULT_SETTINGS_FILE_NAME, SettingsError, WatchOptions};
use crate::xml::write_document;

/// Run the command selected on the command line
///
/// This is the main entry point; `watch` runs until the future is dropped.
pub async fn run_with_cli(cli: &Cli) -> anyhow::Result<()> {
    init_logging(cli)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        command = ?cli.command,
        "Starting config-settings"
    );

    match &cli.command {
        Command::Watch {
            config,
            settings,
            debounce_ms,
        } => watch(config, settings, Duration::from_millis(*debounce_ms)).await,
        command => execute_command(command, &mut std::io::stdout().lock()),
    }
}

/// Run a one-shot command, writing its results to `out`
///
/// Empty results print nothing. `watch` applies once.
pub fn execute_command(command: &Command, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Apply { config, settings } | Command::Watch { config, settings, .. } => {
            let live_path = ChangeConfig::new(settings.change_options())
                .execute(config)
                .trace_context()?;
            writeln!(out, "{}", live_path.display())?;
        }
        Command::Preview { config, settings } => {
            let document = ChangeConfig::new(settings.change_options())
                .execute_without_change(config)
                .trace_context()?;
            print_line(out, &write_document(&document))?;
        }
        Command::Get { path, name } => {
            let store = load(path)?;
            print_line(out, store.variable_value(name).unwrap_or_default())?;
        }
        Command::Has { path, name } => {
            writeln!(out, "{}", load(path)?.has_variable(name))?;
        }
        Command::HasBlock { path, name } => {
            writeln!(out, "{}", load(path)?.has_block(name))?;
        }
        Command::Imports { path } => {
            for import in load(path)?.all_imports() {
                writeln!(out, "{}", import.display())?;
            }
        }
        Command::DefaultFilename => {
            writeln!(out, "{DEFAULT_SETTINGS_FILE_NAME}")?;
        }
    }
    Ok(())
}

/// Exit code for a failed command: the settings error code, 1 for anything else
pub fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<SettingsError>()
        .map_or(1, |e| e.error_code().code())
}

fn load(path: &Path) -> anyhow::Result<SettingsStore> {
    Ok(SettingsStore::load(&SettingsLocation::File(paths::absolute(path))).trace_context()?)
}

fn print_line(out: &mut impl Write, text: &str) -> std::io::Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    writeln!(out, "{text}")
}

/// Apply once, then again after every settings change
async fn watch(config: &Path, settings: &SettingsArgs, debounce: Duration) -> anyhow::Result<()> {
    let change = ChangeConfig::new(settings.change_options()).with_settings_cache(Arc::new(SettingsCache::new()));
    let config = paths::absolute(config);

    let live_path = apply_blocking(&change, &config).await?;
    println!("{}", live_path.display());

    let location = change.settings_location();
    let (mut watcher, mut events) = SettingsWatcher::channel(&location, WatchOptions::default().with_debounce(debounce))?;
    if !watcher.is_running() {
        tracing::warn!("No settings file found, nothing to watch");
        return Ok(());
    }
    tracing::info!(files = ?watcher.watched_paths(), "Watching settings");

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping settings watcher");
                None
            }
        };
        let Some(event) = event else {
            break;
        };

        match event {
            SettingsChangeEvent::Reloaded { changed_paths } => {
                tracing::info!(?changed_paths, "Settings changed, applying again");
                match apply_blocking(&change, &config).await {
                    Ok(live_path) => println!("{}", live_path.display()),
                    Err(e) => tracing::warn!("Live file not updated: {e:#}"),
                }
            }
            SettingsChangeEvent::Failed {
                changed_paths,
                message,
            } => {
                tracing::warn!(?changed_paths, "Settings reload failed, live file left as is: {message}");
            }
        }
    }

    watcher.stop();
    Ok(())
}

async fn apply_blocking(change: &ChangeConfig, config: &Path) -> anyhow::Result<PathBuf> {
    let change = change.clone();
    let config = config.to_path_buf();
    Ok(tokio::task::spawn_blocking(move || change.execute(&config).trace_context()).await??)
}
