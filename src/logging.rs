//! Logging setup
//!
//! Logs go to stderr so that command output on stdout stays clean, or to a
//! file in diagnostic mode.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::Cli;

/// Build EnvFilter with RUST_LOG priority
///
/// If RUST_LOG environment variable is set and non-empty, use it exclusively.
/// Otherwise, use the CLI log level (-v, -vv, -q).
pub fn build_env_filter(cli: &Cli) -> EnvFilter {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        if !rust_log.is_empty() {
            return EnvFilter::new(rust_log);
        }
    }

    EnvFilter::from_default_env().add_directive(cli.log_level().into())
}

/// Initialize logging with file output (diagnostic mode)
fn init_logging_to_file(cli: &Cli) -> anyhow::Result<()> {
    let filter = build_env_filter(cli);
    let log_path = cli.log_path();

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(&log_path)?;

    // The user needs to know where the log went
    eprintln!("Diagnostic mode: logging to {}", log_path.display());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

/// Initialize logging with stderr output (normal mode)
fn init_logging_to_stderr(cli: &Cli) -> anyhow::Result<()> {
    let filter = build_env_filter(cli);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

/// Initialize logging based on CLI arguments
pub fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    if cli.is_diagnostic() {
        init_logging_to_file(cli)
    } else {
        init_logging_to_stderr(cli)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_rust_log_takes_priority() {
        let cli = Cli {
            quiet: true,
            ..Default::default()
        };

        // SAFETY: serialized with the other tests touching RUST_LOG
        unsafe { std::env::set_var("RUST_LOG", "config_settings=trace") };
        let filter = build_env_filter(&cli);
        unsafe { std::env::remove_var("RUST_LOG") };

        assert_eq!(filter.to_string(), "config_settings=trace");
    }

    #[test]
    #[serial]
    fn test_cli_level_without_rust_log() {
        unsafe { std::env::remove_var("RUST_LOG") };
        let cli = Cli {
            verbose: 2,
            ..Default::default()
        };
        assert_eq!(build_env_filter(&cli).to_string(), "debug");
    }
}
