//! config-settings binary
//!
//! Run with: cargo run -- apply web.config
//!
//! For help: cargo run -- --help

use clap::Parser;
use config_settings::{cli::Cli, runner::exit_code, run_with_cli};
use std::io::IsTerminal;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Stop watching on SIGTERM/SIGINT
    let result = tokio::select! {
        result = run_with_cli(&cli) => result,
        _ = signal::ctrl_c() => {
            eprintln!("Received SIGINT, shutting down...");
            Ok(())
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => sigterm.recv().await,
                    Err(_) => std::future::pending::<Option<()>>().await,
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await
            }
        } => {
            eprintln!("Received SIGTERM, shutting down...");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");

        if std::io::stdin().is_terminal() {
            eprintln!("\nFor debugging, run with --diagnostic to log to a file.");
            eprintln!("Or use -v/-vv/-vvv for more verbose logging.");
        }

        std::process::exit(exit_code(&e));
    }

    Ok(())
}
