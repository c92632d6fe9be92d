//! Command-line interface definitions
//!
//! Provides CLI argument parsing using clap for the `config-settings` tool.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::ChangeOptions;

/// Patch XML configuration templates with settings files
#[derive(Parser, Debug, Clone)]
#[command(name = "config-settings")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable diagnostic mode (auto-log to temp file)
    #[arg(short, long, global = true)]
    pub diagnostic: bool,

    /// Log directory (implies diagnostic mode)
    #[arg(short = 'l', long, value_name = "DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Log file name (implies diagnostic mode)
    #[arg(short = 'f', long, value_name = "FILE", global = true)]
    pub log_file: Option<String>,

    /// Increase logging verbosity (-v, -vv)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only errors)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write the live file of a configuration template and print its path
    Apply {
        /// Configuration template
        config: PathBuf,
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Print the patched template without writing anything
    Preview {
        config: PathBuf,
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Apply, then apply again whenever the settings change (until Ctrl-C)
    Watch {
        config: PathBuf,
        #[command(flatten)]
        settings: SettingsArgs,
        /// Quiet period after a settings change before re-applying
        #[arg(long, value_name = "MS", default_value_t = 5000)]
        debounce_ms: u64,
    },

    /// Print the value of a variable
    Get {
        /// Settings file
        #[arg(long)]
        path: PathBuf,
        /// Variable name
        #[arg(long)]
        name: String,
    },

    /// Print whether a variable is declared
    Has {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        name: String,
    },

    /// Print whether a block is declared
    HasBlock {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        name: String,
    },

    /// Print every file imported by a settings file
    Imports {
        #[arg(long)]
        path: PathBuf,
    },

    /// Print the settings file name searched for by default
    DefaultFilename,
}

/// Where to find settings and where relocated live files go
///
/// Unset options fall back to the `CONFIG_SETTINGS_*` environment variables.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsArgs {
    /// Settings file path, or a name searched upwards from --settings-dir
    #[arg(long, value_name = "NAME")]
    pub settings: Option<PathBuf>,

    /// Directory the settings search starts from (default: current directory)
    #[arg(long, value_name = "DIR")]
    pub settings_dir: Option<PathBuf>,

    /// Base directory for live files that cannot be written beside the template
    #[arg(long, value_name = "DIR")]
    pub app_data: Option<PathBuf>,
}

impl SettingsArgs {
    /// Orchestrator options: flags, then environment, then the user data directory for app data
    pub fn change_options(&self) -> ChangeOptions {
        let explicit = ChangeOptions {
            settings_path: self.settings.clone(),
            settings_dir: self.settings_dir.clone(),
            app_data_dir: self.app_data.clone(),
        };
        let mut options = explicit.or(ChangeOptions::from_env());
        if options.app_data_dir.is_none() {
            options.app_data_dir = dirs::data_dir().map(|dir| dir.join("config-settings"));
        }
        options
    }
}

#[allow(clippy::derivable_impls)]
impl Default for Cli {
    fn default() -> Self {
        Self {
            command: Command::DefaultFilename,
            diagnostic: false,
            log_dir: None,
            log_file: None,
            verbose: 0,
            quiet: false,
        }
    }
}

impl Cli {
    /// Check if diagnostic mode is enabled (output to file)
    ///
    /// Returns true if `--diagnostic` is set, or if `--log-dir` or `--log-file` is specified.
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic || self.log_dir.is_some() || self.log_file.is_some()
    }

    /// Get the log level based on CLI arguments
    ///
    /// - `--quiet`: ERROR
    /// - default: WARN
    /// - `-v`: INFO
    /// - `-vv`: DEBUG
    /// - `-vvv` or more: TRACE
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else {
            match self.verbose {
                0 => tracing::Level::WARN,
                1 => tracing::Level::INFO,
                2 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            }
        }
    }

    /// Get the log file path for diagnostic mode
    ///
    /// Uses the specified log directory and file name, or defaults to:
    /// - Directory: system temp directory
    /// - File: `config-settings-{timestamp}.log`
    pub fn log_path(&self) -> PathBuf {
        let dir = self
            .log_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        let filename = self.log_file.clone().unwrap_or_else(|| {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            format!("config-settings-{timestamp}.log")
        });

        dir.join(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    #[test]
    fn test_default_cli() {
        let cli = Cli::default();
        assert!(!cli.is_diagnostic());
        assert_eq!(cli.log_level(), tracing::Level::WARN);
    }

    #[test]
    fn test_log_file_implies_diagnostic() {
        let cli = Cli {
            log_file: Some("test.log".to_string()),
            ..Default::default()
        };
        assert!(cli.is_diagnostic());
    }

    #[test]
    fn test_log_levels() {
        let cli = Cli {
            quiet: true,
            verbose: 2,
            ..Default::default()
        };
        assert_eq!(cli.log_level(), tracing::Level::ERROR);

        let cli = Cli {
            verbose: 1,
            ..Default::default()
        };
        assert_eq!(cli.log_level(), tracing::Level::INFO);

        let cli = Cli {
            verbose: 3,
            ..Default::default()
        };
        assert_eq!(cli.log_level(), tracing::Level::TRACE);
    }

    #[test]
    fn test_log_path_default_generates_timestamp() {
        let path = Cli::default().log_path();
        assert!(path.starts_with(std::env::temp_dir()));

        let filename = path.file_name().unwrap().to_str().unwrap();
        assert!(filename.starts_with("config-settings-"));
        assert!(std::path::Path::new(filename)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("log")));
    }

    #[test]
    #[serial]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "config-settings",
            "-vv",
            "apply",
            "web.config",
            "--settings",
            "custom.xml",
            "--settings-dir",
            "/srv",
            "--app-data",
            "/data",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.command,
            Command::Apply {
                config: PathBuf::from("web.config"),
                settings: SettingsArgs {
                    settings: Some(PathBuf::from("custom.xml")),
                    settings_dir: Some(PathBuf::from("/srv")),
                    app_data: Some(PathBuf::from("/data")),
                },
            }
        );
    }

    #[test]
    fn test_parse_query_commands() {
        let cli = Cli::try_parse_from(["config-settings", "has-block", "--path", "s.xml", "--name", "B"]).unwrap();
        assert_eq!(
            cli.command,
            Command::HasBlock {
                path: PathBuf::from("s.xml"),
                name: "B".to_string(),
            }
        );

        let cli = Cli::try_parse_from(["config-settings", "default-filename", "-q"]).unwrap();
        assert_eq!(cli.command, Command::DefaultFilename);
        assert!(cli.quiet);

        assert!(Cli::try_parse_from(["config-settings", "get", "--path", "s.xml"]).is_err());
    }

    #[test]
    fn test_watch_debounce_default() {
        let cli = Cli::try_parse_from(["config-settings", "watch", "web.config"]).unwrap();
        assert!(matches!(cli.command, Command::Watch { debounce_ms: 5000, .. }));
    }

    #[test]
    #[serial]
    fn test_change_options_from_args() {
        let args = SettingsArgs {
            settings: Some(PathBuf::from("custom.xml")),
            settings_dir: None,
            app_data: Some(PathBuf::from("/data")),
        };
        let options = args.change_options();
        assert_eq!(options.settings_path, Some(PathBuf::from("custom.xml")));
        assert_eq!(options.app_data_dir, Some(PathBuf::from("/data")));
    }

    #[test]
    #[serial]
    fn test_change_options_fall_back_to_env() {
        // SAFETY: serialized with the other tests touching CONFIG_SETTINGS_*
        unsafe {
            std::env::set_var("CONFIG_SETTINGS_PATH", "from-env.xml");
            std::env::set_var("CONFIG_SETTINGS_DIR", "/env/dir");
        }
        let args = SettingsArgs {
            settings: Some(PathBuf::from("flag.xml")),
            ..Default::default()
        };
        let options = args.change_options();
        unsafe {
            std::env::remove_var("CONFIG_SETTINGS_PATH");
            std::env::remove_var("CONFIG_SETTINGS_DIR");
        }

        assert_eq!(options.settings_path, Some(PathBuf::from("flag.xml")));
        assert_eq!(options.settings_dir, Some(PathBuf::from("/env/dir")));
    }
}
