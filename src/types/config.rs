//! Orchestrator and watcher configuration

use std::path::PathBuf;
use std::time::Duration;

/// Default settings file name searched for next to (or above) the target config
pub const DEFAULT_SETTINGS_FILE_NAME: &str = "_ConfigSettings.xml";

/// Options steering [`ChangeConfig`](crate::change::ChangeConfig)
///
/// Every field is optional; an empty value means "use the default".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeOptions {
    /// Settings file path or name
    /// Environment variable: `CONFIG_SETTINGS_PATH`
    ///
    /// A rooted path is used as-is, anything else is searched for by suffix
    /// starting at `settings_dir` and walking up its parents.
    pub settings_path: Option<PathBuf>,

    /// Directory the settings search starts from (current directory when unset)
    /// Environment variable: `CONFIG_SETTINGS_DIR`
    pub settings_dir: Option<PathBuf>,

    /// Base directory for live files that cannot be written next to the target
    /// Environment variable: `CONFIG_SETTINGS_APPDATA`
    pub app_data_dir: Option<PathBuf>,
}

impl ChangeOptions {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Reads the following environment variables:
    /// - `CONFIG_SETTINGS_PATH`: settings file path or name
    /// - `CONFIG_SETTINGS_DIR`: directory to start the settings search from
    /// - `CONFIG_SETTINGS_APPDATA`: base directory for relocated live files
    ///
    /// Empty values are treated as unset.
    pub fn from_env() -> Self {
        Self {
            settings_path: env_path("CONFIG_SETTINGS_PATH"),
            settings_dir: env_path("CONFIG_SETTINGS_DIR"),
            app_data_dir: env_path("CONFIG_SETTINGS_APPDATA"),
        }
    }

    /// Set the settings file path or name
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    /// Set the directory the settings search starts from
    pub fn with_settings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings_dir = Some(dir.into());
        self
    }

    /// Set the base directory for relocated live files
    pub fn with_app_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.app_data_dir = Some(dir.into());
        self
    }

    /// Merge another set of options, preferring values already set on `self`
    pub fn or(self, fallback: ChangeOptions) -> Self {
        Self {
            settings_path: self.settings_path.or(fallback.settings_path),
            settings_dir: self.settings_dir.or(fallback.settings_dir),
            app_data_dir: self.app_data_dir.or(fallback.app_data_dir),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Timing options for [`SettingsWatcher`](crate::settings::SettingsWatcher)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Quiet period after the last change before a reload fires
    pub debounce: Duration,
    /// How often to look for a root settings file that does not exist yet
    pub poll_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl WatchOptions {
    /// Set the debounce period
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the polling interval used while the root file is missing
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}
