//! Config Settings
//!
//! Produces environment-specific "live" XML configuration files from a
//! checked-in template and a set of external settings files.
//!
//! ## Features
//!
//! - Settings files with variables, meta variables, blocks and imports
//! - Lossless editing and saving of settings files, comments included
//! - Directive comments in templates: `{@attr=EXPR}` setters and `{~NAME}` blocks
//! - Live file written only when its content changed
//! - Watching a settings file and its imports for changes
//!
//! ## Quick Start
//!
//! ```no_run
//! use config_settings::{ChangeConfig, ChangeOptions};
//!
//! fn main() -> config_settings::Result<()> {
//!     let change = ChangeConfig::new(ChangeOptions::from_env());
//!     let live_path = change.execute("web.config")?;
//!     println!("{}", live_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Settings file
//!
//! ```xml
//! <settings>
//!   <import from="shared/_ConfigSettings.xml" />
//!   <meta name="FORCE_USE_APPDATA_PATH" value="false" />
//!   <var name="DB_HOST" value="db.local" />
//!   <block name="CACHE" enabled="true" />
//! </settings>
//! ```
//!
//! Variables declared later win: a file's own entries override those of the
//! files it imports.
//!
//! ## Template directives
//!
//! ```xml
//! <configuration>
//!   <!--{@host=DB_HOST}-->
//!   <database host="localhost" />
//!   <!--{~CACHE}-->
//!   <!--<cache size="512" />-->
//! </configuration>
//! ```
//!
//! ## Environment Variables
//!
//! - `CONFIG_SETTINGS_PATH`: settings file path or name (default: `_ConfigSettings.xml`)
//! - `CONFIG_SETTINGS_DIR`: directory the settings search starts from
//! - `CONFIG_SETTINGS_APPDATA`: base directory for relocated live files
//! - `RUST_LOG`: log filter, overrides `-v`/`-q`

pub mod change;
pub mod cli;
pub mod logging;
pub mod patch;
pub mod paths;
pub mod runner;
pub mod settings;
pub mod tracing;
pub mod types;
pub mod xml;

pub use change::{AppDataResolver, ChangeConfig, HashedAppDataResolver, app_data_resolver};
pub use cli::Cli;
pub use patch::PatchReport;
pub use runner::{execute_command, run_with_cli};
pub use settings::{
    BlockState, SettingsCache, SettingsChangeEvent, SettingsLocation, SettingsStore, SettingsWatcher,
};
pub use types::{ChangeOptions, ErrorCode, Result, SettingsError, WatchOptions};
