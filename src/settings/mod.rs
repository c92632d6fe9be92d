//! Settings files
//!
//! A root settings file declares variables, meta-variables and blocks, and
//! may import other settings files:
//! - Imports are followed recursively, relative to the importing file
//! - A file's own declarations override those of its imports
//! - Saving writes every entry back to the file it came from

mod cache;
mod model;
mod persist;
mod store;
mod watcher;

pub use cache::SettingsCache;
pub use model::{Block, BlockState, CommentRecord, ImportRef, MetaVariable, SettingsLocation, Variable};
pub use store::SettingsStore;
pub use watcher::{SettingsChangeEvent, SettingsWatcher};
