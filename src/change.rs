//! Live file production
//!
//! [`ChangeConfig::execute`] turns a configuration template into its live
//! file: the template is patched with the located settings and written next
//! to it as `<stem>.live<.ext>`, or into an application data directory when
//! that is not possible or the settings ask for it.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use sha2::{Digest, Sha256};

use crate::patch::{self, LogSettingsFixup, expression};
use crate::paths;
use crate::settings::{SettingsCache, SettingsLocation, SettingsStore};
use crate::types::{ChangeOptions, DEFAULT_SETTINGS_FILE_NAME, Result, SettingsError};
use crate::xml::{Document, Element, Mutation, Node, apply_mutations, parse_document, write_document};

/// Meta-variable forcing the live file into the application data directory
pub const FORCE_USE_APPDATA_PATH: &str = "FORCE_USE_APPDATA_PATH";

/// Marker of a region regenerated on every run and ignored when comparing
pub const GENERATED_MARKER: &str = "{~GENERATED}";

/// Serializes live file production within the process
static EXECUTE_LOCK: Mutex<()> = Mutex::new(());

/// Chooses the directory for live files that cannot be written next to their template
pub trait AppDataResolver: Send + Sync {
    fn resolve(&self, config_path: &Path) -> PathBuf;
}

impl<F> AppDataResolver for F
where
    F: Fn(&Path) -> PathBuf + Send + Sync,
{
    fn resolve(&self, config_path: &Path) -> PathBuf {
        self(config_path)
    }
}

/// Default resolver: `<base>/Configs/<hash of the template directory>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedAppDataResolver {
    base: PathBuf,
}

impl AppDataResolver for HashedAppDataResolver {
    fn resolve(&self, config_path: &Path) -> PathBuf {
        let dir = paths::parent_dir(config_path);
        let mut hasher = Sha256::new();
        hasher.update(dir.to_string_lossy().as_bytes());
        let hash_hex = format!("{:x}", hasher.finalize());
        self.base.join("Configs").join(&hash_hex[..8])
    }
}

/// Build the default resolver rooted at `base`
pub fn app_data_resolver(base: impl Into<PathBuf>) -> HashedAppDataResolver {
    HashedAppDataResolver { base: base.into() }
}

/// Produces live files from configuration templates
#[derive(Clone)]
#[allow(missing_debug_implementations)]
pub struct ChangeConfig {
    options: ChangeOptions,
    app_data: Option<Arc<dyn AppDataResolver>>,
    cache: Option<Arc<SettingsCache>>,
}

impl ChangeConfig {
    /// Create from options; `app_data_dir` installs the default resolver
    pub fn new(options: ChangeOptions) -> Self {
        let app_data = options
            .app_data_dir
            .clone()
            .map(|base| Arc::new(app_data_resolver(base)) as Arc<dyn AppDataResolver>);
        Self {
            options,
            app_data,
            cache: None,
        }
    }

    /// Options from `CONFIG_SETTINGS_*` environment variables
    pub fn from_env() -> Self {
        Self::new(ChangeOptions::from_env())
    }

    pub fn with_app_data_resolver(mut self, resolver: impl AppDataResolver + 'static) -> Self {
        self.app_data = Some(Arc::new(resolver));
        self
    }

    /// Reuse settings across runs while their files are unchanged
    pub fn with_settings_cache(mut self, cache: Arc<SettingsCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &ChangeOptions {
        &self.options
    }

    /// Settings file to use: an absolute `settings_path` as-is, otherwise the
    /// configured name (or the default one) searched from `settings_dir` upwards
    pub fn settings_location(&self) -> SettingsLocation {
        let name = self
            .options
            .settings_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE_NAME));
        if name.is_absolute() {
            return SettingsLocation::File(name);
        }

        let start = self
            .options
            .settings_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        match find_settings_file(&paths::absolute(&start), &name) {
            Some(path) => SettingsLocation::File(path),
            None => {
                tracing::debug!("No settings file {} found from {}", name.display(), start.display());
                SettingsLocation::Unresolved
            }
        }
    }

    /// Load the located settings, through the cache when one is set
    pub fn load_settings(&self) -> Result<Arc<SettingsStore>> {
        let location = self.settings_location();
        match &self.cache {
            Some(cache) => cache.get_or_load(&location),
            None => Ok(Arc::new(SettingsStore::load(&location)?)),
        }
    }

    /// Patch `config_path` and write its live file if the content changed
    ///
    /// Returns the live file path.
    pub fn execute(&self, config_path: impl AsRef<Path>) -> Result<PathBuf> {
        let _guard = EXECUTE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let config_path = paths::absolute(config_path.as_ref());

        let (document, store) = self.patched(&config_path)?;
        let live_path = self.live_path(&config_path, &store)?;
        write_if_changed(&document, &live_path)?;
        Ok(live_path)
    }

    /// Patched document of `config_path`; nothing is written
    pub fn execute_without_change(&self, config_path: impl AsRef<Path>) -> Result<Document> {
        let _guard = EXECUTE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let config_path = paths::absolute(config_path.as_ref());
        self.patched(&config_path).map(|(document, _)| document)
    }

    fn patched(&self, config_path: &Path) -> Result<(Document, Arc<SettingsStore>)> {
        let source = fs::read_to_string(config_path)?;
        let mut document = parse_document(&source)?;
        let store = self.load_settings()?;

        patch::patch(&mut document, &store);
        LogSettingsFixup::apply(&mut document.root, config_path);
        Ok((document, store))
    }

    /// Where the live file of `config_path` goes
    pub fn live_path(&self, config_path: &Path, store: &SettingsStore) -> Result<PathBuf> {
        let live_name = live_file_name(config_path);
        let forced = store
            .meta_variable_value(FORCE_USE_APPDATA_PATH)
            .is_some_and(expression::is_true);

        if !forced {
            let beside = paths::parent_dir(config_path).join(&live_name);
            if !is_file_locked(&beside) {
                return Ok(beside);
            }
            tracing::info!("Live file is locked, using application data: {}", beside.display());
        }

        let resolver = self.app_data.as_ref().ok_or_else(|| {
            SettingsError::config_error(format!(
                "live file must go to application data, but no resolver is set: remove the {FORCE_USE_APPDATA_PATH} meta variable or configure an application data directory"
            ))
        })?;
        let dir = resolver.resolve(config_path);
        fs::create_dir_all(&dir).map_err(|e| SettingsError::write(&dir, e))?;
        Ok(dir.join(live_name))
    }
}

/// `web.config` → `web.live.config`
pub fn live_file_name(config_path: &Path) -> OsString {
    let mut name = config_path.file_stem().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".live");
    if let Some(extension) = config_path.extension() {
        name.push(".");
        name.push(extension);
    }
    name
}

/// Search `name` in `start_dir` and each of its parents
pub fn find_settings_file(start_dir: &Path, name: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .find_map(|dir| find_first_by_mask(dir, name))
}

/// `dir/name` if it exists, else the first file (by name) in `dir` whose name ends with `name`'s file name
pub fn find_first_by_mask(dir: &Path, name: &Path) -> Option<PathBuf> {
    let exact = dir.join(name);
    if exact.is_file() {
        return Some(exact);
    }

    let suffix = name.file_name()?.to_string_lossy().into_owned();
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .is_some_and(|f| f.to_string_lossy().ends_with(&suffix))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Whether `path` cannot be written: read-only, not openable for writing,
/// or (when missing) in a directory that does not accept new files
pub fn is_file_locked(path: &Path) -> bool {
    let dir = paths::parent_dir(path);
    if fs::create_dir_all(dir).is_err() {
        return true;
    }
    if !path.exists() {
        return tempfile::tempfile_in(dir).is_err();
    }
    match fs::metadata(path) {
        Ok(metadata) if metadata.permissions().readonly() => true,
        Ok(_) => OpenOptions::new().append(true).open(path).is_err(),
        Err(_) => true,
    }
}

/// Write the document unless the live file already has the same content
///
/// With a `{~GENERATED}` region the comparison ignores generated regions.
/// Returns whether the file was written.
pub fn write_if_changed(document: &Document, live_path: &Path) -> Result<bool> {
    let content = write_document(document);

    let unchanged = match fs::read_to_string(live_path) {
        Ok(existing) if has_generated_block(document) => match parse_document(&existing) {
            Ok(existing) => {
                write_document(&without_generated(existing)) == write_document(&without_generated(document.clone()))
            }
            Err(_) => false,
        },
        Ok(existing) => existing == content,
        Err(_) => false,
    };
    if unchanged {
        tracing::debug!("Live file is up to date: {}", live_path.display());
        return Ok(false);
    }

    fs::write(live_path, content).map_err(|e| SettingsError::write(live_path, e))?;
    tracing::info!("Live file written: {}", live_path.display());
    Ok(true)
}

fn has_generated_block(document: &Document) -> bool {
    document
        .comments()
        .iter()
        .any(|comment| comment.trim() == GENERATED_MARKER)
}

fn without_generated(mut document: Document) -> Document {
    let mut mutations = Vec::new();
    collect_generated(&document.root, &mut Vec::new(), &mut mutations);
    apply_mutations(&mut document.root, mutations);
    document
}

/// Collect removals of each `{~GENERATED}` marker and the element following it
fn collect_generated(element: &Element, path: &mut Vec<usize>, out: &mut Vec<Mutation>) {
    let mut next_is_generated = false;
    for (index, node) in element.children.iter().enumerate() {
        path.push(index);
        match node {
            Node::Comment(comment) => match crate::patch::marker_name(comment) {
                Some(_) if comment.trim() == GENERATED_MARKER => {
                    out.push(Mutation::Replace {
                        path: path.clone(),
                        nodes: Vec::new(),
                    });
                    next_is_generated = true;
                }
                Some(_) => {}
                None => next_is_generated = false,
            },
            Node::Element(child) => {
                if next_is_generated {
                    out.push(Mutation::Replace {
                        path: path.clone(),
                        nodes: Vec::new(),
                    });
                    next_is_generated = false;
                } else {
                    collect_generated(child, path, out);
                }
            }
            _ => {}
        }
        path.pop();
    }
}
