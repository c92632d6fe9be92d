//! Settings file watcher
//!
//! Keeps a [`SettingsStore`] current while the root settings file or any of
//! its imports changes on disk.
//!
//! Every source file gets its own debouncer watching the file's directory;
//! debounced changes wake a single reload worker. A reload drops all
//! debouncers, builds a fresh store and watches the (possibly different) set
//! of files again. While the root file does not exist the worker polls for
//! it instead.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, DebouncedEventKind, Debouncer, new_debouncer};
use tokio::sync::mpsc as tokio_mpsc;

use super::model::SettingsLocation;
use super::store::SettingsStore;
use crate::paths;
use crate::types::{Result, SettingsError, WatchOptions};

/// Event delivered by [`SettingsWatcher::channel`]
#[derive(Debug, Clone)]
pub enum SettingsChangeEvent {
    /// Settings were reloaded
    Reloaded {
        /// Files whose changes triggered the reload
        changed_paths: Vec<PathBuf>,
    },
    /// Reloading failed; the previous settings stay in effect
    Failed {
        changed_paths: Vec<PathBuf>,
        message: String,
    },
}

enum Signal {
    Changed(Vec<PathBuf>),
    Shutdown,
}

type ReloadHandler = Box<dyn Fn(&SettingsStore, &[PathBuf]) + Send>;
type ErrorHandler = Box<dyn Fn(&SettingsError, &[PathBuf]) + Send>;

/// Settings file watcher
///
/// Dropping the watcher stops it.
#[allow(missing_debug_implementations)]
pub struct SettingsWatcher {
    store: Arc<RwLock<Arc<SettingsStore>>>,
    watched: Arc<Mutex<Vec<PathBuf>>>,
    signals: mpsc::Sender<Signal>,
    worker: Option<JoinHandle<()>>,
}

impl SettingsWatcher {
    /// Load settings and start watching them
    ///
    /// `on_reload` runs on the worker thread after every successful reload;
    /// `on_error` runs there when a reload fails, in which case the previous
    /// store is kept. Errors of the initial load are returned.
    pub fn start(
        location: &SettingsLocation,
        options: WatchOptions,
        on_reload: impl Fn(&SettingsStore) + Send + 'static,
        on_error: impl Fn(&SettingsError) + Send + 'static,
    ) -> Result<Self> {
        Self::spawn(
            location,
            options,
            Box::new(move |store, _| on_reload(store)),
            Box::new(move |error, _| on_error(error)),
        )
    }

    /// Like [`Self::start`], delivering outcomes as [`SettingsChangeEvent`]s
    pub fn channel(
        location: &SettingsLocation,
        options: WatchOptions,
    ) -> Result<(Self, tokio_mpsc::UnboundedReceiver<SettingsChangeEvent>)> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let error_tx = tx.clone();
        let watcher = Self::spawn(
            location,
            options,
            Box::new(move |_, changed| {
                drop(tx.send(SettingsChangeEvent::Reloaded {
                    changed_paths: changed.to_vec(),
                }));
            }),
            Box::new(move |error, changed| {
                drop(error_tx.send(SettingsChangeEvent::Failed {
                    changed_paths: changed.to_vec(),
                    message: error.to_string(),
                }));
            }),
        )?;
        Ok((watcher, rx))
    }

    fn spawn(
        location: &SettingsLocation,
        options: WatchOptions,
        on_reload: ReloadHandler,
        on_error: ErrorHandler,
    ) -> Result<Self> {
        let initial = SettingsStore::load(location)?;
        let (signals, receiver) = mpsc::channel();

        let Some(root) = initial.root().map(Path::to_path_buf) else {
            tracing::debug!("No settings file located, not watching");
            return Ok(Self {
                store: Arc::new(RwLock::new(Arc::new(initial))),
                watched: Arc::new(Mutex::new(Vec::new())),
                signals,
                worker: None,
            });
        };

        let files = initial.watched_files();
        let debouncers = watch_files(&files, &options, &signals)?;
        let store = Arc::new(RwLock::new(Arc::new(initial)));
        let watched = Arc::new(Mutex::new(files));

        let mut worker = ReloadWorker {
            root,
            location: location.clone(),
            options,
            store: Arc::clone(&store),
            watched: Arc::clone(&watched),
            signals: signals.clone(),
            debouncers,
            on_reload,
            on_error,
        };
        let handle = std::thread::Builder::new()
            .name("settings-watcher".to_string())
            .spawn(move || worker.run(&receiver))
            .map_err(|e| SettingsError::watch(format!("failed to start watcher thread: {e}")))?;

        Ok(Self {
            store,
            watched,
            signals,
            worker: Some(handle),
        })
    }

    /// Current settings
    pub fn store(&self) -> Arc<SettingsStore> {
        Arc::clone(&self.store.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Files currently watched: the root and every import
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop watching; no callback runs after this returns
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(self.signals.send(Signal::Shutdown));
            if worker.join().is_err() {
                tracing::warn!("Settings watcher thread panicked");
            }
            tracing::debug!("Settings watcher stopped");
        }
    }
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ReloadWorker {
    root: PathBuf,
    location: SettingsLocation,
    options: WatchOptions,
    store: Arc<RwLock<Arc<SettingsStore>>>,
    watched: Arc<Mutex<Vec<PathBuf>>>,
    signals: mpsc::Sender<Signal>,
    debouncers: Vec<Debouncer<RecommendedWatcher>>,
    on_reload: ReloadHandler,
    on_error: ErrorHandler,
}

impl ReloadWorker {
    fn run(&mut self, receiver: &mpsc::Receiver<Signal>) {
        loop {
            let signal = if self.root.exists() {
                receiver.recv().map_err(|_| RecvTimeoutError::Disconnected)
            } else {
                receiver.recv_timeout(self.options.poll_interval)
            };

            let (mut changed, polled) = match signal {
                Ok(Signal::Changed(paths)) => (paths, false),
                Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {
                    if !self.root.exists() {
                        continue;
                    }
                    tracing::debug!("Settings file appeared: {}", self.root.display());
                    (vec![self.root.clone()], true)
                }
            };

            // Coalesce changes queued while the previous reload ran
            while let Ok(signal) = receiver.try_recv() {
                match signal {
                    Signal::Changed(paths) => changed.extend(paths),
                    Signal::Shutdown => return,
                }
            }
            changed.sort();
            changed.dedup();

            // A root that failed to load may still be mid-write; keep its notifications
            if self.reload(&changed) && polled && self.skip_root_signals(receiver) {
                return;
            }
        }
    }

    /// Drop queued notifications about the root file, which a reload just read
    ///
    /// Notifications about other files are queued again. Returns `true` on shutdown.
    fn skip_root_signals(&self, receiver: &mpsc::Receiver<Signal>) -> bool {
        let mut others = Vec::new();
        while let Ok(signal) = receiver.try_recv() {
            match signal {
                Signal::Changed(paths) => others.extend(paths.into_iter().filter(|p| *p != self.root)),
                Signal::Shutdown => return true,
            }
        }
        if !others.is_empty() {
            drop(self.signals.send(Signal::Changed(others)));
        }
        false
    }

    /// Returns whether the settings loaded
    fn reload(&mut self, changed: &[PathBuf]) -> bool {
        tracing::info!("Settings changed, reloading: {:?}", changed);
        self.debouncers.clear();

        match SettingsStore::load(&self.location) {
            Ok(store) => {
                let store = Arc::new(store);
                *self.store.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&store);
                self.rewatch(&store);
                (self.on_reload)(&store, changed);
                true
            }
            Err(e) => {
                tracing::warn!("Settings reload failed, keeping previous settings: {}", e);
                let current = Arc::clone(&self.store.read().unwrap_or_else(PoisonError::into_inner));
                self.rewatch(&current);
                (self.on_error)(&e, changed);
                false
            }
        }
    }

    fn rewatch(&mut self, store: &SettingsStore) {
        let files = store.watched_files();
        match watch_files(&files, &self.options, &self.signals) {
            Ok(debouncers) => self.debouncers = debouncers,
            Err(e) => {
                tracing::warn!("Failed to watch settings files: {}", e);
                (self.on_error)(&e, &[]);
            }
        }
        *self.watched.lock().unwrap_or_else(PoisonError::into_inner) = files;
    }
}

/// One debouncer per file, watching its directory and filtering by file name
///
/// Files whose directory does not exist are skipped.
fn watch_files(
    files: &[PathBuf],
    options: &WatchOptions,
    signals: &mpsc::Sender<Signal>,
) -> Result<Vec<Debouncer<RecommendedWatcher>>> {
    let mut debouncers = Vec::new();
    for file in files {
        let dir = paths::parent_dir(file);
        let Some(file_name) = file.file_name().map(ToOwned::to_owned) else {
            continue;
        };
        if !dir.is_dir() {
            tracing::debug!("Settings directory missing, not watching: {}", dir.display());
            continue;
        }

        let tx = signals.clone();
        let target = file.clone();
        let mut debouncer = new_debouncer(options.debounce, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let relevant = events.iter().any(|e| {
                        matches!(e.kind, DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous)
                            && e.path.file_name() == Some(file_name.as_os_str())
                    });
                    if relevant {
                        tracing::debug!("Settings file changed: {}", target.display());
                        drop(tx.send(Signal::Changed(vec![target.clone()])));
                    }
                }
                Err(e) => {
                    tracing::warn!("Settings watcher error: {:?}", e);
                }
            }
        })
        .map_err(|e| SettingsError::watch(format!("failed to initialize watcher: {e}")))?;

        debouncer
            .watcher()
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| SettingsError::watch(format!("failed to watch {}: {e}", dir.display())))?;
        tracing::debug!("Watching settings file: {}", file.display());
        debouncers.push(debouncer);
    }
    Ok(debouncers)
}
