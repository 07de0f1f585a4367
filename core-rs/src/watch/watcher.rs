//! Filesystem change source feeding the debouncer
//!
//! Uses the notify crate's native watcher, falling back to polling when it
//! cannot be created (or when polling is forced):
//! - Walks the watch root once, registering every non-ignored directory
//! - Registers directories created or moved in later
//! - Sends one `RestartSignal` per changed path that passes the filter

use crate::errors::Result;
use crate::watch::{PathFilter, RestartSignal};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

type EventSender = Sender<notify::Result<Event>>;

/// Watches a directory tree and reports relevant changes
#[derive(Debug)]
pub struct ChangeWatcher {
    root: PathBuf,
    filter: PathFilter,
    force_poll: bool,
    poll_interval: Duration,
}

impl ChangeWatcher {
    pub fn new(root: impl Into<PathBuf>, filter: PathFilter) -> Self {
        Self {
            root: root.into(),
            filter,
            force_poll: false,
            poll_interval: crate::config::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Use polling instead of native events
    pub fn with_polling(mut self, force_poll: bool) -> Self {
        self.force_poll = force_poll;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Register the tree and start delivering signals on a dedicated thread.
    ///
    /// # Errors
    /// Fails if the tree cannot be enumerated or a directory cannot be
    /// registered. The thread exits once `signals` has no receiver.
    pub fn start(self, signals: mpsc::Sender<RestartSignal>) -> Result<JoinHandle<()>> {
        let (tx, rx) = channel();
        let mut watcher = self.create_watcher(tx)?;

        let count = self.register_tree(watcher.as_mut())?;
        info!(
            "[Watcher] Watching {} director{} under {}",
            count,
            if count == 1 { "y" } else { "ies" },
            self.root.display()
        );

        let handle = std::thread::Builder::new()
            .name("rebind-watcher".to_string())
            .spawn(move || self.event_loop(watcher, rx, signals))?;

        Ok(handle)
    }

    fn create_watcher(&self, tx: EventSender) -> Result<Box<dyn Watcher + Send>> {
        if !self.force_poll {
            match RecommendedWatcher::new(tx.clone(), NotifyConfig::default()) {
                Ok(watcher) => return Ok(Box::new(watcher)),
                Err(e) => {
                    warn!(
                        "[Watcher] Couldn't create event watcher ({}), falling back to polling watcher.",
                        e
                    );
                    info!("[Watcher] HINT: Use --poll to force polling.");
                }
            }
        }

        let config = NotifyConfig::default().with_poll_interval(self.poll_interval);
        Ok(Box::new(PollWatcher::new(tx, config)?))
    }

    /// Register every watchable directory below the root. Ignored
    /// directories are not descended into.
    fn register_tree(&self, watcher: &mut dyn Watcher) -> Result<usize> {
        let mut count = 0;

        let walker = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| !self.filter.is_ignored(entry.path()));

        for entry in walker {
            let entry = entry?;
            let is_dir = entry.file_type().is_dir();

            if !self.filter.should_watch(entry.path(), is_dir) {
                debug!("[Watcher] Ignoring {}", entry.path().display());
                continue;
            }

            debug!("[Watcher] Watching {}", entry.path().display());
            if is_dir {
                watcher.watch(entry.path(), RecursiveMode::NonRecursive)?;
                count += 1;
            }
        }

        Ok(count)
    }

    fn event_loop(
        self,
        mut watcher: Box<dyn Watcher + Send>,
        rx: Receiver<notify::Result<Event>>,
        signals: mpsc::Sender<RestartSignal>,
    ) {
        for result in rx {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!("[Watcher] Error: {}", e);
                    continue;
                }
            };

            // Reads by the child (or by us) are not changes.
            if matches!(event.kind, EventKind::Access(_)) {
                continue;
            }

            for path in &event.paths {
                if self.filter.should_signal(path) {
                    debug!("[Watcher] Changed: {} ({:?})", path.display(), event.kind);
                    if signals.blocking_send(RestartSignal).is_err() {
                        debug!("[Watcher] Signal receiver closed, stopping");
                        return;
                    }
                }

                match event.kind {
                    EventKind::Create(_) => self.watch_created(watcher.as_mut(), path),
                    // inotify reports `mv dir into/tree` as a rename, not a create
                    EventKind::Modify(ModifyKind::Name(
                        RenameMode::To | RenameMode::Both | RenameMode::Any,
                    )) => self.watch_created(watcher.as_mut(), path),
                    EventKind::Remove(_) => {
                        // Fails harmlessly for paths that were never registered.
                        let _ = watcher.unwatch(path);
                    }
                    _ => {}
                }
            }
        }
    }

    fn watch_created(&self, watcher: &mut dyn Watcher, path: &Path) {
        if !path.is_dir() || !self.filter.should_watch(path, true) {
            return;
        }

        // New trees may arrive whole (`mv`, `git checkout`, `cp -r`).
        if let Err(e) = self.register_subtree(watcher, path) {
            warn!("[Watcher] Error: {}", e);
        }
    }

    fn register_subtree(&self, watcher: &mut dyn Watcher, dir: &Path) -> Result<()> {
        let walker = WalkDir::new(dir)
            .into_iter()
            .filter_entry(|entry| !self.filter.is_ignored(entry.path()));

        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_dir() {
                debug!("[Watcher] Watching {}", entry.path().display());
                watcher.watch(entry.path(), RecursiveMode::NonRecursive)?;
            }
        }
        Ok(())
    }
}
