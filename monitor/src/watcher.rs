//! Source tree watcher producing [`FileEvent`]s.
//!
//! The watcher monitors the project root recursively and publishes a
//! `filecontent` event into the hub for each created, modified or deleted
//! file whose extension is watched.
//!
//! # Architecture
//!
//! The notify callback runs on notify's own thread and is kept lightweight:
//! it classifies the event, maps the path to a project-relative key and hands
//! it to a [`Debouncer`]. A forwarding task receives the debounced changes,
//! reads the file content and publishes the event. Reading happens after the
//! burst settles, so the content is what the editor finished writing.
//!
//! Paths under hidden directories (`.git`, `.venv`, `.tox`, ...) and under
//! `__pycache__` are never reported.

use std::path::{Component, Path, PathBuf};

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::hub::LocalHub;
use crate::types::{ChangeKind, FileEvent, FILECONTENT_PLUGIN};
use crate::utils::debounce::Debouncer;

/// Directory name Python uses for bytecode caches.
const PYCACHE_DIR: &str = "__pycache__";

/// Errors that can occur while setting up file watching.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// Failed to resolve the project root.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The project root does not exist or is inaccessible.
    #[error("watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// A change after debouncing: the file key and the last kind seen.
type PendingChange = (String, ChangeKind);

/// Watches the project root and publishes file events into a hub.
///
/// Watching stops when the value is dropped.
#[derive(Debug)]
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl SourceWatcher {
    /// Starts watching `config.project_root`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the project root does not exist or the notify
    /// watcher cannot be created.
    pub fn start(config: &Config, hub: LocalHub) -> Result<Self> {
        if !config.project_root.is_dir() {
            return Err(WatcherError::DirectoryNotFound(config.project_root.clone()));
        }

        // notify reports canonical paths on some platforms; compare against the
        // same form.
        let root = config.project_root.canonicalize()?;
        let extensions = config.watch_extensions.clone();

        let (output_tx, output_rx) = mpsc::channel::<PendingChange>(config.buffer_size);
        let debouncer = Debouncer::new(config.debounce, output_tx);

        tokio::spawn(forward_changes(
            output_rx,
            hub,
            config.project_name.clone(),
            root.clone(),
        ));

        let callback_root = root.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                handle_notify_event(res, &callback_root, &extensions, &debouncer);
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        info!(
            root = %root.display(),
            extensions = ?config.watch_extensions,
            "Watching source tree"
        );

        Ok(Self {
            _watcher: watcher,
            root,
        })
    }

    /// Returns the canonical root being watched.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn handle_notify_event(
    res: notify::Result<Event>,
    root: &Path,
    extensions: &[String],
    debouncer: &Debouncer<String, ChangeKind>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    let Some(kind) = change_kind(&event.kind) else {
        trace!(kind = ?event.kind, "Ignoring event kind");
        return;
    };

    for path in &event.paths {
        let Some(key) = watch_key(root, path, extensions) else {
            continue;
        };
        if !debouncer.try_send(key, kind) {
            warn!(path = %path.display(), "Debounce queue full, dropping change");
        }
    }
}

/// Maps a notify event kind to the change it represents.
///
/// Renames are reported as modifications; the forwarding task turns them into
/// deletions when the file is gone by the time it is read.
fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(CreateKind::File | CreateKind::Any) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any) => {
            Some(ChangeKind::Modified)
        }
        EventKind::Remove(RemoveKind::File | RemoveKind::Any) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

/// Returns the `/`-separated key of `path` relative to `root`, or `None` if
/// the path should not be reported.
fn watch_key(root: &Path, path: &Path, extensions: &[String]) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;

    let extension = relative.extension()?.to_str()?;
    if !extensions.iter().any(|ext| ext == extension) {
        return None;
    }

    let mut parts = Vec::new();
    for component in relative.components() {
        let Component::Normal(part) = component else {
            return None;
        };
        let part = part.to_str()?;
        if part.starts_with('.') || part == PYCACHE_DIR {
            return None;
        }
        parts.push(part);
    }

    Some(parts.join("/"))
}

async fn forward_changes(
    mut rx: mpsc::Receiver<PendingChange>,
    hub: LocalHub,
    project: String,
    root: PathBuf,
) {
    while let Some((key, kind)) = rx.recv().await {
        let path = root.join(&key);

        let (kind, content) = match kind {
            ChangeKind::Deleted => (ChangeKind::Deleted, None),
            kind => match tokio::fs::read(&path).await {
                Ok(bytes) => (kind, Some(String::from_utf8_lossy(&bytes).into_owned())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => (ChangeKind::Deleted, None),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read changed file");
                    continue;
                }
            },
        };

        debug!(key = %key, kind = ?kind, "Source file changed");
        let event = FileEvent::new(project.as_str(), FILECONTENT_PLUGIN, key, kind, content);
        hub.publish(event);
    }

    debug!("Source watcher forwarding task shutting down");
}
