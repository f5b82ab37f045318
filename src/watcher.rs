use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::error::Result;

pub const DEFAULT_WATCH_DEBOUNCE: Duration = Duration::from_millis(500);

// File watcher event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FsEvent {
    Created { path: PathBuf },
    Deleted { path: PathBuf },
    Modified { path: PathBuf },
    Renamed { from: PathBuf, to: PathBuf },
}

impl FsEvent {
    fn label(&self) -> &'static str {
        match self {
            FsEvent::Created { .. } => "created",
            FsEvent::Deleted { .. } => "deleted",
            FsEvent::Modified { .. } => "modified",
            FsEvent::Renamed { .. } => "renamed",
        }
    }

    fn key_path(&self) -> &Path {
        match self {
            FsEvent::Created { path } | FsEvent::Deleted { path } | FsEvent::Modified { path } => {
                path
            }
            FsEvent::Renamed { from, .. } => from,
        }
    }
}

/// Turn a raw notify event into zero or more of our events.
pub fn translate(event: &Event) -> Vec<FsEvent> {
    let paths = &event.paths;
    match event.kind {
        EventKind::Create(_) => paths
            .iter()
            .map(|p| FsEvent::Created { path: p.clone() })
            .collect(),
        EventKind::Remove(_) => paths
            .iter()
            .map(|p| FsEvent::Deleted { path: p.clone() })
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match (mode, paths.as_slice()) {
            (RenameMode::Both, [from, to]) => vec![FsEvent::Renamed {
                from: from.clone(),
                to: to.clone(),
            }],
            (RenameMode::From, _) => paths
                .iter()
                .map(|p| FsEvent::Deleted { path: p.clone() })
                .collect(),
            (RenameMode::To, _) => paths
                .iter()
                .map(|p| FsEvent::Created { path: p.clone() })
                .collect(),
            // Backends that can't pair the two halves report one side at a
            // time; whether the path still exists says which side it was.
            _ => paths
                .iter()
                .map(|p| {
                    if p.exists() {
                        FsEvent::Created { path: p.clone() }
                    } else {
                        FsEvent::Deleted { path: p.clone() }
                    }
                })
                .collect(),
        },
        EventKind::Modify(_) => paths
            .iter()
            .map(|p| FsEvent::Modified { path: p.clone() })
            .collect(),
        _ => Vec::new(),
    }
}

/// Drops repeats of the same event for the same path inside a short window;
/// editors tend to emit several writes per save.
#[derive(Debug)]
pub struct EventDebouncer {
    window: Duration,
    last_seen: HashMap<(&'static str, PathBuf), Instant>,
}

impl EventDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    pub fn admit(&mut self, event: &FsEvent, now: Instant) -> bool {
        // Clean up old entries periodically
        if self.last_seen.len() > 100 {
            let keep = self.window * 10;
            self.last_seen
                .retain(|_, last| now.duration_since(*last) < keep);
        }

        let key = (event.label(), event.key_path().to_path_buf());
        if let Some(last) = self.last_seen.get(&key) {
            if now.duration_since(*last) < self.window {
                return false;
            }
        }
        self.last_seen.insert(key, now);
        true
    }
}

/// A live watch on a folder. Events arrive through `next`; dropping the
/// subscription stops the underlying watcher.
pub struct WatchSubscription {
    root: PathBuf,
    events: mpsc::UnboundedReceiver<FsEvent>,
    _watcher: RecommendedWatcher,
}

impl WatchSubscription {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn next(&mut self) -> Option<FsEvent> {
        self.events.recv().await
    }
}

/// Start watching `root` recursively.
pub fn watch(root: impl AsRef<Path>, debounce: Duration) -> Result<WatchSubscription> {
    let root = root.as_ref().to_path_buf();
    let (tx, rx) = mpsc::unbounded_channel();
    let debouncer = Mutex::new(EventDebouncer::new(debounce));

    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                for fs_event in translate(&event) {
                    let admitted = debouncer
                        .lock()
                        .expect("debounce map mutex")
                        .admit(&fs_event, Instant::now());
                    if admitted && tx.send(fs_event).is_err() {
                        // Subscription dropped; the watcher goes with it shortly
                        return;
                    }
                }
            }
            Err(e) => log::warn!("File watcher error: {}", e),
        },
        Config::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    log::info!("Watching {}", root.display());

    Ok(WatchSubscription {
        root,
        events: rx,
        _watcher: watcher,
    })
}
