use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::alerts::{Alert, Notifier};
use crate::bridge::FileBridge;
use crate::document::{Document, DocumentContent, DocumentKind};
use crate::error::Result;

pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Content was written and the snapshot updated.
    Saved,
    /// Nothing to write: content matches the last write.
    Clean,
    /// Another save for this document was already running.
    InFlight,
    /// The document was closed; nothing is written any more.
    Closed,
    /// Writes are blocked while the file is being deleted.
    Suspended,
}

// Scheduling state for one document
#[derive(Debug, Default)]
struct SaveTask {
    timer: Option<JoinHandle<()>>,
    // Bumped on every (re)schedule and cancel so a timer that already woke
    // up can tell it has been superseded.
    generation: u64,
    last_scheduled_at: Option<Instant>,
    held: bool,
    // Set while the file is being deleted; blocks writes as well as timers.
    suspended: bool,
    changed_while_held: bool,
    closed: bool,
}

impl SaveTask {
    fn cancel_timer(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct SaverInner {
    document: Mutex<Document>,
    task: Mutex<SaveTask>,
    in_flight: watch::Sender<bool>,
    bridge: Arc<dyn FileBridge>,
    notifier: Arc<dyn Notifier>,
    delay: Duration,
}

/// Owns one open document and decides when it gets written.
///
/// Edits reset a trailing-edge timer; when it fires the document is written
/// if it is still dirty. Only one write per document is ever running.
/// Cloning yields another handle to the same document.
#[derive(Clone)]
pub struct SaveScheduler {
    inner: Arc<SaverInner>,
}

impl fmt::Debug for SaveScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveScheduler")
            .field("path", &self.path())
            .field("pending", &self.is_pending())
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

impl SaveScheduler {
    pub fn new(
        document: Document,
        bridge: Arc<dyn FileBridge>,
        notifier: Arc<dyn Notifier>,
        delay: Duration,
    ) -> Self {
        let (in_flight, _) = watch::channel(false);
        Self {
            inner: Arc::new(SaverInner {
                document: Mutex::new(document),
                task: Mutex::new(SaveTask::default()),
                in_flight,
                bridge,
                notifier,
                delay,
            }),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.document().path.clone()
    }

    pub fn kind(&self) -> DocumentKind {
        self.document().kind()
    }

    pub fn content(&self) -> DocumentContent {
        self.document().content.clone()
    }

    pub fn is_dirty(&self) -> Result<bool> {
        self.document().is_dirty()
    }

    pub fn persisted_snapshot(&self) -> String {
        self.document().tracker().snapshot().to_string()
    }

    pub fn is_pending(&self) -> bool {
        self.task().timer.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        *self.inner.in_flight.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.task().closed
    }

    /// When the pending save is due, if one is scheduled.
    pub fn scheduled_at(&self) -> Option<Instant> {
        let task = self.task();
        task.timer.as_ref().and(task.last_scheduled_at)
    }

    /// Mutate the content and schedule a save.
    pub fn edit<R>(&self, f: impl FnOnce(&mut DocumentContent) -> R) -> R {
        let result = {
            let mut document = self.document();
            f(&mut document.content)
        };
        self.notify_changed();
        result
    }

    pub fn replace(&self, content: DocumentContent) {
        self.edit(|current| *current = content);
    }

    /// Record a change now and (re)arm the timer to fire `delay` from now.
    /// Scheduling is unconditional; dirtiness is checked when it fires.
    pub fn notify_changed(&self) {
        let mut task = self.task();
        if task.closed {
            return;
        }
        if task.held {
            task.changed_while_held = true;
            return;
        }
        self.arm(&mut task);
    }

    fn arm(&self, task: &mut SaveTask) {
        task.cancel_timer();
        let generation = task.generation;
        let fire_at = Instant::now() + self.inner.delay;
        task.last_scheduled_at = Some(fire_at);

        let inner = Arc::clone(&self.inner);
        task.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(fire_at).await;
            {
                let mut task = inner.task.lock().expect("save task mutex");
                if task.generation != generation || task.closed {
                    return;
                }
                task.timer = None;
            }
            // The write runs in its own task so aborting a timer can never
            // interrupt a write that has started.
            tokio::spawn(async move {
                let _ = attempt_save(&inner).await;
            });
        }));
        log::debug!("Autosave scheduled in {:?}", self.inner.delay);
    }

    /// Drop the pending save, if any, without writing.
    pub fn cancel_pending(&self) {
        self.task().cancel_timer();
    }

    /// Cancel the pending save and write now. If a write is already running,
    /// wait for it and then write again only if still dirty.
    pub async fn flush(&self) -> Result<SaveOutcome> {
        self.cancel_pending();
        let mut in_flight = self.inner.in_flight.subscribe();
        loop {
            let _ = in_flight.wait_for(|busy| !*busy).await;
            match attempt_save(&self.inner).await? {
                SaveOutcome::InFlight => continue,
                outcome => return Ok(outcome),
            }
        }
    }

    /// Resolve once no write for this document is running.
    pub async fn wait_idle(&self) {
        let mut in_flight = self.inner.in_flight.subscribe();
        let _ = in_flight.wait_for(|busy| !*busy).await;
    }

    /// Stop scheduling saves for this document. A write that has already
    /// started is left to finish.
    pub fn close(&self) {
        let mut task = self.task();
        task.closed = true;
        task.cancel_timer();
    }

    /// Suspend the timer while the file is being moved. Edits made in the
    /// meantime are remembered and scheduled on `release`.
    pub fn hold(&self) {
        let mut task = self.task();
        task.held = true;
        task.cancel_timer();
    }

    /// Like `hold`, but also refuses writes until `release`, including ones
    /// requested through `flush`.
    pub fn suspend(&self) {
        let mut task = self.task();
        task.held = true;
        task.suspended = true;
        task.cancel_timer();
    }

    pub fn release(&self) {
        let mut task = self.task();
        task.held = false;
        task.suspended = false;
        if std::mem::take(&mut task.changed_while_held) && !task.closed {
            self.arm(&mut task);
        }
    }

    /// Point the document at a new path (after a rename).
    pub fn retarget(&self, path: impl Into<PathBuf>) {
        self.document().path = path.into();
    }

    pub fn is_at(&self, path: &Path) -> bool {
        self.document().path == path
    }

    fn document(&self) -> std::sync::MutexGuard<'_, Document> {
        self.inner.document.lock().expect("document mutex")
    }

    fn task(&self) -> std::sync::MutexGuard<'_, SaveTask> {
        self.inner.task.lock().expect("save task mutex")
    }
}

// Clears the in-flight flag however the write ends.
struct InFlightGuard<'a>(&'a watch::Sender<bool>);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

async fn attempt_save(inner: &Arc<SaverInner>) -> Result<SaveOutcome> {
    // Checked under the task lock so `suspend` followed by `wait_idle`
    // can't miss a write that is about to start.
    let acquired = {
        let task = inner.task.lock().expect("save task mutex");
        if task.closed {
            return Ok(SaveOutcome::Closed);
        }
        if task.suspended {
            return Ok(SaveOutcome::Suspended);
        }
        inner.in_flight.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        })
    };
    if !acquired {
        log::debug!("Save skipped, another save is in flight");
        return Ok(SaveOutcome::InFlight);
    }
    let _guard = InFlightGuard(&inner.in_flight);

    let (path, serialized) = {
        let document = inner.document.lock().expect("document mutex");
        let serialized = document.content.serialize()?;
        if !document.tracker().is_dirty(&serialized) {
            return Ok(SaveOutcome::Clean);
        }
        (document.path.clone(), serialized)
    };

    match inner.bridge.write_file(&path, &serialized).await {
        Ok(()) => {
            let mut document = inner.document.lock().expect("document mutex");
            // A rename that landed mid-write means this went to the old
            // path; leave the document dirty so it is written again.
            if document.path == path {
                document.tracker_mut().mark_persisted(serialized);
            }
            log::info!("Saved {}", path.display());
            Ok(SaveOutcome::Saved)
        }
        Err(e) => {
            log::warn!("Auto-save failed for {}: {}", path.display(), e);
            inner
                .notifier
                .notify(Alert::error("Auto-save Error", format!("Failed to save: {}", e)));
            Err(e)
        }
    }
}

// ---- Open documents ----

/// Every document currently open, keyed by path.
#[derive(Default, Clone)]
pub struct OpenDocuments {
    by_path: BTreeMap<PathBuf, SaveScheduler>,
}

impl OpenDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<SaveScheduler> {
        self.by_path.get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn insert(&mut self, scheduler: SaveScheduler) {
        if let Some(previous) = self.by_path.insert(scheduler.path(), scheduler) {
            previous.close();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.by_path.keys().cloned().collect()
    }

    pub fn all(&self) -> Vec<SaveScheduler> {
        self.by_path.values().cloned().collect()
    }

    /// Documents at `path` or below it.
    pub fn under(&self, path: &Path) -> Vec<SaveScheduler> {
        self.by_path
            .iter()
            .filter(|(p, _)| p.starts_with(path))
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn remove(&mut self, path: &Path) -> Option<SaveScheduler> {
        self.by_path.remove(path)
    }

    /// Close and forget every document at `path` or below it.
    pub fn evict_under(&mut self, path: &Path) -> Vec<PathBuf> {
        let doomed: Vec<PathBuf> = self
            .by_path
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        for p in &doomed {
            if let Some(scheduler) = self.by_path.remove(p) {
                scheduler.close();
            }
        }
        doomed
    }

    /// Re-key documents after `old` was renamed to `new`, pointing each one
    /// at its new location.
    pub fn rebase(&mut self, old: &Path, new: &Path) -> usize {
        let moved: Vec<PathBuf> = self
            .by_path
            .keys()
            .filter(|p| p.starts_with(old))
            .cloned()
            .collect();
        for p in &moved {
            if let Some(scheduler) = self.by_path.remove(p) {
                let target = match p.strip_prefix(old) {
                    Ok(rest) if !rest.as_os_str().is_empty() => new.join(rest),
                    _ => new.to_path_buf(),
                };
                scheduler.retarget(target.clone());
                self.by_path.insert(target, scheduler);
            }
        }
        moved.len()
    }
}
