use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::bridge::{FileBridge, FileNode};
use crate::error::{HubError, Result};

/// Let spawned timer and save tasks run to their next suspension point.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedWrite {
    pub path: PathBuf,
    pub content: String,
    pub at: Instant,
}

/// In-memory file bridge with knobs for stalling and failing writes.
#[derive(Default)]
pub(crate) struct MemoryBridge {
    files: Mutex<BTreeMap<PathBuf, String>>,
    writes: Mutex<Vec<RecordedWrite>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    fail_writes: AtomicBool,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MemoryBridge {
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files
            .lock()
            .unwrap()
            .insert(path.into(), content.into());
    }

    pub fn content(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }

    /// Every write from now on waits for a permit on the returned semaphore.
    pub fn hold_writes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn max_concurrent_writes(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileBridge for MemoryBridge {
    async fn read_file(&self, path: &Path) -> Result<String> {
        self.content(path)
            .ok_or_else(|| HubError::NotFound(path.to_path_buf()))
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let result = if self.fail_writes.load(Ordering::SeqCst) {
            Err(HubError::from_io(
                path,
                std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            ))
        } else {
            self.insert(path, content);
            self.writes.lock().unwrap().push(RecordedWrite {
                path: path.to_path_buf(),
                content: content.to_string(),
                at: Instant::now(),
            });
            Ok(())
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn create_file(&self, path: &Path, content: &str) -> Result<()> {
        if self.exists(path) {
            return Err(HubError::AlreadyExists(path.to_path_buf()));
        }
        self.insert(path, content);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        let before = files.len();
        files.retain(|p, _| !p.starts_with(path));
        if files.len() == before {
            return Err(HubError::NotFound(path.to_path_buf()));
        }
        Ok(())
    }

    async fn rename_file(&self, path: &Path, new_name: &str) -> Result<PathBuf> {
        let parent = path
            .parent()
            .ok_or_else(|| HubError::NotFound(path.to_path_buf()))?;
        let new_path = parent.join(new_name);
        let mut files = self.files.lock().unwrap();
        if files.keys().any(|p| p.starts_with(&new_path)) {
            return Err(HubError::AlreadyExists(new_path));
        }
        // a folder is every file below it
        let moved: Vec<PathBuf> = files
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        if moved.is_empty() {
            return Err(HubError::NotFound(path.to_path_buf()));
        }
        for old in moved {
            if let Some(content) = files.remove(&old) {
                let rest = old.strip_prefix(path).unwrap_or(Path::new(""));
                let target = if rest.as_os_str().is_empty() {
                    new_path.clone()
                } else {
                    new_path.join(rest)
                };
                files.insert(target, content);
            }
        }
        Ok(new_path)
    }

    async fn create_dir(&self, parent: &Path, name: &str) -> Result<PathBuf> {
        Ok(parent.join(name))
    }

    async fn list_tree(&self, root: &Path) -> Result<Vec<FileNode>> {
        let files = self.files.lock().unwrap();
        Ok(files
            .keys()
            .filter(|p| p.parent() == Some(root))
            .map(|p| FileNode {
                name: p
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: p.to_string_lossy().into_owned(),
                is_dir: false,
                children: None,
            })
            .collect())
    }
}
