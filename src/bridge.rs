use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{HubError, Result};

// Entry in the workspace tree shown by the explorer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "isDirectory")]
    pub is_dir: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

/// File access used by the hub. Everything that touches the disk goes
/// through here so the save and reconcile logic can run against a fake.
#[async_trait]
pub trait FileBridge: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<String>;

    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Like `write_file` but fails with `AlreadyExists` instead of overwriting.
    async fn create_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Removes a file, or a directory with everything below it.
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Renames within the same directory and returns the new path.
    async fn rename_file(&self, path: &Path, new_name: &str) -> Result<PathBuf>;

    async fn create_dir(&self, parent: &Path, name: &str) -> Result<PathBuf>;

    async fn list_tree(&self, root: &Path) -> Result<Vec<FileNode>>;
}

/// The real thing, on top of `tokio::fs`.
#[derive(Debug, Default, Clone)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileBridge for LocalFs {
    async fn read_file(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .await
            .map_err(|e| HubError::from_io(path, e))
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        fs::write(path, content)
            .await
            .map_err(|e| HubError::from_io(path, e))
    }

    async fn create_file(&self, path: &Path, content: &str) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => HubError::AlreadyExists(path.to_path_buf()),
                _ => HubError::from_io(path, e),
            })?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| HubError::from_io(path, e))?;
        file.flush().await.map_err(|e| HubError::from_io(path, e))
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| HubError::from_io(path, e))?;
        let removed = if metadata.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };
        removed.map_err(|e| HubError::from_io(path, e))
    }

    async fn rename_file(&self, path: &Path, new_name: &str) -> Result<PathBuf> {
        let parent = path
            .parent()
            .ok_or_else(|| HubError::NotFound(path.to_path_buf()))?;
        let new_path = parent.join(new_name);

        if fs::try_exists(&new_path).await.unwrap_or(false) {
            return Err(HubError::AlreadyExists(new_path));
        }

        fs::rename(path, &new_path)
            .await
            .map_err(|e| HubError::from_io(path, e))?;
        Ok(new_path)
    }

    async fn create_dir(&self, parent: &Path, name: &str) -> Result<PathBuf> {
        let path = parent.join(name);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Err(HubError::AlreadyExists(path));
        }
        fs::create_dir_all(&path)
            .await
            .map_err(|e| HubError::from_io(&path, e))?;
        Ok(path)
    }

    async fn list_tree(&self, root: &Path) -> Result<Vec<FileNode>> {
        let root = root.to_path_buf();
        let join_root = root.clone();
        tokio::task::spawn_blocking(move || read_tree(&root))
            .await
            .map_err(|e| HubError::from_io(&join_root, std::io::Error::other(e)))?
    }
}

fn read_tree(root: &Path) -> Result<Vec<FileNode>> {
    let metadata = std::fs::metadata(root).map_err(|e| HubError::from_io(root, e))?;
    if !metadata.is_dir() {
        return Err(HubError::from_io(
            root,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Path is not a directory"),
        ));
    }
    read_children(root)
}

fn read_children(dir: &Path) -> Result<Vec<FileNode>> {
    let mut nodes = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| HubError::from_io(dir, e))? {
        let entry = entry.map_err(|e| HubError::from_io(dir, e))?;
        let path = entry.path();
        let is_dir = entry
            .file_type()
            .map_err(|e| HubError::from_io(&path, e))?
            .is_dir();
        let children = if is_dir {
            Some(read_children(&path)?)
        } else {
            None
        };
        nodes.push(FileNode {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: path.to_string_lossy().into_owned(),
            is_dir,
            children,
        });
    }

    // Folders first, then by name
    nodes.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(nodes)
}
