use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HubError>;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid document {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not encode document: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("A file with this name already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Unsupported file type: {}", .0.display())]
    Unsupported(PathBuf),

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Document is not open: {}", .0.display())]
    NotOpen(PathBuf),

    #[error(transparent)]
    Kanban(#[from] crate::kanban::KanbanError),

    #[error(transparent)]
    Canvas(#[from] crate::canvas::CanvasError),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("State store error: {0}")]
    Store(String),
}

impl HubError {
    /// Map an io error onto `NotFound` when the OS says the path is gone.
    pub fn from_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == std::io::ErrorKind::NotFound {
            HubError::NotFound(path)
        } else {
            HubError::Io { path, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HubError::NotFound(_))
    }
}

/// How a failed load is presented: a vanished file is evicted, anything else
/// is shown inline and the selection is kept so the user can retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    NotFound,
    Other(String),
}

impl From<&HubError> for LoadError {
    fn from(err: &HubError) -> Self {
        if err.is_not_found() {
            LoadError::NotFound
        } else {
            LoadError::Other(err.to_string())
        }
    }
}
