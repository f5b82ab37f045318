use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::canvas::CanvasGraph;
use crate::dirty::DirtyTracker;
use crate::error::{HubError, Result};
use crate::kanban::KanbanBoard;
use crate::session::AppView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Markdown,
    Kanban,
    Canvas,
}

impl DocumentKind {
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(DocumentKind::Markdown),
            "kanban" => Some(DocumentKind::Kanban),
            "canvas" => Some(DocumentKind::Canvas),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Markdown => "md",
            DocumentKind::Kanban => "kanban",
            DocumentKind::Canvas => "canvas",
        }
    }

    /// The view that edits this kind of document.
    pub fn view(&self) -> AppView {
        match self {
            DocumentKind::Markdown => AppView::Editor,
            DocumentKind::Kanban => AppView::Kanban,
            DocumentKind::Canvas => AppView::Canvas,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Markdown => "markdown",
            DocumentKind::Kanban => "kanban",
            DocumentKind::Canvas => "canvas",
        }
    }
}

/// In-memory editable form of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentContent {
    Text(String),
    Kanban(KanbanBoard),
    Canvas(CanvasGraph),
}

impl DocumentContent {
    pub fn parse(kind: DocumentKind, path: &Path, raw: &str) -> Result<Self> {
        match kind {
            DocumentKind::Markdown => Ok(DocumentContent::Text(raw.to_string())),
            DocumentKind::Kanban => {
                // Syntax errors keep their serde detail; shape errors come from the board.
                serde_json::from_str::<serde_json::Value>(raw).map_err(|source| {
                    HubError::Parse {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                Ok(DocumentContent::Kanban(KanbanBoard::from_json(raw)?))
            }
            DocumentKind::Canvas => CanvasGraph::from_json(raw)
                .map(DocumentContent::Canvas)
                .map_err(|source| HubError::Parse {
                    path: path.to_path_buf(),
                    source,
                }),
        }
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            DocumentContent::Text(_) => DocumentKind::Markdown,
            DocumentContent::Kanban(_) => DocumentKind::Kanban,
            DocumentContent::Canvas(_) => DocumentKind::Canvas,
        }
    }

    /// The exact bytes written to disk. JSON documents go through
    /// `serde_json::Value`, whose maps are ordered, so key order is stable.
    pub fn serialize(&self) -> Result<String> {
        match self {
            DocumentContent::Text(text) => Ok(text.clone()),
            DocumentContent::Kanban(board) => canonical_json(board),
            DocumentContent::Canvas(graph) => canonical_json(graph),
        }
    }
}

fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value).map_err(HubError::Encode)?;
    serde_json::to_string_pretty(&value).map_err(HubError::Encode)
}

/// An open file: its path, current content and what was last written.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub content: DocumentContent,
    tracker: DirtyTracker,
}

impl Document {
    /// Wrap freshly loaded content. The snapshot is the canonical form, so a
    /// file written by another tool with different formatting is not dirty.
    pub fn loaded(path: PathBuf, content: DocumentContent) -> Result<Self> {
        let snapshot = content.serialize()?;
        Ok(Self {
            path,
            content,
            tracker: DirtyTracker::new(snapshot),
        })
    }

    pub fn kind(&self) -> DocumentKind {
        self.content.kind()
    }

    pub fn is_dirty(&self) -> Result<bool> {
        Ok(self.tracker.is_dirty(&self.content.serialize()?))
    }

    pub fn tracker(&self) -> &DirtyTracker {
        &self.tracker
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut DirtyTracker {
        &mut self.tracker
    }
}
