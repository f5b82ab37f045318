//! Game Hub core: autosave, view sessions and file-system reconciliation for
//! a workspace of markdown notes, kanban boards and canvases.
//!
//! The [`Hub`] ties the pieces together. Each open document is owned by a
//! [`SaveScheduler`] that debounces edits into writes through a
//! [`FileBridge`]; a [`SessionRegistry`] remembers what every view had open;
//! and events from [`watch`] are folded back into both so nothing keeps
//! pointing at a file that is gone.

pub mod alerts;
pub mod autosave;
pub mod bridge;
pub mod canvas;
pub mod config;
pub mod dirty;
pub mod document;
pub mod error;
pub mod hub;
pub mod kanban;
pub mod reconciler;
pub mod session;
pub mod templates;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use alerts::{Alert, AlertLevel, ChannelNotifier, LogNotifier, Notifier};
pub use autosave::{OpenDocuments, SaveOutcome, SaveScheduler, DEFAULT_AUTOSAVE_DELAY};
pub use bridge::{FileBridge, FileNode, LocalFs};
pub use canvas::{CanvasEdge, CanvasError, CanvasGraph, CanvasNode};
pub use config::HubConfig;
pub use document::{Document, DocumentContent, DocumentKind};
pub use error::{HubError, LoadError, Result};
pub use hub::Hub;
pub use kanban::{Card, CardDraft, CardPatch, Column, KanbanBoard, KanbanError, Priority};
pub use reconciler::Reconciliation;
pub use session::{AppView, SessionRegistry, StateStore};
pub use watcher::{watch, FsEvent, WatchSubscription, DEFAULT_WATCH_DEBOUNCE};
