use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::autosave::OpenDocuments;
use crate::error::{HubError, LoadError};
use crate::session::SessionRegistry;
use crate::watcher::FsEvent;

/// What the hub did (or should do) about an outside change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Reconciliation {
    /// References to a vanished path were dropped and its documents closed.
    Evicted {
        path: PathBuf,
        closed: Vec<PathBuf>,
    },
    /// The listing of this folder is stale.
    RefreshListing { dir: PathBuf },
    /// An open document changed on disk behind our back.
    ExternallyModified { path: PathBuf },
}

/// Drop every reference to `path` (and anything under it): open documents
/// are closed first so no pending save can recreate the file.
pub fn evict(
    path: &Path,
    sessions: &mut SessionRegistry,
    documents: &mut OpenDocuments,
) -> Option<Reconciliation> {
    let closed = documents.evict_under(path);
    let cleared = sessions.clear_file_everywhere(path);
    if closed.is_empty() && !cleared {
        return None;
    }
    log::info!(
        "Evicted {} ({} open document(s) closed)",
        path.display(),
        closed.len()
    );
    Some(Reconciliation::Evicted {
        path: path.to_path_buf(),
        closed,
    })
}

/// Apply one watcher event to the session and document state.
pub fn reconcile_event(
    event: &FsEvent,
    sessions: &mut SessionRegistry,
    documents: &mut OpenDocuments,
) -> Vec<Reconciliation> {
    let mut actions = Vec::new();
    match event {
        FsEvent::Created { path } => {
            push_refresh(&mut actions, path);
        }
        FsEvent::Deleted { path } => {
            actions.extend(evict(path, sessions, documents));
            push_refresh(&mut actions, path);
        }
        FsEvent::Renamed { from, to } => {
            // Outside renames don't follow the file; the old path is gone.
            actions.extend(evict(from, sessions, documents));
            push_refresh(&mut actions, from);
            push_refresh(&mut actions, to);
        }
        FsEvent::Modified { path } => {
            if documents.contains(path) {
                actions.push(Reconciliation::ExternallyModified {
                    path: path.to_path_buf(),
                });
            }
        }
    }
    actions
}

/// Classify a failed load. A file that is gone is evicted everywhere; any
/// other failure leaves selection and sessions untouched.
pub fn reconcile_load_failure(
    path: &Path,
    err: &HubError,
    sessions: &mut SessionRegistry,
    documents: &mut OpenDocuments,
) -> LoadError {
    let classified = LoadError::from(err);
    match &classified {
        LoadError::NotFound => {
            log::warn!("{} no longer exists, clearing references", path.display());
            evict(path, sessions, documents);
        }
        LoadError::Other(message) => {
            log::warn!("Failed to load {}: {}", path.display(), message);
        }
    }
    classified
}

fn push_refresh(actions: &mut Vec<Reconciliation>, path: &Path) {
    if let Some(dir) = path.parent() {
        let refresh = Reconciliation::RefreshListing {
            dir: dir.to_path_buf(),
        };
        if !actions.contains(&refresh) {
            actions.push(refresh);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LogNotifier;
    use crate::autosave::SaveScheduler;
    use crate::document::{Document, DocumentContent};
    use crate::session::{AppView, StateStore};
    use crate::testing::MemoryBridge;
    use std::sync::Arc;
    use std::time::Duration;

    fn registry() -> SessionRegistry {
        SessionRegistry::restore(StateStore::in_memory())
    }

    fn open(documents: &mut OpenDocuments, path: &str) -> SaveScheduler {
        let doc = Document::loaded(PathBuf::from(path), DocumentContent::Text("x".into())).unwrap();
        let scheduler = SaveScheduler::new(
            doc,
            Arc::new(MemoryBridge::default()),
            Arc::new(LogNotifier),
            Duration::from_millis(2000),
        );
        documents.insert(scheduler.clone());
        scheduler
    }

    #[tokio::test]
    async fn test_deleted_file_is_evicted_and_others_kept() {
        let mut sessions = registry();
        let mut documents = OpenDocuments::new();
        sessions.set_session(AppView::Editor, "/w/a.md");
        sessions.set_session(AppView::Kanban, "/w/board.kanban");
        sessions.set_selected_file(Some("/w/a.md".into()));
        let doc = open(&mut documents, "/w/a.md");

        let actions = reconcile_event(
            &FsEvent::Deleted { path: "/w/a.md".into() },
            &mut sessions,
            &mut documents,
        );

        assert_eq!(
            actions,
            vec![
                Reconciliation::Evicted {
                    path: "/w/a.md".into(),
                    closed: vec!["/w/a.md".into()],
                },
                Reconciliation::RefreshListing { dir: "/w".into() },
            ]
        );
        assert!(doc.is_closed());
        assert!(documents.is_empty());
        assert_eq!(sessions.selected_file(), None);
        assert_eq!(sessions.session(AppView::Editor), None);
        assert_eq!(
            sessions.session(AppView::Kanban),
            Some(Path::new("/w/board.kanban"))
        );
    }

    #[tokio::test]
    async fn test_deleted_folder_evicts_everything_below_it() {
        let mut sessions = registry();
        let mut documents = OpenDocuments::new();
        sessions.set_session(AppView::Canvas, "/w/plans/map.canvas");
        sessions.set_session(AppView::Editor, "/w/plans-old/x.md");
        open(&mut documents, "/w/plans/deep/todo.kanban");

        let actions = reconcile_event(
            &FsEvent::Deleted { path: "/w/plans".into() },
            &mut sessions,
            &mut documents,
        );

        assert!(matches!(&actions[0], Reconciliation::Evicted { closed, .. } if closed.len() == 1));
        assert_eq!(sessions.session(AppView::Canvas), None);
        // sibling with a shared name prefix is not inside the folder
        assert_eq!(
            sessions.session(AppView::Editor),
            Some(Path::new("/w/plans-old/x.md"))
        );
    }

    #[test]
    fn test_unreferenced_delete_only_refreshes() {
        let mut sessions = registry();
        let mut documents = OpenDocuments::new();
        let actions = reconcile_event(
            &FsEvent::Deleted { path: "/w/stray.md".into() },
            &mut sessions,
            &mut documents,
        );
        assert_eq!(actions, vec![Reconciliation::RefreshListing { dir: "/w".into() }]);
    }

    #[test]
    fn test_created_refreshes_parent() {
        let mut sessions = registry();
        let mut documents = OpenDocuments::new();
        let actions = reconcile_event(
            &FsEvent::Created { path: "/w/sub/new.md".into() },
            &mut sessions,
            &mut documents,
        );
        assert_eq!(actions, vec![Reconciliation::RefreshListing { dir: "/w/sub".into() }]);
    }

    #[tokio::test]
    async fn test_outside_rename_evicts_old_path() {
        let mut sessions = registry();
        let mut documents = OpenDocuments::new();
        sessions.set_selected_file(Some("/w/a.md".into()));
        open(&mut documents, "/w/a.md");

        let actions = reconcile_event(
            &FsEvent::Renamed {
                from: "/w/a.md".into(),
                to: "/w/b.md".into(),
            },
            &mut sessions,
            &mut documents,
        );

        assert_eq!(actions.len(), 2);
        assert_eq!(sessions.selected_file(), None);
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn test_modified_only_matters_for_open_documents() {
        let mut sessions = registry();
        let mut documents = OpenDocuments::new();
        sessions.set_selected_file(Some("/w/unopened.md".into()));

        let quiet = reconcile_event(
            &FsEvent::Modified { path: "/w/unopened.md".into() },
            &mut sessions,
            &mut documents,
        );
        assert!(quiet.is_empty());
        assert_eq!(sessions.selected_file(), Some(Path::new("/w/unopened.md")));

        open(&mut documents, "/w/open.md");
        let flagged = reconcile_event(
            &FsEvent::Modified { path: "/w/open.md".into() },
            &mut sessions,
            &mut documents,
        );
        assert_eq!(
            flagged,
            vec![Reconciliation::ExternallyModified { path: "/w/open.md".into() }]
        );
    }

    #[test]
    fn test_load_failure_classification() {
        let mut sessions = registry();
        let mut documents = OpenDocuments::new();
        sessions.set_selected_file(Some("/w/a.md".into()));
        sessions.set_session(AppView::Editor, "/w/a.md");

        let denied = HubError::from_io(
            "/w/a.md",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let outcome = reconcile_load_failure(Path::new("/w/a.md"), &denied, &mut sessions, &mut documents);
        assert!(matches!(outcome, LoadError::Other(_)));
        assert_eq!(sessions.selected_file(), Some(Path::new("/w/a.md")));

        let gone = HubError::NotFound("/w/a.md".into());
        let outcome = reconcile_load_failure(Path::new("/w/a.md"), &gone, &mut sessions, &mut documents);
        assert_eq!(outcome, LoadError::NotFound);
        assert_eq!(sessions.selected_file(), None);
        assert_eq!(sessions.session(AppView::Editor), None);
    }
}
