use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::alerts::{Alert, AlertLevel, LogNotifier, Notifier};
use crate::autosave::{OpenDocuments, SaveOutcome, SaveScheduler};
use crate::bridge::{FileBridge, FileNode, LocalFs};
use crate::config::HubConfig;
use crate::document::{Document, DocumentContent, DocumentKind};
use crate::error::{HubError, LoadError, Result};
use crate::reconciler::{evict, reconcile_event, reconcile_load_failure, Reconciliation};
use crate::session::{AppView, SessionRegistry, StateStore};
use crate::templates;
use crate::watcher::FsEvent;

/// Application state shared by every view: which files are open, what each
/// view last showed, and the file access they all go through.
pub struct Hub {
    config: HubConfig,
    bridge: Arc<dyn FileBridge>,
    notifier: Arc<dyn Notifier>,
    // Lock order: sessions before documents. Never held across an await.
    sessions: Mutex<SessionRegistry>,
    documents: Mutex<OpenDocuments>,
}

impl Hub {
    pub fn new(
        config: HubConfig,
        bridge: Arc<dyn FileBridge>,
        notifier: Arc<dyn Notifier>,
        store: StateStore,
    ) -> Self {
        Self {
            config,
            bridge,
            notifier,
            sessions: Mutex::new(SessionRegistry::restore(store)),
            documents: Mutex::new(OpenDocuments::new()),
        }
    }

    /// Local disk, alerts to the log, state file from the config.
    pub fn with_local_fs(config: HubConfig) -> Self {
        let store = match config.state_file() {
            Some(path) => StateStore::open(path),
            None => StateStore::in_memory(),
        };
        Self::new(config, Arc::new(LocalFs::new()), Arc::new(LogNotifier), store)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn sessions(&self) -> MutexGuard<'_, SessionRegistry> {
        self.sessions.lock().expect("sessions mutex")
    }

    fn documents(&self) -> MutexGuard<'_, OpenDocuments> {
        self.documents.lock().expect("documents mutex")
    }

    pub fn document(&self, path: &Path) -> Option<SaveScheduler> {
        self.documents().get(path)
    }

    pub fn open_paths(&self) -> Vec<PathBuf> {
        self.documents().paths()
    }

    // ---- Opening and saving ----

    /// Select `path`, remember it as its view's session and load it.
    ///
    /// A file that no longer exists is cleared from the selection and every
    /// session. Any other failure is returned for inline display and the
    /// selection is kept so the user can retry.
    pub async fn open_file(&self, path: &Path) -> std::result::Result<SaveScheduler, LoadError> {
        let kind = DocumentKind::from_path(path)
            .ok_or_else(|| LoadError::from(&HubError::Unsupported(path.to_path_buf())))?;

        let previous = self.sessions().selected_file().map(Path::to_path_buf);
        if let Some(previous) = previous.filter(|p| p != path) {
            self.flush_quietly(&previous).await;
        }

        {
            let mut sessions = self.sessions();
            sessions.set_selected_file(Some(path.to_path_buf()));
            sessions.set_session(kind.view(), path);
            sessions.set_current_view(kind.view());
        }

        if let Some(open) = self.document(path) {
            return Ok(open);
        }

        let loaded = match self.bridge.read_file(path).await {
            Ok(raw) => DocumentContent::parse(kind, path, &raw)
                .and_then(|content| Document::loaded(path.to_path_buf(), content)),
            Err(e) => Err(e),
        };

        match loaded {
            Ok(document) => {
                let mut documents = self.documents();
                if let Some(open) = documents.get(path) {
                    return Ok(open);
                }
                let scheduler = SaveScheduler::new(
                    document,
                    Arc::clone(&self.bridge),
                    Arc::clone(&self.notifier),
                    self.config.autosave_delay(),
                );
                documents.insert(scheduler.clone());
                log::info!("Opened {} as {}", path.display(), kind.as_str());
                Ok(scheduler)
            }
            Err(e) => {
                let mut sessions = self.sessions();
                let mut documents = self.documents();
                Err(reconcile_load_failure(path, &e, &mut sessions, &mut documents))
            }
        }
    }

    /// Explicit save: write now if dirty.
    pub async fn save(&self, path: &Path) -> Result<SaveOutcome> {
        let document = self
            .document(path)
            .ok_or_else(|| HubError::NotOpen(path.to_path_buf()))?;
        document.flush().await
    }

    /// Flush every open document. All are attempted; the first failure is
    /// returned after the rest have had their turn.
    pub async fn flush_all(&self) -> Result<()> {
        let mut first_error = None;
        let open = self.documents().all();
        for document in open {
            if let Err(e) = document.flush().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn flush_quietly(&self, path: &Path) {
        let open = self.document(path);
        if let Some(document) = open {
            if let Err(e) = document.flush().await {
                log::warn!("Could not save {} before leaving it: {}", path.display(), e);
            }
        }
    }

    /// Save and stop tracking `path`. If the save fails the document stays
    /// open with its edits.
    pub async fn close_file(&self, path: &Path) -> Result<()> {
        let document = self
            .document(path)
            .ok_or_else(|| HubError::NotOpen(path.to_path_buf()))?;
        document.flush().await?;
        document.close();
        self.documents().remove(path);
        log::debug!("Closed {}", path.display());
        Ok(())
    }

    /// Leave the current view for `view`, saving open work first. Returns
    /// the file `view` had open last time, now selected again.
    pub async fn navigate_to(&self, view: AppView) -> Option<PathBuf> {
        if let Err(e) = self.flush_all().await {
            log::warn!("Navigating to {} with unsaved changes: {}", view, e);
        }
        self.sessions().switch_to_view(view)
    }

    /// Save everything and close all documents.
    pub async fn shutdown(&self) {
        if let Err(e) = self.flush_all().await {
            log::error!("Unsaved changes at shutdown: {}", e);
        }
        let open = self.documents().all();
        for document in open {
            document.close();
            document.wait_idle().await;
        }
        log::info!("Hub shut down");
    }

    // ---- File operations ----

    pub async fn list_tree(&self, root: &Path) -> Result<Vec<FileNode>> {
        self.bridge.list_tree(root).await
    }

    /// Create a file from a template (the kind's default when `template` is
    /// `None`). Blank or placeholder names get a timestamped name.
    pub async fn create_file(
        &self,
        dir: &Path,
        name: &str,
        kind: DocumentKind,
        template: Option<&str>,
    ) -> Result<PathBuf> {
        let template = match template {
            Some(id) => templates::find(id)
                .filter(|t| t.document_kind() == kind)
                .ok_or_else(|| HubError::UnknownTemplate(id.to_string()))?,
            None => templates::default_for(kind),
        };
        let now = Utc::now();
        let path = dir.join(templates::generate_file_name(name, kind, now));
        let content = template.instantiate(now).serialize()?;

        if let Err(e) = self.bridge.create_file(&path, &content).await {
            self.notifier
                .notify(Alert::error("Create failed", format!("Could not create file: {}", e)));
            return Err(e);
        }
        log::info!("Created {} from template {}", path.display(), template.id);
        Ok(path)
    }

    pub async fn create_folder(&self, parent: &Path, name: &str) -> Result<PathBuf> {
        let name = templates::sanitize_file_name(name);
        let path = self.bridge.create_dir(parent, &name).await?;
        log::info!("Created folder {}", path.display());
        Ok(path)
    }

    /// Delete a file or folder. Open documents at or under it are closed and
    /// every reference to it is cleared once the delete succeeds.
    pub async fn delete_file(&self, path: &Path) -> Result<()> {
        let affected = self.documents().under(path);
        for document in &affected {
            document.suspend();
        }
        for document in &affected {
            document.wait_idle().await;
        }

        match self.bridge.delete_file(path).await {
            Ok(()) => {
                let mut sessions = self.sessions();
                let mut documents = self.documents();
                evict(path, &mut sessions, &mut documents);
                log::info!("Deleted {}", path.display());
                Ok(())
            }
            Err(e) => {
                for document in &affected {
                    document.release();
                }
                self.notifier
                    .notify(Alert::error("Delete failed", format!("Could not delete: {}", e)));
                Err(e)
            }
        }
    }

    /// Rename in place. Pending edits are written to the old path first,
    /// then the file moves and every reference follows it.
    pub async fn rename_file(&self, path: &Path, new_name: &str) -> Result<PathBuf> {
        let new_name = rename_target(path, new_name)?;
        let affected = self.documents().under(path);
        for document in &affected {
            document.hold();
        }

        let result = self.flush_then_rename(path, &new_name, &affected).await;
        for document in &affected {
            document.release();
        }
        result
    }

    async fn flush_then_rename(
        &self,
        path: &Path,
        new_name: &str,
        affected: &[SaveScheduler],
    ) -> Result<PathBuf> {
        // A failed flush has already raised its own alert.
        for document in affected {
            document.flush().await?;
        }
        let new_path = match self.bridge.rename_file(path, new_name).await {
            Ok(new_path) => new_path,
            Err(e) => {
                self.notifier
                    .notify(Alert::error("Rename failed", format!("Could not rename: {}", e)));
                return Err(e);
            }
        };

        let mut sessions = self.sessions();
        let mut documents = self.documents();
        documents.rebase(path, &new_path);
        sessions.replace_file_everywhere(path, &new_path);
        log::info!("Renamed {} to {}", path.display(), new_path.display());
        Ok(new_path)
    }

    // ---- Outside changes ----

    /// Apply a watcher event. Modifications to open documents that only
    /// echo our own writes are dropped.
    pub async fn handle_fs_event(&self, event: &FsEvent) -> Vec<Reconciliation> {
        let actions = {
            let mut sessions = self.sessions();
            let mut documents = self.documents();
            reconcile_event(event, &mut sessions, &mut documents)
        };

        let mut applied = Vec::with_capacity(actions.len());
        for action in actions {
            if let Reconciliation::ExternallyModified { path } = &action {
                if !self.changed_on_disk(path).await {
                    continue;
                }
                self.notifier.notify(Alert::new(
                    AlertLevel::Warning,
                    "File changed on disk",
                    format!("{} was modified outside the hub", path.display()),
                ));
            }
            applied.push(action);
        }
        applied
    }

    async fn changed_on_disk(&self, path: &Path) -> bool {
        let Some(document) = self.document(path) else {
            return false;
        };
        if document.is_in_flight() {
            return false;
        }
        let raw = match self.bridge.read_file(path).await {
            Ok(raw) => raw,
            Err(_) => return false,
        };
        match DocumentContent::parse(document.kind(), path, &raw).and_then(|c| c.serialize()) {
            Ok(on_disk) => on_disk != document.persisted_snapshot(),
            // unreadable now, but it was readable when we wrote it
            Err(_) => true,
        }
    }
}

/// The name `path` should get. Blank names are refused and separators are
/// replaced so the entry stays in its folder. A document renamed without an
/// extension keeps its old one so the hub can still open it.
fn rename_target(path: &Path, new_name: &str) -> Result<String> {
    let trimmed = new_name.trim();
    if trimmed.is_empty() {
        return Err(HubError::InvalidName(new_name.to_string()));
    }
    let name = templates::sanitize_file_name(trimmed);
    if name == "." || name == ".." {
        return Err(HubError::InvalidName(new_name.to_string()));
    }

    let is_document = DocumentKind::from_path(path).is_some();
    match path.extension() {
        Some(ext) if is_document && Path::new(&name).extension().is_none() => {
            Ok(format!("{}.{}", name, ext.to_string_lossy()))
        }
        _ => Ok(name),
    }
}
