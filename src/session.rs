use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{HubError, Result};

const KEY_CURRENT_VIEW: &str = "game-hub-current-view";
const KEY_SIDEBAR_VISIBLE: &str = "game-hub-sidebar-visible";
const KEY_SELECTED_FILE: &str = "game-hub-selected-file";
const KEY_CURRENT_FOLDER: &str = "game-hub-current-folder";
const KEY_VIEW_SESSIONS: &str = "game-hub-view-sessions";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppView {
    #[default]
    Home,
    Editor,
    Kanban,
    Canvas,
}

impl AppView {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppView::Home => "home",
            AppView::Editor => "editor",
            AppView::Kanban => "kanban",
            AppView::Canvas => "canvas",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "home" => Some(AppView::Home),
            "editor" => Some(AppView::Editor),
            "kanban" => Some(AppView::Kanban),
            "canvas" => Some(AppView::Canvas),
            _ => None,
        }
    }
}

impl fmt::Display for AppView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---- Durable key-value store ----

/// String key-value pairs kept in a single JSON file. Every `set` rewrites
/// the file before returning. A store without a path lives in memory only.
#[derive(Debug, Default)]
pub struct StateStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl StateStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| match serde_json::from_str(&content) {
                Ok(values) => Some(values),
                Err(e) => {
                    log::warn!("Ignoring malformed state file {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();
        Self {
            path: Some(path),
            values,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.values.insert(key.to_string(), value.into());
        self.flush()
    }

    pub fn remove(&mut self, key: &str) -> Result<()> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HubError::from_io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(&self.values)
            .map_err(|e| HubError::Store(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| HubError::from_io(path, e))
    }
}

// ---- Per-view sessions ----

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ViewSessions {
    #[serde(default)]
    editor: Option<PathBuf>,
    #[serde(default)]
    kanban: Option<PathBuf>,
    #[serde(default)]
    canvas: Option<PathBuf>,
    // Always null; kept so the stored object has one entry per view.
    #[serde(default)]
    home: Option<PathBuf>,
}

impl ViewSessions {
    fn slot_mut(&mut self, view: AppView) -> Option<&mut Option<PathBuf>> {
        match view {
            AppView::Home => None,
            AppView::Editor => Some(&mut self.editor),
            AppView::Kanban => Some(&mut self.kanban),
            AppView::Canvas => Some(&mut self.canvas),
        }
    }

    fn get(&self, view: AppView) -> Option<&Path> {
        match view {
            AppView::Home => None,
            AppView::Editor => self.editor.as_deref(),
            AppView::Kanban => self.kanban.as_deref(),
            AppView::Canvas => self.canvas.as_deref(),
        }
    }

    fn slots_mut(&mut self) -> [&mut Option<PathBuf>; 3] {
        [&mut self.editor, &mut self.kanban, &mut self.canvas]
    }
}

/// Which file each view had open, what is selected right now and the bits
/// of layout that survive a restart.
#[derive(Debug)]
pub struct SessionRegistry {
    store: StateStore,
    current_view: AppView,
    sidebar_visible: bool,
    selected_file: Option<PathBuf>,
    current_folder: Option<PathBuf>,
    sessions: ViewSessions,
}

impl SessionRegistry {
    /// Load whatever the store remembers. Referenced files are not checked
    /// here; a vanished file is discovered when something tries to open it.
    pub fn restore(store: StateStore) -> Self {
        let current_view = store
            .get(KEY_CURRENT_VIEW)
            .and_then(AppView::parse)
            .unwrap_or_default();
        let sidebar_visible = store
            .get(KEY_SIDEBAR_VISIBLE)
            .map_or(true, |v| v == "true");
        let selected_file = store.get(KEY_SELECTED_FILE).map(PathBuf::from);
        let current_folder = store.get(KEY_CURRENT_FOLDER).map(PathBuf::from);
        let sessions = match store.get(KEY_VIEW_SESSIONS) {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                log::warn!("Failed to parse view sessions: {}", e);
                ViewSessions::default()
            }),
            None => ViewSessions::default(),
        };

        Self {
            store,
            current_view,
            sidebar_visible,
            selected_file,
            current_folder,
            sessions,
        }
    }

    pub fn current_view(&self) -> AppView {
        self.current_view
    }

    pub fn selected_file(&self) -> Option<&Path> {
        self.selected_file.as_deref()
    }

    pub fn current_folder(&self) -> Option<&Path> {
        self.current_folder.as_deref()
    }

    pub fn sidebar_visible(&self) -> bool {
        self.sidebar_visible
    }

    pub fn session(&self, view: AppView) -> Option<&Path> {
        self.sessions.get(view)
    }

    pub fn set_current_view(&mut self, view: AppView) {
        self.current_view = view;
        self.write(KEY_CURRENT_VIEW, Some(view.as_str().to_string()));
    }

    /// Enter `view` and reselect the file it last had open. Home has no file.
    pub fn switch_to_view(&mut self, view: AppView) -> Option<PathBuf> {
        self.set_current_view(view);
        let restored = self.sessions.get(view).map(Path::to_path_buf);
        if let Some(file) = &restored {
            self.set_selected_file(Some(file.clone()));
        }
        restored
    }

    pub fn set_selected_file(&mut self, file: Option<PathBuf>) {
        let stored = file.as_ref().map(|f| f.to_string_lossy().into_owned());
        self.selected_file = file;
        self.write(KEY_SELECTED_FILE, stored);
    }

    pub fn set_current_folder(&mut self, folder: Option<PathBuf>) {
        let stored = folder.as_ref().map(|f| f.to_string_lossy().into_owned());
        self.current_folder = folder;
        self.write(KEY_CURRENT_FOLDER, stored);
    }

    pub fn set_sidebar_visible(&mut self, visible: bool) {
        self.sidebar_visible = visible;
        self.write(KEY_SIDEBAR_VISIBLE, Some(visible.to_string()));
    }

    pub fn set_session(&mut self, view: AppView, file: impl Into<PathBuf>) {
        if let Some(slot) = self.sessions.slot_mut(view) {
            *slot = Some(file.into());
            self.write_sessions();
        }
    }

    pub fn clear_session(&mut self, view: AppView) {
        if let Some(slot) = self.sessions.slot_mut(view) {
            if slot.take().is_some() {
                self.write_sessions();
            }
        }
    }

    /// Forget `path` (or anything below it, for a removed folder) in every
    /// view session and in the global selection. Returns whether anything
    /// was cleared.
    pub fn clear_file_everywhere(&mut self, path: &Path) -> bool {
        let mut sessions_changed = false;
        for slot in self.sessions.slots_mut() {
            if slot.as_deref().map_or(false, |p| p.starts_with(path)) {
                *slot = None;
                sessions_changed = true;
            }
        }
        if sessions_changed {
            self.write_sessions();
        }

        let selection_cleared = self
            .selected_file
            .as_deref()
            .map_or(false, |p| p.starts_with(path));
        if selection_cleared {
            self.set_selected_file(None);
        }
        sessions_changed || selection_cleared
    }

    /// Point every reference to `old` (or below it) at the matching path
    /// under `new`.
    pub fn replace_file_everywhere(&mut self, old: &Path, new: &Path) -> bool {
        let rebase = |p: &Path| p.strip_prefix(old).ok().map(|rest| {
            if rest.as_os_str().is_empty() {
                new.to_path_buf()
            } else {
                new.join(rest)
            }
        });

        let mut sessions_changed = false;
        for slot in self.sessions.slots_mut() {
            if let Some(moved) = slot.as_deref().and_then(rebase) {
                *slot = Some(moved);
                sessions_changed = true;
            }
        }
        if sessions_changed {
            self.write_sessions();
        }

        let moved_selection = self.selected_file.as_deref().and_then(rebase);
        let selection_changed = moved_selection.is_some();
        if let Some(moved) = moved_selection {
            self.set_selected_file(Some(moved));
        }
        sessions_changed || selection_changed
    }

    fn write_sessions(&mut self) {
        match serde_json::to_string(&self.sessions) {
            Ok(json) => self.write(KEY_VIEW_SESSIONS, Some(json)),
            Err(e) => log::warn!("Failed to encode view sessions: {}", e),
        }
    }

    fn write(&mut self, key: &str, value: Option<String>) {
        let result = match value {
            Some(value) => self.store.set(key, value),
            None => self.store.remove(key),
        };
        if let Err(e) = result {
            log::warn!("Failed to persist {}: {}", key, e);
        }
    }
}
