//! Session-scoped state.
//!
//! One [`SessionState`] is constructed per process and passed by mutable
//! reference into every operation; there are no process-wide singletons.
//! Everything here lives exactly as long as the session: the context
//! ledger, the conversation history, the working-folder selection, the
//! per-session listing caches, and the set of names already archived.

use crate::config::Config;
use crate::ledger::ContextLedger;
use crate::models::{ChatRole, ChatTurn, FileListing, Folder, FolderListing};

/// Default label for the pre-configured root folder.
pub const ROOT_FOLDER_LABEL: &str = "(root)";

pub struct SessionState {
    pub ledger: ContextLedger,
    history: Vec<ChatTurn>,
    /// Currently selected folder: scope for file discovery and the upload
    /// destination. Defaults to the configured root.
    working_folder_id: String,
    working_folder_label: String,
    root_folder_id: String,
    /// Folder tree from the most recent `:folders`, kept so `:use <n>` can
    /// select by position without re-listing.
    folder_cache: Option<FolderListing>,
    /// Most recent file listing; anchors the batch-size bound for `:read`.
    file_cache: Option<CachedFiles>,
    /// Names already uploaded to storage this session. Lives outside the
    /// ledger so a ledger reset does not permit duplicate archive uploads.
    uploaded_names: std::collections::HashSet<String>,
}

/// A file listing remembered together with the scope that produced it.
pub struct CachedFiles {
    pub folder_id: String,
    pub deep: bool,
    pub listing: FileListing,
}

impl SessionState {
    pub fn new(config: &Config) -> Self {
        Self {
            ledger: ContextLedger::new(config.ingest.min_text_chars),
            history: Vec::new(),
            working_folder_id: config.drive.root_folder_id.clone(),
            working_folder_label: ROOT_FOLDER_LABEL.to_string(),
            root_folder_id: config.drive.root_folder_id.clone(),
            folder_cache: None,
            file_cache: None,
            uploaded_names: std::collections::HashSet::new(),
        }
    }

    // ---- conversation history (append-only) ----

    pub fn push_user(&mut self, content: String) {
        self.history.push(ChatTurn {
            role: ChatRole::User,
            content,
        });
    }

    pub fn push_assistant(&mut self, content: String) {
        self.history.push(ChatTurn {
            role: ChatRole::Assistant,
            content,
        });
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// The latest assistant turn, if the model has answered yet.
    pub fn last_assistant(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|turn| turn.role == ChatRole::Assistant)
            .map(|turn| turn.content.as_str())
    }

    // ---- working folder ----

    pub fn working_folder_id(&self) -> &str {
        &self.working_folder_id
    }

    pub fn working_folder_label(&self) -> &str {
        &self.working_folder_label
    }

    pub fn select_root(&mut self) {
        self.working_folder_id = self.root_folder_id.clone();
        self.working_folder_label = ROOT_FOLDER_LABEL.to_string();
        self.file_cache = None;
    }

    /// Selects a folder by bare id (e.g. from a `--folder` flag), using the
    /// id itself as the label.
    pub fn select_folder_id(&mut self, id: &str) {
        self.working_folder_id = id.to_string();
        self.working_folder_label = id.to_string();
        self.file_cache = None;
    }

    pub fn select_folder(&mut self, folder: &Folder) {
        self.working_folder_id = folder.id.clone();
        self.working_folder_label = folder.name.clone();
        self.file_cache = None;
    }

    // ---- listing caches ----

    pub fn cache_folders(&mut self, listing: FolderListing) {
        self.folder_cache = Some(listing);
    }

    pub fn cached_folders(&self) -> Option<&FolderListing> {
        self.folder_cache.as_ref()
    }

    pub fn cache_files(&mut self, folder_id: &str, deep: bool, listing: FileListing) {
        self.file_cache = Some(CachedFiles {
            folder_id: folder_id.to_string(),
            deep,
            listing,
        });
    }

    /// The cached listing, if it matches the requested scope.
    pub fn cached_files(&self, folder_id: &str, deep: bool) -> Option<&FileListing> {
        self.file_cache
            .as_ref()
            .filter(|c| c.folder_id == folder_id && c.deep == deep)
            .map(|c| &c.listing)
    }

    // ---- archival bookkeeping ----

    /// Records a name as uploaded; returns false if it already was.
    pub fn mark_uploaded(&mut self, name: &str) -> bool {
        self.uploaded_names.insert(name.to_string())
    }

    pub fn already_uploaded(&self, name: &str) -> bool {
        self.uploaded_names.contains(name)
    }
}
