//! Core data models used throughout askdrive.
//!
//! These types represent the files, folders, chat turns, and reports that
//! flow through the ingestion pipeline and the conversation session.

/// MIME types the pipeline cares about.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_GOOGLE_DOC: &str = "application/vnd.google-apps.document";
pub const MIME_FOLDER: &str = "application/vnd.google-apps.folder";

/// Document format of an artifact, inferred from its MIME type or name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFormat {
    Pdf,
    Docx,
    /// Native Google document. Has no raw bytes; must be exported to DOCX
    /// before decoding.
    GoogleDoc,
    Unsupported,
}

impl DocFormat {
    /// Infer the format from a MIME type alone.
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            MIME_PDF => DocFormat::Pdf,
            MIME_DOCX => DocFormat::Docx,
            MIME_GOOGLE_DOC => DocFormat::GoogleDoc,
            _ => DocFormat::Unsupported,
        }
    }

    /// Infer the format from a file name suffix alone.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            DocFormat::Pdf
        } else if lower.ends_with(".docx") {
            DocFormat::Docx
        } else {
            DocFormat::Unsupported
        }
    }

    /// Infer the format from MIME type, falling back to the name suffix.
    ///
    /// The MIME type is authoritative when it maps to a known format;
    /// storage backends sometimes report `application/octet-stream` for
    /// perfectly good documents, so the suffix is the fallback.
    pub fn detect(name: &str, mime: &str) -> Self {
        match Self::from_mime(mime) {
            DocFormat::Unsupported => Self::from_name(name),
            known => known,
        }
    }
}

/// A single entry returned by a storage listing: file or folder.
#[derive(Debug, Clone)]
pub struct DriveEntry {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

impl DriveEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type == MIME_FOLDER
    }
}

/// A folder discovered by the tree walker.
#[derive(Debug, Clone)]
pub struct Folder {
    pub id: String,
    pub name: String,
    /// Indented label encoding the folder's depth below the scan root,
    /// so a flattened list still reads as a tree.
    pub display_label: String,
    pub parent_id: String,
}

/// A file discovered by the tree walker.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub parent_id: String,
}

impl RemoteFile {
    pub fn format(&self) -> DocFormat {
        DocFormat::detect(&self.name, &self.mime_type)
    }
}

/// Result of a folder-tree walk. `failed_branches` counts subfolders whose
/// listing failed; an empty result with zero failures is genuinely empty.
#[derive(Debug, Clone, Default)]
pub struct FolderListing {
    pub folders: Vec<Folder>,
    pub failed_branches: usize,
}

/// Result of a file discovery walk, shallow or deep.
#[derive(Debug, Clone, Default)]
pub struct FileListing {
    pub files: Vec<RemoteFile>,
    pub failed_branches: usize,
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of the conversation, in the order it happened.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Outcome of offering one artifact to the context ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// New name, real text: appended to the context.
    Accepted,
    /// Name already ingested; the context is unchanged.
    Skipped,
    /// Extracted text was below the significance threshold. The name is
    /// not recorded, so a later attempt with better bytes can succeed.
    Empty,
}

/// Aggregate counts for one batched read action.
#[derive(Debug, Clone, Default)]
pub struct ReadReport {
    /// Scope label, e.g. `drive:<folder id>` or `local`.
    pub scope: String,
    pub found: usize,
    pub accepted: usize,
    pub skipped: usize,
    pub empty: usize,
    pub failed: usize,
    pub archived: usize,
    pub archive_failed: usize,
}
