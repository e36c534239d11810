//! Pipeline tests against an in-memory storage gateway.
//!
//! Exercises the folder walker and the batched read pipeline without any
//! network: shallow/deep listing, bounded and cycle-safe traversal,
//! per-branch failure isolation, the batch cap, dedup across repeated
//! scans, the native-document export path, and archival independence.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use askdrive::config::{Config, DriveConfig};
use askdrive::drive::StorageGateway;
use askdrive::ingest;
use askdrive::models::{DriveEntry, IngestOutcome, MIME_DOCX, MIME_FOLDER, MIME_GOOGLE_DOC, MIME_PDF};
use askdrive::progress::NoProgress;
use askdrive::session::SessionState;
use askdrive::walker::{self, NameFilter};

// ============ Fake gateway ============

#[derive(Default)]
struct FakeGateway {
    /// folder id -> children
    children: HashMap<String, Vec<DriveEntry>>,
    /// file id -> raw bytes
    contents: HashMap<String, Vec<u8>>,
    /// file id -> exported bytes (native documents)
    exports: HashMap<String, Vec<u8>>,
    /// folders whose listing fails
    broken_folders: HashSet<String>,
    /// files whose download fails
    broken_files: HashSet<String>,
    fail_uploads: bool,
    uploads: Mutex<Vec<(String, String)>>,
    downloads: AtomicUsize,
}

impl FakeGateway {
    fn new() -> Self {
        Self::default()
    }

    fn folder(&mut self, parent: &str, id: &str, name: &str) -> &mut Self {
        self.children.entry(parent.to_string()).or_default().push(DriveEntry {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: MIME_FOLDER.to_string(),
        });
        self
    }

    fn file(&mut self, parent: &str, id: &str, name: &str, mime: &str, bytes: Vec<u8>) -> &mut Self {
        self.children.entry(parent.to_string()).or_default().push(DriveEntry {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: mime.to_string(),
        });
        self.contents.insert(id.to_string(), bytes);
        self
    }

    fn native_doc(&mut self, parent: &str, id: &str, name: &str, exported: Vec<u8>) -> &mut Self {
        self.children.entry(parent.to_string()).or_default().push(DriveEntry {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: MIME_GOOGLE_DOC.to_string(),
        });
        self.exports.insert(id.to_string(), exported);
        self
    }

    fn upload_names(&self) -> Vec<String> {
        self.uploads.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl StorageGateway for FakeGateway {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveEntry>> {
        if self.broken_folders.contains(folder_id) {
            bail!("listing failed for {}", folder_id);
        }
        Ok(self.children.get(folder_id).cloned().unwrap_or_default())
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.broken_files.contains(file_id) {
            bail!("download failed for {}", file_id);
        }
        self.contents
            .get(file_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such file {}", file_id))
    }

    async fn export(&self, file_id: &str, _target_mime: &str) -> Result<Vec<u8>> {
        self.exports
            .get(file_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no export for {}", file_id))
    }

    async fn upload(&self, _bytes: Vec<u8>, name: &str, parent_folder_id: &str) -> Result<String> {
        if self.fail_uploads {
            bail!("upload failed for {}", name);
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((name.to_string(), parent_folder_id.to_string()));
        Ok(format!("uploaded-{}", uploads.len()))
    }
}

// ============ Fixtures ============

fn docx_bytes(phrase: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
            phrase
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn test_config() -> Config {
    Config {
        drive: DriveConfig {
            credentials_path: "/nonexistent/token.json".into(),
            root_folder_id: "root".to_string(),
            max_depth: 10,
            include_globs: vec!["*".to_string()],
            exclude_globs: vec![],
        },
        chat: Default::default(),
        speech: Default::default(),
        ingest: askdrive::config::IngestConfig { min_text_chars: 5 },
        render: Default::default(),
    }
}

/// Root containing x.docx and subfolder S containing y.pdf.
fn two_level_gateway() -> FakeGateway {
    let mut gw = FakeGateway::new();
    gw.file("root", "fx", "x.docx", MIME_DOCX, docx_bytes("content of x"));
    gw.folder("root", "s", "S");
    gw.file("s", "fy", "y.pdf", MIME_PDF, b"%PDF-fake".to_vec());
    gw
}

// ============ Walker ============

#[tokio::test]
async fn shallow_listing_returns_direct_children_only() {
    let gw = two_level_gateway();
    let listing = walker::list_files(&gw, "root", false, 10, &NameFilter::accept_all()).await;
    let names: Vec<&str> = listing.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["x.docx"]);
    assert_eq!(listing.failed_branches, 0);
}

#[tokio::test]
async fn deep_listing_is_a_superset_of_shallow() {
    let gw = two_level_gateway();
    let shallow = walker::list_files(&gw, "root", false, 10, &NameFilter::accept_all()).await;
    let deep = walker::list_files(&gw, "root", true, 10, &NameFilter::accept_all()).await;

    let deep_names: HashSet<&str> = deep.files.iter().map(|f| f.name.as_str()).collect();
    for file in &shallow.files {
        assert!(deep_names.contains(file.name.as_str()));
    }
    assert!(deep_names.contains("y.pdf"));
    // The extra entry belongs to a descendant, not the root.
    let y = deep.files.iter().find(|f| f.name == "y.pdf").unwrap();
    assert_eq!(y.parent_id, "s");
}

#[tokio::test]
async fn broken_branch_leaves_siblings_intact() {
    let mut gw = FakeGateway::new();
    gw.folder("root", "good", "Good");
    gw.folder("root", "bad", "Bad");
    gw.file("good", "fg", "g.pdf", MIME_PDF, vec![]);
    gw.file("bad", "fb", "b.pdf", MIME_PDF, vec![]);
    gw.broken_folders.insert("bad".to_string());

    let listing = walker::list_files(&gw, "root", true, 10, &NameFilter::accept_all()).await;
    let names: Vec<&str> = listing.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["g.pdf"]);
    assert_eq!(listing.failed_branches, 1);
}

#[tokio::test]
async fn cyclic_folder_relation_terminates() {
    let mut gw = FakeGateway::new();
    gw.folder("root", "a", "A");
    gw.folder("a", "root", "Root again"); // cycle back to the root
    gw.folder("a", "a", "A again"); // self reference
    gw.file("a", "fa", "a.pdf", MIME_PDF, vec![]);

    let folders = walker::list_folders(&gw, "root", 10).await;
    let ids: Vec<&str> = folders.folders.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["a"], "each folder appears exactly once");

    let files = walker::list_files(&gw, "root", true, 10, &NameFilter::accept_all()).await;
    assert_eq!(files.files.len(), 1);
}

#[tokio::test]
async fn traversal_respects_the_depth_bound() {
    let mut gw = FakeGateway::new();
    gw.folder("root", "d1", "D1");
    gw.folder("d1", "d2", "D2");
    gw.folder("d2", "d3", "D3");
    gw.file("d3", "deepfile", "deep.pdf", MIME_PDF, vec![]);

    let folders = walker::list_folders(&gw, "root", 2).await;
    let ids: Vec<&str> = folders.folders.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["d1", "d2"], "d3 is beyond the bound");

    let files = walker::list_files(&gw, "root", true, 2, &NameFilter::accept_all()).await;
    assert!(files.files.is_empty(), "deep.pdf sits beyond the bound");
}

#[tokio::test]
async fn folder_labels_encode_depth_and_order_is_preorder() {
    let mut gw = FakeGateway::new();
    gw.folder("root", "b", "Beta");
    gw.folder("root", "a", "Alpha");
    gw.folder("a", "a1", "Nested");

    let listing = walker::list_folders(&gw, "root", 10).await;
    let labels: Vec<&str> = listing.folders.iter().map(|f| f.display_label.as_str()).collect();
    assert_eq!(labels, vec!["> Alpha", "> > Nested", "> Beta"]);
}

#[tokio::test]
async fn name_filter_narrows_discovery() {
    let mut gw = FakeGateway::new();
    gw.file("root", "f1", "keep.pdf", MIME_PDF, vec![]);
    gw.file("root", "f2", "skip.docx", MIME_DOCX, vec![]);

    let filter = NameFilter::new(&["*.pdf".to_string()], &[]).unwrap();
    let listing = walker::list_files(&gw, "root", false, 10, &filter).await;
    let names: Vec<&str> = listing.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["keep.pdf"]);
}

// ============ Read pipeline ============

#[tokio::test]
async fn read_remote_ingests_discovered_files() {
    let mut gw = FakeGateway::new();
    gw.file("root", "f1", "a.docx", MIME_DOCX, docx_bytes("alpha document text"));
    gw.file("root", "f2", "b.docx", MIME_DOCX, docx_bytes("bravo document text"));

    let config = test_config();
    let mut state = SessionState::new(&config);
    let report = ingest::read_remote(&gw, &mut state, &config, false, None, &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.found, 2);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.failed, 0);
    let ctx = state.ledger.render_context();
    assert!(ctx.contains("--- Document: a.docx ---"));
    assert!(ctx.contains("bravo document text"));
}

#[tokio::test]
async fn batch_cap_bounds_the_number_of_reads() {
    let mut gw = FakeGateway::new();
    for i in 0..5 {
        gw.file(
            "root",
            &format!("f{}", i),
            &format!("doc{}.docx", i),
            MIME_DOCX,
            docx_bytes(&format!("document number {}", i)),
        );
    }

    let config = test_config();
    let mut state = SessionState::new(&config);
    let report = ingest::read_remote(&gw, &mut state, &config, false, Some(2), &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.found, 5);
    assert_eq!(report.accepted, 2);
    assert_eq!(gw.downloads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn zero_batch_limit_is_an_error() {
    let mut gw = FakeGateway::new();
    gw.file("root", "f1", "a.docx", MIME_DOCX, docx_bytes("alpha document text"));

    let config = test_config();
    let mut state = SessionState::new(&config);
    let result = ingest::read_remote(&gw, &mut state, &config, false, Some(0), &NoProgress).await;

    assert!(result.is_err());
    assert_eq!(gw.downloads.load(Ordering::SeqCst), 0);
    assert!(state.ledger.is_empty());
}

#[tokio::test]
async fn repeated_capped_reads_progress_through_the_listing() {
    let mut gw = FakeGateway::new();
    for i in 0..4 {
        gw.file(
            "root",
            &format!("f{}", i),
            &format!("doc{}.docx", i),
            MIME_DOCX,
            docx_bytes(&format!("document number {}", i)),
        );
    }

    let config = test_config();
    let mut state = SessionState::new(&config);
    let first = ingest::read_remote(&gw, &mut state, &config, false, Some(2), &NoProgress)
        .await
        .unwrap();
    assert_eq!(first.accepted, 2);

    // Already-ingested files do not consume batch slots, so the second
    // capped read reaches the remaining two.
    let second = ingest::read_remote(&gw, &mut state, &config, false, Some(2), &NoProgress)
        .await
        .unwrap();
    assert_eq!(second.accepted, 2);
    assert_eq!(second.skipped, 2);
    assert_eq!(gw.downloads.load(Ordering::SeqCst), 4);
    assert_eq!(state.ledger.len(), 4);
}

#[tokio::test]
async fn failed_download_does_not_abort_siblings() {
    let mut gw = FakeGateway::new();
    gw.file("root", "f1", "ok1.docx", MIME_DOCX, docx_bytes("first fine document"));
    gw.file("root", "f2", "broken.docx", MIME_DOCX, docx_bytes("unreachable"));
    gw.file("root", "f3", "ok2.docx", MIME_DOCX, docx_bytes("second fine document"));
    gw.broken_files.insert("f2".to_string());

    let config = test_config();
    let mut state = SessionState::new(&config);
    let report = ingest::read_remote(&gw, &mut state, &config, false, None, &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.accepted, 2);
    assert_eq!(report.failed, 1);
    assert!(state.ledger.contains("ok1.docx"));
    assert!(state.ledger.contains("ok2.docx"));
    assert!(!state.ledger.contains("broken.docx"));
}

#[tokio::test]
async fn second_scan_skips_without_downloading() {
    let mut gw = FakeGateway::new();
    gw.file("root", "f1", "a.docx", MIME_DOCX, docx_bytes("alpha document text"));

    let config = test_config();
    let mut state = SessionState::new(&config);
    let first = ingest::read_remote(&gw, &mut state, &config, false, None, &NoProgress)
        .await
        .unwrap();
    assert_eq!(first.accepted, 1);
    let downloads_after_first = gw.downloads.load(Ordering::SeqCst);

    let second = ingest::read_remote(&gw, &mut state, &config, false, None, &NoProgress)
        .await
        .unwrap();
    assert_eq!(second.accepted, 0);
    assert_eq!(second.skipped, 1);
    // Dedup short-circuits before the fetch.
    assert_eq!(gw.downloads.load(Ordering::SeqCst), downloads_after_first);
}

#[tokio::test]
async fn native_documents_are_read_via_export() {
    let mut gw = FakeGateway::new();
    gw.native_doc("root", "g1", "plan", docx_bytes("exported plan content"));

    let config = test_config();
    let mut state = SessionState::new(&config);
    let report = ingest::read_remote(&gw, &mut state, &config, false, None, &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.accepted, 1);
    assert!(state.ledger.render_context().contains("exported plan content"));
    // Export, not download.
    assert_eq!(gw.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsupported_files_are_counted_without_fetching() {
    let mut gw = FakeGateway::new();
    gw.file("root", "f1", "photo.png", "image/png", vec![1, 2, 3]);

    let config = test_config();
    let mut state = SessionState::new(&config);
    let report = ingest::read_remote(&gw, &mut state, &config, false, None, &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.empty, 1);
    assert_eq!(gw.downloads.load(Ordering::SeqCst), 0);
    // Not marked ingested: the name stays retryable.
    assert!(!state.ledger.contains("photo.png"));
}

#[tokio::test]
async fn corrupt_remote_payload_stays_retryable() {
    let mut gw = FakeGateway::new();
    gw.file("root", "f1", "scan.pdf", MIME_PDF, b"garbage".to_vec());

    let config = test_config();
    let mut state = SessionState::new(&config);
    let report = ingest::read_remote(&gw, &mut state, &config, false, None, &NoProgress)
        .await
        .unwrap();
    assert_eq!(report.empty, 1);
    assert!(!state.ledger.contains("scan.pdf"));

    // Ingesting the same name later with usable text succeeds.
    assert_eq!(
        state.ledger.ingest("scan.pdf", "now readable content"),
        IngestOutcome::Accepted
    );
}

// ============ Archival ============

#[tokio::test]
async fn archival_uploads_originals_once_per_session() {
    let tmp = tempfile::TempDir::new().unwrap();
    let doc = tmp.path().join("minutes.docx");
    std::fs::write(&doc, docx_bytes("minutes of the meeting")).unwrap();

    let gw = FakeGateway::new();
    let config = test_config();
    let mut state = SessionState::new(&config);

    let first = ingest::read_local(
        &[doc.clone()],
        &mut state,
        &config,
        Some(&gw),
        &NoProgress,
    )
    .await
    .unwrap();
    assert_eq!(first.accepted, 1);
    assert_eq!(first.archived, 1);

    // Same batch again: ingest skips, archive skips too.
    let second = ingest::read_local(&[doc], &mut state, &config, Some(&gw), &NoProgress)
        .await
        .unwrap();
    assert_eq!(second.skipped, 1);
    assert_eq!(second.archived, 0);
    assert_eq!(gw.upload_names(), vec!["minutes.docx"]);
}

#[tokio::test]
async fn upload_failure_never_undoes_an_ingest() {
    let tmp = tempfile::TempDir::new().unwrap();
    let doc = tmp.path().join("notes.docx");
    std::fs::write(&doc, docx_bytes("notes that must survive")).unwrap();

    let mut gw = FakeGateway::new();
    gw.fail_uploads = true;

    let config = test_config();
    let mut state = SessionState::new(&config);
    let report = ingest::read_local(&[doc], &mut state, &config, Some(&gw), &NoProgress)
        .await
        .unwrap();

    assert_eq!(report.accepted, 1);
    assert_eq!(report.archived, 0);
    assert_eq!(report.archive_failed, 1);
    assert!(state.ledger.contains("notes.docx"));
    // A failed upload leaves the name free for a later archive attempt.
    assert!(!state.already_uploaded("notes.docx"));
}
