//! Batched read pipeline: discovery → fetch → decode → ledger.
//!
//! A read batch discovers files (remote folder scan or local paths), reads
//! up to the batch cap of them, extracts text, and offers each artifact to
//! the context ledger, accumulating a [`ReadReport`]. One item's failure
//! never aborts its siblings; failures are counted and reported alongside
//! successes. Archival of local originals is independent of ingestion: an
//! upload failure never undoes a successful ingest.

use anyhow::{bail, Result};
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::config::Config;
use crate::drive::StorageGateway;
use crate::extract::extract_text;
use crate::models::{DocFormat, FileListing, ReadReport, RemoteFile, MIME_DOCX};
use crate::progress::{ReadProgressEvent, ReadProgressReporter};
use crate::session::SessionState;
use crate::walker::{self, NameFilter};

/// Discovers files in the working folder, using the session's cached
/// listing when it matches the requested scope.
pub async fn discover_files(
    gateway: &dyn StorageGateway,
    state: &mut SessionState,
    config: &Config,
    deep: bool,
) -> Result<FileListing> {
    let folder_id = state.working_folder_id().to_string();
    if let Some(cached) = state.cached_files(&folder_id, deep) {
        return Ok(cached.clone());
    }

    let filter = NameFilter::new(&config.drive.include_globs, &config.drive.exclude_globs)?;
    let listing =
        walker::list_files(gateway, &folder_id, deep, config.drive.max_depth, &filter).await;
    state.cache_files(&folder_id, deep, listing.clone());
    Ok(listing)
}

/// Reads up to `limit` discovered remote files into the ledger.
///
/// An artifact already in the ledger is skipped without being fetched and
/// without consuming a batch slot, so repeated capped reads of the same
/// folder keep progressing through the listing. Any per-file fetch failure
/// is counted and the batch continues.
pub async fn read_remote(
    gateway: &dyn StorageGateway,
    state: &mut SessionState,
    config: &Config,
    deep: bool,
    limit: Option<usize>,
    progress: &dyn ReadProgressReporter,
) -> Result<ReadReport> {
    if limit == Some(0) {
        bail!("Batch limit must be at least 1");
    }

    let scope = format!("drive:{}", state.working_folder_id());
    progress.report(ReadProgressEvent::Discovering {
        scope: scope.clone(),
    });

    let listing = discover_files(gateway, state, config, deep).await?;
    if listing.failed_branches > 0 {
        eprintln!(
            "warning: {} folder branch(es) could not be listed; results are partial",
            listing.failed_branches
        );
    }

    let mut report = ReadReport {
        scope,
        found: listing.files.len(),
        ..Default::default()
    };
    if listing.files.is_empty() {
        return Ok(report);
    }

    // Batch cap: 1..=files found. Ledger hits are skipped for free.
    let cap = limit.unwrap_or(listing.files.len()).min(listing.files.len());

    let mut attempted = 0;
    for file in &listing.files {
        if attempted == cap {
            break;
        }
        if state.ledger.contains(&file.name) {
            report.skipped += 1;
            continue;
        }
        attempted += 1;
        progress.report(ReadProgressEvent::Reading {
            scope: report.scope.clone(),
            n: attempted as u64,
            total: cap as u64,
        });
        read_one_remote(gateway, state, file, &mut report).await;
    }

    Ok(report)
}

async fn read_one_remote(
    gateway: &dyn StorageGateway,
    state: &mut SessionState,
    file: &RemoteFile,
    report: &mut ReadReport,
) {
    let fetched = match file.format() {
        DocFormat::Pdf => gateway.download(&file.id).await.map(|b| (b, DocFormat::Pdf)),
        DocFormat::Docx => gateway
            .download(&file.id)
            .await
            .map(|b| (b, DocFormat::Docx)),
        // Native documents have no raw bytes; export to DOCX and decode that.
        DocFormat::GoogleDoc => gateway
            .export(&file.id, MIME_DOCX)
            .await
            .map(|b| (b, DocFormat::Docx)),
        DocFormat::Unsupported => {
            report.empty += 1;
            return;
        }
    };

    let (bytes, format) = match fetched {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("warning: reading '{}' failed: {}", file.name, e);
            report.failed += 1;
            return;
        }
    };

    offer_to_ledger(state, &file.name, &bytes, format, report);
}

/// Reads local files and directories into the ledger. Directories are
/// expanded with the configured include/exclude globs; only supported
/// formats are offered. With `archive` set, each readable original is also
/// uploaded to the working folder (once per name per session).
pub async fn read_local(
    paths: &[PathBuf],
    state: &mut SessionState,
    config: &Config,
    archive_to: Option<&dyn StorageGateway>,
    progress: &dyn ReadProgressReporter,
) -> Result<ReadReport> {
    progress.report(ReadProgressEvent::Discovering {
        scope: "local".to_string(),
    });

    let filter = NameFilter::new(&config.drive.include_globs, &config.drive.exclude_globs)?;
    let files = expand_local_paths(paths, &filter)?;

    let mut report = ReadReport {
        scope: "local".to_string(),
        found: files.len(),
        ..Default::default()
    };

    for (i, path) in files.iter().enumerate() {
        progress.report(ReadProgressEvent::Reading {
            scope: report.scope.clone(),
            n: (i + 1) as u64,
            total: files.len() as u64,
        });

        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("warning: reading '{}' failed: {}", path.display(), e);
                report.failed += 1;
                continue;
            }
        };

        offer_to_ledger(state, &name, &bytes, DocFormat::from_name(&name), &mut report);

        // Archival is independent of the ledger outcome: a duplicate text
        // ingest may still archive the original, an upload failure never
        // blocks the ingest that already happened.
        if let Some(gateway) = archive_to {
            archive_original(gateway, state, &name, bytes, &mut report).await;
        }
    }

    Ok(report)
}

/// Expands paths: explicit files are taken as-is (any supported format),
/// directories are walked and filtered by the configured globs.
fn expand_local_paths(paths: &[PathBuf], filter: &NameFilter) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            let mut found = Vec::new();
            for entry in WalkDir::new(path) {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if DocFormat::from_name(&name) == DocFormat::Unsupported {
                    continue;
                }
                if !filter.matches(&name) {
                    continue;
                }
                found.push(entry.path().to_path_buf());
            }
            found.sort();
            files.extend(found);
        } else {
            bail!("Path does not exist: {}", path.display());
        }
    }
    Ok(files)
}

/// Decodes the bytes and offers the result to the ledger, folding the
/// outcome into the report. A decode failure degrades to empty text, which
/// the ledger refuses to mark ingested.
fn offer_to_ledger(
    state: &mut SessionState,
    name: &str,
    bytes: &[u8],
    format: DocFormat,
    report: &mut ReadReport,
) {
    let text = match extract_text(bytes, format) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("warning: extracting '{}' failed: {}", name, e);
            String::new()
        }
    };

    use crate::models::IngestOutcome;
    match state.ledger.ingest(name, &text) {
        IngestOutcome::Accepted => report.accepted += 1,
        IngestOutcome::Skipped => report.skipped += 1,
        IngestOutcome::Empty => report.empty += 1,
    }
}

async fn archive_original(
    gateway: &dyn StorageGateway,
    state: &mut SessionState,
    name: &str,
    bytes: Vec<u8>,
    report: &mut ReadReport,
) {
    if state.already_uploaded(name) {
        return;
    }
    let folder_id = state.working_folder_id().to_string();
    match gateway.upload(bytes, name, &folder_id).await {
        Ok(_) => {
            state.mark_uploaded(name);
            report.archived += 1;
        }
        Err(e) => {
            eprintln!("warning: archiving '{}' failed: {}", name, e);
            report.archive_failed += 1;
        }
    }
}

/// Prints the aggregate report for one read batch.
pub fn print_report(report: &ReadReport) {
    println!("read {}", report.scope);
    println!("  found: {} files", report.found);
    println!("  accepted: {}", report.accepted);
    println!("  skipped: {}", report.skipped);
    println!("  empty: {}", report.empty);
    println!("  failed: {}", report.failed);
    if report.archived > 0 || report.archive_failed > 0 {
        println!("  archived: {}", report.archived);
        println!("  archive failed: {}", report.archive_failed);
    }
    println!("ok");
}
