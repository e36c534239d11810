//! Folder tree traversal over the storage gateway.
//!
//! Both walks are iterative with an explicit stack, a visited-id set, and a
//! configurable depth bound, so a pathologically deep or cyclic remote
//! hierarchy can never recurse without limit or list the same folder twice.
//! A listing failure inside one branch is counted and skipped; sibling
//! branches still produce results (discovery is advisory, not transactional).

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::drive::StorageGateway;
use crate::models::{FileListing, Folder, FolderListing, RemoteFile};

/// Marker prepended once per level below the scan root, so the flattened
/// folder list still reads as a tree.
const DEPTH_MARKER: &str = "> ";

/// Name filters applied to files (never folders) during discovery.
pub struct NameFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl NameFilter {
    pub fn new(include_globs: &[String], exclude_globs: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(include_globs)?,
            exclude: build_globset(exclude_globs)?,
        })
    }

    /// A filter that matches every file name.
    pub fn accept_all() -> Self {
        Self::new(&["*".to_string()], &[]).unwrap_or_else(|_| unreachable!())
    }

    pub fn matches(&self, name: &str) -> bool {
        self.include.is_match(name) && !self.exclude.is_match(name)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Lists every descendant folder of `root_id` (the root itself excluded),
/// pre-order so each folder appears under its ancestor, siblings sorted by
/// name. `display_label` carries the folder's depth below the root.
pub async fn list_folders(
    gateway: &dyn StorageGateway,
    root_id: &str,
    max_depth: usize,
) -> FolderListing {
    let mut listing = FolderListing::default();
    let mut visited = std::collections::HashSet::new();
    visited.insert(root_id.to_string());

    // (folder id, depth below root)
    let mut stack: Vec<(String, usize)> = vec![(root_id.to_string(), 0)];

    while let Some((folder_id, depth)) = stack.pop() {
        if depth >= max_depth {
            continue;
        }
        let entries = match gateway.list_children(&folder_id).await {
            Ok(entries) => entries,
            Err(e) => {
                eprintln!("warning: listing folder {} failed: {}", folder_id, e);
                listing.failed_branches += 1;
                continue;
            }
        };

        for child in entries.into_iter().filter(|e| e.is_folder()) {
            if !visited.insert(child.id.clone()) {
                continue;
            }
            listing.folders.push(Folder {
                display_label: format!("{}{}", DEPTH_MARKER.repeat(depth + 1), child.name),
                id: child.id.clone(),
                name: child.name,
                parent_id: folder_id.clone(),
            });
            stack.push((child.id, depth + 1));
        }
    }

    listing.folders = preorder(listing.folders, root_id);
    listing
}

/// Reorders a flat folder list into pre-order (parent before children,
/// siblings by name) using the recorded parent ids.
fn preorder(folders: Vec<Folder>, root_id: &str) -> Vec<Folder> {
    let mut by_parent: std::collections::HashMap<String, Vec<Folder>> =
        std::collections::HashMap::new();
    for folder in folders {
        by_parent
            .entry(folder.parent_id.clone())
            .or_default()
            .push(folder);
    }
    for children in by_parent.values_mut() {
        children.sort_by(|a, b| a.name.cmp(&b.name));
    }

    let mut out = Vec::new();
    let mut stack: Vec<Folder> = by_parent
        .remove(root_id)
        .unwrap_or_default()
        .into_iter()
        .rev()
        .collect();
    while let Some(folder) = stack.pop() {
        if let Some(children) = by_parent.remove(&folder.id) {
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        out.push(folder);
    }
    out
}

/// Lists files under `folder_id`. Shallow returns direct children only;
/// deep unions the whole bounded subtree. Folders are never in the result.
pub async fn list_files(
    gateway: &dyn StorageGateway,
    folder_id: &str,
    deep: bool,
    max_depth: usize,
    filter: &NameFilter,
) -> FileListing {
    let mut listing = FileListing::default();
    let mut visited = std::collections::HashSet::new();
    visited.insert(folder_id.to_string());

    let mut stack: Vec<(String, usize)> = vec![(folder_id.to_string(), 0)];

    while let Some((current, depth)) = stack.pop() {
        let entries = match gateway.list_children(&current).await {
            Ok(entries) => entries,
            Err(e) => {
                eprintln!("warning: listing folder {} failed: {}", current, e);
                listing.failed_branches += 1;
                continue;
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            if entry.is_folder() {
                if deep && depth + 1 <= max_depth && visited.insert(entry.id.clone()) {
                    stack.push((entry.id, depth + 1));
                }
            } else if filter.matches(&entry.name) {
                files.push(RemoteFile {
                    id: entry.id,
                    name: entry.name,
                    mime_type: entry.mime_type,
                    parent_id: current.clone(),
                });
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        listing.files.extend(files);
    }

    listing
}
