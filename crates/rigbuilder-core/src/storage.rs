//! # Module Files
//!
//! Disk I/O for module files: load, save, UID header reads and directory
//! scans. Serialization itself lives in [`crate::formats`].

use crate::formats::{ConnectionPolicy, module_from_xml, module_to_xml, uid_from_header};
use crate::primitives::MODULE_FILE_EXTENSION;
use crate::tree::ModuleTree;
use crate::types::{ModuleId, RigError};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Whether `path` looks like a module file.
#[must_use]
pub fn is_module_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == MODULE_FILE_EXTENSION)
}

/// Load a module file into `tree` as a new detached root.
///
/// The loaded module remembers `path` and is never muted.
pub fn load_from_file(tree: &mut ModuleTree, path: &Path) -> Result<ModuleId, RigError> {
    let text = fs::read_to_string(path)
        .map_err(|e| RigError::Io(format!("{}: {}", path.display(), e)))?;
    let id = module_from_xml(tree, &text)?;
    tree.set_identity(id, None, Some(path.to_path_buf()))?;
    tree.module_mut(id)?.muted = false;
    tracing::debug!(path = %path.display(), module = %id, "loaded module file");
    Ok(id)
}

/// Save module `id` to `path`.
///
/// A UID is assigned first when the module has none or `new_uid` is set.
/// Connections leaving the subtree are written blank. Afterwards the module
/// remembers `path` and its modification flags are cleared.
pub fn save_to_file(
    tree: &mut ModuleTree,
    id: ModuleId,
    path: &Path,
    new_uid: bool,
) -> Result<(), RigError> {
    if new_uid || tree.module(id)?.uid().is_empty() {
        let uid = uuid::Uuid::new_v4().simple().to_string();
        tree.set_identity(id, Some(uid), None)?;
    }
    let xml = module_to_xml(tree, id, ConnectionPolicy::StripExternal)?;
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    fs::write(path, xml).map_err(|e| RigError::Io(format!("{}: {}", path.display(), e)))?;
    tree.set_identity(id, None, Some(path.to_path_buf()))?;
    tree.clear_modification_flags(id)?;
    tracing::info!(path = %path.display(), uid = %tree.module(id)?.uid(), "saved module");
    Ok(())
}

/// UID of a module file, read from its first line only.
///
/// `Ok(None)` when the file carries no (or an empty) UID.
pub fn uid_from_file(path: &Path) -> Result<Option<String>, RigError> {
    let file = fs::File::open(path)?;
    let mut first = String::new();
    BufReader::new(file).read_line(&mut first)?;
    Ok(uid_from_header(&first).filter(|uid| !uid.is_empty()))
}

/// Module files under `root`, recursively, in path order.
///
/// A missing root yields an empty list.
pub fn list_modules(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_module_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// UID -> file map of every module file under `root`.
///
/// Files without a UID are skipped; unreadable files are logged and skipped.
/// When two files share a UID the later path wins.
pub fn find_uids(root: &Path) -> BTreeMap<String, PathBuf> {
    let mut uids = BTreeMap::new();
    for path in list_modules(root) {
        match uid_from_file(&path) {
            Ok(Some(uid)) => {
                uids.insert(uid, path);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot read module uid"),
        }
    }
    uids
}
