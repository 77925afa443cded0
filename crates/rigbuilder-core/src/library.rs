//! # Module Library
//!
//! Reference tracking between in-memory modules and module files.
//!
//! Two roots hold module files: a shared **server** root and a per-user
//! **local** root. [`UidCache`] maps UIDs to files under each root; it is an
//! explicit value, rebuilt only on [`ModuleLibrary::refresh`], so it may be
//! stale between refreshes.
//!
//! ## Update rule
//!
//! [`ModuleLibrary::update`] reloads a module from its reference file and
//! keeps the user's edits where they still fit: an attribute of the fresh
//! copy with a (non-empty) name takes over the value, connection and
//! expression of the first existing attribute of that name, provided both
//! share a template. Everything else (attribute list, children, run code,
//! file path) comes from the file.

use crate::primitives::{MAX_DISPLAY_PATH_ITEMS, MODULE_FILE_EXTENSION};
use crate::storage::{find_uids, list_modules, load_from_file, save_to_file};
use crate::tree::ModuleTree;
use crate::types::{ModuleId, RigError, UpdateSource};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

// =============================================================================
// UID CACHE
// =============================================================================

/// UID -> file maps for the local and server roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidCache {
    local: BTreeMap<String, PathBuf>,
    server: BTreeMap<String, PathBuf>,
}

impl UidCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn local(&self) -> &BTreeMap<String, PathBuf> {
        &self.local
    }

    #[must_use]
    pub fn server(&self) -> &BTreeMap<String, PathBuf> {
        &self.server
    }

    pub fn insert_local(&mut self, uid: impl Into<String>, path: impl Into<PathBuf>) {
        self.local.insert(uid.into(), path.into());
    }

    pub fn insert_server(&mut self, uid: impl Into<String>, path: impl Into<PathBuf>) {
        self.server.insert(uid.into(), path.into());
    }

    pub fn remove_local(&mut self, uid: &str) -> Option<PathBuf> {
        self.local.remove(uid)
    }

    /// Rebuild the local map from `root`.
    pub fn refresh_local(&mut self, root: &Path) {
        self.local = find_uids(root);
    }

    /// Rebuild the server map from `root`.
    pub fn refresh_server(&mut self, root: &Path) {
        self.server = find_uids(root);
    }

    /// File of `uid` according to `source`.
    ///
    /// [`UpdateSource::All`] prefers the local file. [`UpdateSource::File`]
    /// never consults the cache.
    #[must_use]
    pub fn lookup(&self, uid: &str, source: UpdateSource) -> Option<&Path> {
        let found = match source {
            UpdateSource::All => self.local.get(uid).or_else(|| self.server.get(uid)),
            UpdateSource::Local => self.local.get(uid),
            UpdateSource::Server => self.server.get(uid),
            UpdateSource::File => None,
        };
        found.map(PathBuf::as_path)
    }
}

// =============================================================================
// LIBRARY
// =============================================================================

/// Loading, updating and publishing modules against the two module roots.
#[derive(Debug, Clone)]
pub struct ModuleLibrary {
    server_root: PathBuf,
    local_root: PathBuf,
    cache: UidCache,
    update_source: UpdateSource,
}

impl ModuleLibrary {
    /// Create a library with empty caches. Call [`Self::refresh`] to scan.
    #[must_use]
    pub fn new(server_root: impl Into<PathBuf>, local_root: impl Into<PathBuf>) -> Self {
        Self {
            server_root: server_root.into(),
            local_root: local_root.into(),
            cache: UidCache::new(),
            update_source: UpdateSource::default(),
        }
    }

    /// Builder: which cache `update` consults.
    #[must_use]
    pub fn with_update_source(mut self, source: UpdateSource) -> Self {
        self.update_source = source;
        self
    }

    /// Builder: replace the UID cache (tests inject prepared caches).
    #[must_use]
    pub fn with_cache(mut self, cache: UidCache) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn server_root(&self) -> &Path {
        &self.server_root
    }

    #[must_use]
    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    #[must_use]
    pub fn cache(&self) -> &UidCache {
        &self.cache
    }

    #[must_use]
    pub fn update_source(&self) -> UpdateSource {
        self.update_source
    }

    pub fn set_update_source(&mut self, source: UpdateSource) {
        self.update_source = source;
    }

    /// Rescan both roots.
    pub fn refresh(&mut self) {
        self.cache.refresh_local(&self.local_root);
        self.cache.refresh_server(&self.server_root);
        tracing::debug!(
            local = self.cache.local.len(),
            server = self.cache.server.len(),
            "refreshed uid caches"
        );
    }

    /// Module files under `dir`, recursively.
    #[must_use]
    pub fn list_modules(&self, dir: &Path) -> Vec<PathBuf> {
        list_modules(dir)
    }

    // =========================================================================
    // REFERENCES
    // =========================================================================

    /// The file module `id` was derived from.
    ///
    /// Looked up by UID in the caches selected by the update source; a module
    /// without UID, or [`UpdateSource::File`], uses its own file path.
    pub fn reference_file(&self, tree: &ModuleTree, id: ModuleId) -> Result<Option<PathBuf>, RigError> {
        let module = tree.module(id)?;
        if module.uid().is_empty() || self.update_source == UpdateSource::File {
            return Ok(module.file_path().map(Path::to_path_buf));
        }
        Ok(self
            .cache
            .lookup(module.uid(), self.update_source)
            .map(Path::to_path_buf))
    }

    /// Load a module by UID, file path or path relative to a root, then
    /// update it.
    ///
    /// Resolution order: local UID, server UID, `spec` as a path, `spec.xml`,
    /// then the same two under the local root and the server root.
    pub fn load_module(&self, tree: &mut ModuleTree, spec: &str) -> Result<ModuleId, RigError> {
        let path = self
            .resolve_spec(spec)
            .ok_or_else(|| RigError::ModuleNotFound(spec.to_string()))?;
        let id = load_from_file(tree, &path)?;
        self.update(tree, id)?;
        Ok(id)
    }

    fn resolve_spec(&self, spec: &str) -> Option<PathBuf> {
        if let Some(path) = self.cache.lookup(spec, UpdateSource::All) {
            return Some(path.to_path_buf());
        }
        let with_ext = format!("{}.{}", spec, MODULE_FILE_EXTENSION);
        let candidates = [
            PathBuf::from(spec),
            PathBuf::from(&with_ext),
            self.local_root.join(spec),
            self.local_root.join(&with_ext),
            self.server_root.join(spec),
            self.server_root.join(&with_ext),
        ];
        candidates.into_iter().find(|p| p.is_file())
    }

    /// Reload `id` (and then its children) from reference files.
    ///
    /// Modules without a reference file are left as they are; their children
    /// are still visited.
    pub fn update(&self, tree: &mut ModuleTree, id: ModuleId) -> Result<(), RigError> {
        if let Some(reference) = self.reference_file(tree, id)? {
            self.replace_from(tree, id, &reference)?;
        }
        let children = tree.module(id)?.children().to_vec();
        for child in children {
            self.update(tree, child)?;
        }
        Ok(())
    }

    fn replace_from(&self, tree: &mut ModuleTree, id: ModuleId, reference: &Path) -> Result<(), RigError> {
        let fresh = load_from_file(tree, reference)?;

        let current = tree.module(id)?.attributes().to_vec();
        for attribute in tree.module_mut(fresh)?.attributes_mut() {
            if attribute.name().is_empty() {
                continue;
            }
            let Some(previous) = current.iter().find(|a| a.name() == attribute.name()) else {
                continue;
            };
            if previous.template() != attribute.template() {
                continue;
            }
            attribute.set_default_value(previous.default_value());
            attribute.set_connect(previous.connect());
            attribute.set_expression(previous.expression());
            attribute.clear_modified();
        }

        for old in tree.remove_children(id)? {
            tree.delete(old)?;
        }
        for child in tree.remove_children(fresh)? {
            tree.add_child(id, child)?;
        }
        let attributes = tree.remove_attributes(fresh)?;
        let fresh_module = tree.module(fresh)?;
        let run_code = fresh_module.run_code().to_string();
        let file_path = fresh_module.file_path().map(Path::to_path_buf);
        tree.delete(fresh)?;

        let module = tree.module_mut(id)?;
        module.attributes = attributes;
        module.run_code = run_code;
        module.file_path = file_path;
        module.modified = false;
        tracing::debug!(module = %module.name(), reference = %reference.display(), "updated module");
        Ok(())
    }

    // =========================================================================
    // ROOTS
    // =========================================================================

    pub fn loaded_from_server(&self, tree: &ModuleTree, id: ModuleId) -> Result<bool, RigError> {
        Ok(tree
            .module(id)?
            .file_path()
            .is_some_and(|p| p.starts_with(&self.server_root)))
    }

    pub fn loaded_from_local(&self, tree: &ModuleTree, id: ModuleId) -> Result<bool, RigError> {
        Ok(tree
            .module(id)?
            .file_path()
            .is_some_and(|p| p.starts_with(&self.local_root)))
    }

    /// File path relative to the root it lives under, or the full path when
    /// it is under neither. `None` for embedded modules.
    pub fn relative_path(&self, tree: &ModuleTree, id: ModuleId) -> Result<Option<PathBuf>, RigError> {
        let Some(path) = tree.module(id)?.file_path() else {
            return Ok(None);
        };
        let relative = path
            .strip_prefix(&self.server_root)
            .or_else(|_| path.strip_prefix(&self.local_root))
            .unwrap_or(path);
        Ok(Some(relative.to_path_buf()))
    }

    /// Short display form of the module's file, without the extension.
    ///
    /// Files under a root show their full root-relative path. Other files
    /// keep at most the last three `/`-separated items of the full path,
    /// prefixed with `../` when shortened.
    pub fn relative_path_string(&self, tree: &ModuleTree, id: ModuleId) -> Result<String, RigError> {
        let Some(path) = tree.module(id)?.file_path() else {
            return Ok(String::new());
        };
        let under_root = self.loaded_from_server(tree, id)? || self.loaded_from_local(tree, id)?;
        let display = if under_root {
            let relative = self.relative_path(tree, id)?.unwrap_or_default();
            relative
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/")
        } else {
            let normalized = path.to_string_lossy().replace('\\', "/");
            let items: Vec<&str> = normalized.split('/').collect();
            if items.len() > MAX_DISPLAY_PATH_ITEMS {
                format!("../{}", items[items.len() - MAX_DISPLAY_PATH_ITEMS..].join("/"))
            } else {
                normalized.clone()
            }
        };
        let suffix = format!(".{}", MODULE_FILE_EXTENSION);
        Ok(display
            .strip_suffix(&suffix)
            .map(str::to_string)
            .unwrap_or(display))
    }

    /// Where saving `id` should write: server modules save into the local
    /// root at the same relative path, everything else saves in place.
    pub fn save_path(&self, tree: &ModuleTree, id: ModuleId) -> Result<Option<PathBuf>, RigError> {
        if self.loaded_from_server(tree, id)? {
            return Ok(self
                .relative_path(tree, id)?
                .map(|relative| self.local_root.join(relative)));
        }
        Ok(tree.module(id)?.file_path().map(Path::to_path_buf))
    }

    /// Save `id` to its save path, assigning a UID if needed, and record it
    /// in the local cache.
    pub fn save(&mut self, tree: &mut ModuleTree, id: ModuleId) -> Result<PathBuf, RigError> {
        let Some(path) = self.save_path(tree, id)? else {
            return Err(RigError::Io(format!(
                "module '{}' has no file path",
                tree.module(id)?.name()
            )));
        };
        save_to_file(tree, id, &path, false)?;
        let uid = tree.module(id)?.uid().to_string();
        if path.starts_with(&self.local_root) {
            self.cache.insert_local(uid, path.clone());
        }
        Ok(path)
    }

    /// Publish a local module to the server root.
    ///
    /// The module is saved from memory to the same relative path under the
    /// server root (assigning a UID if needed), the local file is removed and
    /// the UID moves between the caches.
    pub fn send_to_server(&mut self, tree: &mut ModuleTree, id: ModuleId) -> Result<PathBuf, RigError> {
        let module = tree.module(id)?;
        let Some(local_path) = module.file_path().map(Path::to_path_buf) else {
            return Err(RigError::Io(format!("module '{}' has no file", module.name())));
        };
        let relative = local_path.strip_prefix(&self.local_root).map_err(|_| {
            RigError::Io(format!(
                "{} is not under the local module root",
                local_path.display()
            ))
        })?;
        let server_path = self.server_root.join(relative);

        save_to_file(tree, id, &server_path, false)?;
        match fs::remove_file(&local_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let uid = tree.module(id)?.uid().to_string();
        self.cache.remove_local(&uid);
        self.cache.insert_server(uid, server_path.clone());
        tracing::info!(from = %local_path.display(), to = %server_path.display(), "sent module to server");
        Ok(server_path)
    }
}
