//! In-memory directory tree and path resolution.
//!
//! Paths are `/`-separated; empty components are skipped, so `""`, `"/"`
//! and `"//"` all name the root. The whole tree is one owned value whose
//! interior maps are ordered, and it is persisted wholesale by the engine
//! after every mutation.


use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{FsError, Result};
use crate::wire::{self, DirectoryEntry, FileEntry, FileMetadata};

/// Seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Splits a path into its non-empty components.
#[must_use]
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

/// Splits a path into parent components and the final name. Returns `None`
/// for the root path.
#[must_use]
pub fn split_parent(path: &str) -> Option<(Vec<&str>, &str)> {
    let mut parts = components(path);
    let name = parts.pop()?;
    Some((parts, name))
}

/// What a path resolves to inside the tree.
#[derive(Debug)]
pub enum Resolved<'a> {
    Dir(&'a DirectoryEntry),
    File(&'a FileEntry),
    /// The parent directory exists but the final component does not.
    Vacant,
}

/// The namespace root and the operations the engine performs on it.
#[derive(Debug)]
pub struct Namespace {
    pub root: DirectoryEntry,
}

impl Namespace {
    /// A tree holding only the root directory, named `/`.
    #[must_use]
    pub fn new_root() -> Self {
        let mut root = DirectoryEntry::default();
        root.metadata = fresh_metadata("/");
        Self { root }
    }

    fn walk(&self, parts: &[&str]) -> Result<&DirectoryEntry> {
        let mut current = &self.root;
        for (i, part) in parts.iter().enumerate() {
            current = current
                .directories
                .get(*part)
                .ok_or_else(|| FsError::NotFound(parts[..=i].join("/")))?;
        }
        Ok(current)
    }

    fn walk_mut(&mut self, parts: &[&str]) -> Result<&mut DirectoryEntry> {
        let mut current = &mut self.root;
        for (i, part) in parts.iter().enumerate() {
            current = current
                .directories
                .get_mut(*part)
                .ok_or_else(|| FsError::NotFound(parts[..=i].join("/")))?;
        }
        Ok(current)
    }

    /// Resolves `path` against the final directory's subdirectories first,
    /// then its files. A missing final component is `Vacant`, not an error;
    /// a missing intermediate directory is `NotFound`.
    pub fn resolve(&self, path: &str) -> Result<Resolved<'_>> {
        let Some((parents, name)) = split_parent(path) else {
            return Ok(Resolved::Dir(&self.root));
        };
        let dir = self.walk(&parents)?;
        if let Some(sub) = dir.directories.get(name) {
            return Ok(Resolved::Dir(sub));
        }
        if let Some(file) = dir.files.get(name) {
            return Ok(Resolved::File(file));
        }
        Ok(Resolved::Vacant)
    }

    /// The file entry at `path`. Directories and vacant slots are both
    /// `NotFound` here, matching read semantics.
    pub fn file(&self, path: &str) -> Result<&FileEntry> {
        match self.resolve(path)? {
            Resolved::File(file) => Ok(file),
            Resolved::Dir(_) | Resolved::Vacant => Err(FsError::NotFound(path.to_string())),
        }
    }

    /// The directory at `path`.
    pub fn dir(&self, path: &str) -> Result<&DirectoryEntry> {
        match self.resolve(path)? {
            Resolved::Dir(dir) => Ok(dir),
            Resolved::File(_) => Err(FsError::NotADirectory(path.to_string())),
            Resolved::Vacant => Err(FsError::NotFound(path.to_string())),
        }
    }

    /// Creates every missing directory along `path`, stamping fresh
    /// timestamps on the ones it creates.
    pub fn make_dir_chain(&mut self, path: &str) -> &mut DirectoryEntry {
        let parts = components(path);
        self.make_chain(&parts)
    }

    fn make_chain(&mut self, parts: &[&str]) -> &mut DirectoryEntry {
        let mut current = &mut self.root;
        for part in parts {
            current = current
                .directories
                .entry((*part).to_string())
                .or_insert_with(|| new_directory(part));
        }
        current
    }

    /// The parent directory of `path`, creating missing intermediates, plus
    /// the final component's name. Fails on the root path.
    pub fn parent_dir_mut(&mut self, path: &str) -> Result<(&mut DirectoryEntry, String)> {
        let (parents, name) = split_parent(path)
            .ok_or_else(|| FsError::IsADirectory("/".to_string()))?;
        let name = name.to_string();
        Ok((self.make_chain(&parents), name))
    }

    /// Removes the file entry at `path`, returning it.
    pub fn remove_file(&mut self, path: &str) -> Result<FileEntry> {
        let (parents, name) = split_parent(path)
            .ok_or_else(|| FsError::IsADirectory("/".to_string()))?;
        let dir = self.walk_mut(&parents)?;
        if dir.directories.contains_key(name) {
            return Err(FsError::IsADirectory(path.to_string()));
        }
        dir.files
            .remove(name)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    /// Removes the directory at `path`. The directory must be empty and
    /// must not be the root.
    pub fn remove_dir(&mut self, path: &str) -> Result<()> {
        let (parents, name) = split_parent(path).ok_or(FsError::RootDirectory)?;
        match self.resolve(path)? {
            Resolved::Dir(dir) => {
                if !dir.files.is_empty() || !dir.directories.is_empty() {
                    return Err(FsError::NotEmpty(path.to_string()));
                }
            }
            Resolved::File(_) => return Err(FsError::NotADirectory(path.to_string())),
            Resolved::Vacant => return Err(FsError::NotFound(path.to_string())),
        }
        let parent = self.walk_mut(&parents)?;
        parent.directories.remove(name);
        Ok(())
    }

    /// Recomputes every metadata checksum in the tree.
    pub fn refresh_crcs(&mut self) {
        refresh_dir(&mut self.root);
    }
}

fn refresh_dir(dir: &mut DirectoryEntry) {
    wire::refresh_metadata_crc(&mut dir.metadata);
    for file in dir.files.values_mut() {
        wire::refresh_metadata_crc(&mut file.metadata);
    }
    for sub in dir.directories.values_mut() {
        refresh_dir(sub);
    }
}

/// Metadata for a newly created entry.
#[must_use]
pub fn fresh_metadata(name: &str) -> FileMetadata {
    let now = unix_now();
    let mut meta = FileMetadata {
        name: name.to_string(),
        mod_time: now,
        create_time: now,
        permissions: 0,
        crc32: 0,
    };
    wire::refresh_metadata_crc(&mut meta);
    meta
}

fn new_directory(name: &str) -> DirectoryEntry {
    let mut dir = DirectoryEntry::default();
    dir.metadata = fresh_metadata(name);
    dir
}
