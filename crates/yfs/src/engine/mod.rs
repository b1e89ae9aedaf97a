//! The public filesystem API over the three sidecar files.

#[cfg(test)]
mod engine_tests;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use prost::Message;
use tracing::debug;

use crate::bitmap::Bitmap;
use crate::chain::ChainManager;
use crate::constants::{BLOCKS_HEADER_SIZE, DEFAULT_BLOCK_SIZE, NULL_BLOCK_ID, SCHEMA_VERSION};
use crate::device::BlockDevice;
use crate::error::{FsError, Result};
use crate::namespace::{self, Namespace, Resolved};
use crate::wire::{self, DirectoryEntry, FileEntry, FilesystemHeader};

/// Paths of the three sidecar files that make up one volume.
#[derive(Debug, Clone)]
pub struct VolumePaths {
    pub root: PathBuf,
    pub bitmap: PathBuf,
    pub blocks: PathBuf,
}

impl VolumePaths {
    /// The conventional file names inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            root: dir.join("root.yfs"),
            bitmap: dir.join("bitmap.yfs"),
            blocks: dir.join("blocks.glob"),
        }
    }
}

/// Creation-time settings for a volume. Ignored when an existing volume is
/// opened; the persisted header wins.
#[derive(Debug, Clone, Copy)]
pub struct FsOptions {
    pub block_size: u32,
    pub checksum_enabled: bool,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            checksum_enabled: true,
        }
    }
}

/// A file or directory as reported by `ls` and `stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub is_directory: bool,
    pub size: i64,
    pub mod_time: i64,
    pub create_time: i64,
    pub block_count: u32,
}

/// One node of the full-tree listing produced by [`Yfs::ls_all`].
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub is_directory: bool,
    pub size: i64,
    pub children: Vec<TreeNode>,
}

#[derive(Debug)]
struct EngineState {
    namespace: Namespace,
    version: u32,
    dirty: bool,
}

/// The filesystem engine.
///
/// All mutating operations serialize under the write lock and persist the
/// namespace and (when dirtied) the bitmap before returning; read
/// operations share the read lock.
#[derive(Debug)]
pub struct Yfs {
    paths: VolumePaths,
    device: BlockDevice,
    block_size: u32,
    checksum_enabled: bool,
    state: RwLock<EngineState>,
    bitmap: Mutex<Bitmap>,
}

impl Yfs {
    /// Opens the volume in `dir`, creating it when absent.
    pub fn open(dir: &Path) -> Result<Self> {
        Self::open_paths_with(VolumePaths::in_dir(dir), FsOptions::default())
    }

    /// Like [`Self::open`], with explicit creation options.
    pub fn open_with(dir: &Path, options: FsOptions) -> Result<Self> {
        Self::open_paths_with(VolumePaths::in_dir(dir), options)
    }

    /// Opens a volume from its three individual file paths.
    pub fn open_paths(root: &Path, bitmap: &Path, blocks: &Path) -> Result<Self> {
        Self::open_paths_with(
            VolumePaths {
                root: root.to_path_buf(),
                bitmap: bitmap.to_path_buf(),
                blocks: blocks.to_path_buf(),
            },
            FsOptions::default(),
        )
    }

    /// Opens or creates the volume described by `paths`. A volume exists
    /// when its root file does.
    pub fn open_paths_with(paths: VolumePaths, options: FsOptions) -> Result<Self> {
        if paths.root.exists() {
            Self::load(paths)
        } else {
            Self::create(paths, options)
        }
    }

    fn create(paths: VolumePaths, options: FsOptions) -> Result<Self> {
        let device = BlockDevice::open(&paths.blocks, options.block_size)?;
        let yfs = Self {
            paths,
            device,
            block_size: options.block_size,
            checksum_enabled: options.checksum_enabled,
            state: RwLock::new(EngineState {
                namespace: Namespace::new_root(),
                version: SCHEMA_VERSION,
                dirty: true,
            }),
            bitmap: Mutex::new(Bitmap::new()),
        };
        {
            let mut state = yfs.write_state();
            yfs.save_root(&mut state)?;
        }
        yfs.save_bitmap()?;
        debug!(root = %yfs.paths.root.display(), "created volume");
        Ok(yfs)
    }

    fn load(paths: VolumePaths) -> Result<Self> {
        let raw = std::fs::read(&paths.root)?;
        let header = FilesystemHeader::decode(raw.as_slice())?;
        if header.block_size == 0 {
            return Err(FsError::InvalidFormat("root header carries a zero block size"));
        }
        let device = BlockDevice::open(&paths.blocks, header.block_size)?;
        let bitmap = Bitmap::load(&paths.bitmap)?;
        Ok(Self {
            paths,
            device,
            block_size: header.block_size,
            checksum_enabled: header.checksum_enabled > 0,
            state: RwLock::new(EngineState {
                namespace: Namespace { root: header.root },
                version: header.version,
                dirty: false,
            }),
            bitmap: Mutex::new(bitmap),
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bitmap_lock(&self) -> MutexGuard<'_, Bitmap> {
        self.bitmap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn chain(&self) -> ChainManager<'_> {
        ChainManager::new(&self.device, &self.bitmap, self.checksum_enabled)
    }

    /// Serializes the whole namespace into the root file.
    fn save_root(&self, state: &mut EngineState) -> Result<()> {
        if self.checksum_enabled {
            state.namespace.refresh_crcs();
        }
        let root = std::mem::take(&mut state.namespace.root);
        let header = FilesystemHeader {
            version: state.version,
            block_size: self.block_size,
            root,
            total_blocks: self.bitmap_lock().total_blocks(),
            checksum_enabled: u32::from(self.checksum_enabled),
        };
        let bytes = header.encode_to_vec();
        state.namespace.root = header.root;
        std::fs::write(&self.paths.root, bytes)?;
        state.dirty = false;
        Ok(())
    }

    fn save_bitmap(&self) -> Result<()> {
        self.bitmap_lock().save(&self.paths.bitmap)
    }

    fn verify_metadata(&self, meta: &wire::FileMetadata, path: &str) -> Result<()> {
        if self.checksum_enabled && meta.crc32 != 0 && !wire::metadata_crc_ok(meta) {
            return Err(FsError::ChecksumMismatch(path.to_string()));
        }
        Ok(())
    }

    /// Creates or replaces the file at `path` with `payload`, materializing
    /// missing parent directories.
    pub fn write_file(&self, path: &str, payload: &[u8]) -> Result<()> {
        let mut state = self.write_state();
        let old_head = match state.namespace.resolve(path) {
            Ok(Resolved::Dir(_)) => return Err(FsError::IsADirectory(path.to_string())),
            Ok(Resolved::File(file)) => file.first_index_block_id,
            Ok(Resolved::Vacant) | Err(FsError::NotFound(_)) => NULL_BLOCK_ID,
            Err(err) => return Err(err),
        };
        state.dirty = true;

        let layout = self.chain().store(payload, old_head)?;
        let now = namespace::unix_now();

        let (parent, name) = state.namespace.parent_dir_mut(path)?;
        let entry = parent
            .files
            .entry(name.clone())
            .or_insert_with(|| FileEntry {
                metadata: namespace::fresh_metadata(&name),
                ..FileEntry::default()
            });
        entry.first_index_block_id = layout.head;
        entry.size = payload.len() as i64;
        entry.index_block_count = layout.index_blocks;
        entry.data_block_count = layout.data_blocks;
        entry.metadata.mod_time = now;
        debug!(path, bytes = payload.len(), "write_file");

        self.save_root(&mut state)?;
        self.save_bitmap()
    }

    /// Returns the exact stored contents of the file at `path`.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let state = self.read_state();
        let file = state.namespace.file(path)?;
        self.verify_metadata(&file.metadata, path)?;
        self.chain().load(file.first_index_block_id, file.size as u64)
    }

    /// Removes the file at `path` and frees every block its chain held.
    pub fn delete_file(&self, path: &str) -> Result<()> {
        let mut state = self.write_state();
        let head = match state.namespace.resolve(path)? {
            Resolved::File(file) => file.first_index_block_id,
            Resolved::Dir(_) => return Err(FsError::IsADirectory(path.to_string())),
            Resolved::Vacant => return Err(FsError::NotFound(path.to_string())),
        };
        state.dirty = true;
        if head != NULL_BLOCK_ID {
            self.chain().release(head)?;
        }
        state.namespace.remove_file(path)?;
        debug!(path, "delete_file");

        self.save_root(&mut state)?;
        self.save_bitmap()
    }

    /// Copies `src` to `dst`. The destination gets an independent block
    /// chain with identical content.
    pub fn copy_file(&self, src: &str, dst: &str) -> Result<()> {
        let data = self.read_file(src)?;
        self.write_file(dst, &data)
    }

    /// Moves `src` to `dst` as copy-then-delete; atomic at the namespace
    /// level but not across a crash between the two steps.
    pub fn move_file(&self, src: &str, dst: &str) -> Result<()> {
        self.copy_file(src, dst)?;
        self.delete_file(src)
    }

    /// Creates the directory at `path`, including missing intermediates.
    pub fn create_directory(&self, path: &str) -> Result<()> {
        let mut state = self.write_state();
        if matches!(state.namespace.resolve(path), Ok(Resolved::Dir(_))) {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        state.dirty = true;
        state.namespace.make_dir_chain(path);
        debug!(path, "create_directory");
        self.save_root(&mut state)
    }

    /// Removes the empty directory at `path`.
    pub fn delete_directory(&self, path: &str) -> Result<()> {
        let mut state = self.write_state();
        state.namespace.remove_dir(path)?;
        state.dirty = true;
        debug!(path, "delete_directory");
        self.save_root(&mut state)
    }

    /// Lists the entries of the directory at `path`: subdirectories first,
    /// then files, each ordered by name.
    pub fn ls(&self, path: &str) -> Result<Vec<FileInfo>> {
        let state = self.read_state();
        let dir = state.namespace.dir(path)?;
        let mut entries = Vec::with_capacity(dir.directories.len() + dir.files.len());
        for (name, sub) in &dir.directories {
            entries.push(FileInfo {
                name: name.clone(),
                is_directory: true,
                size: 0,
                mod_time: sub.metadata.mod_time,
                create_time: sub.metadata.create_time,
                block_count: 0,
            });
        }
        for (name, file) in &dir.files {
            entries.push(FileInfo {
                name: name.clone(),
                is_directory: false,
                size: file.size,
                mod_time: file.metadata.mod_time,
                create_time: file.metadata.create_time,
                block_count: file.data_block_count,
            });
        }
        Ok(entries)
    }

    /// The whole tree rooted at `/`.
    #[must_use]
    pub fn ls_all(&self) -> TreeNode {
        let state = self.read_state();
        build_tree("/", &state.namespace.root)
    }

    /// Information about the file or directory at `path`.
    pub fn stat(&self, path: &str) -> Result<FileInfo> {
        let state = self.read_state();
        match state.namespace.resolve(path)? {
            Resolved::Dir(dir) => Ok(FileInfo {
                name: dir.metadata.name.clone(),
                is_directory: true,
                size: 0,
                mod_time: dir.metadata.mod_time,
                create_time: dir.metadata.create_time,
                block_count: 0,
            }),
            Resolved::File(file) => {
                self.verify_metadata(&file.metadata, path)?;
                Ok(FileInfo {
                    name: file.metadata.name.clone(),
                    is_directory: false,
                    size: file.size,
                    mod_time: file.metadata.mod_time,
                    create_time: file.metadata.create_time,
                    block_count: file.data_block_count,
                })
            }
            Resolved::Vacant => Err(FsError::NotFound(path.to_string())),
        }
    }

    /// Volume counters: version, block geometry, allocation totals and the
    /// blocks-file size.
    pub fn get_stats(&self) -> Result<BTreeMap<String, u64>> {
        let state = self.read_state();
        let (total, used, search_pos) = {
            let bitmap = self.bitmap_lock();
            (
                bitmap.total_blocks(),
                bitmap.used_count(),
                bitmap.search_pos(),
            )
        };
        let file_len = self.device.file_len()?;
        let allocated = file_len.saturating_sub(BLOCKS_HEADER_SIZE) / u64::from(self.block_size);

        let mut stats = BTreeMap::new();
        stats.insert("version".to_string(), u64::from(state.version));
        stats.insert("block_size".to_string(), u64::from(self.block_size));
        stats.insert("total_blocks".to_string(), total);
        stats.insert("allocated_blocks".to_string(), allocated);
        stats.insert("used_blocks".to_string(), used);
        stats.insert("free_blocks".to_string(), total - used);
        stats.insert(
            "checksum_enabled".to_string(),
            u64::from(self.checksum_enabled),
        );
        stats.insert("bitmap_search_pos".to_string(), search_pos);
        stats.insert("blocks_file_size".to_string(), file_len);
        Ok(stats)
    }

    /// Flushes the namespace and the bitmap if either changed.
    pub fn sync(&self) -> Result<()> {
        let mut state = self.write_state();
        if state.dirty {
            self.save_root(&mut state)?;
        }
        self.save_bitmap()
    }

    /// Synonym for [`Self::sync`].
    pub fn close(&self) -> Result<()> {
        self.sync()
    }

    /// Succeeds iff every metadata checksum verifies and no index chain
    /// contains a cycle or an out-of-range reference.
    pub fn verify_integrity(&self) -> Result<()> {
        let state = self.read_state();
        let total = self.bitmap_lock().total_blocks();
        self.verify_dir(&state.namespace.root, "/", total)
    }

    fn verify_dir(&self, dir: &DirectoryEntry, path: &str, total: u64) -> Result<()> {
        self.verify_metadata(&dir.metadata, path)?;
        for (name, file) in &dir.files {
            let file_path = join_path(path, name);
            self.verify_metadata(&file.metadata, &file_path)?;
            self.chain().verify(file.first_index_block_id, total)?;
        }
        for (name, sub) in &dir.directories {
            self.verify_dir(sub, &join_path(path, name), total)?;
        }
        Ok(())
    }

    /// Resets the allocator's search position to the start of the volume.
    pub fn defragment(&self) -> Result<()> {
        let _state = self.write_state();
        self.bitmap_lock().reset_search();
        self.save_bitmap()
    }

    /// The block size this volume was created with.
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }
}

fn build_tree(name: &str, dir: &DirectoryEntry) -> TreeNode {
    let mut children: Vec<TreeNode> = dir
        .directories
        .iter()
        .map(|(child_name, child)| build_tree(child_name, child))
        .collect();
    children.extend(dir.files.iter().map(|(child_name, file)| TreeNode {
        name: child_name.clone(),
        is_directory: false,
        size: file.size,
        children: Vec::new(),
    }));
    TreeNode {
        name: name.to_string(),
        is_directory: true,
        size: 0,
        children,
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base == "/" {
        format!("/{name}")
    } else {
        format!("{base}/{name}")
    }
}
