//! Wire types persisted in `root.yfs` and inside index blocks.
//!
//! The schema is protobuf: readers and writers of the same volume must agree
//! on tag numbers and the LE varint encoding of integers. Maps are
//! `BTreeMap` so that encoding the same tree always produces the same bytes.

use std::collections::BTreeMap;

/// Process-wide header persisted as the whole of `root.yfs`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FilesystemHeader {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(uint32, tag = "2")]
    pub block_size: u32,
    #[prost(message, required, tag = "3")]
    pub root: DirectoryEntry,
    #[prost(uint64, tag = "4")]
    pub total_blocks: u64,
    #[prost(uint32, tag = "5")]
    pub checksum_enabled: u32,
}

/// A directory: metadata plus named files and named subdirectories.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DirectoryEntry {
    #[prost(message, required, tag = "1")]
    pub metadata: FileMetadata,
    #[prost(btree_map = "string, message", tag = "2")]
    pub files: BTreeMap<String, FileEntry>,
    #[prost(btree_map = "string, message", tag = "3")]
    pub directories: BTreeMap<String, DirectoryEntry>,
}

/// A regular file. `first_index_block_id` is 0 when the file is empty.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FileEntry {
    #[prost(message, required, tag = "1")]
    pub metadata: FileMetadata,
    #[prost(uint32, tag = "2")]
    pub first_index_block_id: u32,
    #[prost(int64, tag = "3")]
    pub size: i64,
    #[prost(uint32, tag = "4")]
    pub index_block_count: u32,
    #[prost(uint32, tag = "5")]
    pub data_block_count: u32,
}

/// Metadata embedded in files and directories. Permissions are stored but
/// never enforced.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FileMetadata {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    pub mod_time: i64,
    #[prost(int64, tag = "3")]
    pub create_time: i64,
    #[prost(uint32, tag = "4")]
    pub permissions: u32,
    #[prost(uint32, tag = "5")]
    pub crc32: u32,
}

/// On-disk record stored inside one block, naming the data blocks that make
/// up part of a file. `next_index_block_id` of 0 terminates the chain.
#[derive(Clone, PartialEq, prost::Message)]
pub struct IndexBlock {
    #[prost(uint32, repeated, tag = "1")]
    pub block_ids: Vec<u32>,
    #[prost(message, repeated, tag = "2")]
    pub extents: Vec<Extent>,
    #[prost(uint32, tag = "3")]
    pub next_index_block_id: u32,
    #[prost(uint32, tag = "4")]
    pub data_size: u32,
    #[prost(uint32, tag = "5")]
    pub crc32: u32,
}

/// A run of `block_count` contiguous data blocks starting at
/// `start_block_id`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Extent {
    #[prost(uint32, tag = "1")]
    pub start_block_id: u32,
    #[prost(uint32, tag = "2")]
    pub block_count: u32,
}

impl Extent {
    /// The block ids covered by this extent.
    #[must_use]
    pub fn block_ids(&self) -> std::ops::Range<u32> {
        self.start_block_id..self.start_block_id.saturating_add(self.block_count)
    }
}

/// CRC-32/IEEE over the canonical textual join of the metadata fields.
#[must_use]
pub fn metadata_crc(meta: &FileMetadata) -> u32 {
    let text = format!(
        "{}{}{}{}",
        meta.name, meta.mod_time, meta.create_time, meta.permissions
    );
    crc32fast::hash(text.as_bytes())
}

/// Stamps `meta` with its current checksum.
pub fn refresh_metadata_crc(meta: &mut FileMetadata) {
    meta.crc32 = metadata_crc(meta);
}

/// Whether the stored checksum matches the metadata fields.
#[must_use]
pub fn metadata_crc_ok(meta: &FileMetadata) -> bool {
    meta.crc32 == metadata_crc(meta)
}

/// CRC-32/IEEE over a deterministic textual rendering of an index record's
/// ids, extents and next pointer.
#[must_use]
pub fn index_crc(block_ids: &[u32], extents: &[Extent], next: u32) -> u32 {
    use std::fmt::Write as _;

    let mut text = String::new();
    text.push('[');
    for (i, id) in block_ids.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        let _ = write!(text, "{id}");
    }
    text.push_str("][");
    for (i, extent) in extents.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        let _ = write!(text, "({},{})", extent.start_block_id, extent.block_count);
    }
    text.push(']');
    let _ = write!(text, "{next}");
    crc32fast::hash(text.as_bytes())
}
