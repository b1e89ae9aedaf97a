//! Index-block chains mapping file payloads to data blocks.


use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use prost::Message;
use tracing::debug;

use crate::bitmap::Bitmap;
use crate::constants::{MAX_IDS_PER_INDEX, NULL_BLOCK_ID};
use crate::device::BlockDevice;
use crate::error::{FsError, Result};
use crate::wire::{self, IndexBlock};

/// Worst-case varint width of one block id.
const ID_WIRE_WIDTH: usize = 5;
/// Room reserved in an index record for the next pointer, data size,
/// checksum and field headers.
const RECORD_RESERVE: usize = 32;

/// Outcome of storing a payload: the chain head plus the block accounting
/// carried by the owning file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLayout {
    pub head: u32,
    pub index_blocks: u32,
    pub data_blocks: u32,
}

impl ChainLayout {
    const EMPTY: Self = Self {
        head: NULL_BLOCK_ID,
        index_blocks: 0,
        data_blocks: 0,
    };
}

/// Builds and walks index-block chains. Borrows the device and the bitmap
/// for the duration of one engine operation.
pub struct ChainManager<'a> {
    device: &'a BlockDevice,
    bitmap: &'a Mutex<Bitmap>,
    checksum_enabled: bool,
}

impl<'a> ChainManager<'a> {
    pub const fn new(
        device: &'a BlockDevice,
        bitmap: &'a Mutex<Bitmap>,
        checksum_enabled: bool,
    ) -> Self {
        Self {
            device,
            bitmap,
            checksum_enabled,
        }
    }

    fn bitmap(&self) -> MutexGuard<'_, Bitmap> {
        self.bitmap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// How many ids one index record may carry so that its serialized form
    /// always fits in a block.
    fn ids_per_index(&self) -> usize {
        let fit = self
            .device
            .max_payload()
            .saturating_sub(RECORD_RESERVE)
            / ID_WIRE_WIDTH;
        fit.clamp(1, MAX_IDS_PER_INDEX)
    }

    /// Writes `payload` as a fresh chain, then frees the chain at
    /// `old_head`. An empty payload only frees the old chain. Every id
    /// allocated before a failure is released again.
    pub fn store(&self, payload: &[u8], old_head: u32) -> Result<ChainLayout> {
        if payload.is_empty() {
            if old_head != NULL_BLOCK_ID {
                self.release(old_head)?;
            }
            return Ok(ChainLayout::EMPTY);
        }

        let slot = self.device.max_payload();
        let n_data = payload.len().div_ceil(slot) as u32;
        let data_ids = self.bitmap().allocate(n_data)?;

        let mut index_ids = Vec::new();
        match self.write_chain(payload, slot, &data_ids, &mut index_ids) {
            Ok(head) => {
                if old_head != NULL_BLOCK_ID {
                    self.release(old_head)?;
                }
                debug!(
                    head,
                    data_blocks = data_ids.len(),
                    index_blocks = index_ids.len(),
                    "stored chain"
                );
                Ok(ChainLayout {
                    head,
                    index_blocks: index_ids.len() as u32,
                    data_blocks: data_ids.len() as u32,
                })
            }
            Err(err) => {
                index_ids.extend_from_slice(&data_ids);
                self.bitmap().free(&index_ids);
                Err(err)
            }
        }
    }

    fn write_chain(
        &self,
        payload: &[u8],
        slot: usize,
        data_ids: &[u32],
        index_ids: &mut Vec<u32>,
    ) -> Result<u32> {
        for (i, &id) in data_ids.iter().enumerate() {
            let start = i * slot;
            let end = payload.len().min(start + slot);
            self.device.write_block(id, &payload[start..end])?;
        }

        let groups: Vec<&[u32]> = data_ids.chunks(self.ids_per_index()).collect();
        for _ in &groups {
            index_ids.push(self.bitmap().allocate(1)?[0]);
        }
        for (i, group) in groups.iter().enumerate() {
            let record = IndexBlock {
                block_ids: group.to_vec(),
                extents: Vec::new(),
                next_index_block_id: index_ids.get(i + 1).copied().unwrap_or(NULL_BLOCK_ID),
                data_size: (group.len() * slot) as u32,
                crc32: 0,
            };
            self.write_index_record(index_ids[i], record)?;
        }
        Ok(index_ids[0])
    }

    fn write_index_record(&self, id: u32, mut record: IndexBlock) -> Result<()> {
        if self.checksum_enabled {
            record.crc32 = wire::index_crc(
                &record.block_ids,
                &record.extents,
                record.next_index_block_id,
            );
        }
        self.device.write_block(id, &record.encode_to_vec())
    }

    /// Reads the index record stored in block `id`, verifying its checksum
    /// when one is present.
    pub fn read_index_record(&self, id: u32) -> Result<IndexBlock> {
        let bytes = self.device.read_block(id)?;
        let record = IndexBlock::decode(bytes.as_slice())?;
        if self.checksum_enabled && record.crc32 != 0 {
            let expected = wire::index_crc(
                &record.block_ids,
                &record.extents,
                record.next_index_block_id,
            );
            if record.crc32 != expected {
                return Err(FsError::ChecksumMismatch(format!("index block {id}")));
            }
        }
        Ok(record)
    }

    /// Reads at most `size` bytes from the chain starting at `head`,
    /// individual ids before extents within each record.
    pub fn load(&self, head: u32, size: u64) -> Result<Vec<u8>> {
        if head == NULL_BLOCK_ID || size == 0 {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(size as usize);
        let mut current = head;
        while current != NULL_BLOCK_ID && (out.len() as u64) < size {
            let record = self.read_index_record(current)?;
            let ids = record
                .block_ids
                .iter()
                .copied()
                .chain(record.extents.iter().flat_map(wire::Extent::block_ids));
            for id in ids {
                if out.len() as u64 >= size {
                    break;
                }
                let data = self.device.read_block(id)?;
                let remaining = (size - out.len() as u64) as usize;
                let take = data.len().min(remaining);
                out.extend_from_slice(&data[..take]);
            }
            current = record.next_index_block_id;
        }
        Ok(out)
    }

    /// Frees every data and index block reachable from `head`.
    pub fn release(&self, head: u32) -> Result<()> {
        let mut visited = HashSet::new();
        let mut current = head;
        while current != NULL_BLOCK_ID {
            if !visited.insert(current) {
                return Err(FsError::CorruptChain(format!(
                    "cycle at index block {current}"
                )));
            }
            let record = self.read_index_record(current)?;
            let mut ids = record.block_ids;
            for extent in &record.extents {
                ids.extend(extent.block_ids());
            }
            ids.push(current);
            self.bitmap().free(&ids);
            current = record.next_index_block_id;
        }
        debug!(head, "released chain");
        Ok(())
    }

    /// Walks the chain at `head`, checking for cycles and ids or extents
    /// outside `[1, total_blocks]`.
    pub fn verify(&self, head: u32, total_blocks: u64) -> Result<()> {
        let mut visited = HashSet::new();
        let mut current = head;
        while current != NULL_BLOCK_ID {
            if !visited.insert(current) {
                return Err(FsError::CorruptChain(format!(
                    "cycle at index block {current}"
                )));
            }
            let record = self.read_index_record(current)?;
            for &id in &record.block_ids {
                if id == NULL_BLOCK_ID || u64::from(id) > total_blocks {
                    return Err(FsError::CorruptChain(format!(
                        "data block {id} out of range in index block {current}"
                    )));
                }
            }
            for extent in &record.extents {
                let end = u64::from(extent.start_block_id) + u64::from(extent.block_count);
                if extent.start_block_id == NULL_BLOCK_ID || end > total_blocks + 1 {
                    return Err(FsError::CorruptChain(format!(
                        "extent {}+{} out of range in index block {current}",
                        extent.start_block_id, extent.block_count
                    )));
                }
            }
            current = record.next_index_block_id;
        }
        Ok(())
    }
}
