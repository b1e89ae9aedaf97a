//! Random-access block device over the `blocks.glob` sidecar file.


use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::constants::{BLOCKS_HEADER_SIZE, BLOCK_FRAME_BYTES, NULL_BLOCK_ID};
use crate::error::{FsError, Result};

/// Fixed-size block store addressed by 1-based block id.
///
/// The file is opened per operation; nothing is cached between calls. Every
/// block starts with its payload length as a u32 LE, so the usable payload
/// per block is `block_size - 4`.
#[derive(Debug)]
pub struct BlockDevice {
    path: PathBuf,
    block_size: u32,
}

impl BlockDevice {
    /// Opens the block file, creating it with a header when absent. An
    /// existing file must carry the same block size in its header.
    pub fn open(path: &Path, block_size: u32) -> Result<Self> {
        if block_size <= BLOCK_FRAME_BYTES {
            return Err(FsError::InvalidFormat(
                "block size must exceed the 4-byte frame header",
            ));
        }
        if path.exists() {
            let stored = read_header(path)?;
            if stored != block_size {
                return Err(FsError::InvalidFormat(
                    "blocks file header disagrees with the volume block size",
                ));
            }
        } else {
            let mut file = File::create(path)?;
            file.write_all(&block_size.to_le_bytes())?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            block_size,
        })
    }

    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Largest payload one block can hold.
    #[must_use]
    pub const fn max_payload(&self) -> usize {
        (self.block_size - BLOCK_FRAME_BYTES) as usize
    }

    /// Current size of the block file in bytes.
    pub fn file_len(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn offset(&self, id: u32) -> Result<u64> {
        if id == NULL_BLOCK_ID {
            return Err(FsError::InvalidBlockId(id));
        }
        Ok(BLOCKS_HEADER_SIZE + u64::from(self.block_size) * u64::from(id - 1))
    }

    /// Writes `payload` into block `id`, zero-padding up to the block size.
    /// Writing past the current end of the file extends it.
    pub fn write_block(&self, id: u32, payload: &[u8]) -> Result<()> {
        let max = self.max_payload();
        if payload.len() > max {
            return Err(FsError::OversizedPayload {
                len: payload.len(),
                max,
            });
        }
        let offset = self.offset(id)?;

        let mut block = vec![0u8; self.block_size as usize];
        block[..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        block[4..4 + payload.len()].copy_from_slice(payload);

        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&block)?;
        Ok(())
    }

    /// Returns the framed payload stored in block `id`.
    pub fn read_block(&self, id: u32) -> Result<Vec<u8>> {
        let offset = self.offset(id)?;
        let mut file = File::open(&self.path)?;
        if offset + u64::from(self.block_size) > file.metadata()?.len() {
            return Err(FsError::InvalidBlockId(id));
        }
        file.seek(SeekFrom::Start(offset))?;

        let mut block = vec![0u8; self.block_size as usize];
        file.read_exact(&mut block)?;

        let len = u32::from_le_bytes([block[0], block[1], block[2], block[3]]) as usize;
        if len > self.max_payload() {
            return Err(FsError::CorruptChain(format!(
                "block {id}: stored payload length {len} exceeds block capacity"
            )));
        }
        block.drain(..4);
        block.truncate(len);
        Ok(block)
    }
}

fn read_header(path: &Path) -> Result<u32> {
    let mut file = File::open(path)?;
    let mut header = [0u8; BLOCKS_HEADER_SIZE as usize];
    file.read_exact(&mut header)
        .map_err(|_| FsError::InvalidFormat("blocks file is too short for its header"))?;
    Ok(u32::from_le_bytes(header))
}
