/// Block size used when a volume is created without explicit options.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;
/// Width of the `blocks.glob` file header: the block size as a u32.
pub const BLOCKS_HEADER_SIZE: u64 = 4;
/// Bytes at the front of every block reserved for the payload length.
pub const BLOCK_FRAME_BYTES: u32 = 4;
/// Sentinel id that never addresses a real block.
pub const NULL_BLOCK_ID: u32 = 0;
/// Upper bound on data-block ids recorded in a single index block.
pub const MAX_IDS_PER_INDEX: usize = 1000;
/// Bytes appended to the bitmap each time it grows (8192 block positions).
pub const BITMAP_GROW_BYTES: usize = 1024;
/// Schema version stamped into freshly created volumes.
pub const SCHEMA_VERSION: u32 = 2;
