//! Single-host filesystem stored in three sidecar files: the serialized
//! namespace (`root.yfs`), the free-block bitmap (`bitmap.yfs`) and the
//! block store (`blocks.glob`).

pub mod bitmap;
pub mod chain;
pub mod constants;
pub mod device;
pub mod engine;
pub mod error;
pub mod namespace;
pub mod wire;

pub use engine::{FileInfo, FsOptions, TreeNode, VolumePaths, Yfs};
pub use error::{FsError, Result};
