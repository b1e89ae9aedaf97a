use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use yfs::Yfs;

/// Interactive shell for YFS volumes.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory containing root.yfs, bitmap.yfs and blocks.glob.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Path to the serialized namespace (historically the `index` file).
    #[arg(long, alias = "index")]
    pub root: Option<PathBuf>,

    /// Path to the free-block bitmap (historically the `free` file).
    #[arg(long, alias = "free")]
    pub bitmap: Option<PathBuf>,

    /// Path to the block store.
    #[arg(long)]
    pub blocks: Option<PathBuf>,
}

impl Cli {
    /// Opens the volume named by the flags: either `--dir`, or all three
    /// explicit file paths.
    pub fn open(&self) -> Result<Yfs> {
        match (&self.dir, &self.root, &self.bitmap, &self.blocks) {
            (Some(dir), None, None, None) => Ok(Yfs::open(dir)?),
            (None, Some(root), Some(bitmap), Some(blocks)) => {
                Ok(Yfs::open_paths(root, bitmap, blocks)?)
            }
            (Some(_), _, _, _) => bail!("cannot combine --dir with individual file paths"),
            _ => bail!("specify either --dir or all of --root, --bitmap and --blocks"),
        }
    }
}
