use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Command script, read from stdin when absent
    #[arg(long, short)]
    pub script: Option<PathBuf>,

    /// Total blocks of the ramdisk
    #[arg(long, short, default_value_t = ramfs::DEFAULT_TOTAL_BLOCKS)]
    pub blocks: u32,

    /// Blocks reserved for the inode table
    #[arg(long, short, default_value_t = ramfs::DEFAULT_INODE_AREA_BLOCKS)]
    pub inode_blocks: u32,

    /// Process issuing the first requests
    #[arg(long, short, default_value_t = 1)]
    pub pid: usize,
}
