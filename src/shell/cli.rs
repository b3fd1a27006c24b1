use clap::Parser;

use crate::disk::SECTOR_COUNT;

/// 交互式 shell 的启动参数
#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about = "interactive shell over a sector file system image")]
pub struct ShellArgs {
    /// the path of the disk image file
    #[clap(short, long, default_value = "disk.img")]
    pub disk: String,
    /// the sector count of a newly created image
    #[clap(short, long, default_value_t = SECTOR_COUNT)]
    pub sectors: u64,
    /// keep the disk in memory instead of a file
    #[clap(short, long)]
    pub memory: bool,
}
