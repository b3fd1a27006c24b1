/// 每个扇区（Sector）的大小：512 字节
/// 块设备以扇区为最小读写单位，文件系统的一个块也就是一个扇区。
pub const SECTOR_SIZE: usize = 512;

/// 默认虚拟磁盘大小：64MB
pub const DISK_SIZE: u64 = 64 * 1024 * 1024;

/// 默认虚拟磁盘扇区数：64MB / 512B = 131072
pub const SECTOR_COUNT: u64 = DISK_SIZE / SECTOR_SIZE as u64;

/// 一个扇区的字节数组，所有磁盘读写都以 Block 为单位进行。
pub type Block = [u8; SECTOR_SIZE];
