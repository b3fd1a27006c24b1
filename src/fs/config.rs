use crate::disk::SECTOR_SIZE as DISK_SECTOR_SIZE;

/// 超级块魔数，用于识别分区是否已格式化
pub const SUPER_BLOCK_MAGIC: u32 = 0x2021_0515;

// 为方便实现，一个块大小就是一个扇区
pub const SECTOR_SIZE: u32 = DISK_SECTOR_SIZE as u32;
pub const BLOCK_SIZE: u32 = SECTOR_SIZE;
pub const BITS_PER_SECTOR: u32 = SECTOR_SIZE * 8;

/// 每个分区最多可创建的文件数
pub const MAX_FILES_PER_PART: u32 = 4096;

/// 根目录 inode 编号
pub const ROOT_INODE_NO: u32 = 0;

// 12 个直接块 + 1 个一级间接块表（128 个指针）
pub const DIRECT_BLOCKS: usize = 12;
pub const INDIRECT_SLOTS: usize = (BLOCK_SIZE / 4) as usize;
pub const BLOCK_PTRS: usize = DIRECT_BLOCKS + 1;
pub const MAX_FILE_BLOCKS: usize = DIRECT_BLOCKS + INDIRECT_SLOTS;
pub const MAX_FILE_SIZE: u32 = MAX_FILE_BLOCKS as u32 * BLOCK_SIZE;

/// inode 在磁盘上的大小：4 个 u32 字段 + 13 个块指针 + 2 个链表字
pub const INODE_SIZE: u32 = (4 + BLOCK_PTRS as u32 + 2) * 4;

/// 目录项大小：16 字节文件名 + inode 号 + 文件类型
pub const DIR_ENTRY_SIZE: u32 = MAX_FILE_NAME_LEN as u32 + 4 + 4;
pub const DIR_ENTRIES_PER_SECTOR: usize = (SECTOR_SIZE / DIR_ENTRY_SIZE) as usize;

pub const MAX_FILE_NAME_LEN: usize = 16;
pub const MAX_PATH_LEN: usize = 512;

/// 系统最大可打开文件数，0~2 留给标准输入输出
pub const MAX_FILE_OPEN: usize = 32;
pub const FIRST_FD: usize = 3;

// 引导扇区 + 超级块
pub const BOOT_SECTORS: u32 = 1;
pub const SUPER_BLOCK_SECTORS: u32 = 1;
