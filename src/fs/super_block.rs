use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    disk::{Block, BlockDevice, SECTOR_SIZE},
    fs::{
        bitmap::Bitmap,
        config::{
            BITS_PER_SECTOR, BOOT_SECTORS, DIR_ENTRY_SIZE, INODE_SIZE, MAX_FILES_PER_PART,
            ROOT_INODE_NO, SUPER_BLOCK_MAGIC, SUPER_BLOCK_SECTORS,
        },
        directory::{DirEntry, FileType},
        error::{FsError, Result},
        inode::Inode,
    },
    utils::div_round_up,
};

/// 超级块，占分区第 1 个扇区（第 0 个是引导扇区），格式化后只读
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBlock {
    pub magic: u32,        // 魔数，用于识别文件系统
    pub sector_count: u32, // 本分区总扇区数
    pub inode_count: u32,  // 本分区 inode 数量
    pub part_lba_base: u32, // 本分区起始 lba

    pub block_bitmap_lba: u32,   // 块位图起始扇区
    pub block_bitmap_sects: u32, // 块位图占用扇区数

    pub inode_bitmap_lba: u32,
    pub inode_bitmap_sects: u32,

    pub inode_table_lba: u32,
    pub inode_table_sects: u32,

    pub data_start_lba: u32, // 数据区第一个扇区
    pub root_inode_no: u32,
    pub dir_entry_size: u32,
}

impl SuperBlock {
    /// 根据分区大小计算各区域的位置，返回超级块和块位图中有效位的个数
    pub fn layout(start_lba: u32, sector_count: u32) -> Result<(Self, u32)> {
        let inode_bitmap_sects = div_round_up(MAX_FILES_PER_PART, BITS_PER_SECTOR);
        let inode_table_sects = div_round_up(INODE_SIZE * MAX_FILES_PER_PART, SECTOR_SIZE as u32);
        let used_sects = BOOT_SECTORS + SUPER_BLOCK_SECTORS + inode_bitmap_sects + inode_table_sects;

        // 至少要放下一个块位图扇区和根目录的数据块
        if sector_count < used_sects + 2 {
            return Err(FsError::PartitionTooSmall(sector_count));
        }
        let free_sects = sector_count - used_sects;

        // 块位图本身也要占用空闲扇区，先粗算一次，再按剩下的位数重算
        let block_bitmap_sects = div_round_up(free_sects, BITS_PER_SECTOR);
        let block_bitmap_bits = free_sects - block_bitmap_sects;
        let block_bitmap_sects = div_round_up(block_bitmap_bits, BITS_PER_SECTOR);

        let block_bitmap_lba = start_lba + BOOT_SECTORS + SUPER_BLOCK_SECTORS;
        let inode_bitmap_lba = block_bitmap_lba + block_bitmap_sects;
        let inode_table_lba = inode_bitmap_lba + inode_bitmap_sects;
        let data_start_lba = inode_table_lba + inode_table_sects;

        let sb = Self {
            magic: SUPER_BLOCK_MAGIC,
            sector_count,
            inode_count: MAX_FILES_PER_PART,
            part_lba_base: start_lba,
            block_bitmap_lba,
            block_bitmap_sects,
            inode_bitmap_lba,
            inode_bitmap_sects,
            inode_table_lba,
            inode_table_sects,
            data_start_lba,
            root_inode_no: ROOT_INODE_NO,
            dir_entry_size: DIR_ENTRY_SIZE,
        };
        Ok((sb, block_bitmap_bits))
    }

    pub fn is_formatted(&self) -> bool {
        self.magic == SUPER_BLOCK_MAGIC
    }

    /// 超级块所在扇区
    pub fn lba(start_lba: u32) -> u32 {
        start_lba + BOOT_SECTORS
    }

    pub fn read(device: &dyn BlockDevice, start_lba: u32) -> Result<Self> {
        let mut buf: Block = [0; SECTOR_SIZE];
        device.read_block(Self::lba(start_lba) as u64, &mut buf)?;
        Ok(bincode::deserialize(&buf)?)
    }

    pub fn write(&self, device: &dyn BlockDevice) -> Result<()> {
        // 其余字节补 0，凑够一个扇区
        let mut buf: Block = [0; SECTOR_SIZE];
        bincode::serialize_into(&mut buf[..], self)?;
        device.write_block(Self::lba(self.part_lba_base) as u64, &buf)?;
        Ok(())
    }
}

/// 格式化分区：写超级块、两张位图、根目录 inode 和根目录的数据块
pub fn format(device: &dyn BlockDevice, start_lba: u32, sector_count: u32) -> Result<SuperBlock> {
    let (sb, block_bitmap_bits) = SuperBlock::layout(start_lba, sector_count)?;

    info!(
        "formatting partition at lba {}: {} sectors, block bitmap {}+{}, inode bitmap {}+{}, inode table {}+{}, data start {}",
        sb.part_lba_base,
        sb.sector_count,
        sb.block_bitmap_lba,
        sb.block_bitmap_sects,
        sb.inode_bitmap_lba,
        sb.inode_bitmap_sects,
        sb.inode_table_lba,
        sb.inode_table_sects,
        sb.data_start_lba
    );

    // 1 超级块
    sb.write(device)?;

    // 2 块位图：第 0 块留给根目录，超出实际块数的尾部位直接置为已占用
    let mut block_bitmap = Bitmap::new(sb.block_bitmap_sects);
    block_bitmap.set(0, true);
    for index in block_bitmap_bits as usize..block_bitmap.bit_len() {
        block_bitmap.set(index, true);
    }
    device.write_blocks(sb.block_bitmap_lba as u64, block_bitmap.as_bytes())?;

    // 3 inode 位图：第 0 个 inode 分给根目录
    let mut inode_bitmap = Bitmap::new(sb.inode_bitmap_sects);
    inode_bitmap.set(ROOT_INODE_NO as usize, true);
    device.write_blocks(sb.inode_bitmap_lba as u64, inode_bitmap.as_bytes())?;

    // 4 inode 表，只有根目录一项
    let mut table = vec![0u8; (sb.inode_table_sects * SECTOR_SIZE as u32) as usize];
    let mut root = Inode::new(ROOT_INODE_NO);
    root.size = sb.dir_entry_size * 2;
    root.blocks[0] = sb.data_start_lba;
    root.encode_into(&mut table[..INODE_SIZE as usize])?;
    device.write_blocks(sb.inode_table_lba as u64, &table)?;

    // 5 根目录的 "." 和 ".."，根目录的父目录仍是它自己
    let mut buf: Block = [0; SECTOR_SIZE];
    DirEntry::new(".", ROOT_INODE_NO, FileType::Directory)?.encode_into(&mut buf, 0)?;
    DirEntry::new("..", ROOT_INODE_NO, FileType::Directory)?.encode_into(&mut buf, 1)?;
    device.write_block(sb.data_start_lba as u64, &buf)?;

    info!("format done, root directory at lba {}", sb.data_start_lba);
    Ok(sb)
}
