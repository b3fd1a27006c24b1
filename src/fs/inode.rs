use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    fs::{
        config::{BLOCK_PTRS, DIRECT_BLOCKS, INODE_SIZE, ROOT_INODE_NO, SECTOR_SIZE},
        error::{FsError, Result},
        partition::{OpenInode, Partition},
    },
    utils::lock,
};

/// 内存中的 inode
///
/// 对文件来说 `size` 是文件大小，对目录来说是所有目录项大小之和。
/// `blocks[0..12]` 是直接块，`blocks[12]` 是一级间接块表。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub number: u32,
    pub size: u32,
    pub blocks: [u32; BLOCK_PTRS],
    /// 写文件不能并行，写之前检查此标志；不落盘
    pub write_deny: bool,
}

/// inode 在磁盘上的格式，打开计数、写标志和链表字写盘时总是 0
#[derive(Debug, Default, Serialize, Deserialize)]
struct InodeRecord {
    number: u32,
    size: u32,
    open_count: u32,
    write_deny: u32,
    blocks: [u32; BLOCK_PTRS],
    list_link: [u32; 2],
}

impl Inode {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            size: 0,
            blocks: [0; BLOCK_PTRS],
            write_deny: false,
        }
    }

    /// 一级间接块表的 lba，0 表示没有
    pub fn indirect_table(&self) -> u32 {
        self.blocks[DIRECT_BLOCKS]
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> Result<()> {
        let record = InodeRecord {
            number: self.number,
            size: self.size,
            blocks: self.blocks,
            ..Default::default()
        };
        bincode::serialize_into(&mut buf[..INODE_SIZE as usize], &record)?;
        Ok(())
    }

    /// 解码 `number` 号 inode 的记录；编号以位置为准，不信任记录里的 number 字段
    pub fn decode(number: u32, buf: &[u8]) -> Result<Self> {
        let record: InodeRecord = bincode::deserialize(&buf[..INODE_SIZE as usize])?;
        Ok(Self {
            number,
            size: record.size,
            blocks: record.blocks,
            write_deny: false,
        })
    }
}

/// inode 在 inode 表中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodePosition {
    pub lba: u32,
    /// 扇区内的字节偏移
    pub offset: usize,
    /// inode 是否跨越两个扇区
    pub two_sectors: bool,
}

impl InodePosition {
    fn sectors(&self) -> usize {
        if self.two_sectors {
            2
        } else {
            1
        }
    }
}

/// 共享的已打开 inode，由 `Partition::open_inode` 发放，必须交还 `close_inode`
#[derive(Debug)]
pub struct InodeHandle {
    number: u32,
    inode: Arc<Mutex<Inode>>,
}

impl InodeHandle {
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn lock(&self) -> MutexGuard<'_, Inode> {
        lock(&self.inode)
    }
}

impl Partition {
    pub fn locate_inode(&self, inode_no: u32) -> Result<InodePosition> {
        if inode_no >= self.sb.inode_count {
            return Err(FsError::InvalidInode(inode_no));
        }
        let byte_offset = inode_no * INODE_SIZE;
        let offset = (byte_offset % SECTOR_SIZE) as usize;
        Ok(InodePosition {
            lba: self.sb.inode_table_lba + byte_offset / SECTOR_SIZE,
            offset,
            two_sectors: SECTOR_SIZE as usize - offset < INODE_SIZE as usize,
        })
    }

    /// 直接从 inode 表读取，不经过缓存
    pub fn read_inode(&self, inode_no: u32) -> Result<Inode> {
        let pos = self.locate_inode(inode_no)?;
        let mut buf = [0u8; 2 * SECTOR_SIZE as usize];
        let len = pos.sectors() * SECTOR_SIZE as usize;
        self.device.read_blocks(pos.lba as u64, &mut buf[..len])?;
        Inode::decode(inode_no, &buf[pos.offset..])
    }

    /// 把 inode 写回 inode 表；扇区是整块读写的，所以先读出再拼接
    pub fn write_inode(&self, inode: &Inode) -> Result<()> {
        let pos = self.locate_inode(inode.number)?;
        let mut buf = [0u8; 2 * SECTOR_SIZE as usize];
        let len = pos.sectors() * SECTOR_SIZE as usize;
        self.device.read_blocks(pos.lba as u64, &mut buf[..len])?;
        inode.encode_into(&mut buf[pos.offset..])?;
        self.device.write_blocks(pos.lba as u64, &buf[..len])?;
        Ok(())
    }

    /// 抹掉 inode 表中的记录
    fn erase_inode(&self, inode_no: u32) -> Result<()> {
        let pos = self.locate_inode(inode_no)?;
        let mut buf = [0u8; 2 * SECTOR_SIZE as usize];
        let len = pos.sectors() * SECTOR_SIZE as usize;
        self.device.read_blocks(pos.lba as u64, &mut buf[..len])?;
        buf[pos.offset..pos.offset + INODE_SIZE as usize].fill(0);
        self.device.write_blocks(pos.lba as u64, &buf[..len])?;
        Ok(())
    }

    /// 打开 inode：已在缓存中则计数加一，否则从磁盘读入缓存
    ///
    /// 位图中未分配的 inode 不能打开。
    pub fn open_inode(&self, inode_no: u32) -> Result<InodeHandle> {
        let mut state = self.state();
        if !state.inode_bitmap.get(inode_no as usize) {
            return Err(FsError::InvalidInode(inode_no));
        }
        if let Some(open) = state.open_inodes.get_mut(&inode_no) {
            open.open_count += 1;
            return Ok(InodeHandle {
                number: inode_no,
                inode: Arc::clone(&open.inode),
            });
        }

        let inode = Arc::new(Mutex::new(self.read_inode(inode_no)?));
        state.open_inodes.insert(
            inode_no,
            OpenInode {
                inode: Arc::clone(&inode),
                open_count: 1,
            },
        );
        debug!("inode {} opened from disk", inode_no);
        Ok(InodeHandle {
            number: inode_no,
            inode,
        })
    }

    /// 关闭 inode，计数归零时移出缓存
    ///
    /// 缓存项已被 `release_inode` 逐出（甚至该号已被重新打开）时什么也不做。
    pub fn close_inode(&self, handle: InodeHandle) {
        let mut state = self.state();
        if let Some(open) = state.open_inodes.get_mut(&handle.number) {
            if !Arc::ptr_eq(&open.inode, &handle.inode) {
                return;
            }
            open.open_count -= 1;
            if open.open_count == 0 {
                state.open_inodes.remove(&handle.number);
                debug!("inode {} evicted", handle.number);
            }
        }
    }

    /// 当前的打开计数，未缓存时为 0
    pub fn open_count(&self, inode_no: u32) -> u32 {
        self.state()
            .open_inodes
            .get(&inode_no)
            .map_or(0, |open| open.open_count)
    }

    /// 回收 inode：先抹掉磁盘记录，再释放它引用的所有块（含间接表本身），最后释放 inode 位
    pub fn release_inode(&self, inode_no: u32) -> Result<()> {
        if inode_no == ROOT_INODE_NO {
            return Err(FsError::InvalidInode(inode_no));
        }

        let handle = self.open_inode(inode_no)?;
        let result = self.release_opened(&handle);
        self.evict_inode(handle);
        result
    }

    /// 无论计数多少都把 inode 移出缓存，之后同号的 open 重新从磁盘读
    fn evict_inode(&self, handle: InodeHandle) {
        let mut state = self.state();
        let cached = state
            .open_inodes
            .get(&handle.number)
            .is_some_and(|open| Arc::ptr_eq(&open.inode, &handle.inode));
        if cached {
            state.open_inodes.remove(&handle.number);
            debug!("inode {} evicted after release", handle.number);
        }
    }

    fn release_opened(&self, handle: &InodeHandle) -> Result<()> {
        let mut inode = handle.lock();

        let mut blocks: Vec<u32> = inode.blocks[..DIRECT_BLOCKS]
            .iter()
            .copied()
            .filter(|&lba| lba != 0)
            .collect();
        if let Some(table) = self.load_indirect(&inode)? {
            blocks.extend(table.slots.iter().copied().filter(|&lba| lba != 0));
            blocks.push(table.lba);
        }

        self.erase_inode(inode.number)?;
        for lba in &blocks {
            self.free_block(*lba)?;
        }
        self.free_inode_no(inode.number, true)?;

        debug!("released inode {} and {} blocks", inode.number, blocks.len());
        *inode = Inode::new(inode.number);
        Ok(())
    }
}
