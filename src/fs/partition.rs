use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, info};

use crate::{
    disk::{Block, BlockDevice, SECTOR_SIZE},
    fs::{
        bitmap::Bitmap,
        error::{FsError, Result},
        inode::Inode,
        super_block::{self, SuperBlock},
    },
    utils::lock,
};

/// 已打开 inode 的缓存项
#[derive(Debug)]
pub(crate) struct OpenInode {
    pub(crate) inode: Arc<Mutex<Inode>>,
    pub(crate) open_count: u32,
}

/// 需要整体互斥的分区状态：两张位图和已打开 inode 缓存
#[derive(Debug)]
pub(crate) struct PartitionState {
    pub(crate) block_bitmap: Bitmap,
    pub(crate) inode_bitmap: Bitmap,
    pub(crate) open_inodes: HashMap<u32, OpenInode>,
}

/// 已挂载的分区
pub struct Partition {
    pub(crate) device: Arc<dyn BlockDevice>,
    pub(crate) sb: SuperBlock,
    state: Mutex<PartitionState>,
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition").field("sb", &self.sb).finish()
    }
}

impl Partition {
    /// 挂载分区；超级块魔数不对时先格式化
    pub fn mount(device: Arc<dyn BlockDevice>, start_lba: u32, sector_count: u32) -> Result<Self> {
        let sb = SuperBlock::read(device.as_ref(), start_lba)?;
        let sb = if sb.is_formatted() {
            info!("partition at lba {} has filesystem", start_lba);
            sb
        } else {
            info!("partition at lba {} is not formatted, formatting", start_lba);
            super_block::format(device.as_ref(), start_lba, sector_count)?
        };
        Self::load(device, sb, start_lba)
    }

    /// 无条件格式化后挂载
    pub fn format(device: Arc<dyn BlockDevice>, start_lba: u32, sector_count: u32) -> Result<Self> {
        let sb = super_block::format(device.as_ref(), start_lba, sector_count)?;
        Self::load(device, sb, start_lba)
    }

    fn load(device: Arc<dyn BlockDevice>, sb: SuperBlock, start_lba: u32) -> Result<Self> {
        if sb.part_lba_base != start_lba {
            return Err(FsError::Corrupted(format!(
                "super block records base lba {}, partition starts at {}",
                sb.part_lba_base, start_lba
            )));
        }

        let block_bitmap = read_bitmap(device.as_ref(), sb.block_bitmap_lba, sb.block_bitmap_sects)?;
        let inode_bitmap = read_bitmap(device.as_ref(), sb.inode_bitmap_lba, sb.inode_bitmap_sects)?;

        info!(
            "mounted partition at lba {}: {} free blocks, {} free inodes",
            start_lba,
            block_bitmap.free_count(),
            inode_bitmap.free_count()
        );

        Ok(Self {
            device,
            sb,
            state: Mutex::new(PartitionState {
                block_bitmap,
                inode_bitmap,
                open_inodes: HashMap::new(),
            }),
        })
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.sb
    }

    pub fn device(&self) -> Arc<dyn BlockDevice> {
        Arc::clone(&self.device)
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, PartitionState> {
        lock(&self.state)
    }

    pub(crate) fn read_sector(&self, lba: u32, buf: &mut Block) -> Result<()> {
        self.device.read_block(lba as u64, buf)?;
        Ok(())
    }

    pub(crate) fn write_sector(&self, lba: u32, buf: &Block) -> Result<()> {
        self.device.write_block(lba as u64, buf)?;
        Ok(())
    }

    fn block_index(&self, lba: u32) -> Result<usize> {
        lba.checked_sub(self.sb.data_start_lba)
            .map(|index| index as usize)
            .ok_or_else(|| FsError::Corrupted(format!("lba {} is outside the data area", lba)))
    }

    /// 分配一个数据块并立即把位图同步到磁盘，返回块的 lba
    pub fn alloc_block(&self) -> Result<u32> {
        let mut state = self.state();
        let index = state.block_bitmap.alloc().ok_or(FsError::NoSpace("block"))?;
        if let Err(e) = sync_bit(self.device.as_ref(), &state.block_bitmap, self.sb.block_bitmap_lba, index) {
            state.block_bitmap.set(index, false);
            return Err(e);
        }
        let lba = self.sb.data_start_lba + index as u32;
        debug!("allocated block {} (lba {})", index, lba);
        Ok(lba)
    }

    /// 释放数据块并同步位图
    pub fn free_block(&self, lba: u32) -> Result<()> {
        let index = self.block_index(lba)?;
        let mut state = self.state();
        state.block_bitmap.set(index, false);
        sync_bit(self.device.as_ref(), &state.block_bitmap, self.sb.block_bitmap_lba, index)?;
        debug!("freed block {} (lba {})", index, lba);
        Ok(())
    }

    /// 在 inode 位图中分配一个 inode 号，只改内存，落盘由调用方 `sync_inode_bit`
    pub fn alloc_inode_no(&self) -> Result<u32> {
        let mut state = self.state();
        let index = state.inode_bitmap.alloc().ok_or(FsError::NoSpace("inode"))?;
        if index as u32 >= self.sb.inode_count {
            state.inode_bitmap.set(index, false);
            return Err(FsError::NoSpace("inode"));
        }
        debug!("allocated inode {}", index);
        Ok(index as u32)
    }

    pub fn sync_inode_bit(&self, inode_no: u32) -> Result<()> {
        let state = self.state();
        sync_bit(
            self.device.as_ref(),
            &state.inode_bitmap,
            self.sb.inode_bitmap_lba,
            inode_no as usize,
        )
    }

    /// 清除 inode 位，`sync` 为真时同时落盘
    pub fn free_inode_no(&self, inode_no: u32, sync: bool) -> Result<()> {
        let mut state = self.state();
        state.inode_bitmap.set(inode_no as usize, false);
        if sync {
            sync_bit(
                self.device.as_ref(),
                &state.inode_bitmap,
                self.sb.inode_bitmap_lba,
                inode_no as usize,
            )?;
        }
        debug!("freed inode {}", inode_no);
        Ok(())
    }

    pub fn block_in_use(&self, lba: u32) -> bool {
        match self.block_index(lba) {
            Ok(index) => self.state().block_bitmap.get(index),
            Err(_) => false,
        }
    }

    pub fn inode_in_use(&self, inode_no: u32) -> bool {
        self.state().inode_bitmap.get(inode_no as usize)
    }

    pub fn free_blocks(&self) -> usize {
        self.state().block_bitmap.free_count()
    }

    pub fn free_inodes(&self) -> usize {
        // inode 位图扇区中超出 inode_count 的位从不分配
        let state = self.state();
        let extra = state.inode_bitmap.bit_len().saturating_sub(self.sb.inode_count as usize);
        state.inode_bitmap.free_count().saturating_sub(extra)
    }
}

/// 分配清零的临时缓冲区，内存不足时返回 `AllocationFailure`
pub(crate) fn zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| FsError::AllocationFailure)?;
    buf.resize(len, 0);
    Ok(buf)
}

fn read_bitmap(device: &dyn BlockDevice, lba: u32, sectors: u32) -> Result<Bitmap> {
    let mut bits = zeroed(sectors as usize * SECTOR_SIZE)?;
    device.read_blocks(lba as u64, &mut bits)?;
    Ok(Bitmap::from_bytes(bits))
}

/// 把位图中第 `index` 位所在的那个扇区写回磁盘
fn sync_bit(device: &dyn BlockDevice, bitmap: &Bitmap, bitmap_lba: u32, index: usize) -> Result<()> {
    let (sector, bytes) = bitmap.sector_of(index);
    device.write_blocks((bitmap_lba + sector) as u64, bytes)?;
    Ok(())
}
