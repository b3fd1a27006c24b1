use std::{
    collections::TryReserveError,
    io::{Error, ErrorKind, Result},
    sync::Mutex,
};

use crate::{
    disk::{
        block_device::BlockDevice,
        types::{Block, SECTOR_SIZE},
    },
    utils::lock,
};

/// 内存盘，内容随进程结束而丢失
#[derive(Debug)]
pub struct MemDisk {
    sectors: Mutex<Vec<Block>>,
}

impl MemDisk {
    pub fn new(sectors: u64) -> Self {
        Self {
            sectors: Mutex::new(vec![[0u8; SECTOR_SIZE]; sectors as usize]),
        }
    }

    /// 扇区数大到分配不出来时返回错误，不中止进程
    pub fn try_new(sectors: u64) -> std::result::Result<Self, TryReserveError> {
        let count = usize::try_from(sectors).unwrap_or(usize::MAX);
        let mut blocks = Vec::new();
        blocks.try_reserve_exact(count)?;
        blocks.resize(count, [0u8; SECTOR_SIZE]);
        Ok(Self {
            sectors: Mutex::new(blocks),
        })
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, lba: u64, buf: &mut Block) -> Result<()> {
        let sectors = lock(&self.sectors);
        let sector = sectors
            .get(lba as usize)
            .ok_or_else(|| Error::new(ErrorKind::InvalidInput, format!("sector {} out of range", lba)))?;
        buf.copy_from_slice(sector);
        Ok(())
    }

    fn write_block(&self, lba: u64, buf: &Block) -> Result<()> {
        let mut sectors = lock(&self.sectors);
        let sector = sectors
            .get_mut(lba as usize)
            .ok_or_else(|| Error::new(ErrorKind::InvalidInput, format!("sector {} out of range", lba)))?;
        sector.copy_from_slice(buf);
        Ok(())
    }

    fn sector_count(&self) -> u64 {
        lock(&self.sectors).len() as u64
    }
}
