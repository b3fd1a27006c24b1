use log::debug;

use crate::{
    disk::{Block, SECTOR_SIZE},
    fs::{
        config::{BLOCK_SIZE, DIRECT_BLOCKS, INDIRECT_SLOTS, MAX_FILE_BLOCKS, MAX_FILE_SIZE},
        error::{FsError, Result},
        inode::Inode,
        partition::Partition,
    },
    utils::div_round_up,
};

/// 文件内第 n 个逻辑块的位置：直接块下标或间接表槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAddr {
    Direct(usize),
    Indirect(usize),
}

impl BlockAddr {
    pub fn from_index(index: usize) -> Result<Self> {
        match index {
            i if i < DIRECT_BLOCKS => Ok(Self::Direct(i)),
            i if i < MAX_FILE_BLOCKS => Ok(Self::Indirect(i - DIRECT_BLOCKS)),
            _ => Err(FsError::FileTooLarge { max: MAX_FILE_SIZE }),
        }
    }

    /// 字节偏移所在的逻辑块
    pub fn from_offset(offset: u32) -> Result<Self> {
        Self::from_index((offset / BLOCK_SIZE) as usize)
    }

    pub fn index(self) -> usize {
        match self {
            Self::Direct(i) => i,
            Self::Indirect(slot) => DIRECT_BLOCKS + slot,
        }
    }

    /// 物理块 lba，未分配时为 0
    pub(crate) fn resolve(self, inode: &Inode, table: Option<&IndirectTable>) -> u32 {
        match self {
            Self::Direct(i) => inode.blocks[i],
            Self::Indirect(slot) => table.map_or(0, |t| t.slots[slot]),
        }
    }
}

/// 读入内存的一级间接块表
#[derive(Debug, Clone)]
pub(crate) struct IndirectTable {
    pub(crate) lba: u32,
    pub(crate) slots: [u32; INDIRECT_SLOTS],
}

impl IndirectTable {
    fn decode(lba: u32, buf: &Block) -> Self {
        let mut slots = [0u32; INDIRECT_SLOTS];
        for (slot, bytes) in slots.iter_mut().zip(buf.chunks_exact(4)) {
            *slot = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        Self { lba, slots }
    }

    fn encode(&self) -> Block {
        let mut buf: Block = [0; SECTOR_SIZE];
        for (bytes, slot) in buf.chunks_exact_mut(4).zip(self.slots.iter()) {
            bytes.copy_from_slice(&slot.to_le_bytes());
        }
        buf
    }
}

impl Partition {
    pub(crate) fn load_indirect(&self, inode: &Inode) -> Result<Option<IndirectTable>> {
        let lba = inode.indirect_table();
        if lba == 0 {
            return Ok(None);
        }
        let mut buf: Block = [0; SECTOR_SIZE];
        self.read_sector(lba, &mut buf)?;
        Ok(Some(IndirectTable::decode(lba, &buf)))
    }

    pub(crate) fn store_indirect(&self, table: &IndirectTable) -> Result<()> {
        self.write_sector(table.lba, &table.encode())
    }

    /// 为 inode 分配一张空的间接表；inode 由调用方写回
    pub(crate) fn alloc_indirect(&self, inode: &mut Inode) -> Result<IndirectTable> {
        let lba = self.alloc_block()?;
        let table = IndirectTable {
            lba,
            slots: [0; INDIRECT_SLOTS],
        };
        if let Err(e) = self.store_indirect(&table) {
            self.free_block(lba)?;
            return Err(e);
        }
        inode.blocks[DIRECT_BLOCKS] = lba;
        debug!("inode {}: indirect table at lba {}", inode.number, lba);
        Ok(table)
    }

    /// 从 `pos` 开始读，最多读到文件末尾，返回实际读取的字节数
    pub fn read_file(&self, inode: &Inode, pos: u32, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if pos >= inode.size {
            return Err(FsError::EndOfFile);
        }

        let count = buf.len().min((inode.size - pos) as usize);
        let table = self.load_indirect(inode)?;
        let mut sector: Block = [0; SECTOR_SIZE];
        let mut done = 0;

        while done < count {
            let offset = pos + done as u32;
            let addr = BlockAddr::from_offset(offset)?;
            let lba = addr.resolve(inode, table.as_ref());
            if lba == 0 {
                return Err(FsError::Corrupted(format!(
                    "inode {} has no block {} below its size",
                    inode.number,
                    addr.index()
                )));
            }

            let in_block = (offset % BLOCK_SIZE) as usize;
            let chunk = (SECTOR_SIZE - in_block).min(count - done);
            self.read_sector(lba, &mut sector)?;
            buf[done..done + chunk].copy_from_slice(&sector[in_block..in_block + chunk]);
            done += chunk;
        }

        Ok(count)
    }

    /// 从 `pos` 开始写入 `data`，按需分配新块，最后写回一次 inode
    ///
    /// 中途分配失败时，已经分配的块保留在 inode 中，文件大小不变。
    pub fn write_file(&self, inode: &mut Inode, pos: u32, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        if pos > inode.size {
            return Err(FsError::InvalidSeek(pos as i64));
        }
        let end = pos as u64 + data.len() as u64;
        if end > MAX_FILE_SIZE as u64 {
            return Err(FsError::FileTooLarge { max: MAX_FILE_SIZE });
        }
        let end = end as u32;

        let used_before = div_round_up(inode.size, BLOCK_SIZE).max(1) as usize;
        let needed = div_round_up(end, BLOCK_SIZE) as usize;
        match (used_before <= DIRECT_BLOCKS, needed <= DIRECT_BLOCKS) {
            (true, true) => debug!("inode {}: write stays in direct blocks", inode.number),
            (true, false) => debug!("inode {}: write grows into indirect blocks", inode.number),
            _ => debug!("inode {}: write within indirect blocks", inode.number),
        }

        let mut table = self.load_indirect(inode)?;
        if let Err(e) = self.ensure_blocks(inode, &mut table, needed) {
            if let Some(t) = &table {
                self.store_indirect(t)?;
            }
            self.write_inode(inode)?;
            return Err(e);
        }
        if needed > DIRECT_BLOCKS {
            if let Some(t) = &table {
                self.store_indirect(t)?;
            }
        }

        let mut sector: Block = [0; SECTOR_SIZE];
        let mut done = 0;
        while done < data.len() {
            let offset = pos + done as u32;
            let lba = BlockAddr::from_offset(offset)?.resolve(inode, table.as_ref());
            let in_block = (offset % BLOCK_SIZE) as usize;
            let chunk = (SECTOR_SIZE - in_block).min(data.len() - done);

            // 整块覆盖时不用先读
            if chunk < SECTOR_SIZE {
                self.read_sector(lba, &mut sector)?;
            }
            sector[in_block..in_block + chunk].copy_from_slice(&data[done..done + chunk]);
            self.write_sector(lba, &sector)?;
            done += chunk;
        }

        inode.size = inode.size.max(end);
        self.write_inode(inode)?;
        Ok(data.len())
    }

    /// 保证前 `needed` 个逻辑块都已分配，每个新块的位图位立即落盘
    fn ensure_blocks(
        &self,
        inode: &mut Inode,
        table: &mut Option<IndirectTable>,
        needed: usize,
    ) -> Result<()> {
        for index in 0..needed {
            let addr = BlockAddr::from_index(index)?;
            if addr.resolve(inode, table.as_ref()) != 0 {
                continue;
            }
            if let (BlockAddr::Indirect(_), None) = (addr, table.as_ref()) {
                *table = Some(self.alloc_indirect(inode)?);
            }

            let lba = self.alloc_block()?;
            match addr {
                BlockAddr::Direct(i) => inode.blocks[i] = lba,
                BlockAddr::Indirect(slot) => {
                    if let Some(t) = table.as_mut() {
                        t.slots[slot] = lba;
                    }
                }
            }
        }
        Ok(())
    }
}
