use std::io::{Error, ErrorKind, Result};

use crate::disk::types::{Block, SECTOR_SIZE};

pub trait BlockDevice: Send + Sync {
    fn read_block(&self, lba: u64, buf: &mut Block) -> Result<()>;
    fn write_block(&self, lba: u64, buf: &Block) -> Result<()>;

    /// 设备总扇区数
    fn sector_count(&self) -> u64;

    /// 从 `lba` 开始连续读取 `buf.len() / SECTOR_SIZE` 个扇区
    fn read_blocks(&self, lba: u64, buf: &mut [u8]) -> Result<()> {
        check_len(buf.len())?;
        for (i, chunk) in buf.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            let block: &mut Block = chunk
                .try_into()
                .map_err(|_| Error::new(ErrorKind::InvalidInput, "short sector buffer"))?;
            self.read_block(lba + i as u64, block)?;
        }
        Ok(())
    }

    /// 从 `lba` 开始连续写入 `buf.len() / SECTOR_SIZE` 个扇区
    fn write_blocks(&self, lba: u64, buf: &[u8]) -> Result<()> {
        check_len(buf.len())?;
        for (i, chunk) in buf.chunks_exact(SECTOR_SIZE).enumerate() {
            let block: &Block = chunk
                .try_into()
                .map_err(|_| Error::new(ErrorKind::InvalidInput, "short sector buffer"))?;
            self.write_block(lba + i as u64, block)?;
        }
        Ok(())
    }
}

fn check_len(len: usize) -> Result<()> {
    if len == 0 || len % SECTOR_SIZE != 0 {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("buffer length {} is not a whole number of sectors", len),
        ));
    }
    Ok(())
}
