use std::{
    fs::{File, OpenOptions},
    io::{Error, ErrorKind, Read, Result, Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};

use crate::{
    disk::{
        block_device::BlockDevice,
        types::{Block, SECTOR_SIZE},
    },
    utils::lock,
};

/// 以宿主机上的镜像文件模拟的磁盘
#[derive(Debug)]
pub struct FileDisk {
    file: Mutex<File>,
    sectors: u64,
}

impl FileDisk {
    /// 打开（必要时创建）镜像文件。文件不足 `sectors` 个扇区时补齐长度，
    /// 返回值的第二项表示是否做了扩容（即这是一块新盘）。
    pub fn open<P: AsRef<Path>>(path: P, sectors: u64) -> Result<(Self, bool)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let wanted = sectors * SECTOR_SIZE as u64;
        let current = file.metadata()?.len();
        let grown = current < wanted;
        if grown {
            file.set_len(wanted)?;
        }

        // 已有镜像比要求的大时以实际大小为准
        let sectors = current.max(wanted) / SECTOR_SIZE as u64;

        Ok((
            Self {
                file: Mutex::new(file),
                sectors,
            },
            grown,
        ))
    }

    fn check_range(&self, lba: u64) -> Result<()> {
        if lba >= self.sectors {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("sector {} beyond end of disk ({} sectors)", lba, self.sectors),
            ));
        }
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    fn read_block(&self, lba: u64, buf: &mut Block) -> Result<()> {
        self.check_range(lba)?;
        let mut file = lock(&self.file);
        file.seek(SeekFrom::Start(lba * SECTOR_SIZE as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&self, lba: u64, buf: &Block) -> Result<()> {
        self.check_range(lba)?;
        let mut file = lock(&self.file);
        file.seek(SeekFrom::Start(lba * SECTOR_SIZE as u64))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn sector_count(&self) -> u64 {
        self.sectors
    }
}
