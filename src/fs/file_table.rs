use bitflags::bitflags;

use crate::fs::{
    config::{FIRST_FD, MAX_FILE_OPEN},
    error::{FsError, Result},
    inode::InodeHandle,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const WRONLY = 1 << 0;
        const RDWR = 1 << 1;
        const CREATE = 1 << 2;
    }
}

impl OpenFlags {
    pub const RDONLY: Self = Self::empty();

    pub fn readable(&self) -> bool {
        !self.contains(Self::WRONLY)
    }

    pub fn writable(&self) -> bool {
        self.intersects(Self::WRONLY | Self::RDWR)
    }
}

/// lseek 的参照点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// 一个打开的文件：读写位置、打开方式和共享的 inode
#[derive(Debug)]
pub struct OpenFile {
    pub pos: u32,
    pub flags: OpenFlags,
    pub inode: InodeHandle,
}

/// 全局文件表，下标就是文件描述符，0~2 保留
#[derive(Debug)]
pub struct FileTable {
    slots: Vec<Option<OpenFile>>,
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_FILE_OPEN).map(|_| None).collect(),
        }
    }

    /// 占用一个空闲槽位；表满时把文件原样还给调用方
    pub fn install(&mut self, file: OpenFile) -> std::result::Result<usize, OpenFile> {
        match self.slots[FIRST_FD..].iter().position(Option::is_none) {
            Some(i) => {
                self.slots[FIRST_FD + i] = Some(file);
                Ok(FIRST_FD + i)
            }
            None => Err(file),
        }
    }

    pub fn get_mut(&mut self, fd: usize) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(fd)
            .filter(|_| fd >= FIRST_FD)
            .and_then(Option::as_mut)
            .ok_or(FsError::BadDescriptor(fd))
    }

    pub fn take(&mut self, fd: usize) -> Result<OpenFile> {
        self.slots
            .get_mut(fd)
            .filter(|_| fd >= FIRST_FD)
            .and_then(Option::take)
            .ok_or(FsError::BadDescriptor(fd))
    }

    /// 是否有描述符引用这个 inode
    pub fn is_open(&self, inode_no: u32) -> bool {
        self.slots
            .iter()
            .flatten()
            .any(|file| file.inode.number() == inode_no)
    }

    pub fn open_files(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}
