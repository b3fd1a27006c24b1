use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};

use crate::{
    disk::{Block, BlockDevice, SECTOR_SIZE},
    fs::{
        config::{DIR_ENTRY_SIZE, ROOT_INODE_NO},
        file_table::{FileTable, OpenFile},
        inode::Inode,
        path::depth,
        rollback::{Rollback, Undo},
    },
    utils::lock,
};

pub mod bitmap;
pub mod config;
pub mod directory;
pub mod error;
pub mod file;
pub mod file_table;
pub mod inode;
pub mod partition;
pub mod path;
pub(crate) mod rollback;
pub mod super_block;

pub use directory::{Dir, DirEntry, FileType};
pub use error::{FsError, Result};
pub use file_table::{OpenFlags, Whence};
pub use partition::Partition;
pub use path::PathSearch;

/// stat 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inode_no: u32,
    pub size: u32,
    pub file_type: FileType,
}

/// 一个挂载好的文件系统：分区、常开的根目录、文件表和当前工作目录
#[derive(Debug)]
pub struct FileSystem {
    part: Partition,
    root: Dir,
    files: Mutex<FileTable>,
    cwd: Mutex<u32>,
}

impl FileSystem {
    /// 把整个设备当作一个分区挂载，未格式化时先格式化
    pub fn mount(device: Arc<dyn BlockDevice>) -> Result<Self> {
        let sectors = device_sectors(device.as_ref())?;
        Self::mount_partition(device, 0, sectors)
    }

    pub fn mount_partition(device: Arc<dyn BlockDevice>, start_lba: u32, sectors: u32) -> Result<Self> {
        Self::with_partition(Partition::mount(device, start_lba, sectors)?)
    }

    /// 无条件格式化整个设备后挂载
    pub fn format(device: Arc<dyn BlockDevice>) -> Result<Self> {
        let sectors = device_sectors(device.as_ref())?;
        Self::with_partition(Partition::format(device, 0, sectors)?)
    }

    fn with_partition(part: Partition) -> Result<Self> {
        let root = part.open_dir(ROOT_INODE_NO)?;
        Ok(Self {
            part,
            root,
            files: Mutex::new(FileTable::new()),
            cwd: Mutex::new(ROOT_INODE_NO),
        })
    }

    /// 关闭所有文件和根目录；所有修改在发生时都已落盘
    pub fn unmount(self) {
        let mut files = lock(&self.files);
        for fd in 0..config::MAX_FILE_OPEN {
            if let Ok(file) = files.take(fd) {
                warn!("unmount: closing fd {} left open", fd);
                self.release_file(file);
            }
        }
        drop(files);
        self.part.close_dir(self.root);
        info!("file system unmounted");
    }

    pub fn partition(&self) -> &Partition {
        &self.part
    }

    pub fn device(&self) -> Arc<dyn BlockDevice> {
        self.part.device()
    }

    pub fn root(&self) -> &Dir {
        &self.root
    }

    fn files(&self) -> MutexGuard<'_, FileTable> {
        lock(&self.files)
    }

    pub fn search_file(&self, path: &str) -> Result<PathSearch> {
        self.part.search_file(path)
    }

    /// 查找 `path`，对结果调用 `f`，无论成败都关闭查找时打开的父目录
    fn with_search<T, F>(&self, path: &str, f: F) -> Result<T>
    where
        F: FnOnce(&PathSearch) -> Result<T>,
    {
        let search = self.part.search_file(path)?;
        let result = f(&search);
        self.part.close_dir(search.parent);
        result
    }

    /// 打开文件，返回文件描述符
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<usize> {
        if path.ends_with('/') {
            return Err(FsError::IsADirectory(path.to_string()));
        }

        // 从查找到装入文件表都持有文件表锁，unlink 无法在中间删掉目标
        let mut files = self.files();
        self.with_search(path, |search| {
            if search.found() && search.file_type == FileType::Directory {
                return Err(FsError::IsADirectory(path.to_string()));
            }
            check_depth(path, search)?;

            match (search.inode_no, flags.contains(OpenFlags::CREATE)) {
                (Some(_), true) => Err(FsError::AlreadyExists(path.to_string())),
                (Some(no), false) => self.open_file(&mut files, no, flags),
                (None, true) => self.create_file(&mut files, &search.parent, path, flags),
                (None, false) => Err(FsError::NotFound(path.to_string())),
            }
        })
    }

    /// 在 `parent` 中创建普通文件并打开
    fn create_file(&self, files: &mut FileTable, parent: &Dir, path: &str, flags: OpenFlags) -> Result<usize> {
        let name = last_component(path);
        DirEntry::new(name, 0, FileType::Regular)?;

        let part = &self.part;
        let inode_no = Rollback::run(part, |rb| {
            let no = part.alloc_inode_no()?;
            rb.record(Undo::InodeBit(no));

            let entry = DirEntry::new(name, no, FileType::Regular)?;
            {
                let mut dir = parent.lock();
                // 查找之后可能有人抢先建了同名项
                if part.search_dir_entry(&dir, name)?.is_some() {
                    return Err(FsError::AlreadyExists(path.to_string()));
                }
                part.insert_dir_entry(&mut dir, &entry)?;
                rb.record(Undo::DirEntry {
                    parent: parent.handle(),
                    inode_no: no,
                });
                part.write_inode(&dir)?;
            }

            part.write_inode(&Inode::new(no))?;
            part.sync_inode_bit(no)?;
            Ok(no)
        })?;

        debug!("created file {} as inode {}", path, inode_no);
        self.open_file(files, inode_no, flags)
    }

    /// 打开已存在的文件；写方式打开时独占写标志
    fn open_file(&self, files: &mut FileTable, inode_no: u32, flags: OpenFlags) -> Result<usize> {
        let handle = self.part.open_inode(inode_no)?;

        if flags.writable() {
            let denied = {
                let mut inode = handle.lock();
                let denied = inode.write_deny;
                inode.write_deny = true;
                denied
            };
            if denied {
                self.part.close_inode(handle);
                warn!("inode {} is already open for writing", inode_no);
                return Err(FsError::WriteConflict(inode_no));
            }
        }

        let file = OpenFile {
            pos: 0,
            flags,
            inode: handle,
        };
        match files.install(file) {
            Ok(fd) => {
                debug!("fd {} -> inode {}", fd, inode_no);
                Ok(fd)
            }
            Err(file) => {
                self.release_file(file);
                Err(FsError::TooManyOpenFiles)
            }
        }
    }

    fn release_file(&self, file: OpenFile) {
        if file.flags.writable() {
            file.inode.lock().write_deny = false;
        }
        self.part.close_inode(file.inode);
    }

    pub fn close(&self, fd: usize) -> Result<()> {
        let file = self.files().take(fd)?;
        self.release_file(file);
        Ok(())
    }

    /// 从当前位置读，返回读到的字节数；已在文件末尾时返回 `EndOfFile`
    pub fn read(&self, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let mut files = self.files();
        let file = files.get_mut(fd)?;
        if !file.flags.readable() {
            return Err(FsError::BadDescriptor(fd));
        }
        let count = {
            let inode = file.inode.lock();
            self.part.read_file(&inode, file.pos, buf)?
        };
        file.pos += count as u32;
        Ok(count)
    }

    pub fn write(&self, fd: usize, data: &[u8]) -> Result<usize> {
        let mut files = self.files();
        let file = files.get_mut(fd)?;
        if !file.flags.writable() {
            return Err(FsError::BadDescriptor(fd));
        }
        let count = {
            let mut inode = file.inode.lock();
            self.part.write_file(&mut inode, file.pos, data)?
        };
        file.pos += count as u32;
        Ok(count)
    }

    /// 移动读写位置，新位置必须在 [0, size] 内
    pub fn lseek(&self, fd: usize, offset: i64, whence: Whence) -> Result<u32> {
        let mut files = self.files();
        let file = files.get_mut(fd)?;
        let size = file.inode.lock().size as i64;
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => file.pos as i64,
            Whence::End => size,
        };
        let pos = base.checked_add(offset).ok_or(FsError::InvalidSeek(offset))?;
        if !(0..=size).contains(&pos) {
            return Err(FsError::InvalidSeek(pos));
        }
        file.pos = pos as u32;
        Ok(file.pos)
    }

    /// 删除普通文件，文件仍被打开时拒绝
    pub fn unlink(&self, path: &str) -> Result<()> {
        self.with_search(path, |search| {
            let inode_no = expect_found(path, search)?;
            if search.file_type == FileType::Directory {
                return Err(FsError::IsADirectory(path.to_string()));
            }

            let files = self.files();
            if files.is_open(inode_no) {
                warn!("unlink {}: file is open", path);
                return Err(FsError::InUse(path.to_string()));
            }

            {
                let mut dir = search.parent.lock();
                self.part.delete_dir_entry(&mut dir, inode_no)?;
            }
            self.part.release_inode(inode_no)?;
            drop(files);

            debug!("unlinked {} (inode {})", path, inode_no);
            Ok(())
        })
    }

    pub fn mkdir(&self, path: &str) -> Result<()> {
        self.with_search(path, |search| {
            check_depth(path, search)?;
            if search.found() {
                return Err(FsError::AlreadyExists(path.to_string()));
            }
            self.make_dir(&search.parent, path)
        })
    }

    fn make_dir(&self, parent: &Dir, path: &str) -> Result<()> {
        let name = last_component(path);
        DirEntry::new(name, 0, FileType::Directory)?;

        let part = &self.part;
        let inode_no = Rollback::run(part, |rb| {
            let no = part.alloc_inode_no()?;
            rb.record(Undo::InodeBit(no));

            let lba = part.alloc_block()?;
            rb.record(Undo::Block(lba));

            let mut inode = Inode::new(no);
            inode.blocks[0] = lba;
            inode.size = 2 * DIR_ENTRY_SIZE;

            let mut buf: Block = [0; SECTOR_SIZE];
            DirEntry::new(".", no, FileType::Directory)?.encode_into(&mut buf, 0)?;
            DirEntry::new("..", parent.inode_no(), FileType::Directory)?.encode_into(&mut buf, 1)?;
            part.write_sector(lba, &buf)?;

            let entry = DirEntry::new(name, no, FileType::Directory)?;
            {
                let mut dir = parent.lock();
                if part.search_dir_entry(&dir, name)?.is_some() {
                    return Err(FsError::AlreadyExists(path.to_string()));
                }
                part.insert_dir_entry(&mut dir, &entry)?;
                rb.record(Undo::DirEntry {
                    parent: parent.handle(),
                    inode_no: no,
                });
                part.write_inode(&dir)?;
            }

            part.write_inode(&inode)?;
            part.sync_inode_bit(no)?;
            Ok(no)
        })?;

        debug!("created directory {} as inode {}", path, inode_no);
        Ok(())
    }

    /// 删除空目录
    pub fn rmdir(&self, path: &str) -> Result<()> {
        self.with_search(path, |search| {
            let inode_no = expect_found(path, search)?;
            if search.file_type != FileType::Directory {
                return Err(FsError::NotADirectory(path.to_string()));
            }
            if inode_no == ROOT_INODE_NO || matches!(last_component(path), "." | "..") {
                return Err(FsError::InvalidPath(path.to_string()));
            }
            if *lock(&self.cwd) == inode_no {
                return Err(FsError::InUse(path.to_string()));
            }

            let child = self.part.open_dir(inode_no)?;
            // 除了这里刚打开的一次，还有别人打开着
            let result = if self.part.open_count(inode_no) > 1 {
                warn!("rmdir {}: directory is open", path);
                Err(FsError::InUse(path.to_string()))
            } else if child.is_empty() {
                let mut dir = search.parent.lock();
                self.part.remove_dir(&mut dir, &child)
            } else {
                Err(FsError::DirectoryNotEmpty(path.to_string()))
            };
            self.part.close_dir(child);
            result
        })
    }

    pub fn opendir(&self, path: &str) -> Result<Dir> {
        let inode_no = self.with_search(path, |search| {
            let inode_no = expect_found(path, search)?;
            if search.file_type != FileType::Directory {
                return Err(FsError::NotADirectory(path.to_string()));
            }
            Ok(inode_no)
        })?;
        self.part.open_dir(inode_no)
    }

    pub fn closedir(&self, dir: Dir) {
        self.part.close_dir(dir);
    }

    pub fn readdir(&self, dir: &mut Dir) -> Result<Option<DirEntry>> {
        self.part.read_dir_entry(dir)
    }

    pub fn rewinddir(&self, dir: &mut Dir) {
        dir.rewind();
    }

    pub fn stat(&self, path: &str) -> Result<Stat> {
        if matches!(path, "/" | "/." | "/..") {
            return Ok(Stat {
                inode_no: ROOT_INODE_NO,
                size: self.root.lock().size,
                file_type: FileType::Directory,
            });
        }

        let (inode_no, file_type) =
            self.with_search(path, |search| Ok((expect_found(path, search)?, search.file_type)))?;
        let handle = self.part.open_inode(inode_no)?;
        let size = handle.lock().size;
        self.part.close_inode(handle);
        Ok(Stat {
            inode_no,
            size,
            file_type,
        })
    }

    /// 从当前目录沿着 ".." 逐级向上，在父目录中查出每一级的名字
    pub fn getcwd(&self) -> Result<String> {
        let mut child = *lock(&self.cwd);
        let mut names = Vec::new();

        while child != ROOT_INODE_NO {
            let parent_no = self.parent_of(child)?;
            let parent = self.part.open_inode(parent_no)?;
            let entry = {
                let dir = parent.lock();
                self.part.search_dir_entry_by_inode(&dir, child)
            };
            self.part.close_inode(parent);

            let entry = entry?.ok_or_else(|| {
                FsError::Corrupted(format!("directory {} has no entry for {}", parent_no, child))
            })?;
            names.push(entry.name().into_owned());
            child = parent_no;
        }

        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }

    /// 目录首块第二项 ".." 记录的父目录
    fn parent_of(&self, dir_no: u32) -> Result<u32> {
        let handle = self.part.open_inode(dir_no)?;
        let first = handle.lock().blocks[0];
        self.part.close_inode(handle);

        let mut buf: Block = [0; SECTOR_SIZE];
        self.part.read_sector(first, &mut buf)?;
        let entries = DirEntry::decode_block(&buf)?;
        Ok(entries[1].inode_no)
    }

    pub fn chdir(&self, path: &str) -> Result<()> {
        let inode_no = self.with_search(path, |search| {
            let inode_no = expect_found(path, search)?;
            if search.file_type != FileType::Directory {
                return Err(FsError::NotADirectory(path.to_string()));
            }
            Ok(inode_no)
        })?;
        *lock(&self.cwd) = inode_no;
        Ok(())
    }
}

fn device_sectors(device: &dyn BlockDevice) -> Result<u32> {
    let sectors = device.sector_count();
    u32::try_from(sectors).map_err(|_| FsError::Corrupted(format!("device of {} sectors is too large", sectors)))
}

/// 路径最后一个非空分量
fn last_component(path: &str) -> &str {
    path.rsplit('/').find(|name| !name.is_empty()).unwrap_or("")
}

/// 查找停在中途时：中途遇到普通文件是 NotADirectory，否则是 NotFound
fn check_depth(path: &str, search: &PathSearch) -> Result<()> {
    if depth(path) == depth(&search.searched) {
        return Ok(());
    }
    if search.found() {
        Err(FsError::NotADirectory(search.searched.clone()))
    } else {
        Err(FsError::NotFound(search.searched.clone()))
    }
}

fn expect_found(path: &str, search: &PathSearch) -> Result<u32> {
    check_depth(path, search)?;
    search.inode_no.ok_or_else(|| FsError::NotFound(path.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{
        disk::MemDisk,
        fs::{
            config::{DIR_ENTRIES_PER_SECTOR, DIRECT_BLOCKS, INDIRECT_SLOTS, MAX_FILE_SIZE},
            file::BlockAddr,
            super_block::SuperBlock,
        },
    };

    fn mem_fs() -> FileSystem {
        FileSystem::mount(Arc::new(MemDisk::new(4096))).unwrap()
    }

    fn write_file(fs: &FileSystem, path: &str, data: &[u8]) {
        let fd = fs.open(path, OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
        assert_eq!(fs.write(fd, data).unwrap(), data.len());
        fs.close(fd).unwrap();
    }

    fn list(fs: &FileSystem, path: &str) -> Vec<String> {
        let mut dir = fs.opendir(path).unwrap();
        let mut names = Vec::new();
        while let Some(entry) = fs.readdir(&mut dir).unwrap() {
            names.push(entry.name().into_owned());
        }
        fs.closedir(dir);
        names
    }

    /// 所有已用 inode 引用到的块，恰好是块位图中置位的块
    fn assert_bitmaps_consistent(fs: &FileSystem) {
        let part = fs.partition();
        let sb = *part.super_block();
        let (_, data_blocks) = SuperBlock::layout(sb.part_lba_base, sb.sector_count).unwrap();

        let mut referenced = HashSet::new();
        for no in 0..sb.inode_count {
            if !part.inode_in_use(no) {
                continue;
            }
            let inode = part.read_inode(no).unwrap();
            let table = part.load_indirect(&inode).unwrap();
            for index in 0..config::MAX_FILE_BLOCKS {
                let lba = BlockAddr::from_index(index).unwrap().resolve(&inode, table.as_ref());
                if lba != 0 {
                    assert!(referenced.insert(lba), "block {} referenced twice", lba);
                }
            }
            if inode.indirect_table() != 0 {
                assert!(referenced.insert(inode.indirect_table()));
            }
        }

        for lba in sb.data_start_lba..sb.data_start_lba + data_blocks {
            assert_eq!(part.block_in_use(lba), referenced.contains(&lba), "lba {}", lba);
        }
    }

    #[test]
    fn create_write_reopen_read_stat() {
        let fs = mem_fs();
        fs.mkdir("/d").unwrap();

        let fd = fs.open("/d/f", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
        assert_eq!(fd, 3);
        assert_eq!(fs.write(fd, b"hello world\n").unwrap(), 12);
        fs.close(fd).unwrap();

        let fd = fs.open("/d/f", OpenFlags::RDONLY).unwrap();
        let mut buf = [0u8; 12];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 12);
        assert_eq!(&buf, b"hello world\n");
        assert!(matches!(fs.read(fd, &mut buf), Err(FsError::EndOfFile)));
        fs.close(fd).unwrap();

        let stat = fs.stat("/d/f").unwrap();
        assert_eq!(stat.size, 12);
        assert_eq!(stat.file_type, FileType::Regular);
        assert_bitmaps_consistent(&fs);
    }

    #[test]
    fn new_directories_start_with_dot_entries() {
        let fs = mem_fs();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        let a = fs.stat("/a").unwrap().inode_no;
        let b = fs.stat("/a/b").unwrap().inode_no;

        let mut dir = fs.opendir("/a/b").unwrap();
        let dot = fs.readdir(&mut dir).unwrap().unwrap();
        let dotdot = fs.readdir(&mut dir).unwrap().unwrap();
        assert_eq!(dot.name(), ".");
        assert_eq!(dot.inode_no, b);
        assert_eq!(dotdot.name(), "..");
        assert_eq!(dotdot.inode_no, a);
        assert_eq!(fs.readdir(&mut dir).unwrap(), None);

        fs.rewinddir(&mut dir);
        assert_eq!(fs.readdir(&mut dir).unwrap(), Some(dot));
        fs.closedir(dir);

        assert_eq!(list(&fs, "/"), [".", "..", "a"]);
    }

    #[test]
    fn missing_parent_reports_searched_prefix() {
        let fs = mem_fs();
        fs.mkdir("/a").unwrap();
        let a = fs.stat("/a").unwrap().inode_no;

        let search = fs.search_file("/a/b/c").unwrap();
        assert!(!search.found());
        assert_eq!(search.resolved_prefix(), "/a");
        assert_eq!(search.parent.inode_no(), a);
        fs.partition().close_dir(search.parent);

        match fs.open("/a/b/c", OpenFlags::CREATE) {
            Err(FsError::NotFound(searched)) => assert_eq!(searched, "/a/b"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(fs.mkdir("/a/b/c"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn boundary_sizes_round_trip() {
        for len in [1usize, 512, 6144, MAX_FILE_SIZE as usize] {
            let fs = mem_fs();
            let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
            write_file(&fs, "/big", &data);

            let fd = fs.open("/big", OpenFlags::RDONLY).unwrap();
            let mut back = vec![0u8; len];
            assert_eq!(fs.read(fd, &mut back).unwrap(), len);
            assert_eq!(back, data);
            fs.close(fd).unwrap();
            assert_bitmaps_consistent(&fs);
        }

        let fs = mem_fs();
        let fd = fs.open("/big", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();
        fs.write(fd, &vec![0u8; MAX_FILE_SIZE as usize]).unwrap();
        assert!(matches!(fs.write(fd, b"!"), Err(FsError::FileTooLarge { .. })));
        fs.close(fd).unwrap();
    }

    #[test]
    fn second_writer_conflicts() {
        let fs = mem_fs();
        let w = fs.open("/f", OpenFlags::CREATE | OpenFlags::WRONLY).unwrap();
        assert!(matches!(
            fs.open("/f", OpenFlags::RDWR),
            Err(FsError::WriteConflict(_))
        ));
        let r1 = fs.open("/f", OpenFlags::RDONLY).unwrap();
        let r2 = fs.open("/f", OpenFlags::RDONLY).unwrap();
        fs.close(w).unwrap();

        let w2 = fs.open("/f", OpenFlags::WRONLY).unwrap();
        for fd in [r1, r2, w2] {
            fs.close(fd).unwrap();
        }
        assert_eq!(fs.partition().open_count(fs.stat("/f").unwrap().inode_no), 0);
    }

    #[test]
    fn open_errors() {
        let fs = mem_fs();
        fs.mkdir("/d").unwrap();
        write_file(&fs, "/f", b"x");

        assert!(matches!(fs.open("/d", OpenFlags::RDONLY), Err(FsError::IsADirectory(_))));
        assert!(matches!(fs.open("/f/", OpenFlags::RDONLY), Err(FsError::IsADirectory(_))));
        assert!(matches!(fs.open("/f", OpenFlags::CREATE), Err(FsError::AlreadyExists(_))));
        assert!(matches!(fs.open("/nope", OpenFlags::RDONLY), Err(FsError::NotFound(_))));
        assert!(matches!(fs.open("/f/x", OpenFlags::CREATE), Err(FsError::NotADirectory(_))));
        assert!(matches!(
            fs.open("/seventeen-chars-x", OpenFlags::CREATE),
            Err(FsError::NameTooLong { .. })
        ));
        assert!(matches!(fs.close(3), Err(FsError::BadDescriptor(3))));
    }

    #[test]
    fn descriptor_access_modes() {
        let fs = mem_fs();
        write_file(&fs, "/f", b"abc");
        let r = fs.open("/f", OpenFlags::RDONLY).unwrap();
        assert!(matches!(fs.write(r, b"x"), Err(FsError::BadDescriptor(_))));
        let w = fs.open("/f", OpenFlags::WRONLY).unwrap();
        let mut buf = [0u8; 3];
        assert!(matches!(fs.read(w, &mut buf), Err(FsError::BadDescriptor(_))));
        fs.close(r).unwrap();
        fs.close(w).unwrap();
    }

    #[test]
    fn descriptor_table_fills_up() {
        let fs = mem_fs();
        write_file(&fs, "/f", b"x");
        let fds: Vec<usize> = (3..config::MAX_FILE_OPEN)
            .map(|_| fs.open("/f", OpenFlags::RDONLY).unwrap())
            .collect();
        assert!(matches!(fs.open("/f", OpenFlags::RDONLY), Err(FsError::TooManyOpenFiles)));
        for fd in fds {
            fs.close(fd).unwrap();
        }
    }

    #[test]
    fn lseek_stays_within_file() {
        let fs = mem_fs();
        write_file(&fs, "/f", b"0123456789");
        let fd = fs.open("/f", OpenFlags::RDWR).unwrap();

        assert_eq!(fs.lseek(fd, 4, Whence::Set).unwrap(), 4);
        assert_eq!(fs.lseek(fd, 2, Whence::Cur).unwrap(), 6);
        assert_eq!(fs.lseek(fd, -3, Whence::End).unwrap(), 7);
        let mut buf = [0u8; 8];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"789");

        assert_eq!(fs.lseek(fd, 0, Whence::End).unwrap(), 10);
        assert!(matches!(fs.lseek(fd, 1, Whence::End), Err(FsError::InvalidSeek(11))));
        assert!(matches!(fs.lseek(fd, -1, Whence::Set), Err(FsError::InvalidSeek(-1))));

        // 在中间覆盖写
        fs.lseek(fd, 2, Whence::Set).unwrap();
        fs.write(fd, b"ab").unwrap();
        fs.lseek(fd, 0, Whence::Set).unwrap();
        let mut all = [0u8; 10];
        fs.read(fd, &mut all).unwrap();
        assert_eq!(&all, b"01ab456789");
        fs.close(fd).unwrap();
    }

    #[test]
    fn unlink_reclaims_everything() {
        let fs = mem_fs();
        let free_blocks = fs.partition().free_blocks();
        let free_inodes = fs.partition().free_inodes();

        write_file(&fs, "/f", &vec![7u8; 8000]);
        assert!(fs.partition().free_blocks() < free_blocks);

        fs.unlink("/f").unwrap();
        assert_eq!(fs.partition().free_blocks(), free_blocks);
        assert_eq!(fs.partition().free_inodes(), free_inodes);
        assert!(matches!(fs.stat("/f"), Err(FsError::NotFound(_))));
        assert_bitmaps_consistent(&fs);
    }

    #[test]
    fn unlink_refuses_open_files_and_directories() {
        let fs = mem_fs();
        fs.mkdir("/d").unwrap();
        let fd = fs.open("/f", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();

        assert!(matches!(fs.unlink("/f"), Err(FsError::InUse(_))));
        assert!(matches!(fs.unlink("/d"), Err(FsError::IsADirectory(_))));
        assert!(matches!(fs.unlink("/ghost"), Err(FsError::NotFound(_))));

        fs.close(fd).unwrap();
        fs.unlink("/f").unwrap();
    }

    #[test]
    fn rmdir_rules() {
        let fs = mem_fs();
        fs.mkdir("/d").unwrap();
        fs.mkdir("/d/e").unwrap();
        write_file(&fs, "/f", b"x");

        assert!(matches!(fs.rmdir("/"), Err(FsError::InvalidPath(_))));
        assert!(matches!(fs.rmdir("/d/."), Err(FsError::InvalidPath(_))));
        assert!(matches!(fs.rmdir("/f"), Err(FsError::NotADirectory(_))));
        assert!(matches!(fs.rmdir("/d"), Err(FsError::DirectoryNotEmpty(_))));

        fs.chdir("/d/e").unwrap();
        assert!(matches!(fs.rmdir("/d/e"), Err(FsError::InUse(_))));
        fs.chdir("/").unwrap();

        let free_blocks = fs.partition().free_blocks();
        fs.rmdir("/d/e").unwrap();
        assert_eq!(fs.partition().free_blocks(), free_blocks + 1);
        fs.rmdir("/d").unwrap();
        assert_eq!(list(&fs, "/"), [".", "..", "f"]);
        assert_bitmaps_consistent(&fs);
    }

    #[test]
    fn rmdir_refuses_open_directory() {
        let fs = mem_fs();
        fs.mkdir("/a").unwrap();
        let a = fs.stat("/a").unwrap().inode_no;

        let handle = fs.opendir("/a").unwrap();
        assert!(matches!(fs.rmdir("/a"), Err(FsError::InUse(_))));
        fs.closedir(handle);
        fs.rmdir("/a").unwrap();
        assert_eq!(fs.partition().open_count(a), 0);

        // 复用同一个 inode 号的新目录读到的是新写入的记录
        fs.mkdir("/b").unwrap();
        let stat = fs.stat("/b").unwrap();
        assert_eq!(stat.inode_no, a);
        assert_eq!(stat.size, 2 * DIR_ENTRY_SIZE);
        assert_eq!(list(&fs, "/b"), [".", ".."]);
        assert_bitmaps_consistent(&fs);
    }

    #[test]
    fn open_racing_unlink_leaves_root_intact() {
        let fs = mem_fs();
        let root_lba = fs.partition().read_inode(ROOT_INODE_NO).unwrap().blocks[0];

        for _ in 0..50 {
            write_file(&fs, "/f", b"x");
            std::thread::scope(|s| {
                s.spawn(|| {
                    if let Ok(fd) = fs.open("/f", OpenFlags::WRONLY) {
                        fs.write(fd, b"written").unwrap();
                        fs.close(fd).unwrap();
                    }
                });
                s.spawn(|| {
                    let _ = fs.unlink("/f");
                });
            });
            // 写方赢了时 unlink 会报 InUse，这里补删
            let _ = fs.unlink("/f");

            let root = fs.partition().read_inode(ROOT_INODE_NO).unwrap();
            assert_eq!(root.blocks[0], root_lba);
            assert_eq!(root.size, 2 * DIR_ENTRY_SIZE);
        }
        assert_eq!(list(&fs, "/"), [".", ".."]);
        assert_bitmaps_consistent(&fs);
    }

    #[test]
    fn concurrent_creates_of_one_name_make_one_entry() {
        let fs = mem_fs();
        for round in 0..20 {
            let file = format!("/f{}", round);
            let dir = format!("/d{}", round);
            let (fs, file_ref, dir_ref) = (&fs, &file, &dir);

            let results: Vec<(bool, bool)> = std::thread::scope(|s| {
                let workers: Vec<_> = (0..8)
                    .map(|_| {
                        s.spawn(move || {
                            let file_ok = fs
                                .open(file_ref, OpenFlags::CREATE)
                                .map(|fd| fs.close(fd).unwrap())
                                .is_ok();
                            (file_ok, fs.mkdir(dir_ref).is_ok())
                        })
                    })
                    .collect();
                workers.into_iter().map(|w| w.join().unwrap()).collect()
            });

            assert_eq!(results.iter().filter(|(f, _)| *f).count(), 1, "{}", file);
            assert_eq!(results.iter().filter(|(_, d)| *d).count(), 1, "{}", dir);
        }

        let names = list(&fs, "/");
        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(names.len(), 42);
        assert_eq!(unique.len(), names.len());
        assert_bitmaps_consistent(&fs);
    }

    #[test]
    fn getcwd_follows_parent_links() {
        let fs = mem_fs();
        assert_eq!(fs.getcwd().unwrap(), "/");
        fs.mkdir("/usr").unwrap();
        fs.mkdir("/usr/local").unwrap();
        fs.mkdir("/usr/local/bin").unwrap();

        fs.chdir("/usr/local/bin").unwrap();
        assert_eq!(fs.getcwd().unwrap(), "/usr/local/bin");
        fs.chdir("/usr/local/bin/..").unwrap();
        assert_eq!(fs.getcwd().unwrap(), "/usr/local");

        write_file(&fs, "/usr/file", b"x");
        assert!(matches!(fs.chdir("/usr/file"), Err(FsError::NotADirectory(_))));
        assert!(matches!(fs.chdir("/nowhere"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn stat_of_root() {
        let fs = mem_fs();
        let stat = fs.stat("/").unwrap();
        assert_eq!(stat.inode_no, 0);
        assert_eq!(stat.size, 48);
        assert_eq!(stat.file_type, FileType::Directory);
        fs.mkdir("/x").unwrap();
        assert_eq!(fs.stat("/.").unwrap().size, 72);
    }

    #[test]
    fn failed_create_rolls_back() {
        let fs = mem_fs();
        // 根目录首块还有 19 个空槽，先填满
        for i in 0..DIR_ENTRIES_PER_SECTOR - 2 {
            let fd = fs.open(&format!("/f{}", i), OpenFlags::CREATE).unwrap();
            fs.close(fd).unwrap();
        }
        while fs.partition().free_blocks() > 0 {
            fs.partition().alloc_block().unwrap();
        }
        let free_inodes = fs.partition().free_inodes();
        let root_size = fs.stat("/").unwrap().size;

        assert!(matches!(
            fs.open("/extra", OpenFlags::CREATE),
            Err(FsError::NoSpace("block"))
        ));
        assert!(matches!(fs.mkdir("/dir"), Err(FsError::NoSpace("block"))));
        assert_eq!(fs.partition().free_inodes(), free_inodes);
        assert_eq!(fs.stat("/").unwrap().size, root_size);
        assert!(matches!(fs.stat("/extra"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn failed_mkdir_frees_its_block() {
        let fs = mem_fs();
        for i in 0..DIR_ENTRIES_PER_SECTOR - 2 {
            fs.mkdir(&format!("/d{}", i)).unwrap();
        }
        // 只剩一个块：新目录拿到它之后，父目录扩容失败
        while fs.partition().free_blocks() > 1 {
            fs.partition().alloc_block().unwrap();
        }
        let free_inodes = fs.partition().free_inodes();

        assert!(matches!(fs.mkdir("/one-more"), Err(FsError::NoSpace("block"))));
        assert_eq!(fs.partition().free_blocks(), 1);
        assert_eq!(fs.partition().free_inodes(), free_inodes);
        assert_eq!(fs.stat("/").unwrap().size, (DIR_ENTRIES_PER_SECTOR as u32) * DIR_ENTRY_SIZE);
    }

    #[test]
    fn full_directory_reports_directory_full() {
        let fs = FileSystem::mount(Arc::new(MemDisk::new(8192))).unwrap();
        fs.mkdir("/d").unwrap();
        let capacity = (DIRECT_BLOCKS + INDIRECT_SLOTS) * DIR_ENTRIES_PER_SECTOR - 2;
        for i in 0..capacity {
            let fd = fs.open(&format!("/d/{}", i), OpenFlags::CREATE).unwrap();
            fs.close(fd).unwrap();
        }

        let free_inodes = fs.partition().free_inodes();
        assert!(matches!(
            fs.open("/d/overflow", OpenFlags::CREATE),
            Err(FsError::DirectoryFull)
        ));
        assert_eq!(fs.partition().free_inodes(), free_inodes);

        let names: HashSet<String> = list(&fs, "/d").into_iter().collect();
        assert_eq!(names.len(), capacity + 2);
        assert!(names.contains("0") && names.contains(&(capacity - 1).to_string()));
        assert_bitmaps_consistent(&fs);
    }

    #[test]
    fn unmount_closes_leftovers() {
        let disk: Arc<dyn BlockDevice> = Arc::new(MemDisk::new(4096));
        let fs = FileSystem::mount(Arc::clone(&disk)).unwrap();
        let fd = fs.open("/f", OpenFlags::CREATE | OpenFlags::RDWR).unwrap();
        fs.write(fd, b"kept").unwrap();
        fs.unmount();

        let fs = FileSystem::mount(disk).unwrap();
        assert_eq!(fs.stat("/f").unwrap().size, 4);
        let fd = fs.open("/f", OpenFlags::WRONLY).unwrap();
        fs.close(fd).unwrap();
    }
}
