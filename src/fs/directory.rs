use std::borrow::Cow;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    disk::{Block, SECTOR_SIZE},
    fs::{
        config::{
            DIRECT_BLOCKS, DIR_ENTRIES_PER_SECTOR, DIR_ENTRY_SIZE, MAX_FILE_BLOCKS,
            MAX_FILE_NAME_LEN,
        },
        error::{FsError, Result},
        file::BlockAddr,
        inode::{Inode, InodeHandle},
        partition::Partition,
    },
};

// 目录项类型，`Unknown` 表示空闲或已删除的槽位
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    #[default]
    Unknown,
    Regular,
    Directory,
}

// 一个目录项：16 字节文件名 + inode 号 + 类型，共 24 字节
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    name: [u8; MAX_FILE_NAME_LEN],
    pub inode_no: u32,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn new(name: &str, inode_no: u32, file_type: FileType) -> Result<Self> {
        if name.len() > MAX_FILE_NAME_LEN {
            return Err(FsError::NameTooLong {
                name: name.to_string(),
                max: MAX_FILE_NAME_LEN,
            });
        }
        if name.is_empty() || name.contains('/') || name.contains('\0') {
            return Err(FsError::InvalidPath(name.to_string()));
        }

        let mut bytes = [0u8; MAX_FILE_NAME_LEN];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self {
            name: bytes,
            inode_no,
            file_type,
        })
    }

    fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_FILE_NAME_LEN);
        &self.name[..len]
    }

    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name_bytes())
    }

    pub fn is_free(&self) -> bool {
        self.file_type == FileType::Unknown
    }

    /// "." 或 ".."
    pub fn is_dot(&self) -> bool {
        matches!(self.name_bytes(), b"." | b"..")
    }

    pub fn encode_into(&self, buf: &mut Block, slot: usize) -> Result<()> {
        let start = slot * DIR_ENTRY_SIZE as usize;
        bincode::serialize_into(&mut buf[start..start + DIR_ENTRY_SIZE as usize], self)?;
        Ok(())
    }

    /// 解码一个扇区中的全部目录项
    pub fn decode_block(buf: &Block) -> Result<Vec<DirEntry>> {
        buf.chunks_exact(DIR_ENTRY_SIZE as usize)
            .take(DIR_ENTRIES_PER_SECTOR)
            .map(|chunk| Ok(bincode::deserialize(chunk)?))
            .collect()
    }
}

/// 打开的目录
#[derive(Debug)]
pub struct Dir {
    pub(crate) inode: InodeHandle,
    /// 在目录内的读偏移
    pos: u32,
}

impl Dir {
    pub fn inode_no(&self) -> u32 {
        self.inode.number()
    }

    pub fn handle(&self) -> &InodeHandle {
        &self.inode
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, Inode> {
        self.inode.lock()
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// 目录中只有 "." 和 ".." 时为空
    pub fn is_empty(&self) -> bool {
        self.inode.lock().size == 2 * DIR_ENTRY_SIZE
    }
}

impl Partition {
    pub fn open_dir(&self, inode_no: u32) -> Result<Dir> {
        Ok(Dir {
            inode: self.open_inode(inode_no)?,
            pos: 0,
        })
    }

    pub fn close_dir(&self, dir: Dir) {
        self.close_inode(dir.inode);
    }

    /// 目录的所有块（12 个直接块 + 128 个间接块），未分配的为 0
    fn dir_blocks(&self, dir: &Inode) -> Result<Vec<u32>> {
        let mut blocks = dir.blocks[..DIRECT_BLOCKS].to_vec();
        if let Some(table) = self.load_indirect(dir)? {
            blocks.extend_from_slice(&table.slots);
        }
        Ok(blocks)
    }

    fn find_entry<F>(&self, dir: &Inode, mut matches: F) -> Result<Option<DirEntry>>
    where
        F: FnMut(&DirEntry) -> bool,
    {
        let mut buf: Block = [0; SECTOR_SIZE];
        for lba in self.dir_blocks(dir)? {
            if lba == 0 {
                continue;
            }
            self.read_sector(lba, &mut buf)?;
            if let Some(entry) = DirEntry::decode_block(&buf)?
                .into_iter()
                .find(|entry| !entry.is_free() && matches(entry))
            {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// 在目录中按名字查找目录项
    pub fn search_dir_entry(&self, dir: &Inode, name: &str) -> Result<Option<DirEntry>> {
        self.find_entry(dir, |entry| entry.name_bytes() == name.as_bytes())
    }

    /// 按 inode 号查找目录项，跳过 "." 和 ".."
    pub fn search_dir_entry_by_inode(&self, dir: &Inode, inode_no: u32) -> Result<Option<DirEntry>> {
        self.find_entry(dir, |entry| entry.inode_no == inode_no && !entry.is_dot())
    }

    /// 把目录项写入目录：先找已有块中的空槽，没有再分配新块
    ///
    /// 新块的位图会立即落盘，目录 inode 本身由调用方写回。
    pub fn insert_dir_entry(&self, dir: &mut Inode, entry: &DirEntry) -> Result<()> {
        let mut table = self.load_indirect(dir)?;
        let mut buf: Block = [0; SECTOR_SIZE];

        for index in 0..MAX_FILE_BLOCKS {
            let addr = BlockAddr::from_index(index)?;
            let lba = addr.resolve(dir, table.as_ref());

            if lba == 0 {
                // 间接表首次使用时先分配表
                let new_table = match (addr, table.is_none()) {
                    (BlockAddr::Indirect(_), true) => {
                        table = Some(self.alloc_indirect(dir)?);
                        true
                    }
                    _ => false,
                };

                let lba = match self.alloc_block() {
                    Ok(lba) => lba,
                    Err(e) => {
                        if new_table {
                            if let Some(t) = table.take() {
                                dir.blocks[DIRECT_BLOCKS] = 0;
                                self.free_block(t.lba)?;
                            }
                        }
                        return Err(e);
                    }
                };

                buf.fill(0);
                entry.encode_into(&mut buf, 0)?;
                let placed = self.write_sector(lba, &buf).and_then(|()| match addr {
                    BlockAddr::Direct(i) => {
                        dir.blocks[i] = lba;
                        Ok(())
                    }
                    BlockAddr::Indirect(slot) => match table.as_mut() {
                        Some(t) => {
                            t.slots[slot] = lba;
                            self.store_indirect(t)
                        }
                        None => Ok(()),
                    },
                });
                if let Err(e) = placed {
                    // 新块和新表都还没被磁盘上的任何结构引用，直接还回位图
                    self.free_block(lba)?;
                    if new_table {
                        if let Some(t) = table.take() {
                            dir.blocks[DIRECT_BLOCKS] = 0;
                            self.free_block(t.lba)?;
                        }
                    }
                    return Err(e);
                }

                dir.size += DIR_ENTRY_SIZE;
                debug!("dir {}: entry placed in new block {}", dir.number, lba);
                return Ok(());
            }

            self.read_sector(lba, &mut buf)?;
            let entries = DirEntry::decode_block(&buf)?;
            if let Some(slot) = entries.iter().position(DirEntry::is_free) {
                entry.encode_into(&mut buf, slot)?;
                self.write_sector(lba, &buf)?;
                dir.size += DIR_ENTRY_SIZE;
                return Ok(());
            }
        }

        Err(FsError::DirectoryFull)
    }

    /// 删除目录中 inode 号为 `inode_no` 的目录项，并写回目录 inode
    ///
    /// 首块存放 "." 和 ".."，永不回收；其余块在这是唯一一项时整块回收，
    /// 间接表全空时一并回收。找不到时返回 false。
    pub fn delete_dir_entry(&self, dir: &mut Inode, inode_no: u32) -> Result<bool> {
        let mut table = self.load_indirect(dir)?;
        let mut buf: Block = [0; SECTOR_SIZE];

        for index in 0..MAX_FILE_BLOCKS {
            let addr = BlockAddr::from_index(index)?;
            let lba = addr.resolve(dir, table.as_ref());
            if lba == 0 {
                continue;
            }

            self.read_sector(lba, &mut buf)?;
            let entries = DirEntry::decode_block(&buf)?;
            let occupied = entries.iter().filter(|e| !e.is_free()).count();
            let Some(slot) = entries
                .iter()
                .position(|e| !e.is_free() && !e.is_dot() && e.inode_no == inode_no)
            else {
                continue;
            };

            if index == 0 || occupied > 1 {
                DirEntry::default().encode_into(&mut buf, slot)?;
                self.write_sector(lba, &buf)?;
                dir.size -= DIR_ENTRY_SIZE;
                self.write_inode(dir)?;
                return Ok(true);
            }

            // 整块回收：先让磁盘上不再引用它，再释放位图；inode 写盘成功后才更新内存
            let mut updated = dir.clone();
            updated.size -= DIR_ENTRY_SIZE;
            let mut freed_table = None;
            match addr {
                BlockAddr::Direct(i) => updated.blocks[i] = 0,
                BlockAddr::Indirect(s) => {
                    if let Some(t) = table.as_mut() {
                        t.slots[s] = 0;
                        if t.slots.iter().all(|&b| b == 0) {
                            updated.blocks[DIRECT_BLOCKS] = 0;
                            freed_table = Some(t.lba);
                        } else {
                            self.store_indirect(t)?;
                        }
                    }
                }
            }
            self.write_inode(&updated)?;
            *dir = updated;
            self.free_block(lba)?;
            if let Some(table_lba) = freed_table {
                self.free_block(table_lba)?;
            }
            debug!("dir {}: reclaimed block {}", dir.number, lba);
            return Ok(true);
        }

        Ok(false)
    }

    /// 读出目录中下一个有效目录项，读完返回 None
    pub fn read_dir_entry(&self, dir: &mut Dir) -> Result<Option<DirEntry>> {
        let inode = dir.inode.lock().clone();
        if dir.pos >= inode.size {
            return Ok(None);
        }

        let mut buf: Block = [0; SECTOR_SIZE];
        let mut cur = 0;
        for lba in self.dir_blocks(&inode)? {
            if lba == 0 {
                continue;
            }
            self.read_sector(lba, &mut buf)?;
            for entry in DirEntry::decode_block(&buf)? {
                if entry.is_free() {
                    continue;
                }
                // 跳过已经读过的
                if cur < dir.pos {
                    cur += DIR_ENTRY_SIZE;
                    continue;
                }
                dir.pos += DIR_ENTRY_SIZE;
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// 删除空目录 `child`：从父目录中删掉它的目录项并回收它的 inode
    pub fn remove_dir(&self, parent: &mut Inode, child: &Dir) -> Result<()> {
        let child_no = child.inode_no();
        {
            let inode = child.lock();
            // 空目录只能有第一个块
            if inode.blocks[1..].iter().any(|&lba| lba != 0) {
                return Err(FsError::DirectoryNotEmpty(format!("inode {}", child_no)));
            }
        }

        if !self.delete_dir_entry(parent, child_no)? {
            return Err(FsError::Corrupted(format!(
                "directory {} has no entry for inode {}",
                parent.number, child_no
            )));
        }
        self.release_inode(child_no)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        io,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
    };

    use super::*;
    use crate::{
        disk::{BlockDevice, MemDisk},
        fs::config::ROOT_INODE_NO,
    };

    fn mem_partition() -> Partition {
        Partition::mount(Arc::new(MemDisk::new(4096)), 0, 4096).unwrap()
    }

    /// 写 `fail_from` 及之后的扇区时返回 I/O 错误
    #[derive(Debug)]
    struct FlakyDisk {
        inner: MemDisk,
        fail_from: AtomicU64,
    }

    impl FlakyDisk {
        fn fail_writes_from(&self, lba: u32) {
            self.fail_from.store(lba as u64, Ordering::SeqCst);
        }

        fn heal(&self) {
            self.fail_from.store(u64::MAX, Ordering::SeqCst);
        }
    }

    impl BlockDevice for FlakyDisk {
        fn read_block(&self, lba: u64, buf: &mut Block) -> io::Result<()> {
            self.inner.read_block(lba, buf)
        }

        fn write_block(&self, lba: u64, buf: &Block) -> io::Result<()> {
            if lba >= self.fail_from.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
            }
            self.inner.write_block(lba, buf)
        }

        fn sector_count(&self) -> u64 {
            self.inner.sector_count()
        }
    }

    fn flaky_partition() -> (Arc<FlakyDisk>, Partition) {
        let disk = Arc::new(FlakyDisk {
            inner: MemDisk::new(4096),
            fail_from: AtomicU64::new(u64::MAX),
        });
        let device: Arc<dyn BlockDevice> = Arc::clone(&disk) as Arc<dyn BlockDevice>;
        let part = Partition::mount(device, 0, 4096).unwrap();
        (disk, part)
    }

    /// 一个只有 "." 和 ".." 的新目录，inode 不经过缓存
    fn new_dir(part: &Partition) -> Inode {
        let no = part.alloc_inode_no().unwrap();
        part.sync_inode_bit(no).unwrap();
        let mut inode = Inode::new(no);
        inode.blocks[0] = part.alloc_block().unwrap();
        inode.size = 2 * DIR_ENTRY_SIZE;
        let mut buf: Block = [0; SECTOR_SIZE];
        DirEntry::new(".", no, FileType::Directory).unwrap().encode_into(&mut buf, 0).unwrap();
        DirEntry::new("..", ROOT_INODE_NO, FileType::Directory)
            .unwrap()
            .encode_into(&mut buf, 1)
            .unwrap();
        part.write_sector(inode.blocks[0], &buf).unwrap();
        part.write_inode(&inode).unwrap();
        inode
    }

    #[test]
    fn entry_wire_format() {
        let entry = DirEntry::new("hello", 0x0102_0304, FileType::Directory).unwrap();
        let mut buf: Block = [0; SECTOR_SIZE];
        entry.encode_into(&mut buf, 1).unwrap();
        assert_eq!(&buf[24..29], b"hello");
        assert_eq!(&buf[29..40], &[0; 11]);
        assert_eq!(&buf[40..44], &[4, 3, 2, 1]);
        assert_eq!(&buf[44..48], &[2, 0, 0, 0]);

        let entries = DirEntry::decode_block(&buf).unwrap();
        assert_eq!(entries.len(), 21);
        assert!(entries[0].is_free());
        assert_eq!(entries[1], entry);
        assert_eq!(entries[1].name(), "hello");
    }

    #[test]
    fn names_are_validated() {
        assert!(DirEntry::new("sixteen-chars-ok", 1, FileType::Regular).is_ok());
        assert!(matches!(
            DirEntry::new("seventeen-chars-x", 1, FileType::Regular),
            Err(FsError::NameTooLong { .. })
        ));
        assert!(matches!(
            DirEntry::new("", 1, FileType::Regular),
            Err(FsError::InvalidPath(_))
        ));
        assert!(DirEntry::new("a/b", 1, FileType::Regular).is_err());
    }

    #[test]
    fn insert_then_search() {
        let part = mem_partition();
        let mut dir = new_dir(&part);
        let entry = DirEntry::new("notes", 9, FileType::Regular).unwrap();
        part.insert_dir_entry(&mut dir, &entry).unwrap();
        assert_eq!(dir.size, 3 * DIR_ENTRY_SIZE);

        assert_eq!(part.search_dir_entry(&dir, "notes").unwrap(), Some(entry));
        assert_eq!(part.search_dir_entry(&dir, "note").unwrap(), None);
        assert_eq!(
            part.search_dir_entry(&dir, ".").unwrap().map(|e| e.inode_no),
            Some(dir.number)
        );
        assert_eq!(
            part.search_dir_entry_by_inode(&dir, 9).unwrap().map(|e| e.name().into_owned()),
            Some("notes".to_string())
        );
    }

    #[test]
    fn fills_direct_and_indirect_blocks_then_reports_full() {
        let part = mem_partition();
        let mut dir = new_dir(&part);
        let capacity = MAX_FILE_BLOCKS * DIR_ENTRIES_PER_SECTOR - 2;

        for i in 0..capacity {
            let entry = DirEntry::new(&format!("f{}", i), 100 + i as u32, FileType::Regular).unwrap();
            part.insert_dir_entry(&mut dir, &entry).unwrap();
        }
        assert_ne!(dir.indirect_table(), 0);
        assert_eq!(dir.size, (capacity as u32 + 2) * DIR_ENTRY_SIZE);

        let extra = DirEntry::new("overflow", 1, FileType::Regular).unwrap();
        assert!(matches!(
            part.insert_dir_entry(&mut dir, &extra),
            Err(FsError::DirectoryFull)
        ));

        // 逐项读回，每个名字都在
        part.write_inode(&dir).unwrap();
        let mut handle = part.open_dir(dir.number).unwrap();
        let mut names = HashSet::new();
        while let Some(entry) = part.read_dir_entry(&mut handle).unwrap() {
            names.insert(entry.name().into_owned());
        }
        part.close_dir(handle);
        assert_eq!(names.len(), capacity + 2);
        for i in (0..capacity).step_by(97).chain([capacity - 1]) {
            let name = format!("f{}", i);
            assert!(names.contains(&name));
            assert!(part.search_dir_entry(&dir, &name).unwrap().is_some());
        }
    }

    #[test]
    fn delete_sole_entry_reclaims_block() {
        let part = mem_partition();
        let mut dir = new_dir(&part);
        // 首块还剩 19 个空槽
        for i in 0..19 {
            let entry = DirEntry::new(&format!("a{}", i), 10 + i, FileType::Regular).unwrap();
            part.insert_dir_entry(&mut dir, &entry).unwrap();
        }
        let lone = DirEntry::new("lone", 500, FileType::Regular).unwrap();
        part.insert_dir_entry(&mut dir, &lone).unwrap();
        let second = dir.blocks[1];
        assert_ne!(second, 0);
        assert!(part.block_in_use(second));

        assert!(part.delete_dir_entry(&mut dir, 500).unwrap());
        assert_eq!(dir.blocks[1], 0);
        assert!(!part.block_in_use(second));
        assert_eq!(dir.size, 21 * DIR_ENTRY_SIZE);
        assert_eq!(part.read_inode(dir.number).unwrap().blocks[1], 0);
    }

    #[test]
    fn delete_from_shared_block_zeroes_slot() {
        let part = mem_partition();
        let mut dir = new_dir(&part);
        for (i, name) in ["x", "y"].iter().enumerate() {
            let entry = DirEntry::new(name, 20 + i as u32, FileType::Regular).unwrap();
            part.insert_dir_entry(&mut dir, &entry).unwrap();
        }
        let first = dir.blocks[0];

        assert!(part.delete_dir_entry(&mut dir, 20).unwrap());
        assert_eq!(dir.blocks[0], first);
        assert!(part.block_in_use(first));
        assert_eq!(part.search_dir_entry(&dir, "x").unwrap(), None);
        assert!(part.search_dir_entry(&dir, "y").unwrap().is_some());

        // 删掉最后一个非必需项后，首块仍然保留 "." 和 ".."
        assert!(part.delete_dir_entry(&mut dir, 21).unwrap());
        assert_eq!(dir.blocks[0], first);
        assert_eq!(dir.size, 2 * DIR_ENTRY_SIZE);
        assert!(!part.delete_dir_entry(&mut dir, 21).unwrap());
    }

    #[test]
    fn emptied_indirect_table_is_reclaimed() {
        let part = mem_partition();
        let mut dir = new_dir(&part);
        let direct_capacity = DIRECT_BLOCKS * DIR_ENTRIES_PER_SECTOR - 2;
        for i in 0..=direct_capacity {
            let entry = DirEntry::new(&format!("e{}", i), 1000 + i as u32, FileType::Regular).unwrap();
            part.insert_dir_entry(&mut dir, &entry).unwrap();
        }
        let table = dir.indirect_table();
        assert_ne!(table, 0);
        assert!(part.block_in_use(table));

        // 最后一项独占第一个间接块
        assert!(part.delete_dir_entry(&mut dir, 1000 + direct_capacity as u32).unwrap());
        assert_eq!(dir.indirect_table(), 0);
        assert!(!part.block_in_use(table));
    }

    #[test]
    fn read_walks_occupied_entries_in_order() {
        let part = mem_partition();
        let mut dir = new_dir(&part);
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            let entry = DirEntry::new(name, 30 + i as u32, FileType::Regular).unwrap();
            part.insert_dir_entry(&mut dir, &entry).unwrap();
        }
        part.delete_dir_entry(&mut dir, 31).unwrap();

        let mut handle = part.open_dir(dir.number).unwrap();
        let mut names = Vec::new();
        while let Some(entry) = part.read_dir_entry(&mut handle).unwrap() {
            names.push(entry.name().into_owned());
        }
        assert_eq!(names, [".", "..", "a", "c"]);

        handle.rewind();
        let first = part.read_dir_entry(&mut handle).unwrap().unwrap();
        assert_eq!(first.name(), ".");
        part.close_dir(handle);
    }

    #[test]
    fn remove_dir_releases_child() {
        let part = mem_partition();
        let mut parent = new_dir(&part);
        let child = new_dir(&part);
        let entry = DirEntry::new("child", child.number, FileType::Directory).unwrap();
        part.insert_dir_entry(&mut parent, &entry).unwrap();

        let handle = part.open_dir(child.number).unwrap();
        assert!(handle.is_empty());
        part.remove_dir(&mut parent, &handle).unwrap();
        part.close_dir(handle);

        assert!(!part.inode_in_use(child.number));
        assert!(!part.block_in_use(child.blocks[0]));
        assert_eq!(part.search_dir_entry(&parent, "child").unwrap(), None);
    }

    #[test]
    fn failed_new_block_write_returns_block() {
        let (disk, part) = flaky_partition();
        let mut dir = new_dir(&part);
        for i in 0..19 {
            let entry = DirEntry::new(&format!("a{}", i), 10 + i, FileType::Regular).unwrap();
            part.insert_dir_entry(&mut dir, &entry).unwrap();
        }
        let free = part.free_blocks();
        let before = dir.clone();

        disk.fail_writes_from(part.super_block().data_start_lba);
        let entry = DirEntry::new("spill", 77, FileType::Regular).unwrap();
        assert!(matches!(part.insert_dir_entry(&mut dir, &entry), Err(FsError::Io(_))));
        assert_eq!(part.free_blocks(), free);
        assert_eq!(dir, before);
    }

    #[test]
    fn failed_write_after_new_indirect_table_returns_both() {
        let (disk, part) = flaky_partition();
        let mut dir = new_dir(&part);
        let direct_capacity = DIRECT_BLOCKS * DIR_ENTRIES_PER_SECTOR - 2;
        for i in 0..direct_capacity {
            let entry = DirEntry::new(&format!("e{}", i), 1000 + i as u32, FileType::Regular).unwrap();
            part.insert_dir_entry(&mut dir, &entry).unwrap();
        }
        let free = part.free_blocks();

        // 间接表落在下一个空闲块上可以写成功，紧随其后的数据块写失败
        let next = part.alloc_block().unwrap();
        part.free_block(next).unwrap();
        disk.fail_writes_from(next + 1);

        let entry = DirEntry::new("spill", 77, FileType::Regular).unwrap();
        assert!(matches!(part.insert_dir_entry(&mut dir, &entry), Err(FsError::Io(_))));
        assert_eq!(dir.indirect_table(), 0);
        assert_eq!(part.free_blocks(), free);
        assert!(!part.block_in_use(next));
        assert!(!part.block_in_use(next + 1));
    }

    #[test]
    fn failed_slot_write_keeps_size() {
        let (disk, part) = flaky_partition();
        let mut dir = new_dir(&part);
        let entry = DirEntry::new("x", 20, FileType::Regular).unwrap();
        part.insert_dir_entry(&mut dir, &entry).unwrap();
        let before = dir.clone();

        disk.fail_writes_from(part.super_block().data_start_lba);
        assert!(part.delete_dir_entry(&mut dir, 20).is_err());
        assert_eq!(dir, before);

        disk.heal();
        assert!(part.delete_dir_entry(&mut dir, 20).unwrap());
        assert_eq!(dir.size, 2 * DIR_ENTRY_SIZE);
    }
}
