use crate::fs::config::SECTOR_SIZE;

/// 位图，每个 bit 表示一个块（或 inode）是否被使用
///
/// 内存中的位图与磁盘上的位图扇区一一对应，修改后需要调用方显式
/// 同步对应扇区，这样批量分配失败时可以在落盘前回滚。
#[derive(Debug, Clone)]
pub struct Bitmap {
    bits: Vec<u8>,
}

impl Bitmap {
    /// 创建 `sectors` 个扇区大小的全空位图
    pub fn new(sectors: u32) -> Self {
        Self {
            bits: vec![0; (sectors * SECTOR_SIZE) as usize],
        }
    }

    /// 用从磁盘读出的字节构造位图
    pub fn from_bytes(bits: Vec<u8>) -> Self {
        Self { bits }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// 位图总位数
    pub fn bit_len(&self) -> usize {
        self.bits.len() * 8
    }

    pub fn free_count(&self) -> usize {
        self.bits.iter().map(|b| b.count_zeros() as usize).sum()
    }

    pub fn get(&self, index: usize) -> bool {
        let byte_index = index / 8;
        let bit_index = index % 8;
        self.bits
            .get(byte_index)
            .map_or(false, |byte| byte & (1 << bit_index) != 0)
    }

    pub fn set(&mut self, index: usize, used: bool) {
        let byte_index = index / 8;
        let bit_index = index % 8;
        if let Some(byte) = self.bits.get_mut(byte_index) {
            if used {
                *byte |= 1 << bit_index;
            } else {
                *byte &= !(1 << bit_index);
            }
        }
    }

    /// 找到连续 `count` 个空闲位的起始下标
    ///
    /// 遇到已用位时重新计数，扫描到末尾不回绕。
    pub fn scan(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }

        // 先跳过全满的字节
        let first_byte = self.bits.iter().position(|&byte| byte != 0xFF)?;

        let mut run = 0;
        for index in first_byte * 8..self.bit_len() {
            if self.get(index) {
                run = 0;
                continue;
            }
            run += 1;
            if run == count {
                return Some(index + 1 - count);
            }
        }
        None
    }

    /// 分配一个空闲位（扫描并置位为一步），返回其下标
    pub fn alloc(&mut self) -> Option<usize> {
        let index = self.scan(1)?;
        self.set(index, true);
        Some(index)
    }

    /// 位 `index` 所在的扇区号（相对位图起点）及该扇区的内容
    pub fn sector_of(&self, index: usize) -> (u32, &[u8]) {
        let sector_bits = (SECTOR_SIZE * 8) as usize;
        let sector = index / sector_bits;
        let start = sector * SECTOR_SIZE as usize;
        let end = (start + SECTOR_SIZE as usize).min(self.bits.len());
        (sector as u32, &self.bits[start.min(end)..end])
    }
}
