use log::warn;

use crate::fs::{error::Result, inode::InodeHandle, partition::Partition};

/// 已完成步骤的补偿动作
#[derive(Debug)]
pub(crate) enum Undo<'a> {
    /// 释放 inode 号并同步位图
    InodeBit(u32),
    /// 释放数据块
    Block(u32),
    /// 从父目录中删除刚写入的目录项
    DirEntry {
        parent: &'a InodeHandle,
        inode_no: u32,
    },
}

/// 多步操作的回滚记录：失败时按相反顺序撤销已完成的步骤
pub(crate) struct Rollback<'a> {
    part: &'a Partition,
    steps: Vec<Undo<'a>>,
}

impl<'a> Rollback<'a> {
    /// 执行 `f`，返回错误时撤销 `f` 中记录过的步骤
    pub(crate) fn run<T, F>(part: &'a Partition, f: F) -> Result<T>
    where
        F: FnOnce(&mut Rollback<'a>) -> Result<T>,
    {
        let mut rollback = Rollback {
            part,
            steps: Vec::new(),
        };
        match f(&mut rollback) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("rolling back {} step(s) after: {}", rollback.steps.len(), e);
                rollback.unwind();
                Err(e)
            }
        }
    }

    pub(crate) fn record(&mut self, undo: Undo<'a>) {
        self.steps.push(undo);
    }

    fn unwind(mut self) {
        while let Some(step) = self.steps.pop() {
            let result = match &step {
                Undo::InodeBit(no) => self.part.free_inode_no(*no, true),
                Undo::Block(lba) => self.part.free_block(*lba),
                Undo::DirEntry { parent, inode_no } => {
                    let mut dir = parent.lock();
                    self.part.delete_dir_entry(&mut dir, *inode_no).map(|_| ())
                }
            };
            // 撤销失败时只能记录下来，继续撤销剩下的步骤
            if let Err(e) = result {
                warn!("undo {:?} failed: {}", step, e);
            }
        }
    }
}
