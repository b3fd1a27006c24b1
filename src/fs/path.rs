use log::debug;

use crate::fs::{
    config::{MAX_PATH_LEN, ROOT_INODE_NO},
    directory::{Dir, FileType},
    error::{FsError, Result},
    partition::Partition,
};

/// 路径深度，即非空分量个数："/a/b/c" 为 3
pub fn depth(path: &str) -> usize {
    path.split('/').filter(|name| !name.is_empty()).count()
}

/// 取出路径最前面的一个分量，返回（分量，剩余路径）；多余的 '/' 被跳过
pub fn parse_component(path: &str) -> (&str, &str) {
    let path = path.trim_start_matches('/');
    match path.find('/') {
        Some(i) => (&path[..i], &path[i..]),
        None => (path, ""),
    }
}

/// 路径查找的结果
///
/// 无论是否找到，`parent` 都是打开着的目录，调用方负责关闭。
#[derive(Debug)]
pub struct PathSearch {
    /// 实际走过的路径，找不到时以缺失的那个分量结尾
    pub searched: String,
    pub parent: Dir,
    pub file_type: FileType,
    pub inode_no: Option<u32>,
}

impl PathSearch {
    pub fn found(&self) -> bool {
        self.inode_no.is_some()
    }

    /// 最后一个成功解析的前缀："/a/b" 中 b 缺失时为 "/a"
    pub fn resolved_prefix(&self) -> &str {
        match self.searched.rfind('/') {
            Some(0) | None => "/",
            Some(i) => &self.searched[..i],
        }
    }
}

impl Partition {
    /// 从根目录开始逐级查找 `path`
    ///
    /// 找到目录时 `parent` 是它的父目录；找到普通文件时就停下，剩余分量
    /// 由调用方按深度判断；找不到时 `parent` 是最后一个成功打开的目录。
    pub fn search_file(&self, path: &str) -> Result<PathSearch> {
        if !path.starts_with('/') || path.len() > MAX_PATH_LEN {
            return Err(FsError::InvalidPath(path.to_string()));
        }

        if matches!(path, "/" | "/." | "/..") {
            return Ok(PathSearch {
                searched: String::new(),
                parent: self.open_dir(ROOT_INODE_NO)?,
                file_type: FileType::Directory,
                inode_no: Some(ROOT_INODE_NO),
            });
        }

        let mut parent = self.open_dir(ROOT_INODE_NO)?;
        let mut parent_no = ROOT_INODE_NO;
        let mut searched = String::new();
        let mut rest = path;

        loop {
            let (name, next) = parse_component(rest);
            if name.is_empty() {
                break;
            }
            rest = next;
            searched.push('/');
            searched.push_str(name);

            let lookup = self.search_dir_entry(&parent.lock(), name);
            let entry = match lookup {
                Ok(entry) => entry,
                Err(e) => {
                    self.close_dir(parent);
                    return Err(e);
                }
            };

            match entry {
                None => {
                    debug!("search {}: missing at {}", path, searched);
                    return Ok(PathSearch {
                        searched,
                        parent,
                        file_type: FileType::Unknown,
                        inode_no: None,
                    });
                }
                Some(entry) if entry.file_type == FileType::Directory => {
                    parent_no = parent.inode_no();
                    self.close_dir(parent);
                    parent = self.open_dir(entry.inode_no)?;
                }
                Some(entry) => {
                    return Ok(PathSearch {
                        searched,
                        parent,
                        file_type: entry.file_type,
                        inode_no: Some(entry.inode_no),
                    });
                }
            }
        }

        // 走到底的是目录，此时 parent 就是它本身，换回真正的父目录
        let dir_no = parent.inode_no();
        self.close_dir(parent);
        Ok(PathSearch {
            searched,
            parent: self.open_dir(parent_no)?,
            file_type: FileType::Directory,
            inode_no: Some(dir_no),
        })
    }
}
