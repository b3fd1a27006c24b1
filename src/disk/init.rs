use std::sync::{mpsc::Sender, Arc};

use crate::{
    disk::{BlockDevice, FileDisk, MemDisk},
    fs::{FileSystem, FsError},
    shell::{cli::ShellArgs, BootProgress},
};

/// 在后台线程里打开磁盘并挂载，进度通过 `tx` 发给前台
pub fn perform_disk_initialization(tx: Sender<BootProgress>, args: &ShellArgs) {
    // 前台提前退出时发送会失败，此时没有人关心进度
    let send = |msg| {
        let _ = tx.send(msg);
    };

    send(BootProgress::Step("🧠 Initializing virtual disk..."));
    let device: Arc<dyn BlockDevice> = if args.memory {
        match MemDisk::try_new(args.sectors) {
            Ok(disk) => Arc::new(disk),
            Err(e) => {
                log::error!("cannot allocate {} sectors in memory: {}", args.sectors, e);
                send(BootProgress::Finished(Err(FsError::AllocationFailure)));
                return;
            }
        }
    } else {
        match FileDisk::open(&args.disk, args.sectors) {
            Ok((disk, grown)) => {
                if grown {
                    log::info!("disk image {} created or extended", args.disk);
                }
                Arc::new(disk)
            }
            Err(e) => {
                send(BootProgress::Finished(Err(FsError::Io(e))));
                return;
            }
        }
    };
    send(BootProgress::Progress(40));

    // 未格式化的盘在挂载时自动格式化
    send(BootProgress::Step("⚙️  Mounting file system..."));
    let fs = FileSystem::mount(device);
    send(BootProgress::Progress(100));

    send(BootProgress::Finished(fs));
}
