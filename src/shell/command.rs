use colored::*;
use dialoguer::Confirm;
use indicatif::ProgressBar;
use std::{error::Error, time::Duration};

use crate::fs::{FileSystem, FileType, FsError, OpenFlags, Whence};

#[derive(Debug, PartialEq)]
pub enum Command {
    Help,
    Ls(Option<String>),
    Pwd,
    Mkdir(String),
    Rmdir(String),
    Create(String),
    Rm(String),
    Cd(String),
    Read(String),
    Write(String, String),
    Stat(String),
    Format,
    Exit,
}

/// 相对路径拼到当前目录后面
pub fn resolve_path(current_dir: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else if current_dir == "/" {
        format!("/{}", path)
    } else {
        format!("{}/{}", current_dir, path)
    }
}

pub fn execute_command(
    cmd: &Command,
    fs: &mut FileSystem,
    current_dir: &mut String,
) -> Result<(), Box<dyn Error>> {
    match cmd {
        Command::Help => print_help(),
        Command::Ls(path) => {
            let path = path
                .as_deref()
                .map_or_else(|| current_dir.clone(), |p| resolve_path(current_dir, p));
            for (name, file_type, size) in list_dir(fs, &path)? {
                match file_type {
                    FileType::Directory => println!("📁  {}", name.blue()),
                    _ => println!("📄  {} {}", name, format!("({} bytes)", size).bright_black()),
                }
            }
        }
        Command::Pwd => println!("📍 {}", current_dir.cyan()),
        Command::Mkdir(name) => {
            let path = resolve_path(current_dir, name);
            fs.mkdir(&path)?;
            println!("✅ Created directory: {}", path.green());
        }
        Command::Rmdir(name) => {
            let path = resolve_path(current_dir, name);
            fs.rmdir(&path)?;
            println!("🗑️ Removed directory: {}", path.red());
        }
        Command::Create(name) => {
            let path = resolve_path(current_dir, name);
            let fd = fs.open(&path, OpenFlags::CREATE)?;
            fs.close(fd)?;
            println!("📝 Created file: {}", path.green());
        }
        Command::Rm(name) => {
            let path = resolve_path(current_dir, name);
            fs.unlink(&path)?;
            println!("❌ Deleted file: {}", path.red());
        }
        Command::Cd(path) => {
            fs.chdir(&resolve_path(current_dir, path))?;
            *current_dir = fs.getcwd()?;
            println!("📂 Moved to {}", current_dir.blue());
        }
        Command::Read(file) => {
            let path = resolve_path(current_dir, file);
            println!("📖 Reading file: {}", path.cyan());
            let data = read_all(fs, &path)?;
            println!("{}", String::from_utf8_lossy(&data));
        }
        Command::Write(file, content) => {
            let path = resolve_path(current_dir, file);
            let written = append(fs, &path, content.as_bytes())?;
            println!("✏️  Wrote {} bytes to {}", written, path.cyan());
        }
        Command::Stat(file) => {
            let path = resolve_path(current_dir, file);
            let stat = fs.stat(&path)?;
            let kind = match stat.file_type {
                FileType::Directory => "Directory",
                _ => "File",
            };
            println!(
                "{}\n{}: {}\n{}: {}\n{}: {}\n{}: {} bytes\n",
                "📊 File Info".bright_yellow().bold(),
                "Name".blue(),
                path,
                "Inode".blue(),
                stat.inode_no,
                "Type".blue(),
                kind,
                "Size".blue(),
                stat.size
            );
        }
        Command::Format => {
            let confirmed = Confirm::new()
                .with_prompt("Format the disk? All data will be lost")
                .default(false)
                .interact()?;
            if !confirmed {
                println!("{}", "Format cancelled.".yellow());
                return Ok(());
            }

            let pb = ProgressBar::new_spinner();
            pb.enable_steady_tick(Duration::from_millis(80));
            pb.set_message("💾 Formatting virtual disk...");
            let fresh = FileSystem::format(fs.device())?;
            std::mem::replace(fs, fresh).unmount();
            *current_dir = fs.getcwd()?;
            pb.finish_with_message("✅ Disk formatted successfully!");
        }
        Command::Exit => println!("{}", "👋 Exiting KFS shell...".yellow().bold()),
    }

    Ok(())
}

/// 目录内容：名字、类型、大小
pub fn list_dir(fs: &FileSystem, path: &str) -> Result<Vec<(String, FileType, u32)>, FsError> {
    let mut dir = fs.opendir(path)?;
    let mut entries = Vec::new();
    let result = loop {
        match fs.readdir(&mut dir) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    fs.closedir(dir);
    result?;

    let mut listing = Vec::new();
    for entry in entries {
        let name = entry.name().into_owned();
        let size = if entry.file_type == FileType::Regular {
            fs.stat(&resolve_path(path, &name))?.size
        } else {
            0
        };
        listing.push((name, entry.file_type, size));
    }
    Ok(listing)
}

pub fn read_all(fs: &FileSystem, path: &str) -> Result<Vec<u8>, FsError> {
    let fd = fs.open(path, OpenFlags::RDONLY)?;
    let mut data = Vec::new();
    let mut buf = [0u8; 512];
    let result = loop {
        match fs.read(fd, &mut buf) {
            Ok(n) => data.extend_from_slice(&buf[..n]),
            Err(FsError::EndOfFile) => break Ok(data),
            Err(e) => break Err(e),
        }
    };
    fs.close(fd)?;
    result
}

/// 追加到文件末尾，文件不存在时创建
pub fn append(fs: &FileSystem, path: &str, data: &[u8]) -> Result<usize, FsError> {
    let fd = match fs.open(path, OpenFlags::WRONLY) {
        Err(FsError::NotFound(_)) => fs.open(path, OpenFlags::CREATE | OpenFlags::WRONLY)?,
        other => other?,
    };
    let result = fs
        .lseek(fd, 0, Whence::End)
        .and_then(|_| fs.write(fd, data));
    fs.close(fd)?;
    result
}

fn print_help() {
    println!("{}", "📘 KFS Commands".bright_cyan().bold());
    println!(
        "{}",
        "
  ls [dir]           List files in a directory
  pwd                Print current path
  mkdir <dir>        Create directory
  rmdir <dir>        Remove empty directory
  create <file>      Create file
  rm <file>          Remove file
  cd <dir>           Change directory
  read <file>        Read file content
  write <file> <str> Append string to file
  stat <file>        Show file info
  format             Format virtual disk
  help               Show this help message
  exit               Quit the shell
"
        .bright_black()
    );
}
