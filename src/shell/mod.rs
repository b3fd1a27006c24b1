pub mod cli;
pub mod command;
pub mod parse;

use crate::{
    disk::init::perform_disk_initialization,
    fs::{FileSystem, FsError},
    shell::{cli::ShellArgs, command::execute_command, parse::parse_command},
};
use colored::*;
use crossterm::{
    cursor, execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use indicatif::{ProgressBar, ProgressStyle};
use reedline::{DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal};
use std::{error::Error, io::stdout, path::PathBuf, sync::mpsc, thread};

/// 后台初始化线程发给前台的启动进度
#[derive(Debug)]
pub enum BootProgress {
    Step(&'static str),
    Progress(u64),
    Finished(Result<FileSystem, FsError>),
}

pub fn start_shell(args: ShellArgs) -> Result<(), Box<dyn Error>> {
    let mut fs = boot(args)?;

    let username = whoami::username();
    let hostname = whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string());
    let mut current_dir = fs.getcwd()?;

    println!(
        "{}",
        "Type 'help' for available commands. Use ↑↓ for history, Tab for auto-completion.\n"
            .bright_black()
    );

    // 初始化 reedline
    let history_path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kfs_history");

    let mut line_editor =
        Reedline::create().with_history(Box::new(FileBackedHistory::with_file(100, history_path)?));

    // 命令补全
    let commands: Vec<String> = vec![
        "help", "ls", "pwd", "mkdir", "rmdir", "create", "rm", "cd", "read", "write", "stat",
        "format", "exit",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    let completer = reedline::DefaultCompleter::new_with_wordlen(commands, 2);
    line_editor = line_editor.with_completer(Box::new(completer));

    loop {
        let full_prompt = format!(
            "{}:{}> ",
            format!("{}@{}", username, hostname).green(),
            current_dir.blue()
        );
        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic(full_prompt),
            DefaultPromptSegment::Basic("KFS".bright_blue().bold().to_string()),
        );

        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => {
                let trimmed = buffer.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match parse_command(trimmed) {
                    Some(cmd) => {
                        if let Err(e) = execute_command(&cmd, &mut fs, &mut current_dir) {
                            println!("{} {}", "❌ Error:".red().bold(), e);
                        }
                        if matches!(cmd, command::Command::Exit) {
                            break;
                        }
                    }
                    None => println!(
                        "{}",
                        "⚠️  Unknown command. Type 'help' for command list.".yellow()
                    ),
                }
            }
            Ok(Signal::CtrlC) => {
                println!();
                continue;
            }
            Ok(Signal::CtrlD) => {
                println!("{}", "Exiting KFS...".yellow());
                break;
            }
            Err(e) => {
                println!("Error reading line: {}", e);
                break;
            }
        }
    }

    fs.unmount();
    println!("{}", "GoodBye!".bright_yellow());
    Ok(())
}

/// 启动画面：后台线程打开磁盘并挂载，前台显示进度
fn boot(args: ShellArgs) -> Result<FileSystem, Box<dyn Error>> {
    let mut stdout = stdout();

    execute!(stdout, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    println!("{}", "[KFS Booting...]".bright_yellow().bold());

    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || perform_disk_initialization(tx, &args));

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos:>3}% {msg}")?.progress_chars("=> "),
    );

    let mut finished = None;
    for msg in rx {
        match msg {
            BootProgress::Step(step) => pb.println(step),
            BootProgress::Progress(pos) => pb.set_position(pos),
            BootProgress::Finished(result) => finished = Some(result),
        }
    }
    if worker.join().is_err() {
        return Err("disk initialization thread panicked".into());
    }

    let fs = match finished {
        Some(Ok(fs)) => fs,
        Some(Err(e)) => {
            pb.abandon_with_message("❌ Boot failed");
            return Err(e.into());
        }
        None => return Err("disk initialization ended without a result".into()),
    };
    pb.finish_with_message("✅ Ready!");

    let sb = fs.partition().super_block();
    execute!(
        stdout,
        Clear(ClearType::All),
        cursor::MoveTo(0, 0),
        SetForegroundColor(Color::Cyan),
        Print(format!("Welcome to KFS v{}\n", env!("CARGO_PKG_VERSION"))),
        ResetColor
    )?;
    println!(
        "{}",
        format!(
            "{} sectors, {} free blocks, {} free inodes",
            sb.sector_count,
            fs.partition().free_blocks(),
            fs.partition().free_inodes()
        )
        .bright_black()
    );
    Ok(fs)
}
