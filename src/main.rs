use clap::Parser;
use colored::*;
use kfs::shell::{cli::ShellArgs, start_shell};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = ShellArgs::parse();
    if let Err(e) = start_shell(args) {
        eprintln!("{} {}", "❌ Fatal:".red().bold(), e);
        std::process::exit(1);
    }
}
