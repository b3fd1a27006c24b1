use crate::shell::command::Command;

pub fn parse_command(input: &str) -> Option<Command> {
    let tokens: Vec<&str> = input.trim().split_ascii_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }

    let cmd = tokens[0];
    let args = &tokens[1..];
    let first = || args.first().map(|&arg| arg.to_string());

    match cmd {
        "help" => Some(Command::Help),
        "ls" => Some(Command::Ls(first())),
        "pwd" => Some(Command::Pwd),
        "mkdir" => first().map(Command::Mkdir),
        "rmdir" => first().map(Command::Rmdir),
        "create" => first().map(Command::Create),
        "rm" => first().map(Command::Rm),
        "cd" => Some(Command::Cd(first().unwrap_or_else(|| "/".to_string()))),
        "read" => first().map(Command::Read),
        "write" => {
            if args.len() >= 2 {
                Some(Command::Write(args[0].to_string(), args[1..].join(" ")))
            } else {
                None
            }
        }
        "stat" => first().map(Command::Stat),
        "format" => Some(Command::Format),
        "exit" => Some(Command::Exit),
        _ => None,
    }
}
