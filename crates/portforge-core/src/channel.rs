use crate::util::unix_stamp;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const READY_STAMP: &str = "ready for command";

/// File-based command bridge for inspecting long runs.
///
/// Commands are lines written into the command file by a human or a
/// supervising process; replies are appended to the reply file. A poll
/// reads command lines until the ready stamp, dispatches each line to the
/// first registered command whose name is a prefix of it, and rewrites the
/// command file with a fresh stamp. The reply file is truncated once on
/// construction, never afterwards.
pub struct CommandChannel {
    command_path: PathBuf,
    reply_path: PathBuf,
    commands: Vec<String>,
}

impl CommandChannel {
    pub fn new(command_path: impl Into<PathBuf>, reply_path: impl Into<PathBuf>) -> io::Result<Self> {
        let channel = Self {
            command_path: command_path.into(),
            reply_path: reply_path.into(),
            commands: vec!["help".to_string()],
        };
        clear_file(&channel.command_path)?;
        clear_file(&channel.reply_path)?;
        Ok(channel)
    }

    /// Register a command name; `help` lists all registered names.
    pub fn register(&mut self, name: &str) {
        self.commands.push(name.to_string());
    }

    /// Poll the command file. `handle` is invoked with the matched command
    /// name, the full command line, and the reply stream.
    pub fn check_commands(
        &mut self,
        mut handle: impl FnMut(&str, &str, &mut dyn Write) -> io::Result<()>,
    ) -> io::Result<()> {
        let infile = File::open(&self.command_path)?;
        let mut reply = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.reply_path)?;

        for line in BufReader::new(infile).lines() {
            let line = line?;
            if line.starts_with(READY_STAMP) {
                break;
            }
            writeln!(reply, "{} start handling command '{line}'", unix_stamp())?;
            match self.commands.iter().find(|c| line.starts_with(c.as_str())) {
                Some(name) if name == "help" => {
                    writeln!(reply, "Available commands:")?;
                    for cmd in &self.commands {
                        writeln!(reply, "  {cmd}")?;
                    }
                }
                Some(name) => handle(name, &line, &mut reply)?,
                None => writeln!(reply, "  No such command!")?,
            }
            writeln!(reply, "{} done handling command '{line}'", unix_stamp())?;
        }

        clear_file(&self.command_path)
    }
}

fn clear_file(path: &Path) -> io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{READY_STAMP} {}", unix_stamp())
}
