//! Line-oriented command interpreter over a [`FileSystem`].
//! Each command yields a status code: 0 on success, the error's code otherwise.

use std::io::{BufRead, Write};

use log::debug;

use crate::error::{FsError, Result};
use crate::{BlockDevice, FileSystem};

const HELP_TEXT: &str = "commands: format, create <file>, cat <file>, ls, cp <src> <dst>, \
mv <src> <dst>, rm <path>, append <src> <dst>, mkdir <dir>, cd <dir>, pwd, \
chmod <rights> <path>, help, quit\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Format,
    Create(&'a str),
    Cat(&'a str),
    Ls,
    Cp(&'a str, &'a str),
    Mv(&'a str, &'a str),
    Rm(&'a str),
    Append(&'a str, &'a str),
    Mkdir(&'a str),
    Cd(&'a str),
    Pwd,
    Chmod(&'a str, &'a str),
    Help,
    Quit,
    Empty,
}

impl<'a> Command<'a> {
    /// Splits a command line into a command and its arguments.
    /// Unknown commands and wrong argument counts are malformed.
    pub fn parse(line: &'a str) -> Result<Self> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let command = match args.as_slice() {
            [] => Command::Empty,
            ["format"] => Command::Format,
            ["create", path] => Command::Create(*path),
            ["cat", path] => Command::Cat(*path),
            ["ls"] => Command::Ls,
            ["cp", src, dst] => Command::Cp(*src, *dst),
            ["mv", src, dst] => Command::Mv(*src, *dst),
            ["rm", path] => Command::Rm(*path),
            ["append", src, dst] => Command::Append(*src, *dst),
            ["mkdir", path] => Command::Mkdir(*path),
            ["cd", path] => Command::Cd(*path),
            ["pwd"] => Command::Pwd,
            ["chmod", rights, path] => Command::Chmod(*rights, *path),
            ["help"] => Command::Help,
            ["quit"] | ["exit"] => Command::Quit,
            _ => return Err(FsError::Malformed),
        };
        Ok(command)
    }
}

/// Reads a `create` payload: lines up to the first empty line or end of input.
/// Every payload line keeps its newline.
pub fn read_payload(input: &mut impl BufRead) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let content = line.trim_end_matches(['\n', '\r']);
        if content.is_empty() {
            break;
        }
        data.extend_from_slice(content.as_bytes());
        data.push(b'\n');
    }
    Ok(data)
}

pub struct Shell<D: BlockDevice> {
    fs: FileSystem<D>,
    running: bool,
}

impl<D: BlockDevice> Shell<D> {
    pub fn new(fs: FileSystem<D>) -> Self {
        Self { fs, running: true }
    }

    pub fn fs(&self) -> &FileSystem<D> {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut FileSystem<D> {
        &mut self.fs
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn dispatch(&mut self, command: Command<'_>, input: &mut impl BufRead, out: &mut impl Write) -> Result<()> {
        match command {
            Command::Empty => Ok(()),
            Command::Format => self.fs.reformat(),
            Command::Create(path) => {
                let data = read_payload(input)?;
                self.fs.create(path, &data)
            }
            Command::Cat(path) => self.fs.cat(path, out).map(|_| ()),
            Command::Ls => self.fs.ls(out),
            Command::Cp(src, dst) => self.fs.cp(src, dst),
            Command::Mv(src, dst) => self.fs.mv(src, dst),
            Command::Rm(path) => self.fs.rm(path),
            Command::Append(src, dst) => self.fs.append(src, dst),
            Command::Mkdir(path) => self.fs.mkdir(path),
            Command::Cd(path) => self.fs.cd(path),
            Command::Pwd => {
                writeln!(out, "{}", self.fs.pwd())?;
                Ok(())
            }
            Command::Chmod(rights, path) => self.fs.chmod(rights, path),
            Command::Help => {
                out.write_all(HELP_TEXT.as_bytes())?;
                Ok(())
            }
            Command::Quit => {
                self.running = false;
                Ok(())
            }
        }
    }

    /// Runs one command line. A `create` reads its payload from `input`.
    pub fn execute(&mut self, line: &str, input: &mut impl BufRead, out: &mut impl Write) -> i32 {
        let result = Command::parse(line).and_then(|command| {
            debug!("[shell] {:?}", command);
            self.dispatch(command, input, out)
        });
        match result {
            Ok(()) => 0,
            Err(e) => {
                let _ = writeln!(out, "error: {}", e);
                e.status()
            }
        }
    }

    /// Prompts, reads and executes commands until `quit` or end of input.
    pub fn run(&mut self, input: &mut impl BufRead, out: &mut impl Write) -> Result<()> {
        let mut line = String::new();
        while self.running {
            write!(out, "tinyfat:{}> ", self.fs.pwd())?;
            out.flush()?;
            line.clear();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            let status = self.execute(&line, input, out);
            if status != 0 {
                debug!("[shell] status {}", status);
            }
        }
        Ok(())
    }
}
