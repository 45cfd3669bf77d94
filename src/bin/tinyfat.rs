use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use log::{info, warn, LevelFilter};

use tinyfat::shell::Shell;
use tinyfat::{BlockDevice, Error, FileSystem, Result, BLOCK_SIZE, FAT_ENTRIES};

/// Interactive shell over a tinyfat disk image.
#[derive(Debug, Parser)]
#[command(name = "tinyfat", version)]
struct Config {
    /// Disk image file, created when missing
    #[arg(default_value = "diskfile.bin")]
    image: PathBuf,

    /// Number of blocks for a newly created image
    #[arg(long, default_value_t = FAT_ENTRIES)]
    blocks: usize,

    /// Format the image even if it already holds a file system
    #[arg(long)]
    format: bool,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

/// A disk image file, one block after another.
struct FileDisk {
    inner: Mutex<File>,
    num_blocks: usize,
}

impl FileDisk {
    fn open(path: &Path, blocks: usize) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len() as usize;
        let num_blocks = if len >= BLOCK_SIZE { len / BLOCK_SIZE } else { blocks };
        file.set_len((num_blocks * BLOCK_SIZE) as u64)?;
        Ok(FileDisk {
            inner: Mutex::new(file),
            num_blocks,
        })
    }
}

impl BlockDevice for FileDisk {
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<()> {
        if block_id >= self.num_blocks {
            return Err(Error::InvalidBlockId);
        }
        let mut file = self.inner.lock().map_err(|_| Error::ReadError)?;
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map_err(|_| Error::ReadError)?;
        file.read_exact(buf).map_err(|_| Error::ReadError)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<()> {
        if block_id >= self.num_blocks {
            return Err(Error::InvalidBlockId);
        }
        let mut file = self.inner.lock().map_err(|_| Error::WriteError)?;
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map_err(|_| Error::WriteError)?;
        file.write_all(buf).map_err(|_| Error::WriteError)
    }

    fn flush(&self) -> Result<()> {
        let mut file = self.inner.lock().map_err(|_| Error::WriteError)?;
        file.flush().map_err(|_| Error::WriteError)?;
        file.sync_data().map_err(|_| Error::WriteError)
    }
}

fn open_fs(config: &Config) -> Result<FileSystem<FileDisk>> {
    let disk = FileDisk::open(&config.image, config.blocks)?;
    let disk = Arc::new(disk);
    if config.format {
        return FileSystem::format(disk);
    }
    match FileSystem::mount(Arc::clone(&disk)) {
        Ok(fs) => Ok(fs),
        Err(Error::Unformatted) => {
            warn!("{} holds no file system, formatting", config.image.display());
            FileSystem::format(disk)
        }
        Err(e) => Err(e),
    }
}

fn main() -> ExitCode {
    let config = Config::parse();
    tinyfat::logging::init(config.log_level.unwrap_or_else(tinyfat::logging::default_level));
    info!("opening {}", config.image.display());

    let fs = match open_fs(&config) {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("tinyfat: cannot open {}: {}", config.image.display(), e);
            return ExitCode::from(e.status().unsigned_abs() as u8);
        }
    };

    let mut shell = Shell::new(fs);
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut out = std::io::stdout();
    if let Err(e) = shell.run(&mut input, &mut out) {
        eprintln!("tinyfat: {}", e);
        return ExitCode::FAILURE;
    }
    if let Err(e) = shell.fs().flush() {
        eprintln!("tinyfat: final flush failed: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
