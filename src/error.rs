use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("not a file")]
    NotAFile,
    #[error("access denied")]
    AccessDenied,
    #[error("name already exists")]
    NameCollision,
    #[error("no space left on device")]
    NoSpace,
    #[error("malformed path or name")]
    Malformed,
    #[error("directory not empty")]
    NotEmpty,
    #[error("directory is in use by the working path")]
    Busy,
    #[error("cannot move a directory beneath itself")]
    Loop,
    #[error("device holds no file system")]
    Unformatted,
    #[error("block id out of range")]
    InvalidBlockId,
    #[error("device read failed")]
    ReadError,
    #[error("device write failed")]
    WriteError,
    #[error("i/o error")]
    IoError,
}

impl FsError {
    /// Status code reported to the shell. Success is 0.
    pub fn status(&self) -> i32 {
        match self {
            FsError::NotFound => -1,
            FsError::NotADirectory => -2,
            FsError::NotAFile => -3,
            FsError::AccessDenied => -4,
            FsError::NameCollision => -5,
            FsError::NoSpace => -6,
            FsError::Malformed => -7,
            FsError::NotEmpty => -8,
            FsError::Busy => -9,
            FsError::Loop => -10,
            FsError::Unformatted => -11,
            FsError::InvalidBlockId => -12,
            FsError::ReadError => -13,
            FsError::WriteError => -14,
            FsError::IoError => -15,
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        log::debug!("output sink failed: {}", err);
        FsError::IoError
    }
}

/// Folds an operation result into a shell status code.
pub fn status_of<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.status(),
    }
}

pub type Result<T> = core::result::Result<T, FsError>;
