use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::lmdb::{self, sys};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    InvalidArgument,
    NotFound,
    KeyExists,
    Corrupt,
    Engine,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    code: Option<i32>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            code: None,
            source: None,
        }
    }

    /// Classifies a native status code. The code itself is kept verbatim in
    /// [`Error::code`] so callers can forward it across the ABI unchanged.
    pub fn from_code(code: i32) -> Self {
        Self::new(kind_for_code(code))
            .with_code(code)
            .with_message(lmdb::strerror(code))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Native status code, when the error originated in the engine.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Status to report across the C ABI.
    pub fn status(&self) -> i32 {
        match self.code {
            Some(code) => code,
            None => match self.kind {
                ErrorKind::NotFound => sys::MDB_NOTFOUND,
                ErrorKind::KeyExists => sys::MDB_KEYEXIST,
                ErrorKind::Corrupt => sys::MDB_CORRUPTED,
                _ => libc::EINVAL,
            },
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(code) = self.code {
            write!(f, " (code: {code})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

fn kind_for_code(code: i32) -> ErrorKind {
    match code {
        sys::MDB_NOTFOUND => ErrorKind::NotFound,
        sys::MDB_KEYEXIST => ErrorKind::KeyExists,
        sys::MDB_CORRUPTED
        | sys::MDB_PAGE_NOTFOUND
        | sys::MDB_PANIC
        | sys::MDB_VERSION_MISMATCH
        | sys::MDB_INVALID => ErrorKind::Corrupt,
        libc::EINVAL => ErrorKind::InvalidArgument,
        code if (sys::MDB_KEYEXIST..=sys::MDB_LAST_ERRCODE).contains(&code) => ErrorKind::Engine,
        code if code > 0 => ErrorKind::Io,
        _ => ErrorKind::Engine,
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::KeyExists => 4,
        ErrorKind::InvalidArgument => 5,
        ErrorKind::Engine => 6,
        ErrorKind::Corrupt => 7,
        ErrorKind::Io => 8,
    }
}
