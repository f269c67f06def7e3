// Environment open/close with scoped view/update transactions.
use std::ffi::CString;
use std::fs;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::lmdb::{self, sys};
use crate::core::ops::EnvFlags;
use crate::core::txn::{RoTxn, RwTxn};

const DEFAULT_MAP_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_READERS: u32 = 126;
const DEFAULT_MAX_DBS: u32 = 16;
const DEFAULT_FILE_MODE: u32 = 0o644;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvOptions {
    pub map_size: u64,
    pub max_readers: u32,
    pub max_dbs: u32,
    pub flags: EnvFlags,
    pub file_mode: u32,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            map_size: DEFAULT_MAP_SIZE,
            max_readers: DEFAULT_MAX_READERS,
            max_dbs: DEFAULT_MAX_DBS,
            flags: EnvFlags::empty(),
            file_mode: DEFAULT_FILE_MODE,
        }
    }
}

impl EnvOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map_size(mut self, map_size: u64) -> Self {
        self.map_size = map_size;
        self
    }

    pub fn with_max_dbs(mut self, max_dbs: u32) -> Self {
        self.max_dbs = max_dbs;
        self
    }

    pub fn with_max_readers(mut self, max_readers: u32) -> Self {
        self.max_readers = max_readers;
        self
    }

    pub fn with_flags(mut self, flags: EnvFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read config")
                .with_path(path)
                .with_source(err)
        })?;
        serde_json::from_str(&text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid config: {err}"))
                .with_path(path)
                .with_source(err)
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EnvInfo {
    pub map_size: u64,
    pub last_page: u64,
    pub last_txn_id: u64,
    pub max_readers: u32,
    pub num_readers: u32,
}

#[derive(Debug)]
pub struct Environment {
    raw: NonNull<sys::MDB_env>,
    path: PathBuf,
    read_only: bool,
}

// LMDB environments may be shared across threads; transactions may not.
unsafe impl Send for Environment {}
unsafe impl Sync for Environment {}

impl Environment {
    pub fn open(path: impl AsRef<Path>, options: &EnvOptions) -> Result<Self, Error> {
        let path = path.as_ref();
        let read_only = options.flags.contains(EnvFlags::READ_ONLY);
        if !read_only {
            ensure_dir(path, options.flags)?;
        }
        let c_path = path_to_cstring(path)?;

        let mut raw = ptr::null_mut();
        lmdb::check(unsafe { sys::mdb_env_create(&mut raw) })
            .map_err(|err| err.with_path(path))?;
        let raw = NonNull::new(raw).ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("mdb_env_create returned null")
        })?;
        // From here on, dropping `env` closes the native handle on every error path.
        let mut env = Self {
            raw,
            path: path.to_path_buf(),
            read_only,
        };

        let map_size = usize::try_from(options.map_size).map_err(|_| {
            Error::new(ErrorKind::InvalidArgument).with_message("map_size exceeds address space")
        })?;
        env.configure(|raw| unsafe { sys::mdb_env_set_maxreaders(raw, options.max_readers) })?;
        env.configure(|raw| unsafe { sys::mdb_env_set_maxdbs(raw, options.max_dbs) })?;
        env.configure(|raw| unsafe { sys::mdb_env_set_mapsize(raw, map_size) })?;

        let flags = (options.flags | EnvFlags::NO_TLS).bits();
        env.configure(|raw| unsafe {
            sys::mdb_env_open(raw, c_path.as_ptr(), flags, options.file_mode as sys::mdb_mode_t)
        })?;

        env.align_map_size()?;
        debug!(path = %env.path.display(), read_only, "environment opened");
        Ok(env)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn as_raw(&self) -> *mut sys::MDB_env {
        self.raw.as_ptr()
    }

    pub fn info(&self) -> Result<EnvInfo, Error> {
        let mut info = sys::MDB_envinfo {
            me_mapaddr: ptr::null_mut(),
            me_mapsize: 0,
            me_last_pgno: 0,
            me_last_txnid: 0,
            me_maxreaders: 0,
            me_numreaders: 0,
        };
        lmdb::check(unsafe { sys::mdb_env_info(self.as_raw(), &mut info) })?;
        Ok(EnvInfo {
            map_size: info.me_mapsize as u64,
            last_page: info.me_last_pgno as u64,
            last_txn_id: info.me_last_txnid as u64,
            max_readers: info.me_maxreaders,
            num_readers: info.me_numreaders,
        })
    }

    pub fn map_size(&self) -> Result<u64, Error> {
        Ok(self.info()?.map_size)
    }

    pub fn sync(&self, force: bool) -> Result<(), Error> {
        debug!(path = %self.path.display(), force, "environment sync");
        lmdb::check(unsafe { sys::mdb_env_sync(self.as_raw(), i32::from(force)) })
    }

    /// Writes a consistent copy of the environment into the directory `dest`
    /// (or the file `dest` when opened with `NO_SUB_DIR`).
    pub fn copy_to(&self, dest: impl AsRef<Path>, compact: bool) -> Result<(), Error> {
        let dest = dest.as_ref();
        let c_dest = path_to_cstring(dest)?;
        let flags = if compact { sys::MDB_CP_COMPACT } else { 0 };
        debug!(from = %self.path.display(), to = %dest.display(), compact, "environment copy");
        lmdb::check(unsafe { sys::mdb_env_copy2(self.as_raw(), c_dest.as_ptr(), flags) })
            .map_err(|err| err.with_path(dest))
    }

    pub fn begin_ro_txn(&self) -> Result<RoTxn<'_>, Error> {
        let raw = self.begin_raw(true)?;
        Ok(RoTxn::from_raw(raw))
    }

    pub fn begin_rw_txn(&self) -> Result<RwTxn<'_>, Error> {
        if self.read_only {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("environment is read-only")
                .with_path(&self.path)
                .with_code(libc::EACCES));
        }
        let raw = self.begin_raw(false)?;
        Ok(RwTxn::from_raw(raw))
    }

    /// Runs `f` in a read-only transaction that is always aborted afterwards.
    pub fn view<T>(&self, f: impl FnOnce(&RoTxn<'_>) -> Result<T, Error>) -> Result<T, Error> {
        let txn = self.begin_ro_txn()?;
        f(&txn)
    }

    /// Runs `f` in a read-write transaction, committed only when `f` returns `Ok`.
    pub fn update<T>(&self, f: impl FnOnce(&mut RwTxn<'_>) -> Result<T, Error>) -> Result<T, Error> {
        let mut txn = self.begin_rw_txn()?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.abort();
                Err(err)
            }
        }
    }

    pub(crate) fn begin_raw(&self, read_only: bool) -> Result<NonNull<sys::MDB_txn>, Error> {
        let flags = if read_only { sys::MDB_RDONLY } else { 0 };
        let mut raw = ptr::null_mut();
        lmdb::check(unsafe { sys::mdb_txn_begin(self.as_raw(), ptr::null_mut(), flags, &mut raw) })?;
        NonNull::new(raw).ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("mdb_txn_begin returned null")
        })
    }

    fn configure(&mut self, call: impl FnOnce(*mut sys::MDB_env) -> i32) -> Result<(), Error> {
        lmdb::check(call(self.raw.as_ptr())).map_err(|err| err.with_path(&self.path))
    }

    fn align_map_size(&mut self) -> Result<(), Error> {
        let page_size = lmdb::page_size();
        let map_size = self.map_size()?;
        let remainder = map_size % page_size;
        if remainder == 0 {
            return Ok(());
        }
        let aligned = map_size + (page_size - remainder);
        debug!(map_size, aligned, "rounding map size up to page size");
        let aligned = usize::try_from(aligned).map_err(|_| {
            Error::new(ErrorKind::InvalidArgument).with_message("map_size exceeds address space")
        })?;
        self.configure(|raw| unsafe { sys::mdb_env_set_mapsize(raw, aligned) })
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "environment closed");
        unsafe { sys::mdb_env_close(self.raw.as_ptr()) };
    }
}

fn ensure_dir(path: &Path, flags: EnvFlags) -> Result<(), Error> {
    let dir = if flags.contains(EnvFlags::NO_SUB_DIR) {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => return Ok(()),
        }
    } else {
        path
    };
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|err| {
        warn!(path = %dir.display(), "failed to create environment directory");
        Error::new(ErrorKind::Io)
            .with_message("failed to create environment directory")
            .with_path(dir)
            .with_source(err)
    })
}

fn path_to_cstring(path: &Path) -> Result<CString, Error> {
    let text = path.to_str().ok_or_else(|| {
        Error::new(ErrorKind::InvalidArgument)
            .with_message("path is not valid UTF-8")
            .with_path(path)
    })?;
    CString::new(text).map_err(|err| {
        Error::new(ErrorKind::InvalidArgument)
            .with_message("path contains NUL")
            .with_path(path)
            .with_source(err)
    })
}
