//! Purpose: Thin helpers over the raw LMDB bindings shared by proxies and handles.
//! Exports: `check`, `strerror`, `page_size`, and the `sys` declarations.
//! Role: The only place native status codes are turned into `Error` values.
//! Invariants: Native codes are never rewritten; `Error::code` carries them verbatim.
use std::ffi::CStr;
use std::os::raw::c_int;

use crate::core::error::Error;

pub mod sys;

pub fn check(rc: c_int) -> Result<(), Error> {
    if rc == sys::MDB_SUCCESS {
        Ok(())
    } else {
        Err(Error::from_code(rc))
    }
}

/// Like [`check`], but maps `MDB_NOTFOUND` to `Ok(None)`.
pub fn check_found<T>(rc: c_int, value: impl FnOnce() -> T) -> Result<Option<T>, Error> {
    match rc {
        sys::MDB_SUCCESS => Ok(Some(value())),
        sys::MDB_NOTFOUND => Ok(None),
        rc => Err(Error::from_code(rc)),
    }
}

pub fn strerror(rc: c_int) -> String {
    let ptr = unsafe { sys::mdb_strerror(rc) };
    if ptr.is_null() {
        return format!("LMDB error: {rc}");
    }
    let message = unsafe { CStr::from_ptr(ptr) }.to_string_lossy();
    if message.is_empty() {
        format!("LMDB error: {rc}")
    } else {
        message.into_owned()
    }
}

pub fn page_size() -> u64 {
    #[cfg(unix)]
    {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as u64;
        }
    }
    4096
}

#[cfg(test)]
mod tests {
    use super::{check, check_found, page_size, strerror, sys};
    use crate::core::error::ErrorKind;

    #[test]
    fn not_found_is_not_an_error_for_lookups() {
        assert_eq!(check_found(sys::MDB_NOTFOUND, || 1).expect("found"), None);
        assert_eq!(check_found(sys::MDB_SUCCESS, || 1).expect("found"), Some(1));
        let err = check_found(sys::MDB_MAP_FULL, || 1).expect_err("map full");
        assert_eq!(err.kind(), ErrorKind::Engine);
        assert_eq!(err.code(), Some(sys::MDB_MAP_FULL));
    }

    #[test]
    fn check_passes_codes_through() {
        assert!(check(sys::MDB_SUCCESS).is_ok());
        let err = check(sys::MDB_NOTFOUND).expect_err("not found");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.code(), Some(sys::MDB_NOTFOUND));
    }

    #[test]
    fn engine_messages_are_available() {
        assert!(strerror(sys::MDB_NOTFOUND).contains("MDB_NOTFOUND"));
        assert!(page_size() >= 512);
    }
}
