//! Purpose: C ABI bridge for bindings (liblmdb_proxy).
//! Exports: C-callable env/txn/dbi/cursor functions and the byte-span proxies.
//! Role: Stable ABI surface for non-Rust bindings.
//! Invariants: Every function returns the native status code unchanged; `EINVAL` marks
//! invalid arguments rejected before the engine is called.
//! Invariants: Keys and values cross as separate (pointer, length) pairs; out slots are
//! written only on success, and key/value slots only when the engine replaced them.
//! Notes: Transaction and cursor handles are the engine's own; the caller owns their lifetime.
#![allow(non_camel_case_types, clippy::missing_safety_doc, clippy::too_many_arguments)]

use crate::core::env::{EnvOptions, Environment};
use crate::core::error::{Error, ErrorKind};
use crate::core::lmdb::sys;
use crate::core::ops::{CursorOp, CursorPutMode, DbFlags, DelMode, EnvFlags, PutMode};
use crate::core::proxy;
use crate::core::span::{ByteSpan, Writeback};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint};
use std::path::PathBuf;
use std::ptr;
use tracing::debug;

/// Bit set in `out_replaced` when the key slot was rewritten.
pub const LMPX_REPLACED_KEY: c_uint = 1;
/// Bit set in `out_replaced` when the value slot was rewritten.
pub const LMPX_REPLACED_VALUE: c_uint = 2;

#[repr(C)]
pub struct lmpx_env {
    env: Environment,
}

#[unsafe(no_mangle)]
pub extern "C" fn lmpx_env_open(
    path: *const c_char,
    map_size: u64,
    max_dbs: c_uint,
    flags: c_uint,
    out_env: *mut *mut lmpx_env,
) -> c_int {
    if out_env.is_null() {
        return fail(invalid("out_env is null"));
    }
    if path.is_null() {
        return fail(invalid("path is null"));
    }
    let path = match unsafe { CStr::from_ptr(path) }.to_str() {
        Ok(path) => PathBuf::from(path),
        Err(_) => return fail(invalid("path is not valid UTF-8")),
    };
    let Some(flags) = EnvFlags::from_bits(flags) else {
        return fail(invalid(format!("unknown environment flags {flags:#x}")));
    };
    let mut options = EnvOptions::new().with_flags(flags);
    if map_size != 0 {
        options = options.with_map_size(map_size);
    }
    if max_dbs != 0 {
        options = options.with_max_dbs(max_dbs);
    }
    let env = match Environment::open(&path, &options) {
        Ok(env) => env,
        Err(err) => return fail(err),
    };
    unsafe {
        *out_env = Box::into_raw(Box::new(lmpx_env { env }));
    }
    sys::MDB_SUCCESS
}

#[unsafe(no_mangle)]
pub extern "C" fn lmpx_env_free(env: *mut lmpx_env) {
    if env.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(env));
    }
}

/// Begins a top-level transaction. Every transaction must end in exactly one
/// of `lmpx_txn_commit` or `lmpx_txn_abort`, before `lmpx_env_free`.
#[unsafe(no_mangle)]
pub extern "C" fn lmpx_txn_begin(
    env: *mut lmpx_env,
    read_only: u8,
    out_txn: *mut *mut sys::MDB_txn,
) -> c_int {
    let env = match borrow_env(env) {
        Ok(env) => env,
        Err(code) => return code,
    };
    if out_txn.is_null() {
        return fail(invalid("out_txn is null"));
    }
    let read_only = read_only != 0;
    if !read_only && env.env.is_read_only() {
        return fail(Error::new(ErrorKind::Usage)
            .with_message("environment is read-only")
            .with_code(libc::EACCES));
    }
    match env.env.begin_raw(read_only) {
        Ok(raw) => {
            unsafe {
                *out_txn = raw.as_ptr();
            }
            sys::MDB_SUCCESS
        }
        Err(err) => fail(err),
    }
}

/// Commits and releases `txn`, whatever the outcome.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_txn_commit(txn: *mut sys::MDB_txn) -> c_int {
    if txn.is_null() {
        return fail(invalid("txn is null"));
    }
    unsafe { sys::mdb_txn_commit(txn) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_txn_abort(txn: *mut sys::MDB_txn) {
    if txn.is_null() {
        return;
    }
    unsafe { sys::mdb_txn_abort(txn) };
}

/// Opens the database `name` (null for the unnamed database).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_dbi_open(
    txn: *mut sys::MDB_txn,
    name: *const c_char,
    flags: c_uint,
    out_dbi: *mut sys::MDB_dbi,
) -> c_int {
    if txn.is_null() {
        return fail(invalid("txn is null"));
    }
    if out_dbi.is_null() {
        return fail(invalid("out_dbi is null"));
    }
    if DbFlags::from_bits(flags).is_none() {
        return fail(invalid(format!("unknown database flags {flags:#x}")));
    }
    let mut dbi: sys::MDB_dbi = 0;
    let rc = unsafe { sys::mdb_dbi_open(txn, name, flags, &mut dbi) };
    if rc == sys::MDB_SUCCESS {
        unsafe {
            *out_dbi = dbi;
        }
    }
    rc
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_cursor_open(
    txn: *mut sys::MDB_txn,
    dbi: sys::MDB_dbi,
    out_cursor: *mut *mut sys::MDB_cursor,
) -> c_int {
    if txn.is_null() {
        return fail(invalid("txn is null"));
    }
    if out_cursor.is_null() {
        return fail(invalid("out_cursor is null"));
    }
    let mut cursor = ptr::null_mut();
    let rc = unsafe { sys::mdb_cursor_open(txn, dbi, &mut cursor) };
    if rc == sys::MDB_SUCCESS {
        unsafe {
            *out_cursor = cursor;
        }
    }
    rc
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_cursor_close(cursor: *mut sys::MDB_cursor) {
    if cursor.is_null() {
        return;
    }
    unsafe { sys::mdb_cursor_close(cursor) };
}

/// Point lookup. On success `out_value` aliases engine memory valid until
/// the transaction ends or the next write through it.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_get(
    txn: *mut sys::MDB_txn,
    dbi: sys::MDB_dbi,
    key_data: *const u8,
    key_len: usize,
    out_value: *mut ByteSpan,
) -> c_int {
    if txn.is_null() {
        return fail(invalid("txn is null"));
    }
    if out_value.is_null() {
        return fail(invalid("out_value is null"));
    }
    match unsafe { proxy::get(txn, dbi, ByteSpan::new(key_data, key_len)) } {
        Ok(Some(value)) => {
            unsafe {
                *out_value = value;
            }
            sys::MDB_SUCCESS
        }
        Ok(None) => sys::MDB_NOTFOUND,
        Err(err) => fail(err),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_put(
    txn: *mut sys::MDB_txn,
    dbi: sys::MDB_dbi,
    key_data: *const u8,
    key_len: usize,
    value_data: *const u8,
    value_len: usize,
    flags: c_uint,
) -> c_int {
    if txn.is_null() {
        return fail(invalid("txn is null"));
    }
    let mode = match PutMode::from_raw(flags) {
        Ok(mode) => mode,
        Err(err) => return fail(err),
    };
    let key = ByteSpan::new(key_data, key_len);
    let value = ByteSpan::new(value_data, value_len);
    status(unsafe { proxy::put(txn, dbi, key, value, mode) })
}

/// Deletes `key`; with a non-empty value, only that pair of a duplicate key.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_del(
    txn: *mut sys::MDB_txn,
    dbi: sys::MDB_dbi,
    key_data: *const u8,
    key_len: usize,
    value_data: *const u8,
    value_len: usize,
) -> c_int {
    if txn.is_null() {
        return fail(invalid("txn is null"));
    }
    let key = ByteSpan::new(key_data, key_len);
    let value = ByteSpan::new(value_data, value_len);
    match unsafe { proxy::del(txn, dbi, key, Some(value)) } {
        Ok(true) => sys::MDB_SUCCESS,
        Ok(false) => sys::MDB_NOTFOUND,
        Err(err) => fail(err),
    }
}

/// Positions `cursor` with a key-only opcode. `out_key` is written only when
/// the engine replaced the staged key; `out_value` is always written on success.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_cursor_get_key(
    cursor: *mut sys::MDB_cursor,
    key_data: *const u8,
    key_len: usize,
    op: c_uint,
    out_key: *mut ByteSpan,
    out_value: *mut ByteSpan,
    out_replaced: *mut c_uint,
) -> c_int {
    if let Err(code) = check_cursor_outputs(cursor, out_key, out_value, out_replaced) {
        return code;
    }
    let op = match CursorOp::from_raw(op) {
        Ok(op) => op,
        Err(err) => return fail(err),
    };
    let key = ByteSpan::new(key_data, key_len);
    match unsafe { proxy::cursor_position_key(cursor, key, op) } {
        Ok(Some(position)) => {
            unsafe {
                *out_replaced = write_back(position.key, out_key, LMPX_REPLACED_KEY);
                *out_value = position.value;
            }
            sys::MDB_SUCCESS
        }
        Ok(None) => sys::MDB_NOTFOUND,
        Err(err) => fail(err),
    }
}

/// Positions `cursor` with any supported opcode, staging both slots. Each of
/// `out_key` and `out_value` is written only when the engine replaced it.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_cursor_get_key_value(
    cursor: *mut sys::MDB_cursor,
    key_data: *const u8,
    key_len: usize,
    value_data: *const u8,
    value_len: usize,
    op: c_uint,
    out_key: *mut ByteSpan,
    out_value: *mut ByteSpan,
    out_replaced: *mut c_uint,
) -> c_int {
    if let Err(code) = check_cursor_outputs(cursor, out_key, out_value, out_replaced) {
        return code;
    }
    let op = match CursorOp::from_raw(op) {
        Ok(op) => op,
        Err(err) => return fail(err),
    };
    let key = ByteSpan::new(key_data, key_len);
    let value = ByteSpan::new(value_data, value_len);
    match unsafe { proxy::cursor_position_key_value(cursor, key, value, op) } {
        Ok(Some(position)) => {
            unsafe {
                *out_replaced = write_back(position.key, out_key, LMPX_REPLACED_KEY)
                    | write_back(position.value, out_value, LMPX_REPLACED_VALUE);
            }
            sys::MDB_SUCCESS
        }
        Ok(None) => sys::MDB_NOTFOUND,
        Err(err) => fail(err),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_cursor_put(
    cursor: *mut sys::MDB_cursor,
    key_data: *const u8,
    key_len: usize,
    value_data: *const u8,
    value_len: usize,
    flags: c_uint,
) -> c_int {
    if cursor.is_null() {
        return fail(invalid("cursor is null"));
    }
    let mode = match CursorPutMode::from_raw(flags) {
        Ok(mode) => mode,
        Err(err) => return fail(err),
    };
    let key = ByteSpan::new(key_data, key_len);
    let value = ByteSpan::new(value_data, value_len);
    status(unsafe { proxy::cursor_put(cursor, key, value, mode) })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_cursor_del(cursor: *mut sys::MDB_cursor, flags: c_uint) -> c_int {
    if cursor.is_null() {
        return fail(invalid("cursor is null"));
    }
    match DelMode::from_raw(flags) {
        Ok(mode) => status(unsafe { proxy::cursor_del(cursor, mode) }),
        Err(err) => fail(err),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn lmpx_cursor_count(
    cursor: *mut sys::MDB_cursor,
    out_count: *mut usize,
) -> c_int {
    if cursor.is_null() {
        return fail(invalid("cursor is null"));
    }
    if out_count.is_null() {
        return fail(invalid("out_count is null"));
    }
    match unsafe { proxy::cursor_count(cursor) } {
        Ok(count) => {
            unsafe {
                *out_count = count;
            }
            sys::MDB_SUCCESS
        }
        Err(err) => fail(err),
    }
}

/// Static, NUL-terminated message for a status code. Never freed.
#[unsafe(no_mangle)]
pub extern "C" fn lmpx_strerror(code: c_int) -> *const c_char {
    unsafe { sys::mdb_strerror(code) }
}

fn borrow_env<'a>(env: *mut lmpx_env) -> Result<&'a lmpx_env, c_int> {
    if env.is_null() {
        return Err(fail(invalid("env is null")));
    }
    unsafe { Ok(&*env) }
}

fn check_cursor_outputs(
    cursor: *mut sys::MDB_cursor,
    out_key: *mut ByteSpan,
    out_value: *mut ByteSpan,
    out_replaced: *mut c_uint,
) -> Result<(), c_int> {
    if cursor.is_null() {
        return Err(fail(invalid("cursor is null")));
    }
    if out_key.is_null() || out_value.is_null() || out_replaced.is_null() {
        return Err(fail(invalid("cursor output slot is null")));
    }
    Ok(())
}

/// Stores a replaced descriptor into `slot` and returns `bit`; leaves the
/// caller's slot untouched otherwise.
unsafe fn write_back(outcome: Writeback, slot: *mut ByteSpan, bit: c_uint) -> c_uint {
    if !outcome.is_replaced() {
        return 0;
    }
    outcome.apply(unsafe { &mut *slot });
    bit
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidArgument).with_message(message)
}

fn status(result: Result<(), Error>) -> c_int {
    match result {
        Ok(()) => sys::MDB_SUCCESS,
        Err(err) => fail(err),
    }
}

fn fail(err: Error) -> c_int {
    let code = err.status();
    debug!(code, kind = ?err.kind(), message = err.message().unwrap_or(""), "abi call failed");
    if code == sys::MDB_SUCCESS { libc::EINVAL } else { code }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handles_and_slots_are_invalid() {
        let mut value = ByteSpan::empty();
        let rc = unsafe { lmpx_get(ptr::null_mut(), 0, b"k".as_ptr(), 1, &mut value) };
        assert_eq!(rc, libc::EINVAL);

        let rc = unsafe { lmpx_cursor_count(ptr::null_mut(), ptr::null_mut()) };
        assert_eq!(rc, libc::EINVAL);

        let rc = lmpx_txn_begin(ptr::null_mut(), 1, ptr::null_mut());
        assert_eq!(rc, libc::EINVAL);

        let mut env = ptr::null_mut();
        let rc = lmpx_env_open(ptr::null(), 0, 0, 0, &mut env);
        assert_eq!(rc, libc::EINVAL);
        assert!(env.is_null());
    }

    #[test]
    fn write_back_leaves_slot_alone_when_unchanged() {
        let original = ByteSpan::from_slice(b"staged");
        let mut slot = original;
        let bit = unsafe { write_back(Writeback::Unchanged, &mut slot, LMPX_REPLACED_KEY) };
        assert_eq!(bit, 0);
        assert_eq!(slot, original);

        let engine = ByteSpan::from_slice(b"engine");
        let bit = unsafe { write_back(Writeback::Replaced(engine), &mut slot, LMPX_REPLACED_VALUE) };
        assert_eq!(bit, LMPX_REPLACED_VALUE);
        assert_eq!(slot, engine);
    }

    #[test]
    fn strerror_is_static_text() {
        let message = unsafe { CStr::from_ptr(lmpx_strerror(sys::MDB_NOTFOUND)) };
        assert!(!message.to_bytes().is_empty());
    }
}
