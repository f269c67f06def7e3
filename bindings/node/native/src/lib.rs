/*
Purpose: Provide a Node N-API binding over the liblmdb_proxy C ABI.
Key Exports: Env, Txn, Cursor, CursorOp, PutMode, ErrorKind.
Role: Node/TypeScript binding that mirrors the proxy contract.
Invariants: Calls into the C ABI only; every engine span is copied into a Buffer before JS sees it.
Invariants: NotFound surfaces as null (or false); other statuses become errors carrying kind, kind_id and code.
Notes: Cursors close before their transaction ends; an environment outlives every transaction on it.
*/

use libc::{c_char, c_int, c_uint};
use napi::bindgen_prelude::{BigInt, Buffer, Either, Status};
use napi::{Error, Result};
use napi_derive::napi;
use std::cell::{Cell, RefCell};
use std::ffi::{CStr, CString};
use std::ptr;
use std::rc::Rc;

#[repr(C)]
struct lmpx_env_t {
    _private: [u8; 0],
}

#[repr(C)]
struct lmpx_txn_t {
    _private: [u8; 0],
}

#[repr(C)]
struct lmpx_cursor_t {
    _private: [u8; 0],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct lmpx_span_t {
    len: usize,
    data: *const u8,
}

impl lmpx_span_t {
    fn empty() -> Self {
        Self { len: 0, data: ptr::null() }
    }
}

const MDB_NOTFOUND: c_int = -30798;
const MDB_KEYEXIST: c_int = -30799;
const MDB_PAGE_NOTFOUND: c_int = -30797;
const MDB_CORRUPTED: c_int = -30796;
const MDB_PANIC: c_int = -30795;
const MDB_VERSION_MISMATCH: c_int = -30794;
const MDB_INVALID: c_int = -30793;
const MDB_LAST_ERRCODE: c_int = -30780;
const MDB_CREATE: c_uint = 0x40000;
const MDB_NODUPDATA: c_uint = 0x20;
const REPLACED_KEY: c_uint = 1;
const REPLACED_VALUE: c_uint = 2;

unsafe extern "C" {
    fn lmpx_env_open(
        path: *const c_char,
        map_size: u64,
        max_dbs: c_uint,
        flags: c_uint,
        out_env: *mut *mut lmpx_env_t,
    ) -> c_int;
    fn lmpx_env_free(env: *mut lmpx_env_t);

    fn lmpx_txn_begin(env: *mut lmpx_env_t, read_only: u8, out_txn: *mut *mut lmpx_txn_t) -> c_int;
    fn lmpx_txn_commit(txn: *mut lmpx_txn_t) -> c_int;
    fn lmpx_txn_abort(txn: *mut lmpx_txn_t);

    fn lmpx_dbi_open(
        txn: *mut lmpx_txn_t,
        name: *const c_char,
        flags: c_uint,
        out_dbi: *mut c_uint,
    ) -> c_int;

    fn lmpx_cursor_open(txn: *mut lmpx_txn_t, dbi: c_uint, out_cursor: *mut *mut lmpx_cursor_t) -> c_int;
    fn lmpx_cursor_close(cursor: *mut lmpx_cursor_t);

    fn lmpx_get(
        txn: *mut lmpx_txn_t,
        dbi: c_uint,
        key_data: *const u8,
        key_len: usize,
        out_value: *mut lmpx_span_t,
    ) -> c_int;
    fn lmpx_put(
        txn: *mut lmpx_txn_t,
        dbi: c_uint,
        key_data: *const u8,
        key_len: usize,
        value_data: *const u8,
        value_len: usize,
        flags: c_uint,
    ) -> c_int;
    fn lmpx_del(
        txn: *mut lmpx_txn_t,
        dbi: c_uint,
        key_data: *const u8,
        key_len: usize,
        value_data: *const u8,
        value_len: usize,
    ) -> c_int;

    fn lmpx_cursor_get_key(
        cursor: *mut lmpx_cursor_t,
        key_data: *const u8,
        key_len: usize,
        op: c_uint,
        out_key: *mut lmpx_span_t,
        out_value: *mut lmpx_span_t,
        out_replaced: *mut c_uint,
    ) -> c_int;
    fn lmpx_cursor_get_key_value(
        cursor: *mut lmpx_cursor_t,
        key_data: *const u8,
        key_len: usize,
        value_data: *const u8,
        value_len: usize,
        op: c_uint,
        out_key: *mut lmpx_span_t,
        out_value: *mut lmpx_span_t,
        out_replaced: *mut c_uint,
    ) -> c_int;
    fn lmpx_cursor_put(
        cursor: *mut lmpx_cursor_t,
        key_data: *const u8,
        key_len: usize,
        value_data: *const u8,
        value_len: usize,
        flags: c_uint,
    ) -> c_int;
    fn lmpx_cursor_del(cursor: *mut lmpx_cursor_t, flags: c_uint) -> c_int;
    fn lmpx_cursor_count(cursor: *mut lmpx_cursor_t, out_count: *mut usize) -> c_int;

    fn lmpx_strerror(code: c_int) -> *const c_char;
}

#[napi]
#[derive(Debug, PartialEq, Eq)]
pub enum CursorOp {
    First = 0,
    FirstDup = 1,
    GetBoth = 2,
    GetBothRange = 3,
    GetCurrent = 4,
    Last = 6,
    LastDup = 7,
    Next = 8,
    NextDup = 9,
    NextNoDup = 11,
    Prev = 12,
    PrevDup = 13,
    PrevNoDup = 14,
    Set = 15,
    SetKey = 16,
    SetRange = 17,
}

impl CursorOp {
    fn needs_value(&self) -> bool {
        matches!(self, CursorOp::GetBoth | CursorOp::GetBothRange)
    }

    /// FirstDup and LastDup move within the current key and never report it.
    fn leaves_key(&self) -> bool {
        matches!(self, CursorOp::FirstDup | CursorOp::LastDup)
    }
}

#[napi]
#[derive(Debug, PartialEq, Eq)]
pub enum PutMode {
    Upsert = 0,
    NoOverwrite = 0x10,
    NoDupData = 0x20,
    Current = 0x40,
    Append = 0x20000,
    AppendDup = 0x40000,
}

/// Matches `kind_id` in thrown error messages.
#[napi]
#[derive(Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Internal = 1,
    Usage = 2,
    NotFound = 3,
    KeyExists = 4,
    InvalidArgument = 5,
    Engine = 6,
    Corrupt = 7,
    Io = 8,
}

#[napi(object)]
pub struct Entry {
    pub key: Buffer,
    pub value: Buffer,
}

struct EnvHandle {
    ptr: *mut lmpx_env_t,
}

impl Drop for EnvHandle {
    fn drop(&mut self) {
        unsafe { lmpx_env_free(self.ptr) };
    }
}

/// Open transaction plus the cursors that must close before it ends.
struct TxnState {
    ptr: *mut lmpx_txn_t,
    cursors: Vec<Rc<Cell<*mut lmpx_cursor_t>>>,
    _env: Rc<EnvHandle>,
}

impl TxnState {
    fn live(&self) -> Result<*mut lmpx_txn_t> {
        if self.ptr.is_null() {
            return Err(Error::new(Status::GenericFailure, "transaction already finished"));
        }
        Ok(self.ptr)
    }

    fn finish(&mut self) -> *mut lmpx_txn_t {
        for cursor in self.cursors.drain(..) {
            let raw = cursor.replace(ptr::null_mut());
            if !raw.is_null() {
                unsafe { lmpx_cursor_close(raw) };
            }
        }
        std::mem::replace(&mut self.ptr, ptr::null_mut())
    }
}

impl Drop for TxnState {
    fn drop(&mut self) {
        let raw = self.finish();
        if !raw.is_null() {
            unsafe { lmpx_txn_abort(raw) };
        }
    }
}

#[napi]
pub struct Env {
    handle: Option<Rc<EnvHandle>>,
}

#[napi]
impl Env {
    #[napi(constructor)]
    pub fn new(
        path: String,
        map_size: Option<Either<u32, BigInt>>,
        max_dbs: Option<u32>,
        flags: Option<u32>,
    ) -> Result<Self> {
        let path = CString::new(path).map_err(|_| Error::new(Status::InvalidArg, "path contains NUL"))?;
        let map_size = match map_size {
            Some(value) => to_u64(value, "map_size")?,
            None => 0,
        };
        let mut out = ptr::null_mut();
        let rc = unsafe {
            lmpx_env_open(
                path.as_ptr(),
                map_size,
                max_dbs.unwrap_or(0),
                flags.unwrap_or(0),
                &mut out,
            )
        };
        check(rc)?;
        Ok(Self {
            handle: Some(Rc::new(EnvHandle { ptr: out })),
        })
    }

    /// Starts a transaction; read-only unless `read_only` is false.
    #[napi]
    pub fn begin(&self, read_only: Option<bool>) -> Result<Txn> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| Error::new(Status::GenericFailure, "environment is closed"))?;
        let mut out = ptr::null_mut();
        let rc = unsafe { lmpx_txn_begin(handle.ptr, u8::from(read_only.unwrap_or(true)), &mut out) };
        check(rc)?;
        Ok(Txn {
            state: Rc::new(RefCell::new(TxnState {
                ptr: out,
                cursors: Vec::new(),
                _env: Rc::clone(handle),
            })),
        })
    }

    /// The native environment is released once its last transaction ends.
    #[napi]
    pub fn close(&mut self) {
        self.handle = None;
    }
}

#[napi]
pub struct Txn {
    state: Rc<RefCell<TxnState>>,
}

#[napi]
impl Txn {
    /// Opens the database `name` (unnamed when omitted) and returns its handle.
    #[napi]
    pub fn open_db(&self, name: Option<String>, flags: Option<u32>, create: Option<bool>) -> Result<u32> {
        let txn = self.state.borrow().live()?;
        let name = name
            .map(|name| CString::new(name).map_err(|_| Error::new(Status::InvalidArg, "name contains NUL")))
            .transpose()?;
        let mut flags = flags.unwrap_or(0);
        if create.unwrap_or(false) {
            flags |= MDB_CREATE;
        }
        let mut dbi = 0;
        let name_ptr = name.as_ref().map_or(ptr::null(), |name| name.as_ptr());
        check(unsafe { lmpx_dbi_open(txn, name_ptr, flags, &mut dbi) })?;
        Ok(dbi)
    }

    #[napi]
    pub fn get(&self, dbi: u32, key: Buffer) -> Result<Option<Buffer>> {
        let txn = self.state.borrow().live()?;
        let mut value = lmpx_span_t::empty();
        let rc = unsafe { lmpx_get(txn, dbi, key.as_ptr(), key.len(), &mut value) };
        if rc == MDB_NOTFOUND {
            return Ok(None);
        }
        check(rc)?;
        Ok(Some(copy_span(value)))
    }

    #[napi]
    pub fn put(&self, dbi: u32, key: Buffer, value: Buffer, mode: Option<PutMode>) -> Result<()> {
        let txn = self.state.borrow().live()?;
        let flags = mode.map_or(0, |mode| mode as c_uint);
        check(unsafe { lmpx_put(txn, dbi, key.as_ptr(), key.len(), value.as_ptr(), value.len(), flags) })
    }

    /// Returns false when nothing matched.
    #[napi]
    pub fn del(&self, dbi: u32, key: Buffer, value: Option<Buffer>) -> Result<bool> {
        let txn = self.state.borrow().live()?;
        let (value_ptr, value_len) = value
            .as_ref()
            .map_or((ptr::null(), 0), |value| (value.as_ptr(), value.len()));
        let rc = unsafe { lmpx_del(txn, dbi, key.as_ptr(), key.len(), value_ptr, value_len) };
        if rc == MDB_NOTFOUND {
            return Ok(false);
        }
        check(rc)?;
        Ok(true)
    }

    #[napi]
    pub fn open_cursor(&self, dbi: u32) -> Result<Cursor> {
        let mut state = self.state.borrow_mut();
        let txn = state.live()?;
        let mut out = ptr::null_mut();
        check(unsafe { lmpx_cursor_open(txn, dbi, &mut out) })?;
        let raw = Rc::new(Cell::new(out));
        state.cursors.push(Rc::clone(&raw));
        Ok(Cursor {
            raw,
            _txn: Rc::clone(&self.state),
        })
    }

    /// Open cursors are closed first; the transaction is released either way.
    #[napi]
    pub fn commit(&self) -> Result<()> {
        let raw = self.state.borrow_mut().finish();
        if raw.is_null() {
            return Err(Error::new(Status::GenericFailure, "transaction already finished"));
        }
        check(unsafe { lmpx_txn_commit(raw) })
    }

    #[napi]
    pub fn abort(&self) {
        let raw = self.state.borrow_mut().finish();
        if !raw.is_null() {
            unsafe { lmpx_txn_abort(raw) };
        }
    }
}

#[napi]
pub struct Cursor {
    raw: Rc<Cell<*mut lmpx_cursor_t>>,
    _txn: Rc<RefCell<TxnState>>,
}

#[napi]
impl Cursor {
    /// Positions the cursor. `key` (and `value` for GetBoth/GetBothRange) are
    /// the staged inputs; null when nothing matches.
    #[napi]
    pub fn get(&self, op: CursorOp, key: Option<Buffer>, value: Option<Buffer>) -> Result<Option<Entry>> {
        let cursor = self.live()?;
        let staged_key: &[u8] = key.as_deref().unwrap_or(&[]);
        let staged_value: &[u8] = value.as_deref().unwrap_or(&[]);
        let mut out_key = lmpx_span_t::empty();
        let mut out_value = lmpx_span_t::empty();
        let mut replaced = 0;
        let needs_value = op.needs_value();
        let leaves_key = op.leaves_key();
        let raw_op = op as c_uint;
        let rc = unsafe {
            if needs_value {
                lmpx_cursor_get_key_value(
                    cursor,
                    staged_key.as_ptr(),
                    staged_key.len(),
                    staged_value.as_ptr(),
                    staged_value.len(),
                    raw_op,
                    &mut out_key,
                    &mut out_value,
                    &mut replaced,
                )
            } else {
                lmpx_cursor_get_key(
                    cursor,
                    staged_key.as_ptr(),
                    staged_key.len(),
                    raw_op,
                    &mut out_key,
                    &mut out_value,
                    &mut replaced,
                )
            }
        };
        if rc == MDB_NOTFOUND {
            return Ok(None);
        }
        check(rc)?;
        let key = if replaced & REPLACED_KEY != 0 {
            copy_span(out_key)
        } else if leaves_key {
            copy_span(current_key(cursor)?)
        } else {
            Buffer::from(staged_key.to_vec())
        };
        let value = if needs_value && replaced & REPLACED_VALUE == 0 {
            Buffer::from(staged_value.to_vec())
        } else {
            copy_span(out_value)
        };
        Ok(Some(Entry { key, value }))
    }

    #[napi]
    pub fn put(&self, key: Buffer, value: Buffer, mode: Option<PutMode>) -> Result<()> {
        let cursor = self.live()?;
        let flags = mode.map_or(0, |mode| mode as c_uint);
        check(unsafe { lmpx_cursor_put(cursor, key.as_ptr(), key.len(), value.as_ptr(), value.len(), flags) })
    }

    /// Deletes the current pair, or every value of the current key with `all_dups`.
    #[napi]
    pub fn del(&self, all_dups: Option<bool>) -> Result<()> {
        let cursor = self.live()?;
        let flags = if all_dups.unwrap_or(false) { MDB_NODUPDATA } else { 0 };
        check(unsafe { lmpx_cursor_del(cursor, flags) })
    }

    #[napi]
    pub fn count(&self) -> Result<BigInt> {
        let cursor = self.live()?;
        let mut count = 0usize;
        check(unsafe { lmpx_cursor_count(cursor, &mut count) })?;
        Ok(BigInt::from(count as u64))
    }

    #[napi]
    pub fn close(&self) {
        let raw = self.raw.replace(ptr::null_mut());
        if !raw.is_null() {
            unsafe { lmpx_cursor_close(raw) };
        }
    }

    fn live(&self) -> Result<*mut lmpx_cursor_t> {
        let raw = self.raw.get();
        if raw.is_null() {
            return Err(Error::new(Status::GenericFailure, "cursor is closed"));
        }
        Ok(raw)
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.close();
    }
}

fn current_key(cursor: *mut lmpx_cursor_t) -> Result<lmpx_span_t> {
    let mut out_key = lmpx_span_t::empty();
    let mut out_value = lmpx_span_t::empty();
    let mut replaced = 0;
    check(unsafe {
        lmpx_cursor_get_key(
            cursor,
            ptr::null(),
            0,
            CursorOp::GetCurrent as c_uint,
            &mut out_key,
            &mut out_value,
            &mut replaced,
        )
    })?;
    Ok(out_key)
}

fn copy_span(span: lmpx_span_t) -> Buffer {
    let data = if span.data.is_null() || span.len == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(span.data, span.len) }.to_vec()
    };
    Buffer::from(data)
}

fn check(rc: c_int) -> Result<()> {
    if rc == 0 {
        return Ok(());
    }
    let kind = error_kind(rc);
    let message = unsafe { cstring_to_string(lmpx_strerror(rc)) };
    let status = if kind == ErrorKind::InvalidArgument {
        Status::InvalidArg
    } else {
        Status::GenericFailure
    };
    let label = format!("{kind:?}");
    let kind_id = kind as i32;
    Err(Error::new(
        status,
        format!("lmdb-proxy error: kind={label}; kind_id={kind_id}; code={rc}; message={message}"),
    ))
}

fn error_kind(rc: c_int) -> ErrorKind {
    match rc {
        MDB_NOTFOUND => ErrorKind::NotFound,
        MDB_KEYEXIST => ErrorKind::KeyExists,
        MDB_PAGE_NOTFOUND | MDB_CORRUPTED | MDB_PANIC | MDB_VERSION_MISMATCH | MDB_INVALID => {
            ErrorKind::Corrupt
        }
        libc::EINVAL => ErrorKind::InvalidArgument,
        rc if (MDB_KEYEXIST..=MDB_LAST_ERRCODE).contains(&rc) => ErrorKind::Engine,
        rc if rc > 0 => ErrorKind::Io,
        _ => ErrorKind::Engine,
    }
}

unsafe fn cstring_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().to_string()
}

fn to_u64(value: Either<u32, BigInt>, name: &str) -> Result<u64> {
    match value {
        Either::A(number) => Ok(number as u64),
        Either::B(bigint) => {
            let (is_negative, value, lossless) = bigint.get_u64();
            if !is_negative && lossless {
                Ok(value)
            } else {
                Err(Error::new(
                    Status::InvalidArg,
                    format!("{name} must be non-negative"),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_classifies_native_codes() {
        assert_eq!(error_kind(MDB_NOTFOUND), ErrorKind::NotFound);
        assert_eq!(error_kind(MDB_KEYEXIST), ErrorKind::KeyExists);
        assert_eq!(error_kind(MDB_CORRUPTED), ErrorKind::Corrupt);
        assert_eq!(error_kind(libc::EINVAL), ErrorKind::InvalidArgument);
        assert_eq!(error_kind(libc::ENOENT), ErrorKind::Io);
        assert_eq!(error_kind(-30792), ErrorKind::Engine);
        assert_eq!(ErrorKind::KeyExists as i32, 4);
    }

    #[test]
    fn only_dup_edge_moves_leave_the_key_unreported() {
        assert!(CursorOp::FirstDup.leaves_key());
        assert!(CursorOp::LastDup.leaves_key());
        assert!(!CursorOp::NextDup.leaves_key());
        assert!(!CursorOp::Set.leaves_key());
    }
}
