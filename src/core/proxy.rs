//! Purpose: Stateless proxies over LMDB get/put/del and cursor get/put/del/count.
//! Exports: `get`, `put`, `del`, `cursor_position_key`, `cursor_position_key_value`,
//! `cursor_put`, `cursor_del`, `cursor_count`, `KeyPosition`, `PairPosition`.
//! Role: Engine-facing adapter used by the safe handles and by the C ABI.
//! Invariants: Keys and values arrive as separate spans; no descriptor containing a
//! caller pointer is handed back until the pointer comparison proves it differs.
//! Invariants: `MDB_NOTFOUND` is `Ok(None)` / `Ok(false)`; every other status is returned
//! verbatim through `Error::code`.
//! Invariants: No proxy allocates, retries, locks, or keeps state between calls.
use std::ptr;

use tracing::trace;

use crate::core::error::{Error, ErrorKind};
use crate::core::lmdb::{self, sys};
use crate::core::ops::{CursorOp, CursorPutMode, DelMode, PutMode};
use crate::core::span::{ByteSpan, Writeback};

/// Result of a key-only positioning call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyPosition {
    pub key: Writeback,
    pub value: ByteSpan,
}

/// Result of a key+value positioning call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PairPosition {
    pub key: Writeback,
    pub value: Writeback,
}

/// Point lookup. The returned span aliases the engine's mapped pages.
///
/// # Safety
///
/// `txn` must be a live transaction handle, `dbi` a database opened in its
/// environment, and `key` must describe readable memory for the call.
pub unsafe fn get(
    txn: *mut sys::MDB_txn,
    dbi: sys::MDB_dbi,
    key: ByteSpan,
) -> Result<Option<ByteSpan>, Error> {
    let mut key_val = key.validate("key")?.to_val();
    let mut data = ByteSpan::empty().to_val();
    let rc = unsafe { sys::mdb_get(txn, dbi, &mut key_val, &mut data) };
    lmdb::check_found(rc, || ByteSpan::from_val(&data))
}

/// Insert or update.
///
/// # Safety
///
/// `txn` must be a live read-write transaction; `key` and `value` must
/// describe readable memory for the call.
pub unsafe fn put(
    txn: *mut sys::MDB_txn,
    dbi: sys::MDB_dbi,
    key: ByteSpan,
    value: ByteSpan,
    mode: PutMode,
) -> Result<(), Error> {
    let mut key_val = key.validate("key")?.to_val();
    let mut data = value.validate("value")?.to_val();
    lmdb::check(unsafe { sys::mdb_put(txn, dbi, &mut key_val, &mut data, mode.raw()) })
}

/// Removes a key, or one value of a duplicate key. Returns `false` when
/// nothing matched. `None` or an empty value deletes every value of the key.
///
/// # Safety
///
/// Same requirements as [`put`].
pub unsafe fn del(
    txn: *mut sys::MDB_txn,
    dbi: sys::MDB_dbi,
    key: ByteSpan,
    value: Option<ByteSpan>,
) -> Result<bool, Error> {
    let mut key_val = key.validate("key")?.to_val();
    let mut data = match value {
        Some(value) if !value.is_empty() => Some(value.validate("value")?.to_val()),
        _ => None,
    };
    let data_ptr = data
        .as_mut()
        .map_or(ptr::null_mut(), |data| data as *mut sys::MDB_val);
    let rc = unsafe { sys::mdb_del(txn, dbi, &mut key_val, data_ptr) };
    Ok(lmdb::check_found(rc, || ())?.is_some())
}

/// Positions `cursor` with `op`, using `key` as the scratch key slot.
///
/// The key outcome is `Unchanged` when the engine left the staged pointer in
/// place, `Replaced` with the engine's descriptor otherwise. Opcodes that
/// read a value input are rejected.
///
/// # Safety
///
/// `cursor` must be a live cursor whose transaction is still open; `key`
/// must describe readable memory for the call.
pub unsafe fn cursor_position_key(
    cursor: *mut sys::MDB_cursor,
    key: ByteSpan,
    op: CursorOp,
) -> Result<Option<KeyPosition>, Error> {
    if op.needs_value() {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("{op:?} needs a value; use the key+value proxy")));
    }
    let staged = key.validate("key")?;
    let mut key_val = staged.to_val();
    let mut data = ByteSpan::empty().to_val();
    let rc = unsafe { sys::mdb_cursor_get(cursor, &mut key_val, &mut data, op.raw()) };
    lmdb::check_found(rc, || {
        let key = Writeback::detect(staged, ByteSpan::from_val(&key_val));
        trace!(?op, key_replaced = key.is_replaced(), "cursor positioned");
        KeyPosition {
            key,
            value: ByteSpan::from_val(&data),
        }
    })
}

/// Positions `cursor` with `op`, staging both `key` and `value`; each output
/// slot is compared against its own staged pointer.
///
/// # Safety
///
/// Same requirements as [`cursor_position_key`], for both spans.
pub unsafe fn cursor_position_key_value(
    cursor: *mut sys::MDB_cursor,
    key: ByteSpan,
    value: ByteSpan,
    op: CursorOp,
) -> Result<Option<PairPosition>, Error> {
    let staged_key = key.validate("key")?;
    let staged_value = value.validate("value")?;
    let mut key_val = staged_key.to_val();
    let mut data = staged_value.to_val();
    let rc = unsafe { sys::mdb_cursor_get(cursor, &mut key_val, &mut data, op.raw()) };
    lmdb::check_found(rc, || {
        let position = PairPosition {
            key: Writeback::detect(staged_key, ByteSpan::from_val(&key_val)),
            value: Writeback::detect(staged_value, ByteSpan::from_val(&data)),
        };
        trace!(
            ?op,
            key_replaced = position.key.is_replaced(),
            value_replaced = position.value.is_replaced(),
            "cursor positioned"
        );
        position
    })
}

/// Writes at (and moves the cursor to) `key`.
///
/// # Safety
///
/// `cursor` must belong to a live read-write transaction; `key` and
/// `value` must describe readable memory for the call.
pub unsafe fn cursor_put(
    cursor: *mut sys::MDB_cursor,
    key: ByteSpan,
    value: ByteSpan,
    mode: CursorPutMode,
) -> Result<(), Error> {
    let mut key_val = key.validate("key")?.to_val();
    let mut data = value.validate("value")?.to_val();
    lmdb::check(unsafe { sys::mdb_cursor_put(cursor, &mut key_val, &mut data, mode.raw()) })
}

/// Deletes the pair (or, with `AllDups`, every value of the key) at the cursor.
///
/// # Safety
///
/// `cursor` must belong to a live read-write transaction.
pub unsafe fn cursor_del(cursor: *mut sys::MDB_cursor, mode: DelMode) -> Result<(), Error> {
    lmdb::check(unsafe { sys::mdb_cursor_del(cursor, mode.raw()) })
}

/// Number of values stored under the cursor's current key.
///
/// # Safety
///
/// `cursor` must be a live, positioned cursor on a duplicate-key database.
pub unsafe fn cursor_count(cursor: *mut sys::MDB_cursor) -> Result<usize, Error> {
    let mut count = 0usize;
    lmdb::check(unsafe { sys::mdb_cursor_count(cursor, &mut count) })?;
    Ok(count)
}
