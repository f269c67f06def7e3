// Cursor handles: positioning through the writeback-aware proxies, plus writes.
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};

use crate::core::error::{Error, ErrorKind};
use crate::core::lmdb::{self, sys};
use crate::core::ops::{CursorOp, CursorPutMode, DelMode};
use crate::core::proxy;
use crate::core::span::{ByteSpan, Writeback};

pub type Entry<'a> = (&'a [u8], &'a [u8]);

/// Read cursor. Slices it returns borrow the cursor, so they cannot be held
/// across a reposition or a write.
#[derive(Debug)]
pub struct Cursor<'txn> {
    raw: NonNull<sys::MDB_cursor>,
    _txn: PhantomData<&'txn sys::MDB_txn>,
}

impl<'txn> Cursor<'txn> {
    pub(crate) fn open(txn: *mut sys::MDB_txn, dbi: sys::MDB_dbi) -> Result<Self, Error> {
        let mut raw = ptr::null_mut();
        lmdb::check(unsafe { sys::mdb_cursor_open(txn, dbi, &mut raw) })?;
        let raw = NonNull::new(raw).ok_or_else(|| {
            Error::new(ErrorKind::Internal).with_message("mdb_cursor_open returned null")
        })?;
        Ok(Self {
            raw,
            _txn: PhantomData,
        })
    }

    pub fn as_raw(&self) -> *mut sys::MDB_cursor {
        self.raw.as_ptr()
    }

    /// Moves with an opcode that takes no input. `FirstDup` and `LastDup`
    /// leave the engine's key slot alone, so the key is read back from the
    /// new position.
    pub fn get(&mut self, op: CursorOp) -> Result<Option<Entry<'_>>, Error> {
        if op.needs_key() {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("{op:?} needs a key; use seek")));
        }
        let raw = self.as_raw();
        let Some(position) =
            (unsafe { proxy::cursor_position_key(raw, ByteSpan::empty(), op) })?
        else {
            return Ok(None);
        };
        let key = match position.key {
            Writeback::Replaced(key) => key,
            Writeback::Unchanged => current_key(raw)?,
        };
        Ok(Some(unsafe { (key.as_slice(), position.value.as_slice()) }))
    }

    /// Moves with a key opcode (`Set`, `SetKey`, `SetRange`). When the engine
    /// leaves the key slot alone, the returned key is `key` itself.
    pub fn seek<'a>(&'a mut self, key: &'a [u8], op: CursorOp) -> Result<Option<Entry<'a>>, Error> {
        if !op.needs_key() || op.needs_value() {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("{op:?} is not a key-only seek")));
        }
        let staged = ByteSpan::from_slice(key);
        let position = unsafe { proxy::cursor_position_key(self.as_raw(), staged, op) }?;
        Ok(position.map(|position| unsafe {
            (
                position.key.resolve(staged).as_slice(),
                position.value.as_slice(),
            )
        }))
    }

    /// Moves with a key+value opcode (`GetBoth`, `GetBothRange`).
    pub fn seek_pair<'a>(
        &'a mut self,
        key: &'a [u8],
        value: &'a [u8],
        op: CursorOp,
    ) -> Result<Option<Entry<'a>>, Error> {
        if !op.needs_value() {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("{op:?} is not a key+value seek")));
        }
        let staged_key = ByteSpan::from_slice(key);
        let staged_value = ByteSpan::from_slice(value);
        let position = unsafe {
            proxy::cursor_position_key_value(self.as_raw(), staged_key, staged_value, op)
        }?;
        Ok(position.map(|position| unsafe {
            (
                position.key.resolve(staged_key).as_slice(),
                position.value.resolve(staged_value).as_slice(),
            )
        }))
    }

    pub fn first(&mut self) -> Result<Option<Entry<'_>>, Error> {
        self.get(CursorOp::First)
    }

    pub fn last(&mut self) -> Result<Option<Entry<'_>>, Error> {
        self.get(CursorOp::Last)
    }

    /// For duplicate-key databases this visits every value of every key.
    pub fn next(&mut self) -> Result<Option<Entry<'_>>, Error> {
        self.get(CursorOp::Next)
    }

    pub fn prev(&mut self) -> Result<Option<Entry<'_>>, Error> {
        self.get(CursorOp::Prev)
    }

    pub fn current(&mut self) -> Result<Option<Entry<'_>>, Error> {
        self.get(CursorOp::GetCurrent)
    }

    pub fn first_dup(&mut self) -> Result<Option<&[u8]>, Error> {
        Ok(self.get(CursorOp::FirstDup)?.map(|(_, value)| value))
    }

    pub fn last_dup(&mut self) -> Result<Option<&[u8]>, Error> {
        Ok(self.get(CursorOp::LastDup)?.map(|(_, value)| value))
    }

    pub fn next_dup(&mut self) -> Result<Option<Entry<'_>>, Error> {
        self.get(CursorOp::NextDup)
    }

    pub fn next_nodup(&mut self) -> Result<Option<Entry<'_>>, Error> {
        self.get(CursorOp::NextNoDup)
    }

    pub fn prev_dup(&mut self) -> Result<Option<Entry<'_>>, Error> {
        self.get(CursorOp::PrevDup)
    }

    pub fn prev_nodup(&mut self) -> Result<Option<Entry<'_>>, Error> {
        self.get(CursorOp::PrevNoDup)
    }

    /// Exact key; returns its (first) value.
    pub fn seek_exact<'a>(&'a mut self, key: &'a [u8]) -> Result<Option<&'a [u8]>, Error> {
        Ok(self.seek(key, CursorOp::Set)?.map(|(_, value)| value))
    }

    /// First key greater than or equal to `key`.
    pub fn seek_range<'a>(&'a mut self, key: &'a [u8]) -> Result<Option<Entry<'a>>, Error> {
        self.seek(key, CursorOp::SetRange)
    }

    pub fn seek_exact_pair(&mut self, key: &[u8], value: &[u8]) -> Result<bool, Error> {
        Ok(self.seek_pair(key, value, CursorOp::GetBoth)?.is_some())
    }

    /// First value of `key` greater than or equal to `value`; never moves to another key.
    pub fn seek_pair_range<'a>(
        &'a mut self,
        key: &'a [u8],
        value: &'a [u8],
    ) -> Result<Option<&'a [u8]>, Error> {
        Ok(self
            .seek_pair(key, value, CursorOp::GetBothRange)?
            .map(|(_, value)| value))
    }

    pub fn count(&self) -> Result<usize, Error> {
        unsafe { proxy::cursor_count(self.as_raw()) }
    }
}

fn current_key(raw: *mut sys::MDB_cursor) -> Result<ByteSpan, Error> {
    let position =
        unsafe { proxy::cursor_position_key(raw, ByteSpan::empty(), CursorOp::GetCurrent) }?;
    match position.map(|position| position.key) {
        Some(Writeback::Replaced(key)) => Ok(key),
        _ => Err(Error::new(ErrorKind::Internal).with_message("cursor has no current key")),
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        unsafe { sys::mdb_cursor_close(self.raw.as_ptr()) };
    }
}

/// Cursor over a write transaction.
#[derive(Debug)]
pub struct RwCursor<'txn> {
    inner: Cursor<'txn>,
}

impl RwCursor<'_> {
    pub(crate) fn open(txn: *mut sys::MDB_txn, dbi: sys::MDB_dbi) -> Result<Self, Error> {
        Ok(Self {
            inner: Cursor::open(txn, dbi)?,
        })
    }

    pub fn put(&mut self, key: &[u8], value: &[u8], mode: CursorPutMode) -> Result<(), Error> {
        unsafe {
            proxy::cursor_put(
                self.as_raw(),
                ByteSpan::from_slice(key),
                ByteSpan::from_slice(value),
                mode,
            )
        }
    }

    pub fn del(&mut self, mode: DelMode) -> Result<(), Error> {
        unsafe { proxy::cursor_del(self.as_raw(), mode) }
    }
}

impl<'txn> Deref for RwCursor<'txn> {
    type Target = Cursor<'txn>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for RwCursor<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use crate::core::env::{EnvOptions, Environment};
    use crate::core::error::ErrorKind;
    use crate::core::ops::{CursorOp, CursorPutMode, DbFlags, DelMode, PutMode};
    use crate::core::txn::{Database, Transaction};

    fn env_with(flags: DbFlags, pairs: &[(&str, &str)]) -> (tempfile::TempDir, Environment, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = Environment::open(dir.path(), &EnvOptions::new()).expect("open");
        let db = env
            .update(|txn| {
                let db = txn.create_db(Some("test"), flags)?;
                for (key, value) in pairs {
                    txn.put(db, key.as_bytes(), value.as_bytes(), PutMode::Upsert)?;
                }
                Ok(db)
            })
            .expect("fill");
        (dir, env, db)
    }

    #[test]
    fn get_rejects_key_opcodes_and_seek_rejects_positional_ones() {
        let (_dir, env, db) = env_with(DbFlags::empty(), &[("a", "1")]);
        let txn = env.begin_ro_txn().expect("txn");
        let mut cursor = txn.open_cursor(db).expect("cursor");
        let err = cursor.get(CursorOp::SetRange).expect_err("needs key");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = cursor.seek(b"a", CursorOp::Next).expect_err("no key");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = cursor.seek(b"a", CursorOp::GetBoth).expect_err("needs value");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = cursor.seek_pair(b"a", b"1", CursorOp::Set).expect_err("no value");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn last_and_prev_walk_backwards() {
        let (_dir, env, db) = env_with(DbFlags::empty(), &[("a", "1"), ("b", "2"), ("c", "3")]);
        let txn = env.begin_ro_txn().expect("txn");
        let mut cursor = txn.open_cursor(db).expect("cursor");
        let mut seen = Vec::new();
        let mut entry = cursor.last().expect("last").map(|(k, _)| k.to_vec());
        while let Some(key) = entry {
            seen.push(key);
            entry = cursor.prev().expect("prev").map(|(k, _)| k.to_vec());
        }
        assert_eq!(seen, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn seek_exact_and_range() {
        let (_dir, env, db) = env_with(DbFlags::empty(), &[("apple", "1"), ("cherry", "3")]);
        let txn = env.begin_ro_txn().expect("txn");
        let mut cursor = txn.open_cursor(db).expect("cursor");
        assert_eq!(cursor.seek_exact(b"apple").expect("seek"), Some(&b"1"[..]));
        assert_eq!(cursor.seek_exact(b"banana").expect("seek"), None);
        let (key, value) = cursor.seek_range(b"banana").expect("range").expect("entry");
        assert_eq!((key, value), (&b"cherry"[..], &b"3"[..]));
        assert_eq!(cursor.seek_range(b"zebra").expect("range"), None);
    }

    #[test]
    fn duplicate_navigation_and_count() {
        let (_dir, env, db) = env_with(
            DbFlags::DUP_SORT,
            &[("k", "v1"), ("k", "v2"), ("k", "v3"), ("m", "w1")],
        );
        let txn = env.begin_ro_txn().expect("txn");
        let mut cursor = txn.open_cursor(db).expect("cursor");
        assert!(cursor.seek_exact(b"k").expect("seek").is_some());
        assert_eq!(cursor.count().expect("count"), 3);
        assert_eq!(cursor.last_dup().expect("last dup"), Some(&b"v3"[..]));
        assert_eq!(cursor.first_dup().expect("first dup"), Some(&b"v1"[..]));
        assert_eq!(
            cursor.next_dup().expect("next dup").map(|(_, v)| v.to_vec()),
            Some(b"v2".to_vec())
        );
        assert_eq!(
            cursor.next_nodup().expect("next key").map(|(k, _)| k.to_vec()),
            Some(b"m".to_vec())
        );
        assert_eq!(cursor.next_dup().expect("next dup"), None);
        assert_eq!(
            cursor.prev_nodup().expect("prev key").map(|(k, v)| (k.to_vec(), v.to_vec())),
            Some((b"k".to_vec(), b"v3".to_vec()))
        );
        assert_eq!(
            cursor.prev_dup().expect("prev dup").map(|(_, v)| v.to_vec()),
            Some(b"v2".to_vec())
        );

        assert!(cursor.seek_exact_pair(b"k", b"v2").expect("pair"));
        assert!(!cursor.seek_exact_pair(b"k", b"v9").expect("pair"));
        assert_eq!(cursor.seek_pair_range(b"k", b"v20").expect("range"), Some(&b"v3"[..]));
        assert_eq!(cursor.seek_pair_range(b"k", b"w").expect("range"), None);
    }

    #[test]
    fn dup_edge_moves_report_the_current_key() {
        let (_dir, env, db) = env_with(DbFlags::DUP_SORT, &[("k", "v1"), ("k", "v2"), ("m", "w1")]);
        let txn = env.begin_ro_txn().expect("txn");
        let mut cursor = txn.open_cursor(db).expect("cursor");
        assert!(cursor.first().expect("first").is_some());
        assert_eq!(
            cursor.get(CursorOp::LastDup).expect("last dup"),
            Some((&b"k"[..], &b"v2"[..]))
        );
        assert_eq!(
            cursor.get(CursorOp::FirstDup).expect("first dup"),
            Some((&b"k"[..], &b"v1"[..]))
        );
        assert!(cursor.seek_exact(b"m").expect("seek").is_some());
        assert_eq!(
            cursor.get(CursorOp::LastDup).expect("last dup"),
            Some((&b"m"[..], &b"w1"[..]))
        );
    }

    #[test]
    fn rw_cursor_put_current_and_delete() {
        let (_dir, env, db) = env_with(DbFlags::empty(), &[("a", "1"), ("b", "2")]);
        env.update(|txn| {
            let mut cursor = txn.open_rw_cursor(db)?;
            cursor.put(b"c", b"3", CursorPutMode::Upsert)?;
            assert_eq!(cursor.current()?.map(|(k, _)| k.to_vec()), Some(b"c".to_vec()));

            assert!(cursor.seek_exact(b"a")?.is_some());
            cursor.put(b"a", b"one", CursorPutMode::Current)?;

            let err = cursor
                .put(b"b", b"x", CursorPutMode::NoOverwrite)
                .expect_err("exists");
            assert_eq!(err.kind(), ErrorKind::KeyExists);

            assert!(cursor.seek_exact(b"b")?.is_some());
            cursor.del(DelMode::Current)?;
            Ok(())
        })
        .expect("update");

        let txn = env.begin_ro_txn().expect("txn");
        assert_eq!(txn.get(db, b"a").expect("get"), Some(&b"one"[..]));
        assert_eq!(txn.get(db, b"b").expect("get"), None);
        assert_eq!(txn.get(db, b"c").expect("get"), Some(&b"3"[..]));
    }

    #[test]
    fn delete_all_duplicates_at_cursor() {
        let (_dir, env, db) = env_with(DbFlags::DUP_SORT, &[("k", "v1"), ("k", "v2"), ("j", "x")]);
        env.update(|txn| {
            let mut cursor = txn.open_rw_cursor(db)?;
            assert!(cursor.seek_exact(b"k")?.is_some());
            cursor.del(DelMode::AllDups)
        })
        .expect("update");
        let txn = env.begin_ro_txn().expect("txn");
        assert_eq!(txn.get(db, b"k").expect("get"), None);
        assert_eq!(txn.stat(db).expect("stat").entries, 1);
    }
}
