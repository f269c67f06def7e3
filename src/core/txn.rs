// Scoped transaction handles and named-database references.
use std::ffi::CString;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use tracing::warn;

use crate::core::cursor::{Cursor, RwCursor};
use crate::core::env::Environment;
use crate::core::error::{Error, ErrorKind};
use crate::core::lmdb::{self, sys};
use crate::core::ops::{DbFlags, PutMode};
use crate::core::proxy;
use crate::core::span::ByteSpan;

/// A named key space. Valid for the transaction that opened it, or for the
/// whole environment once the opening write transaction commits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Database {
    dbi: sys::MDB_dbi,
    flags: DbFlags,
}

impl Database {
    pub fn dbi(&self) -> sys::MDB_dbi {
        self.dbi
    }

    pub fn flags(&self) -> DbFlags {
        self.flags
    }

    pub fn allows_duplicates(&self) -> bool {
        self.flags.contains(DbFlags::DUP_SORT)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DbStat {
    pub page_size: u32,
    pub depth: u32,
    pub branch_pages: usize,
    pub leaf_pages: usize,
    pub overflow_pages: usize,
    pub entries: usize,
}

pub trait Transaction {
    fn as_raw(&self) -> *mut sys::MDB_txn;

    /// Opens an existing named database (`None` is the unnamed main database).
    fn open_db(&self, name: Option<&str>, flags: DbFlags) -> Result<Database, Error> {
        let name = name
            .map(|name| {
                CString::new(name).map_err(|err| {
                    Error::new(ErrorKind::InvalidArgument)
                        .with_message("database name contains NUL")
                        .with_source(err)
                })
            })
            .transpose()?;
        let name_ptr = name.as_ref().map_or(ptr::null(), |name| name.as_ptr());
        let mut dbi: sys::MDB_dbi = 0;
        lmdb::check(unsafe { sys::mdb_dbi_open(self.as_raw(), name_ptr, flags.bits(), &mut dbi) })?;
        let mut stored: std::os::raw::c_uint = 0;
        lmdb::check(unsafe { sys::mdb_dbi_flags(self.as_raw(), dbi, &mut stored) })?;
        Ok(Database {
            dbi,
            flags: DbFlags::from_bits_truncate(stored),
        })
    }

    /// Zero-copy lookup; the slice borrows the transaction.
    fn get(&self, db: Database, key: &[u8]) -> Result<Option<&[u8]>, Error> {
        let span = unsafe { proxy::get(self.as_raw(), db.dbi, ByteSpan::from_slice(key)) }?;
        Ok(span.map(|span| unsafe { span.as_slice() }))
    }

    fn stat(&self, db: Database) -> Result<DbStat, Error> {
        let mut stat = sys::empty_stat();
        lmdb::check(unsafe { sys::mdb_stat(self.as_raw(), db.dbi, &mut stat) })?;
        Ok(DbStat {
            page_size: stat.ms_psize,
            depth: stat.ms_depth,
            branch_pages: stat.ms_branch_pages,
            leaf_pages: stat.ms_leaf_pages,
            overflow_pages: stat.ms_overflow_pages,
            entries: stat.ms_entries,
        })
    }

    fn open_cursor(&self, db: Database) -> Result<Cursor<'_>, Error> {
        Cursor::open(self.as_raw(), db.dbi)
    }
}

#[derive(Debug)]
pub struct RoTxn<'env> {
    raw: NonNull<sys::MDB_txn>,
    _env: PhantomData<&'env Environment>,
}

impl RoTxn<'_> {
    pub(crate) fn from_raw(raw: NonNull<sys::MDB_txn>) -> Self {
        Self {
            raw,
            _env: PhantomData,
        }
    }

    pub fn abort(self) {}
}

impl Transaction for RoTxn<'_> {
    fn as_raw(&self) -> *mut sys::MDB_txn {
        self.raw.as_ptr()
    }
}

impl Drop for RoTxn<'_> {
    fn drop(&mut self) {
        unsafe { sys::mdb_txn_abort(self.raw.as_ptr()) };
    }
}

#[derive(Debug)]
pub struct RwTxn<'env> {
    raw: Option<NonNull<sys::MDB_txn>>,
    _env: PhantomData<&'env Environment>,
}

impl<'env> RwTxn<'env> {
    pub(crate) fn from_raw(raw: NonNull<sys::MDB_txn>) -> Self {
        Self {
            raw: Some(raw),
            _env: PhantomData,
        }
    }

    /// Opens a named database, creating it if missing.
    pub fn create_db(&self, name: Option<&str>, flags: DbFlags) -> Result<Database, Error> {
        self.open_db(name, flags | DbFlags::CREATE)
    }

    pub fn put(&mut self, db: Database, key: &[u8], value: &[u8], mode: PutMode) -> Result<(), Error> {
        unsafe {
            proxy::put(
                self.as_raw(),
                db.dbi,
                ByteSpan::from_slice(key),
                ByteSpan::from_slice(value),
                mode,
            )
        }
    }

    /// Deletes `key`, or only the pair `(key, value)` on a duplicate-key
    /// database. Returns `false` when nothing matched.
    pub fn del(&mut self, db: Database, key: &[u8], value: Option<&[u8]>) -> Result<bool, Error> {
        unsafe {
            proxy::del(
                self.as_raw(),
                db.dbi,
                ByteSpan::from_slice(key),
                value.map(ByteSpan::from_slice),
            )
        }
    }

    /// Removes every pair but keeps the database.
    pub fn clear_db(&mut self, db: Database) -> Result<(), Error> {
        lmdb::check(unsafe { sys::mdb_drop(self.as_raw(), db.dbi, 0) })
    }

    /// Removes the database itself; it must be created again before reuse.
    pub fn drop_db(&mut self, db: Database) -> Result<(), Error> {
        lmdb::check(unsafe { sys::mdb_drop(self.as_raw(), db.dbi, 1) })
    }

    pub fn open_rw_cursor(&mut self, db: Database) -> Result<RwCursor<'_>, Error> {
        RwCursor::open(self.as_raw(), db.dbi)
    }

    /// The native transaction is released whether or not the commit succeeds.
    pub fn commit(mut self) -> Result<(), Error> {
        match self.raw.take() {
            Some(raw) => lmdb::check(unsafe { sys::mdb_txn_commit(raw.as_ptr()) }),
            None => Err(Error::new(ErrorKind::Internal).with_message("transaction already finished")),
        }
    }

    pub fn abort(mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { sys::mdb_txn_abort(raw.as_ptr()) };
        }
    }
}

impl Transaction for RwTxn<'_> {
    fn as_raw(&self) -> *mut sys::MDB_txn {
        self.raw.map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}

impl Drop for RwTxn<'_> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            warn!("write transaction dropped without commit; aborting");
            unsafe { sys::mdb_txn_abort(raw.as_ptr()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Transaction;
    use crate::core::env::{EnvOptions, Environment};
    use crate::core::error::ErrorKind;
    use crate::core::ops::{DbFlags, PutMode};

    fn open_env() -> (tempfile::TempDir, Environment) {
        let dir = tempfile::tempdir().expect("tempdir");
        let env = Environment::open(dir.path(), &EnvOptions::new()).expect("open");
        (dir, env)
    }

    #[test]
    fn missing_named_database_is_not_found() {
        let (_dir, env) = open_env();
        let txn = env.begin_ro_txn().expect("txn");
        let err = txn.open_db(Some("absent"), DbFlags::empty()).expect_err("absent");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn transactions_format_with_debug() {
        let (_dir, env) = open_env();
        let rw = env.begin_rw_txn().expect("rw");
        assert!(format!("{rw:?}").starts_with("RwTxn"));
        rw.abort();
        let ro = env.begin_ro_txn().expect("ro");
        assert!(format!("{ro:?}").starts_with("RoTxn"));
    }

    #[test]
    fn created_database_reports_its_flags() {
        let (_dir, env) = open_env();
        let db = env
            .update(|txn| txn.create_db(Some("dups"), DbFlags::DUP_SORT))
            .expect("create");
        assert!(db.allows_duplicates());
        assert!(!db.flags().contains(DbFlags::CREATE));
    }

    #[test]
    fn dropped_write_transaction_is_aborted() {
        let (_dir, env) = open_env();
        let db = env
            .update(|txn| txn.create_db(None, DbFlags::empty()))
            .expect("db");
        {
            let mut txn = env.begin_rw_txn().expect("txn");
            txn.put(db, b"k", b"v", PutMode::Upsert).expect("put");
        }
        let found = env
            .view(|txn| Ok(txn.get(db, b"k")?.map(<[u8]>::to_vec)))
            .expect("view");
        assert_eq!(found, None);
    }

    #[test]
    fn stat_counts_entries_and_clear_empties() {
        let (_dir, env) = open_env();
        let db = env
            .update(|txn| {
                let db = txn.create_db(Some("items"), DbFlags::empty())?;
                for key in [b"a", b"b", b"c"] {
                    txn.put(db, key, b"1", PutMode::Upsert)?;
                }
                Ok(db)
            })
            .expect("fill");
        assert_eq!(env.view(|txn| txn.stat(db)).expect("stat").entries, 3);

        env.update(|txn| txn.clear_db(db)).expect("clear");
        assert_eq!(env.view(|txn| txn.stat(db)).expect("stat").entries, 0);

        env.update(|txn| txn.drop_db(db)).expect("drop");
        let err = env
            .view(|txn| txn.open_db(Some("items"), DbFlags::empty()))
            .expect_err("dropped");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
