// LMDB bindings re-exported from lmdb-rkv-sys, limited to what the proxies and handles call.
pub use lmdb_sys::{MDB_cursor, MDB_cursor_op, MDB_dbi, MDB_env, MDB_envinfo, MDB_stat, MDB_txn};
pub use lmdb_sys::{MDB_val, mdb_mode_t};

pub use lmdb_sys::{
    MDB_BAD_DBI, MDB_BAD_TXN, MDB_BAD_VALSIZE, MDB_CORRUPTED, MDB_DBS_FULL, MDB_INVALID,
    MDB_KEYEXIST, MDB_LAST_ERRCODE, MDB_MAP_FULL, MDB_NOTFOUND, MDB_PAGE_NOTFOUND, MDB_PANIC,
    MDB_READERS_FULL, MDB_SUCCESS, MDB_TXN_FULL, MDB_VERSION_MISMATCH,
};

// Environment flags.
pub use lmdb_sys::{
    MDB_FIXEDMAP, MDB_MAPASYNC, MDB_NOLOCK, MDB_NOMEMINIT, MDB_NOMETASYNC, MDB_NORDAHEAD,
    MDB_NOSUBDIR, MDB_NOSYNC, MDB_NOTLS, MDB_RDONLY, MDB_WRITEMAP,
};

// Database flags.
pub use lmdb_sys::{
    MDB_CREATE, MDB_DUPFIXED, MDB_DUPSORT, MDB_INTEGERDUP, MDB_INTEGERKEY, MDB_REVERSEDUP,
    MDB_REVERSEKEY,
};

// Write and copy flags.
pub use lmdb_sys::{
    MDB_APPEND, MDB_APPENDDUP, MDB_CP_COMPACT, MDB_CURRENT, MDB_MULTIPLE, MDB_NODUPDATA,
    MDB_NOOVERWRITE, MDB_RESERVE,
};

// Cursor opcodes.
pub use lmdb_sys::{
    MDB_FIRST, MDB_FIRST_DUP, MDB_GET_BOTH, MDB_GET_BOTH_RANGE, MDB_GET_CURRENT,
    MDB_GET_MULTIPLE, MDB_LAST, MDB_LAST_DUP, MDB_NEXT, MDB_NEXT_DUP, MDB_NEXT_MULTIPLE,
    MDB_NEXT_NODUP, MDB_PREV, MDB_PREV_DUP, MDB_PREV_MULTIPLE, MDB_PREV_NODUP, MDB_SET,
    MDB_SET_KEY, MDB_SET_RANGE,
};

pub use lmdb_sys::{
    mdb_cursor_close, mdb_cursor_count, mdb_cursor_del, mdb_cursor_get, mdb_cursor_open,
    mdb_cursor_put, mdb_dbi_flags, mdb_dbi_open, mdb_del, mdb_drop, mdb_env_close,
    mdb_env_copy2, mdb_env_create, mdb_env_info, mdb_env_open, mdb_env_set_mapsize,
    mdb_env_set_maxdbs, mdb_env_set_maxreaders, mdb_env_sync, mdb_get, mdb_put, mdb_stat,
    mdb_strerror, mdb_txn_abort, mdb_txn_begin, mdb_txn_commit,
};

/// Zeroed stat block for `mdb_stat` to fill.
pub fn empty_stat() -> MDB_stat {
    MDB_stat {
        ms_psize: 0,
        ms_depth: 0,
        ms_branch_pages: 0,
        ms_leaf_pages: 0,
        ms_overflow_pages: 0,
        ms_entries: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_the_bundled_header() {
        assert_eq!(MDB_KEYEXIST, -30799);
        assert_eq!(MDB_NOTFOUND, -30798);
        assert_eq!(MDB_LAST_ERRCODE, MDB_BAD_DBI);
        assert_eq!(MDB_GET_BOTH, 2);
        assert_eq!(MDB_SET_RANGE, 17);
    }
}
