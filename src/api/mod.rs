//! Purpose: Define the public Rust API boundary for the LMDB proxy layer.
//! Exports: Environment/transaction/cursor handles, write modes, descriptors, errors.
//! Role: Public, additive-only surface; hides the internal `core` layout.
//! Invariants: This module is the only public path to engine primitives.
//! Invariants: Raw proxies stay `unsafe`; the handles are the safe path.

pub use crate::core::cursor::{Cursor, Entry, RwCursor};
pub use crate::core::env::{EnvInfo, EnvOptions, Environment};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::ops::{CursorOp, CursorPutMode, DbFlags, DelMode, EnvFlags, PutMode};
pub use crate::core::span::{ByteSpan, Writeback};
pub use crate::core::txn::{Database, DbStat, RoTxn, RwTxn, Transaction};

/// Stateless engine proxies over raw handles.
pub mod proxy {
    pub use crate::core::proxy::{
        KeyPosition, PairPosition, cursor_count, cursor_del, cursor_position_key,
        cursor_position_key_value, cursor_put, del, get, put,
    };
}

/// Raw engine declarations and status codes.
pub mod sys {
    pub use crate::core::lmdb::sys::*;
}
