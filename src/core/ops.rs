// Operation vocabulary: cursor opcodes, closed write modes, and engine option sets.
use std::os::raw::c_uint;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::lmdb::sys;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CursorOp {
    First,
    FirstDup,
    GetBoth,
    GetBothRange,
    GetCurrent,
    Last,
    LastDup,
    Next,
    NextDup,
    NextNoDup,
    Prev,
    PrevDup,
    PrevNoDup,
    Set,
    SetKey,
    SetRange,
}

impl CursorOp {
    pub const ALL: [CursorOp; 16] = [
        CursorOp::First,
        CursorOp::FirstDup,
        CursorOp::GetBoth,
        CursorOp::GetBothRange,
        CursorOp::GetCurrent,
        CursorOp::Last,
        CursorOp::LastDup,
        CursorOp::Next,
        CursorOp::NextDup,
        CursorOp::NextNoDup,
        CursorOp::Prev,
        CursorOp::PrevDup,
        CursorOp::PrevNoDup,
        CursorOp::Set,
        CursorOp::SetKey,
        CursorOp::SetRange,
    ];

    pub fn raw(self) -> sys::MDB_cursor_op {
        match self {
            CursorOp::First => sys::MDB_FIRST,
            CursorOp::FirstDup => sys::MDB_FIRST_DUP,
            CursorOp::GetBoth => sys::MDB_GET_BOTH,
            CursorOp::GetBothRange => sys::MDB_GET_BOTH_RANGE,
            CursorOp::GetCurrent => sys::MDB_GET_CURRENT,
            CursorOp::Last => sys::MDB_LAST,
            CursorOp::LastDup => sys::MDB_LAST_DUP,
            CursorOp::Next => sys::MDB_NEXT,
            CursorOp::NextDup => sys::MDB_NEXT_DUP,
            CursorOp::NextNoDup => sys::MDB_NEXT_NODUP,
            CursorOp::Prev => sys::MDB_PREV,
            CursorOp::PrevDup => sys::MDB_PREV_DUP,
            CursorOp::PrevNoDup => sys::MDB_PREV_NODUP,
            CursorOp::Set => sys::MDB_SET,
            CursorOp::SetKey => sys::MDB_SET_KEY,
            CursorOp::SetRange => sys::MDB_SET_RANGE,
        }
    }

    /// Maps a host-supplied opcode; the bulk `*_MULTIPLE` opcodes are unsupported.
    pub fn from_raw(raw: sys::MDB_cursor_op) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|op| op.raw() == raw)
            .ok_or_else(|| {
                Error::new(ErrorKind::InvalidArgument)
                    .with_message(format!("unsupported cursor opcode {raw}"))
            })
    }

    /// The opcode reads the key slot as input.
    pub fn needs_key(self) -> bool {
        matches!(
            self,
            CursorOp::Set
                | CursorOp::SetKey
                | CursorOp::SetRange
                | CursorOp::GetBoth
                | CursorOp::GetBothRange
        )
    }

    /// The opcode reads the value slot as input.
    pub fn needs_value(self) -> bool {
        matches!(self, CursorOp::GetBoth | CursorOp::GetBothRange)
    }
}

/// Write modes for a database-level put.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum PutMode {
    #[default]
    Upsert,
    /// Fail with `KeyExists` if the key is present.
    NoOverwrite,
    /// Duplicate-key databases: fail with `KeyExists` if the exact pair is present.
    NoDupData,
    /// The key sorts after every existing key.
    Append,
    /// The value sorts after every existing value of the key.
    AppendDup,
}

impl PutMode {
    pub fn raw(self) -> c_uint {
        match self {
            PutMode::Upsert => 0,
            PutMode::NoOverwrite => sys::MDB_NOOVERWRITE,
            PutMode::NoDupData => sys::MDB_NODUPDATA,
            PutMode::Append => sys::MDB_APPEND,
            PutMode::AppendDup => sys::MDB_APPENDDUP,
        }
    }

    pub fn from_raw(raw: c_uint) -> Result<Self, Error> {
        match raw {
            0 => Ok(PutMode::Upsert),
            sys::MDB_NOOVERWRITE => Ok(PutMode::NoOverwrite),
            sys::MDB_NODUPDATA => Ok(PutMode::NoDupData),
            sys::MDB_APPEND => Ok(PutMode::Append),
            sys::MDB_APPENDDUP => Ok(PutMode::AppendDup),
            other => Err(unsupported_write_flags(other)),
        }
    }
}

/// Write modes for a cursor-level put.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum CursorPutMode {
    #[default]
    Upsert,
    NoOverwrite,
    NoDupData,
    /// Replace the pair at the cursor; the key must match the current key.
    Current,
    Append,
    AppendDup,
}

impl CursorPutMode {
    pub fn raw(self) -> c_uint {
        match self {
            CursorPutMode::Upsert => 0,
            CursorPutMode::NoOverwrite => sys::MDB_NOOVERWRITE,
            CursorPutMode::NoDupData => sys::MDB_NODUPDATA,
            CursorPutMode::Current => sys::MDB_CURRENT,
            CursorPutMode::Append => sys::MDB_APPEND,
            CursorPutMode::AppendDup => sys::MDB_APPENDDUP,
        }
    }

    pub fn from_raw(raw: c_uint) -> Result<Self, Error> {
        match raw {
            sys::MDB_CURRENT => Ok(CursorPutMode::Current),
            other => PutMode::from_raw(other).map(CursorPutMode::from),
        }
    }
}

impl From<PutMode> for CursorPutMode {
    fn from(mode: PutMode) -> Self {
        match mode {
            PutMode::Upsert => CursorPutMode::Upsert,
            PutMode::NoOverwrite => CursorPutMode::NoOverwrite,
            PutMode::NoDupData => CursorPutMode::NoDupData,
            PutMode::Append => CursorPutMode::Append,
            PutMode::AppendDup => CursorPutMode::AppendDup,
        }
    }
}

/// Scope of a cursor delete.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum DelMode {
    #[default]
    Current,
    /// Duplicate-key databases: every value of the current key.
    AllDups,
}

impl DelMode {
    pub fn raw(self) -> c_uint {
        match self {
            DelMode::Current => 0,
            DelMode::AllDups => sys::MDB_NODUPDATA,
        }
    }

    pub fn from_raw(raw: c_uint) -> Result<Self, Error> {
        match raw {
            0 => Ok(DelMode::Current),
            sys::MDB_NODUPDATA => Ok(DelMode::AllDups),
            other => Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("unsupported delete flags {other:#x}"))),
        }
    }
}

fn unsupported_write_flags(raw: c_uint) -> Error {
    let message = if raw & sys::MDB_RESERVE != 0 {
        "reserve-mode writes are not supported".to_string()
    } else if raw & sys::MDB_MULTIPLE != 0 {
        "bulk multiple-value writes are not supported".to_string()
    } else {
        format!("unsupported write flags {raw:#x}")
    };
    Error::new(ErrorKind::InvalidArgument).with_message(message)
}

bitflags! {
    /// Environment open flags. `NO_TLS` is always added when opening.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct EnvFlags: c_uint {
        const FIXED_MAP = sys::MDB_FIXEDMAP;
        const NO_SUB_DIR = sys::MDB_NOSUBDIR;
        const NO_SYNC = sys::MDB_NOSYNC;
        const READ_ONLY = sys::MDB_RDONLY;
        const NO_META_SYNC = sys::MDB_NOMETASYNC;
        const MAP_ASYNC = sys::MDB_MAPASYNC;
        const NO_TLS = sys::MDB_NOTLS;
        const NO_LOCK = sys::MDB_NOLOCK;
        const NO_READ_AHEAD = sys::MDB_NORDAHEAD;
        const NO_MEM_INIT = sys::MDB_NOMEMINIT;
    }
}

bitflags! {
    /// Named-database flags.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DbFlags: c_uint {
        const REVERSE_KEY = sys::MDB_REVERSEKEY;
        const DUP_SORT = sys::MDB_DUPSORT;
        const INTEGER_KEY = sys::MDB_INTEGERKEY;
        const DUP_FIXED = sys::MDB_DUPFIXED;
        const INTEGER_DUP = sys::MDB_INTEGERDUP;
        const REVERSE_DUP = sys::MDB_REVERSEDUP;
        const CREATE = sys::MDB_CREATE;
    }
}

#[cfg(test)]
mod tests {
    use super::{CursorOp, CursorPutMode, DbFlags, DelMode, EnvFlags, PutMode};
    use crate::core::error::ErrorKind;
    use crate::core::lmdb::sys;

    #[test]
    fn cursor_ops_map_both_ways() {
        for op in CursorOp::ALL {
            assert_eq!(CursorOp::from_raw(op.raw()).expect("op"), op);
        }
        for raw in [
            sys::MDB_GET_MULTIPLE,
            sys::MDB_NEXT_MULTIPLE,
            sys::MDB_PREV_MULTIPLE,
            99,
        ] {
            let err = CursorOp::from_raw(raw).expect_err("unsupported");
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn input_requirements_follow_the_opcode() {
        assert!(CursorOp::Set.needs_key());
        assert!(!CursorOp::Set.needs_value());
        assert!(CursorOp::GetBothRange.needs_key());
        assert!(CursorOp::GetBothRange.needs_value());
        assert!(!CursorOp::Next.needs_key());
        assert!(!CursorOp::First.needs_value());
    }

    #[test]
    fn put_modes_accept_one_flag_at_a_time() {
        assert_eq!(PutMode::from_raw(0).expect("mode"), PutMode::Upsert);
        assert_eq!(
            PutMode::from_raw(sys::MDB_NOOVERWRITE).expect("mode"),
            PutMode::NoOverwrite
        );
        let err = PutMode::from_raw(sys::MDB_NOOVERWRITE | sys::MDB_APPEND).expect_err("combo");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = PutMode::from_raw(sys::MDB_RESERVE).expect_err("reserve");
        assert!(err.message().unwrap_or_default().contains("reserve"));
        let err = PutMode::from_raw(sys::MDB_CURRENT).expect_err("current");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn cursor_put_modes_add_current() {
        assert_eq!(
            CursorPutMode::from_raw(sys::MDB_CURRENT).expect("mode"),
            CursorPutMode::Current
        );
        assert_eq!(
            CursorPutMode::from_raw(sys::MDB_APPENDDUP).expect("mode"),
            CursorPutMode::AppendDup
        );
        assert_eq!(CursorPutMode::from(PutMode::Append).raw(), sys::MDB_APPEND);
    }

    #[test]
    fn delete_modes_map_both_ways() {
        assert_eq!(DelMode::from_raw(DelMode::AllDups.raw()).expect("mode"), DelMode::AllDups);
        assert!(DelMode::from_raw(sys::MDB_APPEND).is_err());
    }

    #[test]
    fn flag_sets_use_engine_bits() {
        assert_eq!(
            (DbFlags::DUP_SORT | DbFlags::CREATE).bits(),
            sys::MDB_DUPSORT | sys::MDB_CREATE
        );
        assert_eq!(EnvFlags::NO_SUB_DIR.bits(), sys::MDB_NOSUBDIR);
    }
}
