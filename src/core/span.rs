//! Purpose: Non-owning (pointer, length) descriptors handed to and returned by the engine.
//! Exports: `ByteSpan`, `Writeback`.
//! Role: Shared descriptor type for every proxy and for the C ABI.
//! Invariants: Layout matches `MDB_val` (size first, then pointer); crossing the ABI is a bit copy.
//! Invariants: Building a span never allocates or copies; a zero-length span is never dereferenced.
use std::os::raw::c_void;
use std::{ptr, slice};

use crate::core::error::{Error, ErrorKind};
use crate::core::lmdb::sys::MDB_val;

#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ByteSpan {
    len: usize,
    data: *const u8,
}

impl ByteSpan {
    /// Total: any (pointer, length) pair produces a descriptor.
    pub const fn new(data: *const u8, len: usize) -> Self {
        Self { len, data }
    }

    pub const fn empty() -> Self {
        Self::new(ptr::null(), 0)
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::new(bytes.as_ptr(), bytes.len())
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.data
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A null pointer is only acceptable alongside a zero length.
    pub fn is_well_formed(&self) -> bool {
        !(self.data.is_null() && self.len != 0)
    }

    pub(crate) fn validate(self, what: &str) -> Result<Self, Error> {
        if self.is_well_formed() {
            Ok(self)
        } else {
            Err(Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("{what} has a null pointer with length {}", self.len)))
        }
    }

    /// # Safety
    ///
    /// The span must describe `len` initialized bytes that stay valid and
    /// unmodified for `'a` (for engine spans: no longer than the transaction
    /// that produced them, and no write in between).
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        if self.len == 0 || self.data.is_null() {
            &[]
        } else {
            unsafe { slice::from_raw_parts(self.data, self.len) }
        }
    }

    pub(crate) fn to_val(self) -> MDB_val {
        MDB_val {
            mv_size: self.len,
            mv_data: self.data as *mut c_void,
        }
    }

    pub(crate) fn from_val(val: &MDB_val) -> Self {
        Self::new(val.mv_data as *const u8, val.mv_size)
    }
}

impl Default for ByteSpan {
    fn default() -> Self {
        Self::empty()
    }
}

/// Outcome of one output slot of a cursor-positioning call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Writeback {
    /// The engine left the staged descriptor pointing at the caller's buffer.
    Unchanged,
    /// The engine relocated the slot into its own storage.
    Replaced(ByteSpan),
}

impl Writeback {
    /// Compares pointers only; a relocated result with equal bytes is still a replacement.
    pub fn detect(staged: ByteSpan, returned: ByteSpan) -> Self {
        if ptr::eq(staged.as_ptr(), returned.as_ptr()) {
            Writeback::Unchanged
        } else {
            Writeback::Replaced(returned)
        }
    }

    pub fn is_replaced(&self) -> bool {
        matches!(self, Writeback::Replaced(_))
    }

    pub fn resolve(self, staged: ByteSpan) -> ByteSpan {
        match self {
            Writeback::Unchanged => staged,
            Writeback::Replaced(span) => span,
        }
    }

    /// Writes the replacement into `slot`; leaves it untouched otherwise.
    pub fn apply(self, slot: &mut ByteSpan) {
        if let Writeback::Replaced(span) = self {
            *slot = span;
        }
    }
}
