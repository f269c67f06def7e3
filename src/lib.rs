//! Purpose: Zero-copy proxy layer over LMDB used by the `lmpx` CLI, the C ABI, and bindings.
//! Exports: `api` (safe handles, proxies, errors) and `abi` (C-callable functions).
//! Role: Library backing the binary and every non-Rust binding.
//! Invariants: Engine-returned bytes are never copied by this crate.
//! Invariants: `core` stays private; `api` is the only public path to it.
pub mod abi;
pub mod api;
mod core;
