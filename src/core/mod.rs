// Core modules: engine bindings, descriptors, proxies, and scoped handles.
pub mod cursor;
pub mod env;
pub mod error;
pub mod lmdb;
pub mod ops;
pub mod proxy;
pub mod span;
pub mod txn;
