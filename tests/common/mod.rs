//! Common test utilities for campus-ledger integration tests

#[allow(dead_code)]
pub mod portal;

#[allow(unused_imports)]
pub use portal::*;
