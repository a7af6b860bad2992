//! Deterministic, pure logic shared by the loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! strings and records and return deterministic outputs suitable for tests.

pub mod parser;
pub mod requirements;
pub mod sanitize;
pub mod selector;
pub mod task;
pub mod template;
