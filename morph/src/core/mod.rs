//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! plans and return deterministic outputs suitable for tests.

pub mod budget;
pub mod placeholder;
pub mod plan_check;
pub mod status;
pub mod types;
