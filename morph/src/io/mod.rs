//! I/O adapters for the engine.

pub mod config;
pub mod generator;
pub mod lock;
pub mod notifier;
pub mod plan_file;
pub mod process;
pub mod prompt;
pub mod workspace;
