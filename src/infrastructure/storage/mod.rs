//! Analytics storage infrastructure
//!
//! Building blocks of the append-only metric store:
//! - Fixed-capacity ring buffer per key
//! - Crash-safe JSON files written via write-new-then-rename

pub mod json_file;
pub mod ring_log;

pub use json_file::AtomicJsonFile;
pub use ring_log::BoundedLog;
