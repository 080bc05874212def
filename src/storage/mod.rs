//! Storage layer
//!
//! # Architecture
//!
//! The index consumes nothing but a flat key-value contract:
//!
//! ```text
//! StorageEngine (get / put / delete, string keys, JSON values)
//!   ├─→ MemoryStorage  (in-process map, tests and dry runs)
//!   └─→ LogStorage     (append-only record log, replayed on open)
//! ```
//!
//! Single calls are atomic. Multi-call sequences are not, and no backend
//! offers compare-and-swap.

pub mod engine;
pub mod log;
pub mod memory;

pub use engine::{Storage, StorageEngine};
pub use log::{LogOp, LogRecord, LogStorage};
pub use memory::MemoryStorage;
