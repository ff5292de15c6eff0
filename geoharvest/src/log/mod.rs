//! Logger abstraction handed to request and constituent processors.
//!
//! Processors receive an `Arc<dyn Logger>` instead of calling `tracing`
//! directly. That keeps per-request context attached to every line (see
//! [`ScopedLogger`]) and lets tests capture exactly what a processor
//! reported (see [`MemoryLogger`]).
//!
//! ```
//! use geoharvest::log::{Logger, MemoryLogger, ScopedLogger};
//! use geoharvest::log_warn;
//! use std::sync::Arc;
//!
//! let sink = Arc::new(MemoryLogger::new());
//! let logger = ScopedLogger::new(sink.clone(), "request-1");
//! log_warn!(logger, "constituent {} failed", "/out/b.tif");
//!
//! assert_eq!(sink.lines(), vec!["WARN [request-1] constituent /out/b.tif failed"]);
//! ```

mod memory;
mod noop;
mod scoped;
mod tracing_adapter;
mod r#trait;

pub use memory::MemoryLogger;
pub use noop::NoOpLogger;
pub use r#trait::{LogLevel, Logger};
pub use scoped::ScopedLogger;
pub use tracing_adapter::TracingLogger;
