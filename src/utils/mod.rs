//! # Utility Modules
//!
//! Supporting utilities for the interception pipeline.
//!
//! ## Components
//! - **Buffer Pool**: reusable backing storage for rewrite-path allocations
//! - **Compression**: zlib frame codec with decompression bomb protection
//! - **Metrics**: thread-safe observability counters

pub mod buffer_pool;
pub mod compression;
pub mod metrics;

pub use buffer_pool::BufferPool;
pub use compression::CompressionStage;
pub use metrics::{Metrics, MetricsSnapshot};
