//! # Protocol Layer
//!
//! The version-aware half of the crate: the version model, per-version packet
//! id registries, connection/user tracking, and the interception pipeline
//! that dispatches packet events to listeners.
//!
//! ## Components
//! - **Version**: the total order over protocol versions and client version
//!   resolution
//! - **Registry**: define-then-freeze mapping of logical entries to
//!   per-version numeric ids
//! - **Connection**: users keyed by host channel, with late-bound profile
//!   data
//! - **Event**: packet events, listener priorities, synchronous dispatch
//! - **Pipeline**: the intercept/rewrite state machine and the compression
//!   order guard

pub mod connection;
pub mod event;
pub mod pipeline;
pub mod registry;
pub mod version;

pub use connection::{ChannelId, ConnectionMap, User};
pub use event::{EventManager, ListenerPriority, PacketEvent, PacketListener, PacketSide};
pub use pipeline::{CompressionOrderGuard, InterceptPipeline, PipelineStages};
pub use registry::{RegistryEntry, VersionedRegistry};
pub use version::{ClientVersion, ProtocolVersion};
