//! # packet-intercept
//!
//! Versioned packet codec and interception pipeline for multiplayer game
//! connections.
//!
//! The crate decodes the game's length/VarInt wire primitives across every
//! supported protocol version, lets listeners observe, rewrite, or cancel
//! packets as they pass through a host server's channel pipeline, and keeps
//! per-version packet id registries so the same logical packet can be handled
//! uniformly no matter which client version sent it.
//!
//! ## Components
//! - **Core**: VarInt/VarLong codec, refcounted [`ByteBuf`](crate::core::ByteBuf),
//!   and the version-aware [`PacketWrapper`](crate::core::PacketWrapper)
//! - **Protocol**: the version total order, versioned registries, connection
//!   tracking, packet events, and the interception pipeline
//! - **Utils**: buffer pool, zlib frame codec, pipeline metrics
//! - **Config**: TOML/env configuration with validation
//!
//! ## Example
//! ```
//! use packet_intercept::protocol::{
//!     EventManager, InterceptPipeline, ListenerPriority, PacketEvent,
//! };
//! use std::sync::Arc;
//!
//! let events = Arc::new(EventManager::new());
//! events.register(
//!     ListenerPriority::Normal,
//!     Arc::new(|event: &mut PacketEvent| {
//!         if event.packet_id() == 0x0F {
//!             event.cancel();
//!         }
//!         Ok(())
//!     }),
//! );
//! let pipeline = InterceptPipeline::new(events);
//! # let _ = pipeline;
//! ```
//!
//! ## Security
//! - Every length prefix read off the wire is validated against a cap before
//!   allocation
//! - Decompression output is bounded to defeat decompression bombs
//! - A failing listener or post task is contained to its own connection

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod utils;

pub use crate::config::InterceptConfig;
pub use crate::core::{ByteBuf, PacketBody, PacketWrapper};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::{
    ClientVersion, EventManager, InterceptPipeline, ListenerPriority, PacketEvent, PacketListener,
    PacketSide, ProtocolVersion, VersionedRegistry,
};
