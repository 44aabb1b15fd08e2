//! # Error Types
//!
//! Comprehensive error handling for the interception core.
//!
//! This module defines all error variants that can occur while decoding,
//! mutating, and re-encoding packets, from low-level codec failures to
//! registry definition mistakes.
//!
//! ## Error Categories
//! - **Malformed-data errors**: bad VarInts, buffer underflow, out-of-range
//!   ordinals. Attributable to a single packet and recoverable by dropping
//!   that packet only.
//! - **Definition-time errors**: duplicate registry names, (version, id)
//!   collisions, missing mapping data. Fatal at initialization, before any
//!   connection is accepted.
//! - **Resource-accounting errors**: double release, access after release,
//!   capacity overruns on a non-growable buffer. Detected and reported
//!   rather than silently corrupting sibling buffers.
//! - **Listener errors**: failures raised inside listener callbacks, caught
//!   at the dispatch boundary.
//!
//! All errors implement `std::error::Error` for interoperability.

use std::io;
use thiserror::Error;

/// ProtocolError is the primary error type for all interception operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ---- malformed data (per-packet, recoverable by dropping the packet) ----
    #[error("VarInt too big: {0} groups")]
    MalformedVarInt(usize),

    #[error("VarLong too big: {0} groups")]
    MalformedVarLong(usize),

    /// Not enough bytes to finish decoding; the reader cursor has been
    /// restored so the caller may retry once more data arrives.
    #[error("incomplete VarInt: need more data")]
    IncompleteVarInt,

    #[error("buffer underflow: needed {needed} bytes, {available} readable")]
    BufferUnderflow { needed: usize, available: usize },

    #[error("string of {length} chars exceeds cap of {max}")]
    StringTooLong { length: usize, max: usize },

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("ordinal {value} out of range for {type_name}")]
    UnknownOrdinal { type_name: &'static str, value: i32 },

    #[error("no registry entry with id {id} at version {version}")]
    UnknownRegistryId { version: &'static str, id: i32 },

    /// Wraps any malformed-data error with the packet and connection it was
    /// attributed to, so the caller can log and drop exactly that packet.
    #[error("error while processing packet {packet_id:#04x} of {user}: {source}")]
    PacketProcess {
        user: String,
        packet_id: i32,
        #[source]
        source: Box<ProtocolError>,
    },

    // ---- definition time (fatal at initialization) ----
    #[error("duplicate entry name {name:?} in registry {registry:?}")]
    DuplicateEntryName { registry: String, name: String },

    #[error("registry {registry:?}: entries {first:?} and {second:?} share id {id} at version {version}")]
    IdCollision {
        registry: String,
        version: &'static str,
        id: i32,
        first: String,
        second: String,
    },

    #[error("registry {0:?} has no mapping data")]
    MissingMappings(String),

    #[error("failed to parse mapping data: {0}")]
    MappingParse(#[from] serde_json::Error),

    #[error("registry {0:?} is frozen; define() after unload_mappings() is not allowed")]
    RegistryFrozen(String),

    #[error("unknown version name {0:?} in mapping data")]
    UnknownVersionName(String),

    // ---- resource accounting (programming errors, detected not masked) ----
    #[error("buffer accessed after release")]
    BufferReleased,

    #[error("buffer released more times than retained")]
    DoubleRelease,

    #[error("write of {requested} bytes exceeds max capacity {max}")]
    CapacityExceeded { requested: usize, max: usize },

    // ---- dispatch / configuration ----
    #[error("listener {listener:?} failed: {message}")]
    ListenerError { listener: String, message: String },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    Custom(String),
}

impl ProtocolError {
    /// True for errors that are attributable to one packet and recoverable by
    /// dropping only that packet. Everything else is either fatal at startup
    /// or a programming error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::MalformedVarInt(_)
                | ProtocolError::MalformedVarLong(_)
                | ProtocolError::IncompleteVarInt
                | ProtocolError::BufferUnderflow { .. }
                | ProtocolError::StringTooLong { .. }
                | ProtocolError::InvalidUtf8
                | ProtocolError::UnknownOrdinal { .. }
                | ProtocolError::UnknownRegistryId { .. }
                | ProtocolError::PacketProcess { .. }
                | ProtocolError::ListenerError { .. }
        )
    }

    /// Attach packet/connection context to a low-level error.
    pub fn with_packet_context(self, user: impl Into<String>, packet_id: i32) -> Self {
        ProtocolError::PacketProcess {
            user: user.into(),
            packet_id,
            source: Box::new(self),
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
