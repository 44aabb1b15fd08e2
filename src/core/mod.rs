//! # Core Codec Components
//!
//! Low-level byte handling for the interception path.
//!
//! This module provides the versioned packet codec: the variable-length
//! integer encoding, the reference-counted dual-cursor buffer, and the
//! typed packet wrapper built on both.
//!
//! ## Components
//! - **VarInt/VarLong**: base-128 little-endian-group integers with a
//!   4-byte fast decode path
//! - **ByteBuf**: refcounted buffer with independent read/write cursors
//! - **PacketWrapper**: version-conditional typed field access
//!
//! ## Wire Format
//! ```text
//! [VarInt length] [VarInt packet id] [version-specific field layout]
//! ```
//! Framing (the length prefix) belongs to the host; everything inside the
//! frame goes through this module.

pub mod buffer;
pub mod varint;
pub mod wrapper;

pub use buffer::ByteBuf;
pub use varint::{read_var_int, read_var_long, var_int_len, var_long_len, write_var_int, write_var_long};
pub use wrapper::{MaybeMapped, PacketBody, PacketWrapper, DEFAULT_MAX_STRING_LEN};
