//! # Packet Wrapper
//!
//! The single typed surface through which packet fields are read and written.
//! A wrapper pairs one [`ByteBuf`] with the resolved server and client
//! versions; every primitive that changed wire shape across revisions
//! branches on those versions at exactly one call site.
//!
//! Two construction modes exist: decode-from-wire
//! ([`PacketWrapper::for_decode`], positioned at the packet body) and
//! construct-for-send ([`PacketWrapper::for_encode`], serialized lazily when
//! the body is written). Domain packet types implement [`PacketBody`] on top
//! of these primitives; `Clone` on the body covers the copy-to-sibling case
//! where a fully decoded packet is re-emitted without touching the buffer.

use crate::core::buffer::ByteBuf;
use crate::core::varint;
use crate::error::{ProtocolError, Result};
use crate::protocol::registry::{RegistryEntry, VersionedRegistry};
use crate::protocol::version::{ClientVersion, ProtocolVersion};
use std::sync::Arc;
use uuid::Uuid;

/// Default cap for length-prefixed strings, matching the wire protocol's own
/// maximum chat/identifier length.
pub const DEFAULT_MAX_STRING_LEN: usize = 32767;

/// A registry entry resolved from the wire, or the inlined ("direct")
/// representation used on versions where no matching registry exists.
#[derive(Debug, Clone)]
pub enum MaybeMapped<T, D> {
    Mapped(Arc<RegistryEntry<T>>),
    Direct(D),
}

/// The read/write contract for one packet type. `read` consumes fields from a
/// decode-mode wrapper; `write` emits them through an encode-mode wrapper.
pub trait PacketBody: Clone {
    fn read(wrapper: &mut PacketWrapper) -> Result<Self>;
    fn write(&self, wrapper: &mut PacketWrapper) -> Result<()>;
}

/// Per-packet read/write state over one buffer and the negotiated versions.
pub struct PacketWrapper {
    pub(crate) buffer: ByteBuf,
    server_version: ProtocolVersion,
    client_version: ClientVersion,
    packet_id: i32,
}

impl PacketWrapper {
    /// Wrap an existing buffer positioned at the packet body (decode mode).
    pub fn for_decode(
        buffer: ByteBuf,
        server_version: ProtocolVersion,
        client_version: ClientVersion,
        packet_id: i32,
    ) -> Self {
        PacketWrapper {
            buffer,
            server_version,
            client_version,
            packet_id,
        }
    }

    /// Fresh growable buffer for a packet constructed for sending.
    pub fn for_encode(
        server_version: ProtocolVersion,
        client_version: ClientVersion,
        packet_id: i32,
    ) -> Self {
        Self::for_decode(ByteBuf::new(), server_version, client_version, packet_id)
    }

    pub fn buffer(&self) -> &ByteBuf {
        &self.buffer
    }

    pub fn server_version(&self) -> ProtocolVersion {
        self.server_version
    }

    pub fn client_version(&self) -> ClientVersion {
        self.client_version
    }

    pub fn packet_id(&self) -> i32 {
        self.packet_id
    }

    // ---- fixed-width scalars ----

    pub fn read_u8(&mut self) -> Result<u8> {
        self.buffer.read_u8()
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.buffer.write_u8(value)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.buffer.read_i8()
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.buffer.write_i8(value)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.buffer.read_bool()
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.buffer.write_bool(value)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.buffer.read_i16()
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.buffer.write_i16(value)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.buffer.read_u16()
    }

    pub fn read_medium(&mut self) -> Result<i32> {
        self.buffer.read_medium()
    }

    pub fn write_medium(&mut self, value: i32) -> Result<()> {
        self.buffer.write_medium(value)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.buffer.read_i32()
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.buffer.write_i32(value)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.buffer.read_i64()
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.buffer.write_i64(value)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.buffer.read_f32()
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.buffer.write_f32(value)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.buffer.read_f64()
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.buffer.write_f64(value)
    }

    // ---- variable-length integers ----

    pub fn read_var_int(&mut self) -> Result<i32> {
        varint::read_var_int(&self.buffer)
    }

    pub fn write_var_int(&mut self, value: i32) -> Result<()> {
        varint::write_var_int(&self.buffer, value)
    }

    pub fn read_var_long(&mut self) -> Result<i64> {
        varint::read_var_long(&self.buffer)
    }

    pub fn write_var_long(&mut self, value: i64) -> Result<()> {
        varint::write_var_long(&self.buffer, value)
    }

    /// Fields that widened from a fixed 4-byte int to a VarInt at `since`.
    /// The one dispatch point for such fields; callers never branch on the
    /// version themselves.
    pub fn read_var_int_since(&mut self, since: ProtocolVersion) -> Result<i32> {
        if self.server_version.is_newer_or_equal(since) {
            self.read_var_int()
        } else {
            self.read_i32()
        }
    }

    pub fn write_var_int_since(&mut self, since: ProtocolVersion, value: i32) -> Result<()> {
        if self.server_version.is_newer_or_equal(since) {
            self.write_var_int(value)
        } else {
            self.write_i32(value)
        }
    }

    // ---- strings and byte arrays ----

    /// VarInt-length-prefixed UTF-8 string, capped at `max_len` characters.
    pub fn read_string(&mut self, max_len: usize) -> Result<String> {
        let byte_len = self.read_var_int()?;
        if byte_len < 0 || byte_len as usize > max_len * 4 {
            return Err(ProtocolError::StringTooLong {
                length: byte_len.max(0) as usize,
                max: max_len * 4,
            });
        }
        let raw = self.buffer.read_bytes(byte_len as usize)?;
        let text = String::from_utf8(raw).map_err(|_| ProtocolError::InvalidUtf8)?;
        let chars = text.chars().count();
        if chars > max_len {
            return Err(ProtocolError::StringTooLong {
                length: chars,
                max: max_len,
            });
        }
        Ok(text)
    }

    /// Writing rejects strings over `max_len` characters; the cap is part of
    /// the wire contract, not an incidental limit.
    pub fn write_string(&mut self, value: &str, max_len: usize) -> Result<()> {
        let chars = value.chars().count();
        if chars > max_len {
            return Err(ProtocolError::StringTooLong {
                length: chars,
                max: max_len,
            });
        }
        self.write_var_int(value.len() as i32)?;
        self.buffer.write_bytes(value.as_bytes())
    }

    /// VarInt-length-prefixed byte array.
    pub fn read_byte_array(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let len = self.read_var_int()?;
        if len < 0 || len as usize > max_len {
            return Err(ProtocolError::StringTooLong {
                length: len.max(0) as usize,
                max: max_len,
            });
        }
        self.buffer.read_bytes(len as usize)
    }

    pub fn write_byte_array(&mut self, value: &[u8]) -> Result<()> {
        self.write_var_int(value.len() as i32)?;
        self.buffer.write_bytes(value)
    }

    // ---- UUIDs (two big-endian 64-bit halves) ----

    pub fn read_uuid(&mut self) -> Result<Uuid> {
        let msb = self.read_i64()? as u64;
        let lsb = self.read_i64()? as u64;
        Ok(Uuid::from_u64_pair(msb, lsb))
    }

    pub fn write_uuid(&mut self, value: Uuid) -> Result<()> {
        let (msb, lsb) = value.as_u64_pair();
        self.write_i64(msb as i64)?;
        self.write_i64(lsb as i64)
    }

    // ---- optionals ----

    /// Boolean presence flag followed by the value. The legacy variant:
    /// any nonzero flag byte counts as present.
    pub fn read_optional<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<Option<T>> {
        if self.read_bool()? {
            Ok(Some(read(self)?))
        } else {
            Ok(None)
        }
    }

    pub fn write_optional<T>(
        &mut self,
        value: Option<&T>,
        write: impl FnOnce(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        match value {
            Some(value) => {
                self.write_bool(true)?;
                write(self, value)
            }
            None => self.write_bool(false),
        }
    }

    /// Strict variant used by newer fields: the flag byte must be exactly
    /// 0 or 1, and absence is only ever encoded through the flag, never via a
    /// sentinel value.
    pub fn read_real_optional<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<Option<T>> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(read(self)?)),
            flag => Err(ProtocolError::UnknownOrdinal {
                type_name: "optional presence flag",
                value: flag as i32,
            }),
        }
    }

    pub fn write_real_optional<T>(
        &mut self,
        value: Option<&T>,
        write: impl FnOnce(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        self.write_optional(value, write)
    }

    // ---- lists ----

    /// VarInt count followed by that many elements.
    pub fn read_list<T>(
        &mut self,
        mut read: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let count = self.read_var_int()?;
        let readable = self.buffer.readable_bytes()?;
        // every element occupies at least one byte; a count beyond that is a
        // forged length prefix, not a short buffer
        if count < 0 || count as usize > readable {
            return Err(ProtocolError::BufferUnderflow {
                needed: count.max(0) as usize,
                available: readable,
            });
        }
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(read(self)?);
        }
        Ok(items)
    }

    pub fn write_list<T>(
        &mut self,
        items: &[T],
        mut write: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        self.write_var_int(items.len() as i32)?;
        for item in items {
            write(self, item)?;
        }
        Ok(())
    }

    // ---- mapped entities ----

    /// Resolve a wire id against `registry` at the wrapper's server version.
    pub fn read_mapped_entity<T>(
        &mut self,
        registry: &VersionedRegistry<T>,
    ) -> Result<Arc<RegistryEntry<T>>> {
        let id = self.read_var_int()?;
        registry
            .get_by_id(self.server_version, id)
            .cloned()
            .ok_or(ProtocolError::UnknownRegistryId {
                version: self.server_version.name(),
                id,
            })
    }

    pub fn write_mapped_entity<T>(&mut self, entry: &RegistryEntry<T>) -> Result<()> {
        match entry.id_at(self.server_version) {
            Some(id) => self.write_var_int(id),
            None => Err(ProtocolError::Custom(format!(
                "entry {:?} does not exist at {}",
                entry.name(),
                self.server_version
            ))),
        }
    }

    /// Registry-or-direct encoding: id 0 introduces an inlined value, any
    /// other id resolves as `id - 1` against the registry.
    pub fn read_mapped_entity_or_direct<T, D>(
        &mut self,
        registry: &VersionedRegistry<T>,
        read_direct: impl FnOnce(&mut Self) -> Result<D>,
    ) -> Result<MaybeMapped<T, D>> {
        let id = self.read_var_int()?;
        if id == 0 {
            return Ok(MaybeMapped::Direct(read_direct(self)?));
        }
        registry
            .get_by_id(self.server_version, id - 1)
            .cloned()
            .map(MaybeMapped::Mapped)
            .ok_or(ProtocolError::UnknownRegistryId {
                version: self.server_version.name(),
                id: id - 1,
            })
    }

    pub fn write_mapped_entity_or_direct<T, D>(
        &mut self,
        value: &MaybeMapped<T, D>,
        write_direct: impl FnOnce(&mut Self, &D) -> Result<()>,
    ) -> Result<()> {
        match value {
            MaybeMapped::Mapped(entry) => match entry.id_at(self.server_version) {
                Some(id) => self.write_var_int(id + 1),
                None => Err(ProtocolError::Custom(format!(
                    "entry {:?} does not exist at {}",
                    entry.name(),
                    self.server_version
                ))),
            },
            MaybeMapped::Direct(value) => {
                self.write_var_int(0)?;
                write_direct(self, value)
            }
        }
    }
}
