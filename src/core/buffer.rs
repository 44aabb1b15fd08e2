//! # Byte Buffer Abstraction
//!
//! Reference-counted, dual-cursor byte buffer used on the interception path.
//!
//! A [`ByteBuf`] is a cheap handle over shared storage with two independent
//! cursors (reader index, writer index), a capacity, and an explicit
//! reference count. Handles obtained through [`ByteBuf::clone`] share both
//! storage and cursors (the same logical buffer); [`ByteBuf::duplicate`] and
//! [`ByteBuf::slice`] share storage but carry independent cursors;
//! [`ByteBuf::copy`] detaches into fresh storage.
//!
//! ## Invariants
//! - `reader_index <= writer_index <= capacity` at all times.
//! - A buffer whose reference count has reached zero rejects every further
//!   operation with [`ProtocolError::BufferReleased`].
//! - Fixed-width reads that would pass the writer index fail with
//!   [`ProtocolError::BufferUnderflow`] instead of reading garbage.
//! - Writes past the capacity grow the storage when the buffer is growable,
//!   and fail with [`ProtocolError::CapacityExceeded`] when it is not
//!   (pooled, fixed-capacity buffers handed in by the host).
//!
//! Big-endian accessors carry protocol values; the little-endian `get_*_le`
//! peeks exist for the VarInt fast path.

use crate::error::{ProtocolError, Result};
use bytes::BytesMut;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Storage returned to a pool once the owning buffer is fully released.
pub(crate) type PoolHandle = Arc<Mutex<Vec<BytesMut>>>;

struct Storage {
    data: Mutex<BytesMut>,
    refs: AtomicUsize,
    /// Upper bound for growth. `usize::MAX` marks a growable buffer.
    max_capacity: usize,
    /// Present when the backing storage was drawn from a buffer pool.
    pool: Option<PoolHandle>,
}

#[derive(Clone, Copy)]
struct Cursors {
    reader: usize,
    writer: usize,
    marked_reader: usize,
    marked_writer: usize,
}

/// A reference-counted byte buffer with independent read and write cursors.
pub struct ByteBuf {
    storage: Arc<Storage>,
    cursors: Arc<Mutex<Cursors>>,
}

impl ByteBuf {
    /// New empty growable buffer.
    pub fn new() -> Self {
        Self::from_bytes_mut(BytesMut::new(), usize::MAX, None)
    }

    /// New growable buffer with pre-sized storage.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut data = BytesMut::with_capacity(capacity);
        data.resize(capacity, 0);
        Self::from_bytes_mut(data, usize::MAX, None)
    }

    /// Buffer pre-filled with `content`; reader at 0, writer at the end.
    pub fn from_slice(content: &[u8]) -> Self {
        let buf = Self::from_bytes_mut(BytesMut::from(content), usize::MAX, None);
        // writer index covers the initial content
        let mut c = buf.cursors.lock().unwrap_or_else(|e| e.into_inner());
        c.writer = content.len();
        drop(c);
        buf
    }

    /// Fixed-capacity buffer, as handed down by hosts that use pooled
    /// allocations. Writes beyond `max_capacity` fail instead of growing.
    pub fn fixed(content: &[u8], max_capacity: usize) -> Self {
        let buf = Self::from_bytes_mut(BytesMut::from(content), max_capacity, None);
        let mut c = buf.cursors.lock().unwrap_or_else(|e| e.into_inner());
        c.writer = content.len();
        drop(c);
        buf
    }

    pub(crate) fn from_bytes_mut(data: BytesMut, max_capacity: usize, pool: Option<PoolHandle>) -> Self {
        ByteBuf {
            storage: Arc::new(Storage {
                data: Mutex::new(data),
                refs: AtomicUsize::new(1),
                max_capacity,
                pool,
            }),
            cursors: Arc::new(Mutex::new(Cursors {
                reader: 0,
                writer: 0,
                marked_reader: 0,
                marked_writer: 0,
            })),
        }
    }

    fn guard(&self) -> Result<()> {
        if self.storage.refs.load(Ordering::Acquire) == 0 {
            return Err(ProtocolError::BufferReleased);
        }
        Ok(())
    }

    fn cursors(&self) -> std::sync::MutexGuard<'_, Cursors> {
        self.cursors.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn data(&self) -> std::sync::MutexGuard<'_, BytesMut> {
        self.storage.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- capacity and indices ----

    pub fn capacity(&self) -> Result<usize> {
        self.guard()?;
        Ok(self.data().len())
    }

    /// Resize the storage. Shrinking clamps both cursors.
    pub fn set_capacity(&self, capacity: usize) -> Result<()> {
        self.guard()?;
        if capacity > self.storage.max_capacity {
            return Err(ProtocolError::CapacityExceeded {
                requested: capacity,
                max: self.storage.max_capacity,
            });
        }
        let mut c = self.cursors();
        self.data().resize(capacity, 0);
        c.writer = c.writer.min(capacity);
        c.reader = c.reader.min(c.writer);
        Ok(())
    }

    pub fn max_capacity(&self) -> Result<usize> {
        self.guard()?;
        Ok(self.storage.max_capacity)
    }

    /// Whether the rewrite path may clear and rewrite in place.
    pub fn is_growable(&self) -> Result<bool> {
        self.guard()?;
        Ok(self.storage.max_capacity == usize::MAX)
    }

    pub fn reader_index(&self) -> Result<usize> {
        self.guard()?;
        Ok(self.cursors().reader)
    }

    pub fn set_reader_index(&self, index: usize) -> Result<()> {
        self.guard()?;
        let mut c = self.cursors();
        if index > c.writer {
            return Err(ProtocolError::BufferUnderflow {
                needed: index,
                available: c.writer,
            });
        }
        c.reader = index;
        Ok(())
    }

    pub fn writer_index(&self) -> Result<usize> {
        self.guard()?;
        Ok(self.cursors().writer)
    }

    pub fn set_writer_index(&self, index: usize) -> Result<()> {
        self.guard()?;
        let capacity = self.data().len();
        let mut c = self.cursors();
        if index < c.reader || index > capacity {
            return Err(ProtocolError::BufferUnderflow {
                needed: index,
                available: capacity,
            });
        }
        c.writer = index;
        Ok(())
    }

    pub fn mark_reader_index(&self) -> Result<()> {
        self.guard()?;
        let mut c = self.cursors();
        c.marked_reader = c.reader;
        Ok(())
    }

    pub fn reset_reader_index(&self) -> Result<()> {
        self.guard()?;
        let mut c = self.cursors();
        c.reader = c.marked_reader.min(c.writer);
        Ok(())
    }

    pub fn mark_writer_index(&self) -> Result<()> {
        self.guard()?;
        let mut c = self.cursors();
        c.marked_writer = c.writer;
        Ok(())
    }

    pub fn reset_writer_index(&self) -> Result<()> {
        self.guard()?;
        let mut c = self.cursors();
        c.writer = c.marked_writer.max(c.reader);
        Ok(())
    }

    pub fn readable_bytes(&self) -> Result<usize> {
        self.guard()?;
        let c = self.cursors();
        Ok(c.writer - c.reader)
    }

    pub fn writable_bytes(&self) -> Result<usize> {
        self.guard()?;
        let capacity = self.data().len();
        Ok(capacity - self.cursors().writer)
    }

    pub fn is_readable(&self) -> Result<bool> {
        Ok(self.readable_bytes()? > 0)
    }

    /// Drop all content: both cursors back to zero. The pipeline's CANCELLED
    /// terminal state; downstream observes an empty, non-error buffer.
    pub fn clear(&self) -> Result<()> {
        self.guard()?;
        let mut c = self.cursors();
        c.reader = 0;
        c.writer = 0;
        Ok(())
    }

    pub fn skip_bytes(&self, n: usize) -> Result<()> {
        self.guard()?;
        let mut c = self.cursors();
        let available = c.writer - c.reader;
        if n > available {
            return Err(ProtocolError::BufferUnderflow {
                needed: n,
                available,
            });
        }
        c.reader += n;
        Ok(())
    }

    // ---- read side (big-endian wire values) ----

    fn take(&self, n: usize) -> Result<(usize, std::sync::MutexGuard<'_, BytesMut>)> {
        self.guard()?;
        let mut c = self.cursors();
        let available = c.writer - c.reader;
        if n > available {
            return Err(ProtocolError::BufferUnderflow {
                needed: n,
                available,
            });
        }
        let at = c.reader;
        c.reader += n;
        drop(c);
        Ok((at, self.data()))
    }

    pub fn read_u8(&self) -> Result<u8> {
        let (at, data) = self.take(1)?;
        Ok(data[at])
    }

    pub fn read_i8(&self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&self) -> Result<i16> {
        let (at, data) = self.take(2)?;
        Ok(i16::from_be_bytes([data[at], data[at + 1]]))
    }

    pub fn read_u16(&self) -> Result<u16> {
        Ok(self.read_i16()? as u16)
    }

    /// 3-byte signed big-endian integer.
    pub fn read_medium(&self) -> Result<i32> {
        let (at, data) = self.take(3)?;
        let raw = ((data[at] as i32) << 16) | ((data[at + 1] as i32) << 8) | data[at + 2] as i32;
        // sign-extend from bit 23
        Ok((raw << 8) >> 8)
    }

    pub fn read_i32(&self) -> Result<i32> {
        let (at, data) = self.take(4)?;
        Ok(i32::from_be_bytes([
            data[at],
            data[at + 1],
            data[at + 2],
            data[at + 3],
        ]))
    }

    pub fn read_i64(&self) -> Result<i64> {
        let (at, data) = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&data[at..at + 8]);
        Ok(i64::from_be_bytes(raw))
    }

    pub fn read_f32(&self) -> Result<f32> {
        Ok(f32::from_bits(self.read_i32()? as u32))
    }

    pub fn read_f64(&self) -> Result<f64> {
        Ok(f64::from_bits(self.read_i64()? as u64))
    }

    pub fn read_bytes(&self, n: usize) -> Result<Vec<u8>> {
        let (at, data) = self.take(n)?;
        Ok(data[at..at + n].to_vec())
    }

    // ---- little-endian peeks for the VarInt fast path ----

    fn get_le(&self, index: usize, n: usize) -> Result<u32> {
        self.guard()?;
        let writer = self.cursors().writer;
        if index + n > writer {
            return Err(ProtocolError::BufferUnderflow {
                needed: index + n,
                available: writer,
            });
        }
        let data = self.data();
        let mut word = 0u32;
        for i in 0..n {
            word |= (data[index + i] as u32) << (8 * i);
        }
        Ok(word)
    }

    pub fn get_u16_le(&self, index: usize) -> Result<u32> {
        self.get_le(index, 2)
    }

    pub fn get_u24_le(&self, index: usize) -> Result<u32> {
        self.get_le(index, 3)
    }

    pub fn get_u32_le(&self, index: usize) -> Result<u32> {
        self.get_le(index, 4)
    }

    // ---- write side ----

    /// Make room for `n` more bytes at the writer index, growing the storage
    /// when allowed.
    fn ensure_writable(&self, n: usize) -> Result<(usize, std::sync::MutexGuard<'_, BytesMut>)> {
        self.guard()?;
        let mut c = self.cursors();
        let needed = c.writer + n;
        let mut data = self.data();
        if needed > data.len() {
            if needed > self.storage.max_capacity {
                return Err(ProtocolError::CapacityExceeded {
                    requested: needed,
                    max: self.storage.max_capacity,
                });
            }
            let grown = needed.max(data.len() * 2).min(self.storage.max_capacity);
            data.resize(grown, 0);
        }
        let at = c.writer;
        c.writer += n;
        Ok((at, data))
    }

    pub fn write_u8(&self, value: u8) -> Result<()> {
        let (at, mut data) = self.ensure_writable(1)?;
        data[at] = value;
        Ok(())
    }

    pub fn write_i8(&self, value: i8) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_bool(&self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_i16(&self, value: i16) -> Result<()> {
        let (at, mut data) = self.ensure_writable(2)?;
        data[at..at + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_u16(&self, value: u16) -> Result<()> {
        self.write_i16(value as i16)
    }

    /// 3-byte signed big-endian integer; the top byte of `value` is dropped.
    pub fn write_medium(&self, value: i32) -> Result<()> {
        let (at, mut data) = self.ensure_writable(3)?;
        data[at] = (value >> 16) as u8;
        data[at + 1] = (value >> 8) as u8;
        data[at + 2] = value as u8;
        Ok(())
    }

    pub fn write_i32(&self, value: i32) -> Result<()> {
        let (at, mut data) = self.ensure_writable(4)?;
        data[at..at + 4].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_i64(&self, value: i64) -> Result<()> {
        let (at, mut data) = self.ensure_writable(8)?;
        data[at..at + 8].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    pub fn write_f32(&self, value: f32) -> Result<()> {
        self.write_i32(value.to_bits() as i32)
    }

    pub fn write_f64(&self, value: f64) -> Result<()> {
        self.write_i64(value.to_bits() as i64)
    }

    pub fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        let (at, mut data) = self.ensure_writable(bytes.len())?;
        data[at..at + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    // ---- views and copies ----

    /// New view over the same storage and reference count, with independent
    /// cursors positioned like this buffer's.
    pub fn duplicate(&self) -> Result<ByteBuf> {
        self.guard()?;
        let c = *self.cursors();
        Ok(ByteBuf {
            storage: Arc::clone(&self.storage),
            cursors: Arc::new(Mutex::new(c)),
        })
    }

    /// View over `[index, index + length)` of the same storage. The view's
    /// lifetime is independent of this handle unless explicitly retained.
    pub fn slice(&self, index: usize, length: usize) -> Result<ByteBuf> {
        self.guard()?;
        let writer = self.cursors().writer;
        if index + length > writer {
            return Err(ProtocolError::BufferUnderflow {
                needed: index + length,
                available: writer,
            });
        }
        Ok(ByteBuf {
            storage: Arc::clone(&self.storage),
            cursors: Arc::new(Mutex::new(Cursors {
                reader: index,
                writer: index + length,
                marked_reader: index,
                marked_writer: index + length,
            })),
        })
    }

    /// Independent copy of the readable region; refcount starts at 1.
    pub fn copy(&self) -> Result<ByteBuf> {
        let c = *self.cursors();
        self.guard()?;
        let data = self.data();
        Ok(ByteBuf::from_slice(&data[c.reader..c.writer]))
    }

    /// Snapshot of the readable bytes without advancing the reader cursor.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        self.guard()?;
        let c = *self.cursors();
        let data = self.data();
        Ok(data[c.reader..c.writer].to_vec())
    }

    // ---- reference counting ----

    /// Extend shared access by one reference. Returns the same logical buffer.
    pub fn retain(&self) -> Result<ByteBuf> {
        let mut refs = self.storage.refs.load(Ordering::Acquire);
        loop {
            if refs == 0 {
                return Err(ProtocolError::BufferReleased);
            }
            match self.storage.refs.compare_exchange_weak(
                refs,
                refs + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(self.clone()),
                Err(actual) => refs = actual,
            }
        }
    }

    /// Drop one reference. Returns `true` when the backing storage was freed;
    /// any further access is then an error. Releasing past zero is a
    /// [`ProtocolError::DoubleRelease`].
    pub fn release(&self) -> Result<bool> {
        let mut refs = self.storage.refs.load(Ordering::Acquire);
        loop {
            if refs == 0 {
                return Err(ProtocolError::DoubleRelease);
            }
            match self.storage.refs.compare_exchange_weak(
                refs,
                refs - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => refs = actual,
            }
        }
        if refs == 1 {
            // last reference gone: free the storage, handing pooled backing
            // memory back to its pool
            let freed = std::mem::take(&mut *self.data());
            if let Some(pool) = &self.storage.pool {
                if freed.capacity() <= crate::utils::buffer_pool::MAX_POOLED_CAPACITY {
                    let mut pool = pool.lock().unwrap_or_else(|e| e.into_inner());
                    pool.push(freed);
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    pub fn ref_cnt(&self) -> usize {
        self.storage.refs.load(Ordering::Acquire)
    }
}

impl Clone for ByteBuf {
    /// Shares storage *and* cursors: both handles are the same logical
    /// buffer. Does not touch the reference count; use [`ByteBuf::retain`]
    /// to extend ownership.
    fn clone(&self) -> Self {
        ByteBuf {
            storage: Arc::clone(&self.storage),
            cursors: Arc::clone(&self.cursors),
        }
    }
}

impl Default for ByteBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ByteBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = *self.cursors();
        f.debug_struct("ByteBuf")
            .field("reader", &c.reader)
            .field("writer", &c.writer)
            .field("refs", &self.ref_cnt())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrip_big_endian() {
        let buf = ByteBuf::new();
        buf.write_u8(0xAB).unwrap();
        buf.write_i16(-2).unwrap();
        buf.write_medium(-3).unwrap();
        buf.write_i32(0x0102_0304).unwrap();
        buf.write_i64(-5).unwrap();
        buf.write_f32(1.5).unwrap();
        buf.write_f64(-2.25).unwrap();

        assert_eq!(buf.read_u8().unwrap(), 0xAB);
        assert_eq!(buf.read_i16().unwrap(), -2);
        assert_eq!(buf.read_medium().unwrap(), -3);
        assert_eq!(buf.read_i32().unwrap(), 0x0102_0304);
        assert_eq!(buf.read_i64().unwrap(), -5);
        assert_eq!(buf.read_f32().unwrap(), 1.5);
        assert_eq!(buf.read_f64().unwrap(), -2.25);
        assert!(!buf.is_readable().unwrap());
    }

    #[test]
    fn underflow_is_reported_not_garbage() {
        let buf = ByteBuf::from_slice(&[1, 2]);
        let err = buf.read_i32().unwrap_err();
        assert!(matches!(err, ProtocolError::BufferUnderflow { .. }));
        // cursor untouched by the failed read
        assert_eq!(buf.reader_index().unwrap(), 0);
    }

    #[test]
    fn fixed_capacity_rejects_overgrowth() {
        let buf = ByteBuf::fixed(&[0; 4], 4);
        buf.set_writer_index(4).unwrap();
        let err = buf.write_u8(1).unwrap_err();
        assert!(matches!(err, ProtocolError::CapacityExceeded { .. }));
        assert!(!buf.is_growable().unwrap());
    }

    #[test]
    fn release_then_access_fails() {
        let buf = ByteBuf::from_slice(&[1, 2, 3]);
        assert_eq!(buf.ref_cnt(), 1);
        assert!(buf.release().unwrap());
        assert!(matches!(
            buf.read_u8().unwrap_err(),
            ProtocolError::BufferReleased
        ));
        assert!(matches!(
            buf.release().unwrap_err(),
            ProtocolError::DoubleRelease
        ));
    }

    #[test]
    fn retain_release_accounting() {
        let buf = ByteBuf::from_slice(&[9]);
        let extra = buf.retain().unwrap();
        assert_eq!(buf.ref_cnt(), 2);
        assert!(!extra.release().unwrap());
        assert_eq!(buf.read_u8().unwrap(), 9);
        assert!(buf.release().unwrap());
    }

    #[test]
    fn duplicate_shares_storage_with_independent_cursors() {
        let buf = ByteBuf::from_slice(&[1, 2, 3, 4]);
        let dup = buf.duplicate().unwrap();
        assert_eq!(buf.read_u8().unwrap(), 1);
        // the duplicate still starts at index 0
        assert_eq!(dup.read_u8().unwrap(), 1);
        assert_eq!(dup.read_u8().unwrap(), 2);
        assert_eq!(buf.reader_index().unwrap(), 1);
    }

    #[test]
    fn slice_bounds_readable_region() {
        let buf = ByteBuf::from_slice(&[1, 2, 3, 4, 5]);
        let s = buf.slice(1, 3).unwrap();
        assert_eq!(s.to_vec().unwrap(), vec![2, 3, 4]);
        assert!(buf.slice(3, 5).is_err());
    }

    #[test]
    fn mark_and_reset_reader() {
        let buf = ByteBuf::from_slice(&[1, 2, 3]);
        buf.read_u8().unwrap();
        buf.mark_reader_index().unwrap();
        buf.read_u8().unwrap();
        buf.reset_reader_index().unwrap();
        assert_eq!(buf.read_u8().unwrap(), 2);
    }

    #[test]
    fn clear_leaves_empty_readable_buffer() {
        let buf = ByteBuf::from_slice(&[1, 2, 3]);
        buf.clear().unwrap();
        assert_eq!(buf.readable_bytes().unwrap(), 0);
        // still alive, not released
        assert_eq!(buf.ref_cnt(), 1);
        buf.write_u8(7).unwrap();
        assert_eq!(buf.read_u8().unwrap(), 7);
    }
}
