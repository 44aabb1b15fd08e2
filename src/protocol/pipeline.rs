//! # Interception & Rewrite Pipeline
//!
//! Sits on the host channel's read/write path. For every inbound or outbound
//! buffer it builds a [`PacketEvent`], dispatches it to the registered
//! listeners, and then settles one of three terminal outcomes:
//!
//! ```text
//! RECEIVED(buffer) -> EVENT_DISPATCHED -> { MUTATED, CANCELLED, UNCHANGED }
//!                                             |          |           |
//!                                         REWRITTEN   CLEARED   PASSTHROUGH
//! ```
//!
//! - **CANCELLED**: the buffer's readable content is cleared entirely; the
//!   host observes an empty, non-error buffer.
//! - **UNCHANGED**: the reader index is reset to where it was before any
//!   listener observed the buffer and the original bytes pass through.
//! - **MUTATED**: the packet is re-serialized, in place when the buffer can
//!   grow, otherwise into a pool-drawn replacement that supersedes the
//!   original.
//!
//! Everything runs synchronously within the connection's event-loop turn, so
//! packets of one connection are always processed in strict arrival order.
//!
//! The [`CompressionOrderGuard`] covers the one known hazard: when the host
//! enables connection-level compression after the interception stages are
//! installed, the stages must be relocated relative to the
//! compressor/decompressor, and a buffer already mid-flight at that moment is
//! decompressed, processed, and recompressed instead of dropped.

use crate::core::buffer::ByteBuf;
use crate::core::varint;
use crate::core::wrapper::PacketWrapper;
use crate::error::{ProtocolError, Result};
use crate::protocol::connection::User;
use crate::protocol::event::{EventManager, PacketEvent, PacketSide};
use crate::utils::buffer_pool::BufferPool;
use crate::utils::compression::CompressionStage;
use crate::utils::metrics::Metrics;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Stage name of the inbound interceptor in the host pipeline.
pub const DECODER_STAGE: &str = "packet-intercept-decoder";
/// Stage name of the outbound interceptor in the host pipeline.
pub const ENCODER_STAGE: &str = "packet-intercept-encoder";
/// Host stage names for the compressor pair.
pub const COMPRESS_STAGE: &str = "compress";
pub const DECOMPRESS_STAGE: &str = "decompress";

/// The per-process interception pipeline. Stateless with respect to
/// individual connections; all per-connection state lives on the buffers and
/// users handed in by the host.
pub struct InterceptPipeline {
    events: Arc<EventManager>,
    pool: BufferPool,
    metrics: Arc<Metrics>,
}

impl InterceptPipeline {
    pub fn new(events: Arc<EventManager>) -> Self {
        InterceptPipeline {
            events,
            pool: BufferPool::default(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_pool(mut self, pool: BufferPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Intercept one packet buffer. The buffer must be positioned at the
    /// VarInt packet id; the pipeline owns the reference the caller retained
    /// for it. Returns `None` for an empty buffer.
    ///
    /// After the call the event's buffer holds the terminal outcome: the
    /// original bytes (pass-through), the rewritten bytes, or no readable
    /// bytes at all (cancelled). A malformed packet yields an error carrying
    /// the user context; the caller drops that packet and keeps the
    /// connection.
    pub fn handle_packet(
        &self,
        user: &Arc<User>,
        buffer: ByteBuf,
        side: PacketSide,
    ) -> Result<Option<PacketEvent>> {
        if !buffer.is_readable()? {
            return Ok(None);
        }
        self.metrics.packets_intercepted.fetch_add(1, Ordering::Relaxed);

        // captured before any listener observes the buffer
        let pre_process_index = buffer.reader_index()?;

        let packet_id = varint::read_var_int(&buffer).map_err(|e| {
            self.metrics.packets_dropped.fetch_add(1, Ordering::Relaxed);
            e.with_packet_context(user.display_name(), -1)
        })?;
        let content_start = buffer.reader_index()?;
        trace!(user = %user, packet_id, ?side, "packet intercepted");

        let mut event = PacketEvent::new(side, Arc::clone(user), packet_id, buffer, content_start);
        let listener_errors = self.events.call_event(&mut event);
        if listener_errors > 0 {
            self.metrics
                .listener_errors
                .fetch_add(listener_errors as u64, Ordering::Relaxed);
        }

        self.try_rewrite_buffer(&mut event, pre_process_index)
            .map_err(|e| {
                self.metrics.packets_dropped.fetch_add(1, Ordering::Relaxed);
                e.with_packet_context(user.display_name(), packet_id)
            })?;

        // queued post tasks run after the pipeline decision, in registration
        // order; a failing task is attributed to this user only
        for task in event.take_post_tasks() {
            if let Err(error) = task() {
                warn!(user = %user, packet_id, %error, "post-processing task failed");
            }
        }

        Ok(Some(event))
    }

    /// Settle the terminal state for a dispatched event.
    fn try_rewrite_buffer(&self, event: &mut PacketEvent, pre_process_index: usize) -> Result<()> {
        if event.is_cancelled() {
            // completely clear packet data if the event got cancelled
            event.buffer().clear()?;
            self.metrics.packets_cancelled.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        // if no listener left a body behind, reset the reader index and pass
        // the original buffer through untouched
        let Some(body) = event.take_last_used() else {
            event.buffer().set_reader_index(pre_process_index)?;
            self.metrics.packets_passed_through.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        // hosts that pass down pooled buffers disallow writing past the
        // initial capacity; those get re-serialized into a fresh buffer
        let target = if event.buffer().is_growable()? {
            let target = event.buffer().clone();
            target.clear()?;
            target
        } else {
            let original = event.buffer().clone();
            let replacement = self.pool.acquire(original.reader_index()?);
            replacement.clear()?;
            event.set_buffer(replacement.clone());
            // drop exactly the reference this interception held
            original.release()?;
            self.metrics.buffers_allocated.fetch_add(1, Ordering::Relaxed);
            self.metrics.buffers_released.fetch_add(1, Ordering::Relaxed);
            replacement
        };

        // write the packet id followed by the body's serialized fields
        let mut wrapper = PacketWrapper::for_decode(
            target,
            event.server_version(),
            event.client_version(),
            event.packet_id(),
        );
        wrapper.write_var_int(event.packet_id())?;
        body.encode(&mut wrapper)?;
        self.metrics.packets_rewritten.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Host-side view of the ordered stage list of one connection's processing
/// pipeline. The host maps this onto whatever its networking stack provides.
pub trait PipelineStages {
    /// Stage names in processing order.
    fn names(&self) -> Vec<String>;

    fn position(&self, stage: &str) -> Option<usize> {
        self.names().iter().position(|n| n == stage)
    }

    /// Remove `stage` and reinsert it immediately after `anchor`.
    fn relocate_after(&mut self, stage: &str, anchor: &str) -> Result<()>;
}

/// One-time, idempotent relocation of the interception stages relative to a
/// compressor that was installed after them. Connection-scoped: the host
/// keeps one guard per connection.
pub struct CompressionOrderGuard {
    stage: CompressionStage,
    handled: bool,
    metrics: Option<Arc<Metrics>>,
}

impl CompressionOrderGuard {
    pub fn new(stage: CompressionStage) -> Self {
        CompressionOrderGuard {
            stage,
            handled: false,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn count_relocation(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.compression_relocations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn handled(&self) -> bool {
        self.handled
    }

    /// Check the stage order and fix it if compression ended up downstream of
    /// the interceptors. `buffer` is the frame currently mid-flight; when a
    /// relocation happens it is already compressed and the decompressed
    /// packet bytes are returned for normal pipeline processing (the caller
    /// recompresses afterwards via [`Self::recompress`]).
    pub fn ensure_order(
        &mut self,
        stages: &mut dyn PipelineStages,
        buffer: &ByteBuf,
    ) -> Result<Option<ByteBuf>> {
        if self.handled {
            return Ok(None);
        }
        let Some(compress_at) = stages.position(COMPRESS_STAGE) else {
            // compression not negotiated yet
            return Ok(None);
        };
        let Some(encoder_at) = stages.position(ENCODER_STAGE) else {
            return Ok(None);
        };
        if compress_at <= encoder_at {
            // order already correct; nothing to do, ever again
            self.handled = true;
            return Ok(None);
        }

        // bad order: this frame was compressed before we saw it
        let plain = self.stage.decode_frame(buffer)?;
        stages.relocate_after(DECODER_STAGE, DECOMPRESS_STAGE)?;
        stages.relocate_after(ENCODER_STAGE, COMPRESS_STAGE)?;
        self.handled = true;
        self.count_relocation();
        debug!("interception stages relocated around the compressor");
        Ok(Some(plain))
    }

    /// Recompress packet bytes that were decompressed by [`Self::ensure_order`].
    pub fn recompress(&self, plain: &ByteBuf) -> Result<ByteBuf> {
        self.stage.encode_frame(plain)
    }
}

/// Convenience guard against double processing: some hosts signal the
/// compression change through an out-of-band event rather than by observing
/// frames. They call this with the guard and their stage list once.
pub fn relocate_on_compression_enabled(
    guard: &mut CompressionOrderGuard,
    stages: &mut dyn PipelineStages,
) -> Result<bool> {
    if guard.handled {
        return Ok(false);
    }
    if stages.position(COMPRESS_STAGE).is_none() {
        return Err(ProtocolError::Custom(
            "compression enabled signal without a compress stage".to_string(),
        ));
    }
    stages.relocate_after(DECODER_STAGE, DECOMPRESS_STAGE)?;
    stages.relocate_after(ENCODER_STAGE, COMPRESS_STAGE)?;
    guard.handled = true;
    guard.count_relocation();
    Ok(true)
}
