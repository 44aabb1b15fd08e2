//! # Packet Events and Listener Dispatch
//!
//! One [`PacketEvent`] is created per intercepted buffer. Listeners run
//! synchronously, in priority order, inside the connection's event-loop turn;
//! they may decode the packet through a wrapper, replace its body, cancel the
//! event, or queue post-processing tasks that run after the pipeline decision
//! is made.
//!
//! A listener error is caught at the dispatch boundary, logged with the
//! owning user's context, and never aborts the remaining listeners or
//! sibling connections.

use crate::core::buffer::ByteBuf;
use crate::core::wrapper::{PacketBody, PacketWrapper};
use crate::error::{ProtocolError, Result};
use crate::protocol::connection::User;
use crate::protocol::version::{ClientVersion, ProtocolVersion};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Which side of the connection produced the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketSide {
    /// Serverbound: sent by the game client.
    Client,
    /// Clientbound: sent by the server.
    Server,
}

/// Dispatch order for listeners; higher priorities observe the event later
/// and therefore have the last word on its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ListenerPriority {
    Lowest,
    Low,
    Normal,
    High,
    Highest,
    /// Observes the final state; should not mutate.
    Monitor,
}

/// Object-safe re-encoder for a decoded packet body, stored on the event as
/// the "last used wrapper" back-reference.
pub(crate) trait BodyEncoder: Send {
    fn encode(&self, wrapper: &mut PacketWrapper) -> Result<()>;
}

impl<B: PacketBody + Send> BodyEncoder for B {
    fn encode(&self, wrapper: &mut PacketWrapper) -> Result<()> {
        self.write(wrapper)
    }
}

type PostTask = Box<dyn FnOnce() -> Result<()> + Send>;

/// Context for one intercepted packet: the buffer, the resolved versions, the
/// packet id, cancellation state, and the body a listener left behind for
/// re-serialization. Created per packet, destroyed once the interception step
/// completes.
pub struct PacketEvent {
    side: PacketSide,
    user: Arc<User>,
    server_version: ProtocolVersion,
    client_version: ClientVersion,
    packet_id: i32,
    buffer: ByteBuf,
    /// Reader index at the start of the packet body (just past the id).
    content_start: usize,
    cancelled: bool,
    last_used_wrapper: Option<Box<dyn BodyEncoder>>,
    post_tasks: Vec<PostTask>,
}

impl PacketEvent {
    pub(crate) fn new(
        side: PacketSide,
        user: Arc<User>,
        packet_id: i32,
        buffer: ByteBuf,
        content_start: usize,
    ) -> Self {
        let server_version = user.server_version();
        let client_version = user.client_version();
        PacketEvent {
            side,
            user,
            server_version,
            client_version,
            packet_id,
            buffer,
            content_start,
            cancelled: false,
            last_used_wrapper: None,
            post_tasks: Vec::new(),
        }
    }

    pub fn side(&self) -> PacketSide {
        self.side
    }

    pub fn user(&self) -> &Arc<User> {
        &self.user
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

    pub fn buffer(&self) -> &ByteBuf {
        &self.buffer
    }

    pub(crate) fn set_buffer(&mut self, buffer: ByteBuf) {
        self.buffer = buffer;
    }

    pub(crate) fn content_start(&self) -> usize {
        self.content_start
    }

    /// Decode the packet body. The reader cursor is positioned at the body
    /// start first, so repeated decodes by independent listeners see the same
    /// bytes.
    pub fn read_packet<B: PacketBody>(&mut self) -> Result<B> {
        self.buffer.set_reader_index(self.content_start)?;
        let mut wrapper = PacketWrapper::for_decode(
            self.buffer.clone(),
            self.server_version,
            self.client_version,
            self.packet_id,
        );
        B::read(&mut wrapper)
    }

    /// Replace the packet's body. The pipeline re-serializes the event from
    /// this body instead of passing the original bytes through.
    pub fn rewrite_packet<B: PacketBody + Send + 'static>(&mut self, body: B) {
        self.last_used_wrapper = Some(Box::new(body));
    }

    /// Whether any listener left a body behind for re-serialization.
    pub fn is_mutated(&self) -> bool {
        self.last_used_wrapper.is_some()
    }

    pub(crate) fn take_last_used(&mut self) -> Option<Box<dyn BodyEncoder>> {
        self.last_used_wrapper.take()
    }

    /// Cancel the event: the buffer's content will be cleared and nothing is
    /// forwarded. Immediate and synchronous; later listeners still run and
    /// may un-cancel.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Queue a callback to run after the pipeline decision, in registration
    /// order.
    pub fn add_post_task(&mut self, task: impl FnOnce() -> Result<()> + Send + 'static) {
        self.post_tasks.push(Box::new(task));
    }

    pub fn has_post_tasks(&self) -> bool {
        !self.post_tasks.is_empty()
    }

    pub(crate) fn take_post_tasks(&mut self) -> Vec<PostTask> {
        std::mem::take(&mut self.post_tasks)
    }
}

impl std::fmt::Debug for PacketEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketEvent")
            .field("side", &self.side)
            .field("packet_id", &self.packet_id)
            .field("user", &self.user.display_name())
            .field("cancelled", &self.cancelled)
            .field("mutated", &self.last_used_wrapper.is_some())
            .finish()
    }
}

/// A packet listener. Invoked inline on the connection's event loop; must not
/// block.
pub trait PacketListener: Send + Sync {
    fn name(&self) -> &str {
        "unnamed"
    }

    fn on_packet(&self, event: &mut PacketEvent) -> Result<()>;
}

impl<F> PacketListener for F
where
    F: Fn(&mut PacketEvent) -> Result<()> + Send + Sync,
{
    fn on_packet(&self, event: &mut PacketEvent) -> Result<()> {
        self(event)
    }
}

struct Registration {
    priority: ListenerPriority,
    listener: Arc<dyn PacketListener>,
}

/// Ordered synchronous dispatch of packet events to registered listeners.
pub struct EventManager {
    listeners: RwLock<Vec<Registration>>,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EventManager {
    pub fn new() -> Self {
        EventManager {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener. Listeners of equal priority run in registration
    /// order.
    pub fn register(&self, priority: ListenerPriority, listener: Arc<dyn PacketListener>) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.push(Registration { priority, listener });
        // stable: preserves registration order within one priority
        listeners.sort_by_key(|r| r.priority);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Invoke every listener, in priority order, synchronously. Before each
    /// listener the reader cursor is put back at the packet body so each one
    /// observes the same starting state. Listener errors are logged with the
    /// owning user's context and do not stop dispatch; the error count is
    /// returned for accounting.
    pub fn call_event(&self, event: &mut PacketEvent) -> usize {
        let mut errors = 0;
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        for registration in listeners.iter() {
            if let Err(error) = event.buffer().set_reader_index(event.content_start()) {
                warn!(
                    user = %event.user(),
                    packet_id = event.packet_id(),
                    %error,
                    "could not reset reader index before listener"
                );
                return errors + 1;
            }
            if let Err(cause) = registration.listener.on_packet(event) {
                let error = ProtocolError::ListenerError {
                    listener: registration.listener.name().to_string(),
                    message: cause.to_string(),
                };
                warn!(
                    user = %event.user(),
                    packet_id = event.packet_id(),
                    %error,
                    "packet listener failed"
                );
                errors += 1;
            }
        }
        errors
    }
}
