//! The Mcom transport
//!
//! Composes endpoint resolution, the serializer, the multicast sender and
//! listener, and an ordered handler registry. `send` packs and ships one
//! value; `watch` drives the receive loop and fans every decoded message
//! out to the handlers in registration order.

use async_trait::async_trait;
use serde_json::Value;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;

use super::{
    resolve_group, Endpoint, McastConfig, MulticastListener, MulticastSender, RecvErrorPolicy,
    TransportError, TransportResult,
};
use crate::protocol::{FramingError, JsonZlibSerializer, Serializer, MESSAGE_SIZE_LIMIT};

/// Transport errors visible to callers of `send` and `watch`
#[derive(Error, Debug)]
pub enum McomError {
    #[error("packed message is {size} bytes, over the {limit}-byte datagram limit", limit = MESSAGE_SIZE_LIMIT)]
    DataSize {
        size: usize,
        /// The original value, kept for diagnostics
        value: Value,
    },

    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("no handlers registered")]
    NoHandlers,
}

pub type McomResult<T> = Result<T, McomError>;

/// What a handler sees of the transport: the endpoint it is bound to
#[derive(Debug, Clone, Copy)]
pub struct McomContext {
    endpoint: Endpoint,
}

impl McomContext {
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    #[cfg(test)]
    pub(crate) fn for_tests(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

/// An observer of inbound messages. Handlers are invoked synchronously on
/// the receive loop, in registration order, once per decoded message.
pub trait Handler: Send {
    fn handle(&mut self, ctx: &McomContext, sender: SocketAddr, message: &Value);
}

/// The outbound half of the transport, as a seam so tests can substitute
/// a recording fake for the real multicast socket
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: &[u8]) -> TransportResult<()>;
}

#[async_trait]
impl FrameSink for MulticastSender {
    async fn send_frame(&mut self, frame: &[u8]) -> TransportResult<()> {
        self.send(frame).await
    }
}

/// Requests termination of a running watch loop
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: mpsc::Sender<()>,
}

impl StopHandle {
    /// Ask the watch loop to exit after the current receive
    pub async fn stop(&self) {
        let _ = self.tx.send(()).await;
    }
}

/// IP multicast transport for small serialized messages
pub struct Mcom {
    context: McomContext,
    serializer: Box<dyn Serializer>,
    sink: Box<dyn FrameSink>,
    listener: MulticastListener,
    handlers: Vec<Box<dyn Handler>>,
    on_recv_error: RecvErrorPolicy,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl std::fmt::Debug for Mcom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mcom").finish_non_exhaustive()
    }
}

impl Mcom {
    /// Create a transport for `group_addr:port` with default settings
    pub async fn new(group_addr: &str, port: u16) -> McomResult<Self> {
        Self::with_config(group_addr, port, McastConfig::default()).await
    }

    /// Create a transport, resolving the group address. IPv6 groups are
    /// rejected here, before any socket exists.
    pub async fn with_config(
        group_addr: &str,
        port: u16,
        config: McastConfig,
    ) -> McomResult<Self> {
        let endpoint = resolve_group(group_addr, port).await?;

        let sender = MulticastSender::new(endpoint, config.clone());
        let listener = MulticastListener::new(endpoint, config.clone());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Ok(Self {
            context: McomContext { endpoint },
            serializer: Box::new(JsonZlibSerializer),
            sink: Box::new(sender),
            listener,
            handlers: Vec::new(),
            on_recv_error: config.on_recv_error,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Swap in a different serializer (must happen before any traffic)
    pub fn with_serializer(mut self, serializer: Box<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        self.context.endpoint
    }

    /// Register an observer. Handlers accumulate for the transport's
    /// lifetime; there is no removal.
    pub fn add_handler(&mut self, handler: Box<dyn Handler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// A handle that stops a running `watch` loop
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Pack and send one value as a single datagram. Fails with
    /// `DataSize` before touching the socket when the packed frame
    /// exceeds the limit.
    pub async fn send(&mut self, value: &Value) -> McomResult<()> {
        let frame = self.serializer.pack(value)?;

        if frame.len() > MESSAGE_SIZE_LIMIT {
            return Err(McomError::DataSize {
                size: frame.len(),
                value: value.clone(),
            });
        }

        self.sink.send_frame(&frame).await?;
        tracing::debug!("Sent {} bytes to {}", frame.len(), self.context.endpoint);
        Ok(())
    }

    /// Decode one inbound frame and dispatch it to every handler, in
    /// registration order, with identical arguments
    fn on_next_frame(&mut self, sender: SocketAddr, frame: &[u8]) -> McomResult<()> {
        let message = self.serializer.unpack(frame)?;

        for handler in self.handlers.iter_mut() {
            handler.handle(&self.context, sender, &message);
        }

        Ok(())
    }

    /// Join the group and receive until stopped.
    ///
    /// Returns `NoHandlers` when nothing is registered (listening with no
    /// observers is always a caller mistake). Receive and decode errors
    /// follow the configured policy; the default terminates the loop.
    pub async fn watch(&mut self) -> McomResult<()> {
        if self.handlers.is_empty() {
            return Err(McomError::NoHandlers);
        }

        self.listener.open().await?;

        loop {
            let received = tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    tracing::info!("Watch loop stopped");
                    return Ok(());
                }
                result = self.listener.recv() => result,
            };

            match received {
                Ok((sender, frame)) => {
                    if let Err(err) = self.on_next_frame(sender, &frame) {
                        match self.on_recv_error {
                            RecvErrorPolicy::Fatal => return Err(err),
                            RecvErrorPolicy::SkipAndLog => {
                                tracing::warn!("Dropping frame from {}: {}", sender, err);
                            }
                        }
                    }
                }
                Err(err) => match self.on_recv_error {
                    RecvErrorPolicy::Fatal => return Err(err.into()),
                    RecvErrorPolicy::SkipAndLog => {
                        tracing::warn!("Receive error: {}", err);
                    }
                },
            }
        }
    }
}
