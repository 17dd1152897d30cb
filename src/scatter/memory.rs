//! In-process transport.
//!
//! Not a production transport: every node lives in the same process and
//! messages are delivered on Tokio tasks. Useful for tests and for running a
//! whole cluster inside one binary.

use super::transport::{Channel, Destination, DynReplyHandler, NodeAddr, Transport};
use crate::error::{GeoshardError, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

type Handlers = Arc<Mutex<FxHashMap<Channel, DynReplyHandler>>>;

/// Registry of the nodes reachable from each other.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    nodes: Arc<Mutex<FxHashMap<NodeAddr, Handlers>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node at `addr`. Rejoining an address starts it with no handlers.
    pub fn join(&self, addr: impl Into<NodeAddr>) -> Arc<MemoryTransport> {
        let addr = addr.into();
        let handlers: Handlers = Arc::default();
        self.nodes.lock().insert(addr.clone(), handlers.clone());
        Arc::new(MemoryTransport {
            addr,
            network: self.clone(),
            handlers,
        })
    }

    /// Detach a node. Later sends to it fail.
    pub fn leave(&self, addr: &NodeAddr) {
        self.nodes.lock().remove(addr);
    }

    pub fn contains(&self, addr: &NodeAddr) -> bool {
        self.nodes.lock().contains_key(addr)
    }

    fn handler(&self, dest: &Destination) -> Option<Option<DynReplyHandler>> {
        let handlers = self.nodes.lock().get(&dest.node).cloned()?;
        let handler = handlers.lock().get(&dest.channel).cloned();
        Some(handler)
    }
}

impl fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<NodeAddr> = self.nodes.lock().keys().cloned().collect();
        nodes.sort();
        f.debug_struct("MemoryNetwork").field("nodes", &nodes).finish()
    }
}

/// One node's endpoint on a [`MemoryNetwork`].
pub struct MemoryTransport {
    addr: NodeAddr,
    network: MemoryNetwork,
    handlers: Handlers,
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("addr", &self.addr)
            .field("channels", &self.handlers.lock().len())
            .finish()
    }
}

impl Transport for MemoryTransport {
    fn local_addr(&self) -> NodeAddr {
        self.addr.clone()
    }

    fn send(&self, dest: Destination, reply_to: Channel, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let handler = self.network.handler(&dest).ok_or_else(|| {
                GeoshardError::Transport(format!("unknown node {}", dest.node))
            })?;

            let Some(handler) = handler else {
                log::debug!(
                    "Dropping message for unregistered channel {} on {}",
                    dest.channel,
                    dest.node
                );
                return Ok(());
            };

            let source = Destination::new(self.addr.clone(), reply_to);
            tokio::spawn(async move {
                handler.on_message(source, data);
            });
            Ok(())
        })
    }

    fn register(&self, channel: Channel, handler: DynReplyHandler) {
        self.handlers.lock().insert(channel, handler);
    }

    fn unregister(&self, channel: Channel) {
        self.handlers.lock().remove(&channel);
    }
}
