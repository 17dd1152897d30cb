//! Seams to the network and to partition ownership.

use crate::error::Result;
use bytes::Bytes;
use futures::future::BoxFuture;
use geoshard_types::GeoPolygon;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Address of a storage node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddr(String);

impl NodeAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddr {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

impl From<String> for NodeAddr {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

/// Receive channel on a node. Scatter sessions use their own id as channel.
pub type Channel = Uuid;

/// Channel on which storage nodes accept requests.
pub const SERVICE_CHANNEL: Channel = Uuid::nil();

/// A channel on a specific node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub node: NodeAddr,
    pub channel: Channel,
}

impl Destination {
    pub fn new(node: NodeAddr, channel: Channel) -> Self {
        Self { node, channel }
    }

    /// The request channel of `node`.
    pub fn service(node: NodeAddr) -> Self {
        Self::new(node, SERVICE_CHANNEL)
    }
}

/// Receiver of messages delivered to a registered channel.
pub trait ReplyHandler: 'static + Send + Sync {
    /// Called from a transport-owned context for every message delivered to
    /// the channel. `source` names the sender and the channel it expects
    /// answers on.
    fn on_message(&self, source: Destination, data: Bytes);
}

/// Trait-object [ReplyHandler].
pub type DynReplyHandler = Arc<dyn ReplyHandler>;

/// Fire-and-forget message transport.
pub trait Transport: 'static + Send + Sync + fmt::Debug {
    fn local_addr(&self) -> NodeAddr;

    /// Send `data` to `dest`, asking for answers on our `reply_to` channel.
    ///
    /// The returned future reports failures up to the hand-off to the
    /// network. An `Ok` does not mean the peer received the message.
    fn send(&self, dest: Destination, reply_to: Channel, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Deliver messages arriving on `channel` to `handler`, replacing any
    /// previous handler.
    fn register(&self, channel: Channel, handler: DynReplyHandler);

    /// Stop delivering on `channel`. Later arrivals are dropped.
    fn unregister(&self, channel: Channel);
}

/// Trait-object [Transport].
pub type DynTransport = Arc<dyn Transport>;

/// Resolves spatial keys to the nodes owning them.
pub trait NodeDirectory: Send + Sync {
    /// Nodes holding data for the cell `key`. May be empty.
    fn owners(&self, key: &str) -> Vec<NodeAddr>;
}

/// Deduplicated owners of every cell the polygon touches at `precision`.
pub fn targets_for_polygon(
    directory: &dyn NodeDirectory,
    polygon: &GeoPolygon,
    precision: usize,
) -> Result<BTreeSet<NodeAddr>> {
    let cells = crate::geohash::polygon_to_cells(polygon, precision)?;
    Ok(cells.iter().flat_map(|cell| directory.owners(cell)).collect())
}
