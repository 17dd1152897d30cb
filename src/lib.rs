//! Indexing and scatter-gather coordination core for a distributed
//! spatio-temporal data store.
//!
//! Blocks are located by geohash cells, indexed per filesystem in a
//! persistable path tree, and queried across nodes by fanning a request out
//! and merging the replies once.
//!
//! ```rust
//! use geoshard::prelude::*;
//! use bytes::Bytes;
//!
//! let node = StorageNode::memory()?;
//! node.create_filesystem("roads")?;
//! node.store_block(
//!     "roads",
//!     &Coordinate::new(37.7749, -122.4194),
//!     1_700_000_000,
//!     "sf-1",
//!     Bytes::from_static(b"payload"),
//! )?;
//!
//! let area = GeoPolygon::from_bbox(&BoundingBox::new(37.5, 38.0, -122.6, -122.2));
//! let blocks = node.query("roads", &area, &TimeRange::all())?;
//! assert_eq!(blocks[0].path, "9q8y/1699920000");
//! # Ok::<(), geoshard::GeoshardError>(())
//! ```

pub mod config;
pub mod error;
pub mod geohash;
pub mod index;
pub mod node;
pub mod protocol;
pub mod scatter;
pub mod storage;

pub use config::{Config, ScatterConfig};
pub use error::{GeoshardError, Result};
pub use index::{BlockInfo, NodeId, PathTree};
pub use node::StorageNode;
pub use protocol::{BlockRef, Envelope, Message, MetaKind, Request, Response, ResultKind, TimeRange};
pub use scatter::{ScatterGather, Session};
pub use storage::{BlockStore, MemoryBlockStore, StorageStats};

pub use geoshard_types::{BoundingBox, Coordinate, GeoPolygon};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoshardError, Result};

    pub use crate::{BoundingBox, Coordinate, GeoPolygon};

    pub use crate::geohash::{self, Direction};

    pub use crate::{Config, ScatterConfig};

    pub use crate::{BlockRef, MetaKind, Request, Response, ResultKind, TimeRange};

    pub use crate::{PathTree, StorageNode};

    pub use crate::scatter::{
        JsonCodec, MemoryNetwork, MergeByKind, NodeAddr, NodeDirectory, PrefixDirectory,
        ScatterGather, Transport,
    };

    pub use std::time::Duration;
}
