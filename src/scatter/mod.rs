//! Distributed request fan-out and reply aggregation.
//!
//! [`ScatterGather`] sends a request to every node owning part of the queried
//! area and folds the replies with a [`Reducer`]. Network access sits behind
//! [`Transport`] and partition ownership behind [`NodeDirectory`]; messages
//! cross the wire as bytes produced by a [`Codec`].

mod codec;
mod coordinator;
mod directory;
mod memory;
mod reducer;
mod transport;

#[cfg(feature = "bincode")]
pub use codec::BincodeCodec;
pub use codec::{Codec, DynCodec, JsonCodec};
pub use coordinator::{ScatterGather, Session};
pub use directory::PrefixDirectory;
pub use memory::{MemoryNetwork, MemoryTransport};
pub use reducer::{FnReducer, MergeByKind, Reducer, reducer_fn};
pub use transport::{
    Channel, Destination, DynReplyHandler, DynTransport, NodeAddr, NodeDirectory, ReplyHandler,
    SERVICE_CHANNEL, Transport, targets_for_polygon,
};
