//! Per-filesystem path index.
//!
//! A [`PathTree`] maps segment paths such as `9q8y/17901` to the blocks stored
//! under them. Trees persist to a plain-text index log (see [`log`]) that can
//! be appended to and replayed on startup.

pub mod log;
mod node;
mod tree;

pub use log::{deserialize, deserialize_records, load_log, save_log, serialize_all};
pub use node::{BlockInfo, NodeId, PathNode};
pub use tree::{PATH_SEPARATOR, PathTree, ROOT_ID};
