//! Storage node: local block storage, per-filesystem path trees, and request
//! handling.
//!
//! Blocks are filed under a two-segment path: the geohash of the block's
//! location at the configured spatial precision, then the start of its
//! temporal bucket in epoch seconds. A query resolves its polygon to cells at
//! the same precision and walks only the matching branches.

use crate::config::Config;
use crate::error::{GeoshardError, Result};
use crate::geohash;
use crate::index::{self, PathTree};
use crate::protocol::{BlockRef, Envelope, Message, MetaKind, Request, Response, TimeRange};
use crate::scatter::{Destination, DynCodec, DynTransport, ReplyHandler, SERVICE_CHANNEL, Transport};
use crate::storage::{BlockStore, MemoryBlockStore};
use bytes::Bytes;
use geoshard_types::{Coordinate, GeoPolygon};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Weak};

/// A node holding blocks for any number of filesystems.
///
/// # Thread Safety
///
/// All operations take `&self`. Path trees sit behind one read-write lock, so
/// inserts are serialized while queries run concurrently. Locks are always
/// taken trees first, then blocks.
pub struct StorageNode<B = MemoryBlockStore> {
    config: Config,
    trees: RwLock<BTreeMap<String, PathTree>>,
    blocks: RwLock<B>,
}

impl StorageNode<MemoryBlockStore> {
    /// Node with in-memory block storage and default configuration.
    pub fn memory() -> Result<Self> {
        Self::memory_with_config(Config::default())
    }

    pub fn memory_with_config(config: Config) -> Result<Self> {
        Self::with_store(config, MemoryBlockStore::new())
    }
}

impl<B: BlockStore + 'static> StorageNode<B> {
    pub fn with_store(config: Config, store: B) -> Result<Self> {
        config.validate().map_err(GeoshardError::InvalidInput)?;
        Ok(Self {
            config,
            trees: RwLock::new(BTreeMap::new()),
            blocks: RwLock::new(store),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create an empty filesystem. Returns `false` if it already exists.
    pub fn create_filesystem(&self, name: &str) -> Result<bool> {
        let mut trees = self.trees.write();
        if trees.contains_key(name) {
            return Ok(false);
        }
        let tree = PathTree::new(name)?;
        trees.insert(name.to_string(), tree);
        log::info!("Created filesystem '{}'", name);
        Ok(true)
    }

    pub fn has_filesystem(&self, name: &str) -> bool {
        self.trees.read().contains_key(name)
    }

    pub fn filesystems(&self) -> Vec<String> {
        self.trees.read().keys().cloned().collect()
    }

    /// Run `f` against the tree of `filesystem`, if it exists.
    pub fn with_tree<R>(&self, filesystem: &str, f: impl FnOnce(&PathTree) -> R) -> Option<R> {
        self.trees.read().get(filesystem).map(f)
    }

    /// Path segments a block at `coordinate` and `timestamp` is filed under.
    pub fn segments_for(&self, coordinate: &Coordinate, timestamp: u64) -> Result<[String; 2]> {
        if !coordinate.is_finite() {
            return Err(GeoshardError::InvalidInput(format!(
                "block coordinate is not finite: {coordinate:?}"
            )));
        }
        let spatial = geohash::encode_coordinate(coordinate, self.config.spatial_precision)?;
        let width = self.config.temporal_bucket_secs();
        let bucket = timestamp - timestamp % width;
        Ok([spatial, bucket.to_string()])
    }

    /// Write a block and index it under its spatial and temporal segments.
    ///
    /// # Errors
    ///
    /// [`GeoshardError::UnknownFilesystem`] if the filesystem was never
    /// created, and [`GeoshardError::InvalidInput`] for a non-finite location,
    /// a block name the index cannot hold, or a name already stored in the
    /// filesystem. Nothing is stored on error.
    pub fn store_block(
        &self,
        filesystem: &str,
        coordinate: &Coordinate,
        timestamp: u64,
        block_name: &str,
        data: Bytes,
    ) -> Result<BlockRef> {
        let segments = self.segments_for(coordinate, timestamp)?;
        let size = data.len() as u64;
        let key = block_key(filesystem, block_name);

        let mut trees = self.trees.write();
        let tree = trees
            .get_mut(filesystem)
            .ok_or_else(|| GeoshardError::UnknownFilesystem(filesystem.to_string()))?;

        let mut blocks = self.blocks.write();
        if blocks.contains(&key)? {
            return Err(GeoshardError::InvalidInput(format!(
                "block '{block_name}' is already stored in filesystem '{filesystem}'"
            )));
        }
        blocks.put(&key, data)?;
        if let Err(e) = tree.insert_path(&segments, block_name, size) {
            blocks.delete(&key)?;
            return Err(e);
        }

        let path = segments.join("/");
        log::debug!("Stored block {}/{}/{} ({} bytes)", filesystem, path, block_name, size);
        Ok(BlockRef {
            filesystem: filesystem.to_string(),
            path,
            block: block_name.to_string(),
            size,
        })
    }

    /// Bytes of a stored block.
    pub fn read_block(&self, filesystem: &str, block_name: &str) -> Result<Bytes> {
        self.blocks.read().read(&block_key(filesystem, block_name))
    }

    /// Blocks of `filesystem` whose cell meets `polygon` and whose temporal
    /// bucket overlaps `range`, in tree order.
    pub fn query(
        &self,
        filesystem: &str,
        polygon: &GeoPolygon,
        range: &TimeRange,
    ) -> Result<Vec<BlockRef>> {
        let cells = geohash::polygon_to_cells(polygon, self.config.spatial_precision)?;
        let width = self.config.temporal_bucket_secs();

        let trees = self.trees.read();
        let tree = trees
            .get(filesystem)
            .ok_or_else(|| GeoshardError::UnknownFilesystem(filesystem.to_string()))?;

        let mut matches = Vec::new();
        for &spatial in tree.children(tree.root()) {
            let Some(cell) = tree.node(spatial) else {
                continue;
            };
            if !cell_matches(cell.segment(), &cells) {
                continue;
            }
            for &temporal in tree.children(spatial) {
                let Some(bucket_node) = tree.node(temporal) else {
                    continue;
                };
                let Ok(bucket) = bucket_node.segment().parse::<u64>() else {
                    log::warn!(
                        "Skipping non-numeric temporal segment '{}' in filesystem '{}'",
                        bucket_node.segment(),
                        filesystem
                    );
                    continue;
                };
                if !range.overlaps(bucket, bucket.saturating_add(width - 1)) {
                    continue;
                }
                let path = format!("{}/{}", cell.segment(), bucket_node.segment());
                matches.extend(bucket_node.blocks().iter().map(|b| BlockRef {
                    filesystem: filesystem.to_string(),
                    path: path.clone(),
                    block: b.name.clone(),
                    size: b.size,
                }));
            }
        }
        Ok(matches)
    }

    /// Answer a request locally. Failures become an error response.
    pub fn handle(&self, request: &Request) -> Response {
        match self.try_handle(request) {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Request failed: {}", e);
                Response::error(e.to_string())
            }
        }
    }

    fn try_handle(&self, request: &Request) -> Result<Response> {
        match request {
            Request::Query {
                filesystem,
                polygon,
                time_range,
            } => Ok(Response::Query {
                blocks: self.query(filesystem, polygon, time_range)?,
            }),
            Request::Join {
                filesystem,
                polygon,
                time_range,
                special_text,
            } => {
                let blocks = self.query(filesystem, polygon, time_range)?;
                let mut lines: Vec<String> = Vec::with_capacity(blocks.len() + 1);
                if let Some(text) = special_text.as_deref().filter(|t| !t.is_empty()) {
                    lines.push(text.to_string());
                }
                lines.extend(blocks.iter().map(BlockRef::to_string));
                Ok(Response::Join {
                    text: lines.join("\n"),
                })
            }
            Request::Meta { kind } => {
                let entries: BTreeSet<String> = match kind {
                    MetaKind::Filesystems => self.trees.read().keys().cloned().collect(),
                    MetaKind::Paths { filesystem } => self
                        .with_tree(filesystem, |tree| {
                            tree.paths()
                                .into_iter()
                                .map(str::to_string)
                                .collect::<BTreeSet<String>>()
                        })
                        .ok_or_else(|| GeoshardError::UnknownFilesystem(filesystem.clone()))?,
                };
                Ok(Response::Meta { entries })
            }
        }
    }

    /// Write every filesystem's tree to the index log at `path`.
    pub fn save_index<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let trees = self.trees.read();
        index::save_log(path, trees.values())?;
        log::info!("Saved index of {} filesystems", trees.len());
        Ok(())
    }

    /// Load trees from the index log at `path`, replacing filesystems of the
    /// same name. Returns the number of trees loaded.
    pub fn load_index<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let loaded = index::load_log(path)?;
        let count = loaded.len();
        self.trees.write().extend(loaded);
        log::info!("Loaded index of {} filesystems", count);
        Ok(count)
    }

    /// Answer requests arriving on the transport's service channel.
    pub fn serve(self: &Arc<Self>, transport: &DynTransport, codec: DynCodec) {
        let service = NodeService {
            node: self.clone(),
            transport: Arc::downgrade(transport),
            codec,
        };
        transport.register(SERVICE_CHANNEL, Arc::new(service));
        log::info!("Serving requests on {}", transport.local_addr());
    }

    pub fn stop_serving(&self, transport: &dyn Transport) {
        transport.unregister(SERVICE_CHANNEL);
    }
}

fn block_key(filesystem: &str, block_name: &str) -> String {
    format!("{filesystem}/{block_name}")
}

/// A stored cell matches when it equals a query cell or one contains the other.
fn cell_matches(segment: &str, cells: &BTreeSet<String>) -> bool {
    cells.contains(segment)
        || cells
            .iter()
            .any(|c| segment.starts_with(c.as_str()) || c.starts_with(segment))
}

struct NodeService<B> {
    node: Arc<StorageNode<B>>,
    transport: Weak<dyn Transport>,
    codec: DynCodec,
}

impl<B: BlockStore + 'static> ReplyHandler for NodeService<B> {
    fn on_message(&self, source: Destination, data: Bytes) {
        let envelope = match self.codec.decode(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Dropping undecodable message from {}: {}", source.node, e);
                return;
            }
        };
        let Message::Request(request) = envelope.body else {
            log::warn!("Ignoring non-request message from {}", source.node);
            return;
        };

        let response = self.node.handle(&request);
        let reply = match self
            .codec
            .encode(&Envelope::response(envelope.request_id, response))
        {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("Could not encode reply to {}: {}", source.node, e);
                return;
            }
        };

        let Some(transport) = self.transport.upgrade() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No async runtime to send reply to {}", source.node);
            return;
        };
        runtime.spawn(async move {
            if let Err(e) = transport.send(source.clone(), SERVICE_CHANNEL, reply).await {
                log::warn!("Failed to send reply to {}: {}", source.node, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoshard_types::BoundingBox;
    use tempfile::NamedTempFile;

    const T0: u64 = 1_700_000_000;
    const DAY: u64 = 86_400;

    fn bay_area() -> GeoPolygon {
        GeoPolygon::from_bbox(&BoundingBox::new(37.5, 38.0, -122.6, -122.2))
    }

    fn node_with_blocks() -> StorageNode {
        let node = StorageNode::memory().unwrap();
        node.create_filesystem("roads").unwrap();
        let sf = Coordinate::new(37.7749, -122.4194);
        let oakland = Coordinate::new(37.80, -122.27);
        let la = Coordinate::new(34.05, -118.24);
        node.store_block("roads", &sf, T0, "sf-1", Bytes::from_static(b"sf"))
            .unwrap();
        node.store_block("roads", &oakland, T0 + 60, "oak-1", Bytes::from_static(b"oak"))
            .unwrap();
        node.store_block("roads", &la, T0, "la-1", Bytes::from_static(b"la"))
            .unwrap();
        node.store_block("roads", &sf, T0 + 2 * DAY, "sf-2", Bytes::from_static(b"later"))
            .unwrap();
        node
    }

    fn names(blocks: &[BlockRef]) -> Vec<&str> {
        blocks.iter().map(|b| b.block.as_str()).collect()
    }

    #[test]
    fn test_store_block_paths() {
        let node = node_with_blocks();
        let bucket = T0 - T0 % DAY;
        let paths = node
            .with_tree("roads", |tree| {
                tree.paths().into_iter().map(str::to_string).collect::<Vec<_>>()
            })
            .unwrap();
        assert!(paths.contains(&format!("9q8y/{bucket}")));
        assert!(paths.contains(&format!("9q9p/{bucket}")));
        assert!(paths.contains(&format!("9q5c/{bucket}")));
        assert_eq!(paths.len(), 4);
        assert_eq!(node.read_block("roads", "oak-1").unwrap(), Bytes::from_static(b"oak"));
    }

    #[test]
    fn test_query_filters_space_and_time() {
        let node = node_with_blocks();
        let blocks = node
            .query("roads", &bay_area(), &TimeRange::new(T0, T0 + 100))
            .unwrap();
        assert_eq!(names(&blocks), ["sf-1", "oak-1"]);

        let all_time = node.query("roads", &bay_area(), &TimeRange::all()).unwrap();
        assert_eq!(names(&all_time), ["sf-1", "sf-2", "oak-1"]);
        assert_eq!(all_time[0].size, 2);
    }

    #[test]
    fn test_unknown_filesystem() {
        let node = StorageNode::memory().unwrap();
        let result = node.store_block(
            "missing",
            &Coordinate::new(0.0, 0.0),
            0,
            "b",
            Bytes::new(),
        );
        assert!(matches!(result, Err(GeoshardError::UnknownFilesystem(_))));
        assert!(matches!(
            node.read_block("missing", "b"),
            Err(GeoshardError::BlockNotFound(_))
        ));
    }

    #[test]
    fn test_rejected_block_leaves_no_bytes() {
        let node = StorageNode::memory().unwrap();
        node.create_filesystem("roads").unwrap();
        let result = node.store_block(
            "roads",
            &Coordinate::new(1.0, 1.0),
            0,
            "bad,name",
            Bytes::from_static(b"x"),
        );
        assert!(matches!(result, Err(GeoshardError::InvalidInput(_))));
        assert!(node.read_block("roads", "bad,name").is_err());
        assert!(
            node.store_block("roads", &Coordinate::new(f64::NAN, 1.0), 0, "b", Bytes::new())
                .is_err()
        );
    }

    #[test]
    fn test_block_names_are_unique_per_filesystem() {
        let node = StorageNode::memory().unwrap();
        node.create_filesystem("roads").unwrap();
        node.create_filesystem("rivers").unwrap();
        let sf = Coordinate::new(37.7749, -122.4194);
        let ny = Coordinate::new(40.7128, -74.0060);

        node.store_block("roads", &sf, 0, "b", Bytes::from_static(b"sf"))
            .unwrap();
        let result = node.store_block("roads", &ny, 0, "b", Bytes::from_static(b"ny"));
        assert!(matches!(result, Err(GeoshardError::InvalidInput(_))));
        assert_eq!(node.read_block("roads", "b").unwrap(), Bytes::from_static(b"sf"));
        let paths = node
            .with_tree("roads", |tree| tree.paths().len())
            .unwrap();
        assert_eq!(paths, 1);

        node.store_block("rivers", &ny, 0, "b", Bytes::from_static(b"ny"))
            .unwrap();
        assert_eq!(node.read_block("rivers", "b").unwrap(), Bytes::from_static(b"ny"));
    }

    #[test]
    fn test_oversized_temporal_bucket_rejected() {
        let config = Config {
            temporal_precision_hours: u64::MAX,
            ..Config::default()
        };
        assert!(matches!(
            StorageNode::memory_with_config(config),
            Err(GeoshardError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_create_filesystem_twice() {
        let node = StorageNode::memory().unwrap();
        assert!(node.create_filesystem("roads").unwrap());
        assert!(!node.create_filesystem("roads").unwrap());
        assert!(node.create_filesystem("bad\nname").is_err());
        assert_eq!(node.filesystems(), ["roads"]);
    }

    #[test]
    fn test_handle_join_with_special_text() {
        let node = node_with_blocks();
        let bucket = T0 - T0 % DAY;
        let response = node.handle(&Request::Join {
            filesystem: "roads".into(),
            polygon: bay_area(),
            time_range: TimeRange::new(T0, T0 + 100),
            special_text: Some("header".into()),
        });
        assert_eq!(
            response,
            Response::Join {
                text: format!("header\nroads/9q8y/{bucket}/sf-1\nroads/9q9p/{bucket}/oak-1"),
            }
        );
    }

    #[test]
    fn test_handle_meta_and_errors() {
        let node = node_with_blocks();
        let response = node.handle(&Request::Meta {
            kind: MetaKind::Filesystems,
        });
        assert_eq!(
            response,
            Response::Meta {
                entries: ["roads".to_string()].into_iter().collect()
            }
        );

        let Response::Meta { entries } = node.handle(&Request::Meta {
            kind: MetaKind::Paths {
                filesystem: "roads".into(),
            },
        }) else {
            panic!("expected meta response");
        };
        assert_eq!(entries.len(), 4);

        let response = node.handle(&Request::Query {
            filesystem: "nope".into(),
            polygon: bay_area(),
            time_range: TimeRange::all(),
        });
        assert!(response.is_error());
    }

    #[test]
    fn test_index_survives_reload() {
        let file = NamedTempFile::new().unwrap();
        let node = node_with_blocks();
        node.save_index(file.path()).unwrap();

        let restored = StorageNode::memory().unwrap();
        assert_eq!(restored.load_index(file.path()).unwrap(), 1);
        let blocks = restored
            .query("roads", &bay_area(), &TimeRange::new(T0, T0 + 100))
            .unwrap();
        assert_eq!(names(&blocks), ["sf-1", "oak-1"]);
        assert!(blocks.iter().all(|b| b.size == 0));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config {
            spatial_precision: 0,
            ..Config::default()
        };
        assert!(matches!(
            StorageNode::memory_with_config(config),
            Err(GeoshardError::InvalidInput(_))
        ));
    }
}
