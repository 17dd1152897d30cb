//! Raw block storage.
//!
//! Storage nodes keep block bytes behind the [`BlockStore`] trait so the index
//! layer never depends on where bytes live. [`MemoryBlockStore`] keeps them in
//! a sorted map.

use crate::error::{GeoshardError, Result};
use bytes::Bytes;
use std::collections::BTreeMap;

/// Trait for block storage implementations
pub trait BlockStore: Send + Sync {
    /// Store `data` under `name`, replacing any previous content
    fn put(&mut self, name: &str, data: Bytes) -> Result<()>;

    /// Get a block by name
    fn get(&self, name: &str) -> Result<Option<Bytes>>;

    /// Delete a block and return its content if it existed
    fn delete(&mut self, name: &str) -> Result<Option<Bytes>>;

    fn contains(&self, name: &str) -> Result<bool>;

    /// Names of all blocks starting with `prefix`, in order
    fn names_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool>;

    /// Flush pending writes
    fn sync(&mut self) -> Result<()>;

    fn stats(&self) -> Result<StorageStats>;

    /// Get a block, failing with [`GeoshardError::BlockNotFound`] if absent
    fn read(&self, name: &str) -> Result<Bytes> {
        self.get(name)?
            .ok_or_else(|| GeoshardError::BlockNotFound(name.to_string()))
    }
}

/// Block store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub block_count: usize,
    /// Total stored bytes
    pub size_bytes: usize,
    /// Number of put and delete operations performed
    pub operations_count: u64,
}

/// In-memory block store using BTreeMap
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    data: BTreeMap<String, Bytes>,
    operations: u64,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemoryBlockStore {
    fn put(&mut self, name: &str, data: Bytes) -> Result<()> {
        self.data.insert(name.to_string(), data);
        self.operations += 1;
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Bytes>> {
        Ok(self.data.get(name).cloned())
    }

    fn delete(&mut self, name: &str) -> Result<Option<Bytes>> {
        self.operations += 1;
        Ok(self.data.remove(name))
    }

    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.data.contains_key(name))
    }

    fn names_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.data.len())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.data.is_empty())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            block_count: self.data.len(),
            size_bytes: self.data.values().map(Bytes::len).sum(),
            operations_count: self.operations,
        })
    }
}
