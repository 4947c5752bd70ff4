//! Contracts of the partitioned data grid the engine reads from and writes to.
//! The grid itself lives outside the engine.

use std::sync::Arc;

use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{JetError, Result};
use crate::partition::{PartitionId, PartitionTable};
use crate::MemberId;

/// A key/value structure split into partitions, e.g. a map or a cache
pub trait PartitionedMap: Send + Sync {
    fn name(&self) -> &str;

    /// Snapshot-like view of one partition. Not synchronized with concurrent writers.
    fn partition_entries(&self, partition: PartitionId) -> Result<Vec<(String, Value)>>;

    fn put(&self, key: &str, value: Value) -> Result<()>;

    fn get(&self, key: &str) -> Option<Value>;

    fn len(&self) -> usize;
}

/// A list stored as a whole on a single member
pub trait GridList: Send + Sync {
    fn name(&self) -> &str;

    fn owner(&self) -> MemberId;

    fn items(&self) -> Result<Vec<Value>>;

    fn add_all(&self, items: Vec<Value>) -> Result<()>;

    fn len(&self) -> usize;
}

pub trait DataGrid: Send + Sync {
    fn local_member(&self) -> MemberId;

    /// All members of the cluster, in the same order on every member
    fn members(&self) -> Vec<MemberId>;

    fn partition_table(&self) -> Arc<dyn PartitionTable>;

    fn map(&self, name: &str) -> Arc<dyn PartitionedMap>;

    fn cache(&self, name: &str) -> Arc<dyn PartitionedMap>;

    fn list(&self, name: &str) -> Arc<dyn GridList>;
}

/// Opens client connections to remote clusters
pub trait GridClientFactory: Send + Sync {
    fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn DataGrid>>;
}

/// Used when the engine was built without any client connector
#[derive(Debug, Default)]
pub struct NoClientFactory;

impl GridClientFactory for NoClientFactory {
    fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn DataGrid>> {
        Err(JetError::Config(format!(
            "no client connector configured, can't reach {}",
            config
        )))
    }
}
