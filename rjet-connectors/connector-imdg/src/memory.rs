//! A data grid held in process memory.
//!
//! Stands in for the cluster's distributed store when running locally and in
//! tests. Partition `p` is owned by member `p % member_count`.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde_json::Value;

use rjet_core::config::ClientConfig;
use rjet_core::grid::{DataGrid, GridClientFactory, GridList, PartitionedMap};
use rjet_core::partition::{PartitionId, PartitionTable};
use rjet_core::{JetError, MemberId, Result};

pub const DEFAULT_PARTITION_COUNT: u32 = 271;

#[derive(Clone, Debug)]
pub struct MemoryPartitionTable {
    partition_count: u32,
    members: Vec<MemberId>,
}

impl MemoryPartitionTable {
    pub fn new(partition_count: u32, members: Vec<MemberId>) -> Self {
        MemoryPartitionTable {
            partition_count: partition_count.max(1),
            members,
        }
    }
}

impl PartitionTable for MemoryPartitionTable {
    fn partition_count(&self) -> u32 {
        self.partition_count
    }

    fn owned_partitions(&self, member: &MemberId) -> Vec<PartitionId> {
        let member_count = self.members.len().max(1) as u32;
        match self.members.iter().position(|m| m.eq(member)) {
            Some(index) => (0..self.partition_count)
                .filter(|p| p % member_count == index as u32)
                .map(PartitionId)
                .collect(),
            None => vec![],
        }
    }
}

pub struct MemoryMap {
    name: String,
    table: Arc<MemoryPartitionTable>,
    partitions: Vec<RwLock<BTreeMap<String, Value>>>,
}

impl MemoryMap {
    fn new(name: &str, table: Arc<MemoryPartitionTable>) -> Self {
        let partitions = (0..table.partition_count())
            .map(|_| RwLock::new(BTreeMap::new()))
            .collect();
        MemoryMap {
            name: name.to_string(),
            table,
            partitions,
        }
    }

    fn partition(&self, key: &str) -> &RwLock<BTreeMap<String, Value>> {
        let partition = self.table.partition_of(key);
        &self.partitions[partition.0 as usize]
    }
}

impl PartitionedMap for MemoryMap {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn partition_entries(&self, partition: PartitionId) -> Result<Vec<(String, Value)>> {
        let entries = self.partitions.get(partition.0 as usize).ok_or_else(|| {
            JetError::IllegalState(format!(
                "`{}` has no partition {}",
                self.name, partition
            ))
        })?;
        let entries = entries.read().unwrap_or_else(|p| p.into_inner());
        Ok(entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn put(&self, key: &str, value: Value) -> Result<()> {
        self.partition(key)
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.partition(key)
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }

    fn len(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| p.read().unwrap_or_else(|p| p.into_inner()).len())
            .sum()
    }
}

pub struct MemoryList {
    name: String,
    owner: MemberId,
    items: RwLock<Vec<Value>>,
}

impl GridList for MemoryList {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn owner(&self) -> MemberId {
        self.owner.clone()
    }

    fn items(&self) -> Result<Vec<Value>> {
        Ok(self.items.read().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn add_all(&self, items: Vec<Value>) -> Result<()> {
        self.items
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .extend(items);
        Ok(())
    }

    fn len(&self) -> usize {
        self.items.read().unwrap_or_else(|p| p.into_inner()).len()
    }
}

pub struct MemoryDataGrid {
    local_member: MemberId,
    table: Arc<MemoryPartitionTable>,
    maps: DashMap<String, Arc<MemoryMap>>,
    caches: DashMap<String, Arc<MemoryMap>>,
    lists: DashMap<String, Arc<MemoryList>>,
}

impl MemoryDataGrid {
    /// A single member cluster
    pub fn new(member: &str, partition_count: u32) -> Self {
        let member = MemberId::new(member);
        MemoryDataGrid::with_members(member.clone(), vec![member], partition_count)
    }

    /// The view of `local_member` on a cluster of `members`
    pub fn with_members(local_member: MemberId, members: Vec<MemberId>, partition_count: u32) -> Self {
        MemoryDataGrid {
            local_member,
            table: Arc::new(MemoryPartitionTable::new(partition_count, members)),
            maps: DashMap::new(),
            caches: DashMap::new(),
            lists: DashMap::new(),
        }
    }

    fn structure(
        structures: &DashMap<String, Arc<MemoryMap>>,
        name: &str,
        table: &Arc<MemoryPartitionTable>,
    ) -> Arc<MemoryMap> {
        structures
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryMap::new(name, table.clone())))
            .clone()
    }
}

impl Default for MemoryDataGrid {
    fn default() -> Self {
        MemoryDataGrid::new("127.0.0.1:5701", DEFAULT_PARTITION_COUNT)
    }
}

impl DataGrid for MemoryDataGrid {
    fn local_member(&self) -> MemberId {
        self.local_member.clone()
    }

    fn members(&self) -> Vec<MemberId> {
        self.table.members.clone()
    }

    fn partition_table(&self) -> Arc<dyn PartitionTable> {
        self.table.clone()
    }

    fn map(&self, name: &str) -> Arc<dyn PartitionedMap> {
        MemoryDataGrid::structure(&self.maps, name, &self.table)
    }

    fn cache(&self, name: &str) -> Arc<dyn PartitionedMap> {
        MemoryDataGrid::structure(&self.caches, name, &self.table)
    }

    fn list(&self, name: &str) -> Arc<dyn GridList> {
        let members = &self.table.members;
        self.lists
            .entry(name.to_string())
            .or_insert_with(|| {
                // the whole list lives on the member owning its name's partition
                let partition = self.table.partition_of(name);
                let owner = members
                    .get(partition.0 as usize % members.len().max(1))
                    .cloned()
                    .unwrap_or_else(|| self.local_member.clone());
                Arc::new(MemoryList {
                    name: name.to_string(),
                    owner,
                    items: RwLock::new(Vec::new()),
                })
            })
            .clone()
    }
}

/// Resolves client connections to grids registered under their cluster name
#[derive(Default)]
pub struct MemoryClientFactory {
    clusters: DashMap<String, Arc<dyn DataGrid>>,
}

impl MemoryClientFactory {
    pub fn new() -> Self {
        MemoryClientFactory::default()
    }

    pub fn register(&self, cluster_name: &str, grid: Arc<dyn DataGrid>) {
        self.clusters.insert(cluster_name.to_string(), grid);
    }
}

impl GridClientFactory for MemoryClientFactory {
    fn connect(&self, config: &ClientConfig) -> Result<Arc<dyn DataGrid>> {
        match self.clusters.get(config.cluster_name.as_str()) {
            Some(grid) => {
                debug!("connected to {}", config);
                Ok(grid.clone())
            }
            None => Err(JetError::Config(format!("cluster {} is unreachable", config))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use serde_json::json;

    use rjet_core::config::ClientConfig;
    use rjet_core::grid::{DataGrid, GridClientFactory};
    use rjet_core::partition::PartitionId;
    use rjet_core::MemberId;

    use crate::memory::{MemoryClientFactory, MemoryDataGrid};

    #[test]
    pub fn map_partitions_test() {
        let grid = MemoryDataGrid::new("m1", 8);
        let map = grid.map("numbers");
        for i in 0..100 {
            map.put(format!("k{}", i).as_str(), json!(i)).unwrap();
        }
        assert_eq!(map.len(), 100);
        assert_eq!(grid.map("numbers").get("k42"), Some(json!(42)));

        let total: usize = (0..8)
            .map(|p| map.partition_entries(PartitionId(p)).unwrap().len())
            .sum();
        assert_eq!(total, 100);
        assert!(map.partition_entries(PartitionId(8)).is_err());

        // caches and maps are separate structures
        assert_eq!(grid.cache("numbers").len(), 0);
    }

    #[test]
    pub fn ownership_test() {
        let members = vec![MemberId::new("m1"), MemberId::new("m2"), MemberId::new("m3")];
        let grid = MemoryDataGrid::with_members(members[1].clone(), members.clone(), 10);
        let table = grid.partition_table();

        let mut all = HashSet::new();
        for member in &members {
            for p in table.owned_partitions(member) {
                assert!(all.insert(p));
            }
        }
        assert_eq!(all.len(), 10);
        assert!(table.owned_partitions(&MemberId::new("stranger")).is_empty());
        assert!(members.contains(&grid.list("sink").owner()));
    }

    #[test]
    pub fn client_factory_test() {
        let factory = MemoryClientFactory::new();
        let remote: Arc<dyn DataGrid> = Arc::new(MemoryDataGrid::new("r1", 4));
        factory.register("remote", remote);

        let config = ClientConfig::new("remote").add_address("10.0.0.1:5701");
        assert_eq!(factory.connect(&config).unwrap().local_member(), MemberId::new("r1"));
        assert!(factory.connect(&ClientConfig::new("other")).is_err());
    }
}
