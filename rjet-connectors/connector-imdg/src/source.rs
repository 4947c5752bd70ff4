//! Sources reading the data grid of the local cluster or of a remote one.
//!
//! Partitioned structures are read in parallel: each member reads the
//! partitions it owns (or, for a remote cluster, its share of them) and deals
//! them out to its local instances. Reads are not synchronized with writers,
//! so entries changed during the job may be missed or seen twice.

use std::sync::Arc;

use rjet_core::config::ClientConfig;
use rjet_core::element::Record;
use rjet_core::grid::{DataGrid, GridList, PartitionedMap};
use rjet_core::partition::{
    check_partition_count, member_share, PartitionAssignment, PartitionedReader,
};
use rjet_core::processor::{Outbox, Processor, ProcessorContext, ProcessorSupplier, SupplierContext};
use rjet_core::Result;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Structure {
    Map,
    Cache,
}

/// Where a source reads from
#[derive(Clone, Debug)]
enum Cluster {
    Local,
    Remote(ClientConfig),
}

impl Cluster {
    /// A source without its own client settings reads from the job's target
    /// cluster, which is a remote one when the job runs with `cluster=client`.
    fn resolve(&self, context: &SupplierContext) -> Cluster {
        match (self, &context.default_client) {
            (Cluster::Local, Some(client_config)) => Cluster::Remote(client_config.clone()),
            _ => self.clone(),
        }
    }

    fn grid(&self, context: &SupplierContext) -> Result<Arc<dyn DataGrid>> {
        match self {
            Cluster::Local => Ok(context.grid()),
            Cluster::Remote(client_config) => context.connect(client_config),
        }
    }
}

pub fn read_map(name: &str) -> PartitionedMapSource {
    PartitionedMapSource::new(name, Structure::Map, Cluster::Local)
}

pub fn read_cache(name: &str) -> PartitionedMapSource {
    PartitionedMapSource::new(name, Structure::Cache, Cluster::Local)
}

pub fn read_map_remote(name: &str, client_config: ClientConfig) -> PartitionedMapSource {
    PartitionedMapSource::new(name, Structure::Map, Cluster::Remote(client_config))
}

pub fn read_cache_remote(name: &str, client_config: ClientConfig) -> PartitionedMapSource {
    PartitionedMapSource::new(name, Structure::Cache, Cluster::Remote(client_config))
}

pub fn read_list(name: &str) -> ListSource {
    ListSource {
        name: name.to_string(),
        cluster: Cluster::Local,
    }
}

pub fn read_list_remote(name: &str, client_config: ClientConfig) -> ListSource {
    ListSource {
        name: name.to_string(),
        cluster: Cluster::Remote(client_config),
    }
}

/// Emits the entries of a map or cache as keyed records
pub struct PartitionedMapSource {
    name: String,
    structure: Structure,
    cluster: Cluster,
}

impl PartitionedMapSource {
    fn new(name: &str, structure: Structure, cluster: Cluster) -> Self {
        PartitionedMapSource {
            name: name.to_string(),
            structure,
            cluster,
        }
    }
}

impl ProcessorSupplier for PartitionedMapSource {
    fn get(&self, context: &SupplierContext, count: usize) -> Result<Vec<Box<dyn Processor>>> {
        let cluster = self.cluster.resolve(context);
        let grid = cluster.grid(context)?;
        let table = grid.partition_table();
        let (owned, member_count) = match &cluster {
            Cluster::Local => (table.owned_partitions(&context.member), grid.members().len()),
            Cluster::Remote(_) => (
                member_share(
                    table.partition_count(),
                    context.member_index,
                    context.member_count,
                ),
                context.member_count,
            ),
        };
        check_partition_count(table.partition_count(), count, member_count.max(1));

        let assignment = PartitionAssignment::assign(owned.as_slice(), count)?;
        let map = match self.structure {
            Structure::Map => grid.map(self.name.as_str()),
            Structure::Cache => grid.cache(self.name.as_str()),
        };
        info!(
            "`{}` reads {:?} `{}` from {} partitions with {} instances, {} idle",
            context.vertex_name,
            self.structure,
            self.name,
            owned.len(),
            count,
            assignment.idle_instances()
        );

        let processors = (0..count)
            .map(|_| {
                let processor: Box<dyn Processor> = Box::new(PartitionedMapReader {
                    map: map.clone(),
                    assignment: assignment.clone(),
                    reader: PartitionedReader::new(),
                });
                processor
            })
            .collect();
        Ok(processors)
    }
}

struct PartitionedMapReader {
    map: Arc<dyn PartitionedMap>,
    assignment: PartitionAssignment,
    reader: PartitionedReader,
}

impl Processor for PartitionedMapReader {
    fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        self.reader.init(&self.assignment, context.local_index)?;
        debug!(
            "`{}`#{} assigned partitions {:?}",
            context.vertex_name,
            context.local_index,
            self.reader.partitions()
        );
        Ok(())
    }

    fn complete(&mut self, outbox: &mut Outbox) -> Result<bool> {
        let map = &self.map;
        self.reader.drain(outbox, |partition| {
            let entries = map.partition_entries(partition)?;
            Ok(entries.into_iter().map(Record::from).collect())
        })
    }
}

/// Emits every item of a list from exactly one instance in the cluster
pub struct ListSource {
    name: String,
    cluster: Cluster,
}

impl ProcessorSupplier for ListSource {
    fn get(&self, context: &SupplierContext, count: usize) -> Result<Vec<Box<dyn Processor>>> {
        let cluster = self.cluster.resolve(context);
        let grid = cluster.grid(context)?;
        let list = grid.list(self.name.as_str());
        let reading_member = match &cluster {
            Cluster::Local => list.owner().eq(&context.member),
            Cluster::Remote(_) => context.member_index == 0,
        };

        let processors = (0..count)
            .map(|local_index| {
                let items = if reading_member && local_index == 0 {
                    Some(list.clone())
                } else {
                    None
                };
                let processor: Box<dyn Processor> = Box::new(ListReader {
                    list: items,
                    pending: Vec::new(),
                    fetched: false,
                });
                processor
            })
            .collect();
        Ok(processors)
    }
}

struct ListReader {
    /// `None` for instances that emit nothing
    list: Option<Arc<dyn GridList>>,
    pending: Vec<Record>,
    fetched: bool,
}

impl Processor for ListReader {
    fn complete(&mut self, outbox: &mut Outbox) -> Result<bool> {
        let list = match &self.list {
            Some(list) => list,
            None => return Ok(true),
        };

        if !self.fetched {
            let mut items: Vec<Record> = list.items()?.into_iter().map(Record::new).collect();
            items.reverse();
            self.pending = items;
            self.fetched = true;
        }

        while !outbox.is_full() {
            match self.pending.pop() {
                Some(record) => outbox.emit(record),
                None => return Ok(true),
            }
        }
        Ok(self.pending.is_empty())
    }
}
