use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use rjet_connector_imdg::memory::{MemoryClientFactory, MemoryDataGrid};
use rjet_connector_imdg::{read_list, read_map, read_map_remote, write_list};
use rjet_core::config::{ClientConfig, ClusterTarget, JobConfig};
use rjet_core::dag::{Dag, DagBuilder, Edge, Vertex};
use rjet_core::element::Record;
use rjet_core::future::AwaitResult;
use rjet_core::grid::{DataGrid, NoClientFactory};
use rjet_core::partition::{PartitionAssignment, PartitionTable};
use rjet_core::processor::{
    Outbox, Processor, ProcessorContext, ProcessorSupplier, SupplierContext,
};
use rjet_core::utils::hash::bucket_of;
use rjet_core::Result;
use rjet_runtime::{JetEngine, JobStatus};

fn job_config(parallelism: u32) -> JobConfig {
    let mut config = JobConfig::new()
        .seconds_to_await(5)
        .local_parallelism(parallelism);
    config.processing_threads = 4;
    config.network_threads = 2;
    config
}

fn fill(grid: &dyn DataGrid, map: &str, entries: usize) {
    let map = grid.map(map);
    for i in 0..entries {
        map.put(format!("key-{}", i).as_str(), json!(i)).unwrap();
    }
}

/// Counts the records each instance receives, by local index
struct Tally {
    counts: Arc<Mutex<Vec<usize>>>,
}

impl ProcessorSupplier for Tally {
    fn get(&self, _context: &SupplierContext, count: usize) -> Result<Vec<Box<dyn Processor>>> {
        Ok((0..count)
            .map(|_| {
                let processor: Box<dyn Processor> = Box::new(TallyProcessor {
                    counts: self.counts.clone(),
                    local_index: 0,
                });
                processor
            })
            .collect())
    }
}

struct TallyProcessor {
    counts: Arc<Mutex<Vec<usize>>>,
    local_index: usize,
}

impl Processor for TallyProcessor {
    fn init(&mut self, context: &ProcessorContext) -> Result<()> {
        self.local_index = context.local_index;
        Ok(())
    }

    fn process(&mut self, _ordinal: usize, record: Record, outbox: &mut Outbox) -> Result<()> {
        self.counts.lock().unwrap()[self.local_index] += 1;
        outbox.emit(record);
        Ok(())
    }
}

fn read_to_list(source: Vertex, list: &str) -> Dag {
    DagBuilder::new("read-to-list")
        .vertex(source)
        .vertex(Vertex::new(list, write_list(list)).local_parallelism(1))
        .edge(Edge::between("source", list))
        .build()
        .unwrap()
}

#[test]
pub fn partitioned_read_scenario_test() {
    let grid = Arc::new(MemoryDataGrid::new("m1", 8));
    fill(grid.as_ref(), "numbers", 200);
    let engine = JetEngine::new(grid.clone(), Arc::new(NoClientFactory));

    let dag = read_to_list(
        Vertex::new("source", read_map("numbers")).local_parallelism(4),
        "sink",
    );
    let future = engine.submit(dag, job_config(4)).unwrap();
    match future.await_timeout(Duration::from_secs(30)) {
        AwaitResult::Value(()) => {}
        AwaitResult::TimedOut => panic!("job didn't finish"),
        AwaitResult::Failed(e) => panic!("job failed: {}", e),
    }

    assert_eq!(future.status(), JobStatus::Completed);
    let items = grid.list("sink").items().unwrap();
    assert_eq!(items.len(), 200);
    assert!(items.contains(&json!(["key-7", 7])));
    assert!(engine.running_jobs().is_empty());
}

#[test]
pub fn every_instance_reads_two_partitions_test() {
    let grid = Arc::new(MemoryDataGrid::new("m1", 8));
    let table = grid.partition_table();
    let assignment =
        PartitionAssignment::assign(table.owned_partitions(&grid.local_member()).as_slice(), 4)
            .unwrap();
    for local_index in 0..4 {
        assert_eq!(assignment.partitions_of(local_index).len(), 2);
    }

    // one entry per partition makes the per-instance count the partition count
    let map = grid.map("spread");
    let mut keys = Vec::new();
    let mut seen = vec![false; 8];
    let mut i = 0;
    while seen.iter().any(|s| !s) {
        let key = format!("k{}", i);
        let partition = table.partition_of(key.as_str()).0 as usize;
        if !seen[partition] {
            seen[partition] = true;
            map.put(key.as_str(), json!(i)).unwrap();
            keys.push(key);
        }
        i += 1;
    }

    let counts = Arc::new(Mutex::new(vec![0; 4]));
    let engine = JetEngine::new(grid.clone(), Arc::new(NoClientFactory));
    let dag = DagBuilder::new("tally")
        .vertex(Vertex::new("source", read_map("spread")).local_parallelism(4))
        .vertex(
            Vertex::new(
                "tally",
                Tally {
                    counts: counts.clone(),
                },
            )
            .local_parallelism(4),
        )
        .vertex(Vertex::new("sink", write_list("spread-out")).local_parallelism(1))
        .edge(Edge::between("source", "tally").partitioned())
        .edge(Edge::between("tally", "sink"))
        .build()
        .unwrap();

    engine.submit(dag, job_config(4)).unwrap().wait().unwrap();
    assert_eq!(grid.list("spread-out").len(), 8);
    let mut expected = vec![0; 4];
    for key in &keys {
        expected[bucket_of(key.as_bytes(), 4)] += 1;
    }
    assert_eq!(*counts.lock().unwrap(), expected);
}

#[test]
pub fn remote_read_test() {
    let remote: Arc<dyn DataGrid> = Arc::new(MemoryDataGrid::new("remote-1", 16));
    fill(remote.as_ref(), "remote-numbers", 20);
    let clients = Arc::new(MemoryClientFactory::new());
    clients.register("remote", remote);

    let local = Arc::new(MemoryDataGrid::new("m1", 8));
    let engine = JetEngine::new(local.clone(), clients);

    let client_config = ClientConfig::new("remote").add_address("10.0.0.2:5701");
    let dag = read_to_list(
        Vertex::new(
            "source",
            read_map_remote("remote-numbers", client_config),
        )
        .local_parallelism(4),
        "copied",
    );
    engine.submit(dag, job_config(4)).unwrap().wait().unwrap();

    assert_eq!(local.list("copied").len(), 20);
}

#[test]
pub fn client_cluster_target_test() {
    let remote: Arc<dyn DataGrid> = Arc::new(MemoryDataGrid::new("remote-1", 16));
    fill(remote.as_ref(), "numbers", 20);
    let clients = Arc::new(MemoryClientFactory::new());
    clients.register("remote", remote);

    let local = Arc::new(MemoryDataGrid::new("m1", 8));
    fill(local.as_ref(), "numbers", 5);
    let engine = JetEngine::new(local.clone(), clients);

    let dag = read_to_list(
        Vertex::new("source", read_map("numbers")).local_parallelism(4),
        "copied",
    );
    let config = job_config(4).cluster(ClusterTarget::Client(
        ClientConfig::new("remote").add_address("10.0.0.2:5701"),
    ));
    engine.submit(dag, config).unwrap().wait().unwrap();

    // the map of the target cluster is read, the local one is left alone
    assert_eq!(local.list("copied").len(), 20);
}

#[test]
pub fn unreachable_remote_fails_job_test() {
    let local = Arc::new(MemoryDataGrid::new("m1", 8));
    let engine = JetEngine::new(local.clone(), Arc::new(MemoryClientFactory::new()));

    let dag = read_to_list(
        Vertex::new(
            "source",
            read_map_remote("numbers", ClientConfig::new("nowhere")),
        )
        .local_parallelism(2),
        "copied",
    );
    let future = engine.submit(dag, job_config(2)).unwrap();
    let e = future.wait().unwrap_err();
    assert!(!e.is_fatal());
    assert_eq!(future.status(), JobStatus::Failed);
}

#[test]
pub fn read_list_once_test() {
    let grid = Arc::new(MemoryDataGrid::new("m1", 8));
    grid.list("input")
        .add_all((0..50).map(|i| json!(i)).collect())
        .unwrap();
    let engine = JetEngine::new(grid.clone(), Arc::new(NoClientFactory));

    let dag = read_to_list(
        Vertex::new("source", read_list("input")).local_parallelism(3),
        "output",
    );
    engine.submit(dag, job_config(3)).unwrap().wait().unwrap();

    let mut items: Vec<i64> = grid
        .list("output")
        .items()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_i64())
        .collect();
    items.sort();
    assert_eq!(items, (0..50).collect::<Vec<i64>>());
}
