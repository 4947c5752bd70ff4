#[macro_use]
extern crate log;

use std::sync::Arc;

use serde_json::json;

use rjet_connector_imdg::memory::MemoryDataGrid;
use rjet_connector_imdg::{read_map, write_list};
use rjet_core::config::JobConfig;
use rjet_core::dag::{DagBuilder, Edge, Vertex};
use rjet_core::element::Record;
use rjet_core::functions;
use rjet_core::grid::{DataGrid, NoClientFactory};
use rjet_runtime::logger::init_log;
use rjet_runtime::JetEngine;

const PARTITIONS: u32 = 8;
const ENTRIES: usize = 1000;

/// Reads a partitioned map with 4 instances, doubles every value and
/// collects the entries into a list on one instance.
///
/// An optional argument names a YAML file with the job configuration.
pub fn main() -> anyhow::Result<()> {
    init_log("INFO")?;

    let config = match std::env::args().nth(1) {
        Some(path) => JobConfig::from_yaml_file(path)?,
        None => JobConfig::new().local_parallelism(4),
    };

    let grid = Arc::new(MemoryDataGrid::new("127.0.0.1:5701", PARTITIONS));
    let numbers = grid.map("numbers");
    for i in 0..ENTRIES {
        numbers.put(format!("n-{}", i).as_str(), json!(i))?;
    }

    let dag = DagBuilder::new("double-numbers")
        .vertex(Vertex::new("read-numbers", read_map("numbers")).local_parallelism(4))
        .vertex(Vertex::new("double", || {
            functions::map(|record: Record| {
                let doubled = record.value.as_u64().unwrap_or(0) * 2;
                Ok(Record {
                    key: record.key,
                    value: json!(doubled),
                })
            })
        }))
        .vertex(Vertex::new("write-doubled", write_list("doubled")).local_parallelism(1))
        .edge(Edge::between("read-numbers", "double"))
        .edge(Edge::between("double", "write-doubled"))
        .build()?;

    let engine = JetEngine::new(grid.clone(), Arc::new(NoClientFactory));
    let job = engine.submit(dag, config)?;
    job.wait()?;

    let doubled = grid.list("doubled");
    info!("{} finished, `doubled` holds {} entries", job.id(), doubled.len());
    for item in doubled.items()?.iter().take(5) {
        info!("  {}", item);
    }
    Ok(())
}
