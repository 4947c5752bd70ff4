use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::element::Record;
use crate::error::{JetError, Result};
use crate::grid::{DataGrid, GridClientFactory};
use crate::task::InterruptSignal;
use crate::{JobId, MemberId};

/// Buffer of records emitted by one processor call, one bucket per outbound edge
#[derive(Debug)]
pub struct Outbox {
    buckets: Vec<VecDeque<Record>>,
    high_water_mark: usize,
}

impl Outbox {
    pub fn new(ordinals: usize, high_water_mark: usize) -> Self {
        Outbox {
            buckets: (0..ordinals).map(|_| VecDeque::new()).collect(),
            high_water_mark: high_water_mark.max(1),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Emit to every outbound edge. A vertex without outbound edges drops the record.
    pub fn emit(&mut self, record: Record) {
        let n = self.buckets.len();
        if n == 0 {
            return;
        }
        for bucket in &mut self.buckets[..n - 1] {
            bucket.push_back(record.clone());
        }
        self.buckets[n - 1].push_back(record);
    }

    pub fn emit_to(&mut self, ordinal: usize, record: Record) -> Result<()> {
        match self.buckets.get_mut(ordinal) {
            Some(bucket) => {
                bucket.push_back(record);
                Ok(())
            }
            None => Err(JetError::IllegalState(format!(
                "outbox has no ordinal {}",
                ordinal
            ))),
        }
    }

    /// Sources should stop emitting for this call once the outbox is full
    pub fn is_full(&self) -> bool {
        self.buckets
            .iter()
            .any(|bucket| bucket.len() >= self.high_water_mark)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|bucket| bucket.is_empty())
    }

    pub fn bucket_mut(&mut self, ordinal: usize) -> Option<&mut VecDeque<Record>> {
        self.buckets.get_mut(ordinal)
    }
}

/// What a processor instance knows about where it runs
#[derive(Clone, Debug)]
pub struct ProcessorContext {
    pub job_id: JobId,
    pub vertex_name: String,
    /// index among all instances of the vertex across the cluster
    pub global_index: usize,
    /// index among the instances of the vertex on this member
    pub local_index: usize,
    pub local_parallelism: usize,
    pub total_parallelism: usize,
    pub member: MemberId,
    pub interrupt: InterruptSignal,
}

/// What a supplier knows when asked for processors on one member
#[derive(Clone)]
pub struct SupplierContext {
    pub job_id: JobId,
    pub vertex_name: String,
    pub local_parallelism: usize,
    pub member: MemberId,
    pub member_index: usize,
    pub member_count: usize,
    pub default_client: Option<ClientConfig>,
    grid: Arc<dyn DataGrid>,
    clients: Arc<dyn GridClientFactory>,
}

impl SupplierContext {
    pub fn new(
        job_id: JobId,
        vertex_name: &str,
        local_parallelism: usize,
        grid: Arc<dyn DataGrid>,
        clients: Arc<dyn GridClientFactory>,
    ) -> Self {
        let member = grid.local_member();
        let members = grid.members();
        let member_index = members.iter().position(|m| m.eq(&member)).unwrap_or(0);
        SupplierContext {
            job_id,
            vertex_name: vertex_name.to_string(),
            local_parallelism,
            member,
            member_index,
            member_count: members.len().max(1),
            default_client: None,
            grid,
            clients,
        }
    }

    pub fn with_default_client(mut self, client: Option<ClientConfig>) -> Self {
        self.default_client = client;
        self
    }

    /// The data grid of the cluster this member belongs to
    pub fn grid(&self) -> Arc<dyn DataGrid> {
        self.grid.clone()
    }

    /// A remote data grid reached through a client connection
    pub fn connect(&self, client_config: &ClientConfig) -> Result<Arc<dyn DataGrid>> {
        self.clients.connect(client_config)
    }

    pub fn processor_context(&self, local_index: usize, interrupt: InterruptSignal) -> ProcessorContext {
        ProcessorContext {
            job_id: self.job_id,
            vertex_name: self.vertex_name.clone(),
            global_index: self.member_index * self.local_parallelism + local_index,
            local_index,
            local_parallelism: self.local_parallelism,
            total_parallelism: self.member_count * self.local_parallelism,
            member: self.member.clone(),
            interrupt,
        }
    }
}

/// Runtime instance of a vertex, driven by one processing task.
///
/// Inbound records arrive through `process`. Once every inbound edge is
/// exhausted `complete` is called until it returns `true`; sources do all of
/// their work there.
pub trait Processor: Send {
    fn init(&mut self, _context: &ProcessorContext) -> Result<()> {
        Ok(())
    }

    fn process(&mut self, _ordinal: usize, _record: Record, _outbox: &mut Outbox) -> Result<()> {
        Ok(())
    }

    fn complete(&mut self, _outbox: &mut Outbox) -> Result<bool> {
        Ok(true)
    }
}

/// Creates the processors of one vertex on one member
pub trait ProcessorSupplier: Send + Sync {
    fn init(&self, _context: &SupplierContext) -> Result<()> {
        Ok(())
    }

    /// Must return exactly `count` processors
    fn get(&self, context: &SupplierContext, count: usize) -> Result<Vec<Box<dyn Processor>>>;
}

impl<F> ProcessorSupplier for F
where
    F: Fn() -> Box<dyn Processor> + Send + Sync,
{
    fn get(&self, _context: &SupplierContext, count: usize) -> Result<Vec<Box<dyn Processor>>> {
        Ok((0..count).map(|_| self()).collect())
    }
}
