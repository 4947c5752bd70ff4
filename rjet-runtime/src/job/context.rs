use std::sync::Arc;

use rjet_core::config::{ClientConfig, ClusterTarget, JobConfig};
use rjet_core::dag::{Dag, VertexIndex};
use rjet_core::grid::{DataGrid, GridClientFactory};
use rjet_core::processor::SupplierContext;
use rjet_core::task::InterruptSignal;
use rjet_core::{JobId, Result};

use crate::edge::EdgeRegistry;
use crate::executor::ExecutorContext;

/// Everything a job and its containers need, handed to each of them when
/// they are built.
pub struct JobContext {
    job_id: JobId,
    dag: Dag,
    config: JobConfig,
    grid: Arc<dyn DataGrid>,
    clients: Arc<dyn GridClientFactory>,
    executor: ExecutorContext,
    edges: EdgeRegistry,
    /// raised when the job is cancelled
    interrupt: InterruptSignal,
}

impl JobContext {
    pub fn new(
        job_id: JobId,
        dag: Dag,
        config: JobConfig,
        grid: Arc<dyn DataGrid>,
        clients: Arc<dyn GridClientFactory>,
    ) -> Result<Self> {
        let executor = ExecutorContext::new(job_id, &config)?;
        Ok(JobContext::with_executor(
            job_id, dag, config, grid, clients, executor,
        ))
    }

    pub fn with_executor(
        job_id: JobId,
        dag: Dag,
        config: JobConfig,
        grid: Arc<dyn DataGrid>,
        clients: Arc<dyn GridClientFactory>,
        executor: ExecutorContext,
    ) -> Self {
        JobContext {
            job_id,
            dag,
            config,
            grid,
            clients,
            executor,
            edges: EdgeRegistry::new(),
            interrupt: InterruptSignal::new(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn executor(&self) -> &ExecutorContext {
        &self.executor
    }

    pub fn edges(&self) -> &EdgeRegistry {
        &self.edges
    }

    pub fn interrupt(&self) -> &InterruptSignal {
        &self.interrupt
    }

    /// Client settings of the target cluster, `None` for the local one
    pub fn default_client(&self) -> Option<ClientConfig> {
        match &self.config.cluster {
            ClusterTarget::Local => None,
            ClusterTarget::Client(client) => Some(client.clone()),
        }
    }

    pub fn local_parallelism(&self, vertex_index: VertexIndex) -> usize {
        self.dag
            .vertex(vertex_index)
            .parallelism_or(self.config.local_parallelism) as usize
    }

    pub fn supplier_context(&self, vertex_index: VertexIndex) -> SupplierContext {
        SupplierContext::new(
            self.job_id,
            self.dag.vertex(vertex_index).name(),
            self.local_parallelism(vertex_index),
            self.grid.clone(),
            self.clients.clone(),
        )
        .with_default_client(self.default_client())
    }
}
