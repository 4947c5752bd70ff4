use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use rjet_core::config::JobConfig;
use rjet_core::dag::Dag;
use rjet_core::grid::{DataGrid, GridClientFactory};
use rjet_core::{JobId, Result};

use crate::job::context::JobContext;
use crate::job::manager::JobManager;
use crate::job::{Job, JobFuture, JobStatus};

/// Job submission surface of one member
pub struct JetEngine {
    grid: Arc<dyn DataGrid>,
    clients: Arc<dyn GridClientFactory>,
    /// jobs that haven't reached a terminal state
    jobs: Arc<DashMap<JobId, Arc<JobManager>>>,
    next_job_id: AtomicU64,
}

impl JetEngine {
    pub fn new(grid: Arc<dyn DataGrid>, clients: Arc<dyn GridClientFactory>) -> Self {
        JetEngine {
            grid,
            clients,
            jobs: Arc::new(DashMap::new()),
            next_job_id: AtomicU64::new(1),
        }
    }

    pub fn grid(&self) -> Arc<dyn DataGrid> {
        self.grid.clone()
    }

    pub fn new_job(&self, dag: Dag, config: JobConfig) -> Result<Job> {
        config.validate()?;

        let job_id = JobId(self.next_job_id.fetch_add(1, Ordering::SeqCst));
        info!("{} created for `{}` with {:?}", job_id, dag.name(), config);
        let context = JobContext::new(job_id, dag, config, self.grid.clone(), self.clients.clone())?;

        let jobs = self.jobs.clone();
        let job = Job::new(context)?.on_terminal(Box::new(move |job_id, status: JobStatus| {
            jobs.remove(&job_id);
            debug!("{} removed from the registry as {:?}", job_id, status);
        }));
        self.jobs.insert(job_id, job.manager().clone());
        Ok(job)
    }

    /// Creates the job and starts executing it
    pub fn submit(&self, dag: Dag, config: JobConfig) -> Result<JobFuture> {
        let job = self.new_job(dag, config)?;
        let job_id = job.id();
        job.execute().map_err(|e| {
            self.jobs.remove(&job_id);
            e
        })
    }

    pub fn running_jobs(&self) -> Vec<JobId> {
        let mut jobs: Vec<JobId> = self.jobs.iter().map(|entry| *entry.key()).collect();
        jobs.sort();
        jobs
    }

    pub fn cancel(&self, job_id: JobId) -> bool {
        match self.jobs.get(&job_id) {
            Some(manager) => {
                manager.cancel();
                true
            }
            None => false,
        }
    }
}
