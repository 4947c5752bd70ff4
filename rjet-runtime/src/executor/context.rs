use std::sync::{Arc, Mutex};

use rjet_core::config::JobConfig;
use rjet_core::task::Task;
use rjet_core::{JetError, JobId, Result};

use crate::executor::pool::ExecutorPool;
use crate::executor::TaskExecutor;

/// The two pools of a job and the tasks its containers contributed to them.
///
/// Containers append while they start. Once the job manager submitted the
/// lists they are only read.
pub struct ExecutorContext {
    network_executor: Arc<dyn TaskExecutor>,
    processing_executor: Arc<dyn TaskExecutor>,
    network_tasks: Mutex<Vec<Arc<dyn Task>>>,
    processing_tasks: Mutex<Vec<Arc<dyn Task>>>,
}

impl ExecutorContext {
    pub fn new(job_id: JobId, config: &JobConfig) -> Result<Self> {
        let network = ExecutorPool::new(
            format!("{}-network", job_id).as_str(),
            config.network_threads,
            config.pool_capacity,
        )?;
        let processing = match ExecutorPool::new(
            format!("{}-processing", job_id).as_str(),
            config.processing_threads,
            config.pool_capacity,
        ) {
            Ok(processing) => processing,
            Err(e) => {
                network.shutdown();
                return Err(e);
            }
        };

        Ok(ExecutorContext::with_executors(
            Arc::new(network),
            Arc::new(processing),
        ))
    }

    pub fn with_executors(
        network_executor: Arc<dyn TaskExecutor>,
        processing_executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        ExecutorContext {
            network_executor,
            processing_executor,
            network_tasks: Mutex::new(Vec::new()),
            processing_tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn network_executor(&self) -> Arc<dyn TaskExecutor> {
        self.network_executor.clone()
    }

    pub fn processing_executor(&self) -> Arc<dyn TaskExecutor> {
        self.processing_executor.clone()
    }

    pub fn add_network_tasks(&self, tasks: Vec<Arc<dyn Task>>) {
        lock(&self.network_tasks).extend(tasks);
    }

    pub fn add_processing_tasks(&self, tasks: Vec<Arc<dyn Task>>) {
        lock(&self.processing_tasks).extend(tasks);
    }

    /// In the order the tasks were added
    pub fn network_tasks(&self) -> Vec<Arc<dyn Task>> {
        lock(&self.network_tasks).clone()
    }

    pub fn processing_tasks(&self) -> Vec<Arc<dyn Task>> {
        lock(&self.processing_tasks).clone()
    }

    /// Interrupts every known task, network tasks first
    pub fn interrupt_all(&self, cause: &JetError) {
        for task in self.network_tasks() {
            task.interrupt(cause);
        }
        for task in self.processing_tasks() {
            task.interrupt(cause);
        }
    }

    pub fn shutdown(&self) {
        self.network_executor.shutdown();
        self.processing_executor.shutdown();
    }
}

fn lock(tasks: &Mutex<Vec<Arc<dyn Task>>>) -> std::sync::MutexGuard<Vec<Arc<dyn Task>>> {
    tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
