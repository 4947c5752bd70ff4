use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use rjet_core::task::{Task, TaskContext, TaskListener, TaskOutcome, TaskProgress};
use rjet_core::{JetError, Result};

use crate::executor::TaskExecutor;
use crate::utils::thread::{spawn, Backoff};

struct Admitted {
    task: Arc<dyn Task>,
    listener: Option<Arc<dyn TaskListener>>,
}

impl Admitted {
    fn report(&self, outcome: TaskOutcome) {
        if let Some(listener) = &self.listener {
            listener.on_task_done(self.task.name(), outcome);
        }
    }
}

struct PoolState {
    shutdown: bool,
    /// admitted but not yet reported tasks
    admitted: usize,
    /// newly admitted tasks, one queue per worker
    queues: Vec<Vec<Admitted>>,
    next_worker: usize,
}

struct PoolInner {
    name: String,
    capacity: usize,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fixed set of worker threads cooperatively stepping their tasks.
///
/// A batch is placed under the single state lock, so it is either admitted as
/// a whole or rejected as a whole. Every admitted task is stepped by one
/// worker until it completes, fails or observes an interruption, and its
/// listener hears about that exactly once.
pub struct ExecutorPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutorPool {
    pub fn new(name: &str, threads: usize, capacity: usize) -> Result<Self> {
        let threads = threads.max(1);
        let inner = Arc::new(PoolInner {
            name: name.to_string(),
            capacity,
            state: Mutex::new(PoolState {
                shutdown: false,
                admitted: 0,
                queues: (0..threads).map(|_| Vec::new()).collect(),
                next_worker: 0,
            }),
        });

        let mut workers = Vec::with_capacity(threads);
        for worker_id in 0..threads {
            let worker_inner = inner.clone();
            let handle = spawn(format!("{}-{}", name, worker_id).as_str(), move || {
                run_worker(worker_inner, worker_id)
            });
            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // let the workers spawned so far exit
                    inner.lock().shutdown = true;
                    return Err(e);
                }
            }
        }

        info!("executor pool `{}` started with {} threads", name, threads);
        Ok(ExecutorPool {
            inner,
            workers: Mutex::new(workers),
        })
    }

    /// Number of admitted tasks not yet reported
    pub fn admitted(&self) -> usize {
        self.inner.lock().admitted
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }
}

impl TaskExecutor for ExecutorPool {
    fn name(&self) -> &str {
        self.inner.name.as_str()
    }

    fn submit_task_context(&self, context: TaskContext) -> Result<()> {
        let mut state = self.inner.lock();
        if state.shutdown {
            return Err(JetError::Submission(format!(
                "pool `{}` is shut down",
                self.inner.name
            )));
        }
        if state.admitted + context.len() > self.inner.capacity {
            return Err(JetError::Submission(format!(
                "pool `{}` can't take {} more tasks, {} of {} in use",
                self.inner.name,
                context.len(),
                state.admitted,
                self.inner.capacity
            )));
        }

        let batch_size = context.len();
        let (tasks, listener) = context.into_parts();
        let workers = state.queues.len();
        for task in tasks {
            let worker_id = state.next_worker % workers;
            state.next_worker = state.next_worker.wrapping_add(1);
            state.queues[worker_id].push(Admitted {
                task,
                listener: listener.clone(),
            });
        }
        state.admitted += batch_size;

        info!(
            "pool `{}` admitted {} tasks, {} in use",
            self.inner.name, batch_size, state.admitted
        );
        Ok(())
    }

    fn shutdown(&self) {
        {
            let mut state = self.inner.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }

        let workers: Vec<JoinHandle<()>> = {
            let mut workers = self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            workers.drain(..).collect()
        };
        for worker in workers {
            if worker.join().is_err() {
                error!("worker of pool `{}` panicked", self.inner.name);
            }
        }
        info!("executor pool `{}` shut down", self.inner.name);
    }
}

impl Drop for ExecutorPool {
    fn drop(&mut self) {
        // workers exit on their own once nothing is left to run
        self.inner.lock().shutdown = true;
    }
}

fn run_worker(inner: Arc<PoolInner>, worker_id: usize) {
    let mut running: Vec<Admitted> = Vec::new();
    let mut backoff = Backoff::new();
    loop {
        {
            let mut state = inner.lock();
            running.extend(state.queues[worker_id].drain(..));
            if state.shutdown && running.is_empty() {
                break;
            }
        }

        let mut progressed = false;
        let mut finished = 0;
        running.retain(|admitted| match step(admitted.task.as_ref()) {
            Ok(TaskProgress::MadeProgress) => {
                progressed = true;
                true
            }
            Ok(TaskProgress::NoProgress) => true,
            Ok(TaskProgress::Done) => {
                debug!("task `{}` completed", admitted.task.name());
                admitted.report(TaskOutcome::Completed);
                finished += 1;
                false
            }
            Err(e) => {
                debug!("task `{}` stopped: {}", admitted.task.name(), e);
                admitted.report(TaskOutcome::from_error(e));
                finished += 1;
                false
            }
        });

        if finished > 0 {
            let mut state = inner.lock();
            state.admitted -= finished;
        }

        if progressed || finished > 0 {
            backoff.reset();
        } else {
            backoff.idle();
        }
    }
}

/// One call of the task, a panic is turned into a fatal failure
fn step(task: &dyn Task) -> Result<TaskProgress> {
    match catch_unwind(AssertUnwindSafe(|| task.call())) {
        Ok(rt) => rt,
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            error!("task `{}` panicked: {}", task.name(), message);
            Err(JetError::Fatal(format!(
                "task `{}` panicked: {}",
                task.name(),
                message
            )))
        }
    }
}
