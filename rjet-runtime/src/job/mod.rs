use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rjet_core::future::{completion, AwaitResult, Completion};
use rjet_core::{JetError, JobId};

use crate::job::context::JobContext;
use crate::job::manager::JobManager;
use crate::utils::thread::spawn;

pub mod context;
mod execution;
pub mod manager;

#[atomic_enum]
#[derive(Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    New = 0,
    Starting = 1,
    Executing = 2,
    Completed = 3,
    Failed = 4,
    /// cancelled, or stopped by an interruption
    Interrupted = 5,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        match self {
            JobStatus::Completed | JobStatus::Failed | JobStatus::Interrupted => true,
            _ => false,
        }
    }

    fn of_result(rt: &rjet_core::Result<()>) -> Self {
        match rt {
            Ok(()) => JobStatus::Completed,
            Err(JetError::Cancelled) | Err(JetError::Interrupted(_)) => JobStatus::Interrupted,
            Err(_) => JobStatus::Failed,
        }
    }
}

pub(crate) type TerminalHook = Box<dyn FnOnce(JobId, JobStatus) + Send>;

/// One execution of a DAG
pub struct Job {
    id: JobId,
    manager: Arc<JobManager>,
    status: Arc<AtomicJobStatus>,
    on_terminal: Option<TerminalHook>,
}

impl Job {
    pub fn new(context: JobContext) -> rjet_core::Result<Self> {
        let id = context.job_id();
        let manager = JobManager::new(Arc::new(context))?;
        Ok(Job {
            id,
            manager: Arc::new(manager),
            status: Arc::new(AtomicJobStatus::new(JobStatus::New)),
            on_terminal: None,
        })
    }

    pub(crate) fn on_terminal(mut self, hook: TerminalHook) -> Self {
        self.on_terminal = Some(hook);
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status.load(Ordering::SeqCst)
    }

    pub fn manager(&self) -> &Arc<JobManager> {
        &self.manager
    }

    /// Runs the job on its own coordination thread
    pub fn execute(self) -> rjet_core::Result<JobFuture> {
        let Job {
            id,
            manager,
            status,
            on_terminal,
        } = self;
        let (completer, completion) = completion();

        let thread_manager = manager.clone();
        let thread_status = status.clone();
        spawn(format!("{}-coordinator", id).as_str(), move || {
            let rt = coordinate(thread_manager.as_ref(), thread_status.as_ref());
            thread_manager.close();

            let terminal = JobStatus::of_result(&rt);
            thread_status.store(terminal, Ordering::SeqCst);
            match &rt {
                Ok(()) => info!("{} completed", id),
                Err(e) => error!("{} ended {:?}: {}", id, terminal, e),
            }

            if let Some(hook) = on_terminal {
                hook(id, terminal);
            }
            completer.complete(rt);
        })?;

        Ok(JobFuture {
            id,
            completion,
            manager,
            status,
        })
    }
}

fn coordinate(manager: &JobManager, status: &AtomicJobStatus) -> rjet_core::Result<()> {
    status.store(JobStatus::Starting, Ordering::SeqCst);
    info!("{} starting", manager.context().job_id());

    let completion = manager.run()?;
    status.store(JobStatus::Executing, Ordering::SeqCst);
    info!("{} executing", manager.context().job_id());

    completion.wait()
}

/// Handle of a running job, resolves once with the job's result
pub struct JobFuture {
    id: JobId,
    completion: Completion<()>,
    manager: Arc<JobManager>,
    status: Arc<AtomicJobStatus>,
}

impl JobFuture {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status.load(Ordering::SeqCst)
    }

    pub fn manager(&self) -> &Arc<JobManager> {
        &self.manager
    }

    pub fn wait(&self) -> rjet_core::Result<()> {
        self.completion.wait()
    }

    pub fn await_timeout(&self, timeout: Duration) -> AwaitResult<()> {
        self.completion.await_timeout(timeout)
    }

    pub fn cancel(&self) {
        self.manager.cancel();
    }
}
