use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rjet_core::future::Completer;
use rjet_core::task::{TaskListener, TaskOutcome};
use rjet_core::{JetError, Result};

use crate::container::ProcessingContainer;
use crate::job::context::JobContext;

/// Follows the submitted tasks of one run to the end.
///
/// The first failure interrupts every sibling in both pools. Processing
/// outcomes are forwarded to the owning container. The last report
/// resolves the run with the first failure, else the first interruption
/// cause, else success.
pub(crate) struct JobExecution {
    context: Arc<JobContext>,
    containers: Vec<Arc<ProcessingContainer>>,
    /// processing task name -> position in `containers`
    owners: HashMap<String, usize>,
    remaining: AtomicUsize,
    failure: Mutex<Option<JetError>>,
    interruption: Mutex<Option<JetError>>,
    completer: Mutex<Option<Completer<()>>>,
}

impl JobExecution {
    pub fn new(
        context: Arc<JobContext>,
        containers: Vec<Arc<ProcessingContainer>>,
        completer: Completer<()>,
    ) -> Self {
        let mut owners = HashMap::new();
        for (i, container) in containers.iter().enumerate() {
            for task in container.tasks() {
                owners.insert(task.name().to_string(), i);
            }
        }

        let executor = context.executor();
        let total = executor.network_tasks().len() + executor.processing_tasks().len();
        JobExecution {
            context,
            containers,
            owners,
            remaining: AtomicUsize::new(total),
            failure: Mutex::new(None),
            interruption: Mutex::new(None),
            completer: Mutex::new(Some(completer)),
        }
    }

    fn on_failure(&self, task_name: &str, e: &JetError) {
        {
            let mut failure = self.failure.lock().unwrap_or_else(|p| p.into_inner());
            if failure.is_some() {
                return;
            }
            *failure = Some(e.clone());
        }

        error!(
            "{} task `{}` failed, interrupting all tasks: {}",
            self.context.job_id(),
            task_name,
            e
        );
        self.context.executor().interrupt_all(e);
    }

    fn on_interrupted(&self, cause: &JetError) {
        let mut interruption = self.interruption.lock().unwrap_or_else(|p| p.into_inner());
        if interruption.is_none() {
            *interruption = Some(cause.clone());
        }
    }

    fn result(&self) -> Result<()> {
        let failure = self.failure.lock().unwrap_or_else(|p| p.into_inner()).clone();
        if let Some(e) = failure {
            return Err(e);
        }
        let interruption = self
            .interruption
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        match interruption {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }
}

impl TaskListener for JobExecution {
    fn on_task_done(&self, task_name: &str, outcome: TaskOutcome) {
        match &outcome {
            TaskOutcome::Completed => {}
            TaskOutcome::Failed(e) => self.on_failure(task_name, e),
            TaskOutcome::Interrupted(cause) => self.on_interrupted(cause),
        }

        if let Some(i) = self.owners.get(task_name) {
            self.containers[*i].task_done(&outcome);
        }

        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            let completer = self.completer.lock().unwrap_or_else(|p| p.into_inner()).take();
            if let Some(completer) = completer {
                completer.complete(self.result());
            }
        }
    }
}
