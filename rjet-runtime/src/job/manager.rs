use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rjet_core::future::{completion, AwaitResult, Completion};
use rjet_core::task::{Task, TaskContext, TaskListener};
use rjet_core::{JetError, Result};

use crate::container::{ContainerRequest, ContainerState, ProcessingContainer};
use crate::job::context::JobContext;
use crate::job::execution::JobExecution;

/// Drives the containers of one job through their lifecycle and hands the
/// resulting tasks to the pools.
pub struct JobManager {
    context: Arc<JobContext>,
    /// one per vertex, by vertex index
    containers: Vec<Arc<ProcessingContainer>>,
    executing: AtomicBool,
}

impl JobManager {
    pub fn new(context: Arc<JobContext>) -> Result<Self> {
        let mut containers = Vec::with_capacity(context.dag().len());
        for vertex_index in 0..context.dag().len() {
            let container = ProcessingContainer::new(context.clone(), vertex_index)?;
            containers.push(Arc::new(container));
        }

        Ok(JobManager {
            context,
            containers,
            executing: AtomicBool::new(false),
        })
    }

    pub fn context(&self) -> &Arc<JobContext> {
        &self.context
    }

    pub fn containers(&self) -> &[Arc<ProcessingContainer>] {
        self.containers.as_slice()
    }

    pub fn container_by_name(&self, name: &str) -> Option<&Arc<ProcessingContainer>> {
        self.context
            .dag()
            .vertex_by_name(name)
            .map(|index| &self.containers[index])
    }

    /// Marks the start of the one execution this manager allows
    pub fn register_execution(&self) -> Result<()> {
        self.executing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| JetError::AlreadyRunning(self.context.job_id().to_string()))
    }

    /// Starts the containers consumers first, one bounded request at a time.
    ///
    /// The first failure stops the sequence: nothing further is started and
    /// every container asked to start so far is interrupted with the cause.
    pub fn start_containers(&self) -> Result<()> {
        let mut started: Vec<&Arc<ProcessingContainer>> = Vec::new();
        for vertex_index in self.context.dag().reverse_topological_order() {
            let container = &self.containers[*vertex_index];
            if let Err(e) = self.start_container(container) {
                error!(
                    "{} failed to start container `{}`: {}",
                    self.context.job_id(),
                    container.name(),
                    e
                );
                // the failed one may still be working on the request
                container.handle_container_request(ContainerRequest::Interrupt(e.clone()));
                self.interrupt_containers(started.as_slice(), &e);
                return Err(e);
            }
            started.push(container);
        }

        info!(
            "{} started {} containers",
            self.context.job_id(),
            started.len()
        );
        Ok(())
    }

    fn start_container(&self, container: &ProcessingContainer) -> Result<()> {
        if let Some(cause) = self.context.interrupt().cause() {
            return Err(cause);
        }

        let timeout = self.context.config().await_timeout();
        info!(
            "{} starting container `{}`",
            self.context.job_id(),
            container.name()
        );
        let state = container
            .handle_container_request(ContainerRequest::Execute)
            .await_timeout(timeout)
            .into_result(
                format!("container `{}` to start", container.name()).as_str(),
                timeout,
            )?;

        match state {
            ContainerState::Executing => Ok(()),
            state => Err(container.cause().unwrap_or_else(|| {
                JetError::IllegalState(format!(
                    "container `{}` is {:?} instead of executing",
                    container.name(),
                    state
                ))
            })),
        }
    }

    /// Best effort, every request is bounded by the job's await timeout
    fn interrupt_containers(&self, containers: &[&Arc<ProcessingContainer>], cause: &JetError) {
        let timeout = self.context.config().await_timeout();
        let pending: Vec<(&Arc<ProcessingContainer>, Completion<ContainerState>)> = containers
            .iter()
            .map(|container| {
                let completion = container
                    .handle_container_request(ContainerRequest::Interrupt(cause.clone()));
                (*container, completion)
            })
            .collect();

        for (container, completion) in pending {
            match completion.await_timeout(timeout) {
                AwaitResult::Value(state) => {
                    info!("container `{}` interrupted, now {:?}", container.name(), state)
                }
                AwaitResult::TimedOut => {
                    warn!("container `{}` didn't confirm the interrupt", container.name())
                }
                AwaitResult::Failed(e) => {
                    warn!("container `{}` failed to interrupt: {}", container.name(), e)
                }
            }
        }
    }

    /// Submits the network batch, then the processing batch.
    ///
    /// When either submission fails, every network task is interrupted in
    /// creation order, then every processing task, and the error that broke
    /// the submission is returned as is.
    pub fn submit_tasks(&self, listener: Option<Arc<dyn TaskListener>>) -> Result<()> {
        let executor = self.context.executor();
        let network_tasks = executor.network_tasks();
        let processing_tasks = executor.processing_tasks();
        info!(
            "{} submitting {} network and {} processing tasks",
            self.context.job_id(),
            network_tasks.len(),
            processing_tasks.len()
        );

        let rt = executor
            .network_executor()
            .submit_task_context(task_context(&network_tasks, &listener))
            .and_then(|_| {
                executor
                    .processing_executor()
                    .submit_task_context(task_context(&processing_tasks, &listener))
            });

        if let Err(e) = rt {
            error!(
                "{} task submission failed, rolling back: {}",
                self.context.job_id(),
                e
            );
            interrupt_tasks(network_tasks.as_slice(), &e);
            interrupt_tasks(processing_tasks.as_slice(), &e);
            return Err(e);
        }

        Ok(())
    }

    /// Registers, starts the containers and submits their tasks. The
    /// returned handle resolves when every submitted task has reported.
    pub fn run(&self) -> Result<Completion<()>> {
        self.register_execution()?;
        self.start_containers()?;

        if let Some(cause) = self.context.interrupt().cause() {
            let containers: Vec<&Arc<ProcessingContainer>> = self.containers.iter().collect();
            self.interrupt_containers(containers.as_slice(), &cause);
            return Err(cause);
        }

        let (completer, completion) = completion();
        let execution = Arc::new(JobExecution::new(
            self.context.clone(),
            self.containers.clone(),
            completer,
        ));
        if let Err(e) = self.submit_tasks(Some(execution)) {
            for container in &self.containers {
                container.handle_container_request(ContainerRequest::Interrupt(e.clone()));
            }
            return Err(e);
        }

        Ok(completion)
    }

    /// Interrupts every task and container with `JetError::Cancelled`
    pub fn cancel(&self) {
        let cause = JetError::Cancelled;
        if !self.context.interrupt().interrupt(&cause) {
            return;
        }

        info!("{} cancelling", self.context.job_id());
        self.context.executor().interrupt_all(&cause);
        for container in &self.containers {
            container.handle_container_request(ContainerRequest::Interrupt(cause.clone()));
        }
    }

    /// Stops the container request handlers and the pools
    pub fn close(&self) {
        for container in &self.containers {
            container.close();
        }
        self.context.executor().shutdown();
    }
}

fn task_context(
    tasks: &[Arc<dyn Task>],
    listener: &Option<Arc<dyn TaskListener>>,
) -> TaskContext {
    match listener {
        Some(listener) => TaskContext::with_listener(tasks.to_vec(), listener.clone()),
        None => TaskContext::new(tasks.to_vec()),
    }
}

/// A panicking `interrupt` doesn't keep the remaining tasks from being interrupted
fn interrupt_tasks(tasks: &[Arc<dyn Task>], cause: &JetError) {
    for task in tasks {
        let rt = catch_unwind(AssertUnwindSafe(|| task.interrupt(cause)));
        if rt.is_err() {
            error!("interrupting task `{}` panicked", task.name());
        }
    }
}
