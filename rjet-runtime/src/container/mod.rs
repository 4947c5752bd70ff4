//! Per-vertex runtime unit of a job on this member.
//!
//! Each container owns a request thread. Requests from the job manager and
//! the internal finalize notice are queued and handled one at a time, so a
//! container never runs two transitions at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::channel::{unbounded, Receiver, Sender};

use rjet_core::dag::VertexIndex;
use rjet_core::future::{completion, Completer, Completion};
use rjet_core::task::{Task, TaskOutcome};
use rjet_core::JetError;

use crate::job::context::JobContext;
use crate::utils::thread::spawn;

mod start;

#[atomic_enum]
#[derive(PartialEq)]
pub enum ContainerState {
    New = 0,
    /// building processors and tasks
    Starting = 1,
    /// tasks handed to the executor context
    Executing = 2,
    Completed = 3,
    Failed = 4,
    Interrupted = 5,
}

impl ContainerState {
    pub fn is_terminal(&self) -> bool {
        match self {
            ContainerState::Completed | ContainerState::Failed | ContainerState::Interrupted => {
                true
            }
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ContainerRequest {
    /// build the processors and contribute their tasks
    Execute,
    /// stop the container's tasks, recording the cause
    Interrupt(JetError),
}

enum Envelope {
    Request(ContainerRequest, Completer<ContainerState>),
    /// all processing tasks have reported
    Finalize,
    Close,
}

struct ContainerShared {
    name: String,
    vertex_index: VertexIndex,
    state: AtomicContainerState,
    cause: Mutex<Option<JetError>>,
    tasks: Mutex<Vec<Arc<dyn Task>>>,
    pending_tasks: AtomicUsize,
    failure: Mutex<Option<JetError>>,
    interruption: Mutex<Option<JetError>>,
}

impl ContainerShared {
    fn state(&self) -> ContainerState {
        self.state.load(Ordering::SeqCst)
    }

    fn transition(&self, to: ContainerState) {
        let from = self.state.swap(to, Ordering::SeqCst);
        info!("container `{}` {:?} -> {:?}", self.name, from, to);
    }

    fn record_cause(&self, cause: &JetError) {
        let mut guard = self.cause.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_none() {
            *guard = Some(cause.clone());
        }
    }

    fn first(slot: &Mutex<Option<JetError>>, e: JetError) {
        let mut guard = slot.lock().unwrap_or_else(|p| p.into_inner());
        if guard.is_none() {
            *guard = Some(e);
        }
    }

    fn tasks(&self) -> Vec<Arc<dyn Task>> {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

pub struct ProcessingContainer {
    shared: Arc<ContainerShared>,
    sender: Sender<Envelope>,
}

impl ProcessingContainer {
    pub fn new(
        context: Arc<JobContext>,
        vertex_index: VertexIndex,
    ) -> rjet_core::Result<Self> {
        let name = context.dag().vertex(vertex_index).name().to_string();
        let shared = Arc::new(ContainerShared {
            name: name.clone(),
            vertex_index,
            state: AtomicContainerState::new(ContainerState::New),
            cause: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            pending_tasks: AtomicUsize::new(0),
            failure: Mutex::new(None),
            interruption: Mutex::new(None),
        });

        let (sender, receiver) = unbounded();
        let thread_shared = shared.clone();
        spawn(
            format!("{}-container-{}", context.job_id(), name).as_str(),
            move || run_container(context, thread_shared, receiver),
        )?;

        Ok(ProcessingContainer { shared, sender })
    }

    pub fn name(&self) -> &str {
        self.shared.name.as_str()
    }

    pub fn vertex_index(&self) -> VertexIndex {
        self.shared.vertex_index
    }

    pub fn state(&self) -> ContainerState {
        self.shared.state()
    }

    /// Why the container failed or was interrupted
    pub fn cause(&self) -> Option<JetError> {
        self.shared
            .cause
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Processing tasks contributed by this container
    pub fn tasks(&self) -> Vec<Arc<dyn Task>> {
        self.shared.tasks()
    }

    /// Queues the request; the returned handle resolves with the state the
    /// container is in once the request was handled.
    pub fn handle_container_request(&self, request: ContainerRequest) -> Completion<ContainerState> {
        let (completer, completion) = completion();
        if let Err(e) = self.sender.send(Envelope::Request(request, completer)) {
            if let Envelope::Request(_, completer) = e.into_inner() {
                completer.complete(Err(JetError::Fatal(format!(
                    "request handler of container `{}` is gone",
                    self.name()
                ))));
            }
        }
        completion
    }

    /// Called once for each of the container's processing tasks
    pub fn task_done(&self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => {}
            TaskOutcome::Failed(e) => ContainerShared::first(&self.shared.failure, e.clone()),
            TaskOutcome::Interrupted(cause) => {
                ContainerShared::first(&self.shared.interruption, cause.clone())
            }
        }

        let previous = self.shared.pending_tasks.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            // the handler is gone only after close, nothing left to finalize then
            let _ = self.sender.send(Envelope::Finalize);
        }
    }

    /// Stops the request thread after the requests already queued
    pub fn close(&self) {
        let _ = self.sender.send(Envelope::Close);
    }
}

fn run_container(
    context: Arc<JobContext>,
    shared: Arc<ContainerShared>,
    receiver: Receiver<Envelope>,
) {
    while let Ok(envelope) = receiver.recv() {
        match envelope {
            Envelope::Request(ContainerRequest::Execute, completer) => {
                completer.complete(on_execute(&context, &shared));
            }
            Envelope::Request(ContainerRequest::Interrupt(cause), completer) => {
                completer.complete(Ok(on_interrupt(&shared, &cause)));
            }
            Envelope::Finalize => on_finalize(&shared),
            Envelope::Close => break,
        }
    }
    debug!("container `{}` request handler stopped", shared.name);
}

fn on_execute(
    context: &JobContext,
    shared: &ContainerShared,
) -> rjet_core::Result<ContainerState> {
    let state = shared.state();
    if state.is_terminal() {
        return Ok(state);
    }
    if state != ContainerState::New {
        return Err(JetError::IllegalState(format!(
            "container `{}` is already {:?}",
            shared.name, state
        )));
    }

    shared.transition(ContainerState::Starting);
    match start::start_container(context, shared.vertex_index) {
        Ok(tasks) => {
            shared.pending_tasks.store(tasks.len(), Ordering::SeqCst);
            *shared.tasks.lock().unwrap_or_else(|p| p.into_inner()) = tasks;
            shared.transition(ContainerState::Executing);
            Ok(ContainerState::Executing)
        }
        Err(e) => {
            error!("container `{}` failed to start: {}", shared.name, e);
            shared.record_cause(&e);
            shared.transition(ContainerState::Failed);
            Err(e)
        }
    }
}

fn on_interrupt(shared: &ContainerShared, cause: &JetError) -> ContainerState {
    let state = shared.state();
    if state.is_terminal() {
        return state;
    }

    shared.record_cause(cause);
    for task in shared.tasks() {
        task.interrupt(cause);
    }
    shared.transition(ContainerState::Interrupted);
    ContainerState::Interrupted
}

fn on_finalize(shared: &ContainerShared) {
    if shared.state().is_terminal() {
        return;
    }

    let failure = shared.failure.lock().unwrap_or_else(|p| p.into_inner()).clone();
    let interruption = shared
        .interruption
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .clone();
    match (failure, interruption) {
        (Some(e), _) => {
            shared.record_cause(&e);
            shared.transition(ContainerState::Failed);
        }
        (None, Some(cause)) => {
            shared.record_cause(&cause);
            shared.transition(ContainerState::Interrupted);
        }
        (None, None) => shared.transition(ContainerState::Completed),
    }
}
