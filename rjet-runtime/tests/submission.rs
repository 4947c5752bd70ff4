use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rjet_connector_imdg::memory::MemoryDataGrid;
use rjet_core::config::JobConfig;
use rjet_core::dag::{DagBuilder, Vertex};
use rjet_core::functions;
use rjet_core::grid::NoClientFactory;
use rjet_core::processor::{Processor, ProcessorSupplier, SupplierContext};
use rjet_core::task::{Task, TaskContext, TaskProgress};
use rjet_core::{ErrorCategory, JetError, JobId, Result};
use rjet_runtime::container::{ContainerRequest, ContainerState};
use rjet_runtime::executor::{ExecutorContext, TaskExecutor};
use rjet_runtime::job::context::JobContext;
use rjet_runtime::job::manager::JobManager;

/// Admits batches without running them, or rejects every batch with `failure`
struct FakeExecutor {
    name: String,
    admitted: Mutex<Vec<usize>>,
    failure: Option<JetError>,
}

impl FakeExecutor {
    fn new(name: &str, failure: Option<JetError>) -> Arc<Self> {
        Arc::new(FakeExecutor {
            name: name.to_string(),
            admitted: Mutex::new(Vec::new()),
            failure,
        })
    }
}

impl TaskExecutor for FakeExecutor {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn submit_task_context(&self, context: TaskContext) -> Result<()> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => {
                self.admitted.lock().unwrap().push(context.len());
                Ok(())
            }
        }
    }

    fn shutdown(&self) {}
}

/// Records every interrupt call in a shared log
struct RecordingTask {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    panics: bool,
}

impl RecordingTask {
    fn batch(prefix: &str, n: usize, log: &Arc<Mutex<Vec<String>>>) -> Vec<Arc<dyn Task>> {
        (0..n)
            .map(|i| {
                let task: Arc<dyn Task> = Arc::new(RecordingTask {
                    name: format!("{}-{}", prefix, i),
                    log: log.clone(),
                    panics: false,
                });
                task
            })
            .collect()
    }
}

impl Task for RecordingTask {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn call(&self) -> Result<TaskProgress> {
        Ok(TaskProgress::Done)
    }

    fn interrupt(&self, _cause: &JetError) {
        self.log.lock().unwrap().push(self.name.clone());
        if self.panics {
            panic!("{} can't be interrupted", self.name);
        }
    }
}

/// Counts concurrent `init` calls
struct Gauge {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    inits: Arc<AtomicUsize>,
}

impl ProcessorSupplier for Gauge {
    fn init(&self, _context: &SupplierContext) -> Result<()> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        self.inits.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, _context: &SupplierContext, count: usize) -> Result<Vec<Box<dyn Processor>>> {
        Ok((0..count).map(|_| functions::noop()).collect())
    }
}

fn manager_with(
    vertex: Vertex,
    network: Arc<dyn TaskExecutor>,
    processing: Arc<dyn TaskExecutor>,
) -> JobManager {
    let dag = DagBuilder::new("single").vertex(vertex).build().unwrap();
    let config = JobConfig::new().seconds_to_await(5).local_parallelism(2);
    let context = JobContext::with_executor(
        JobId(7),
        dag,
        config,
        Arc::new(MemoryDataGrid::new("m1", 8)),
        Arc::new(NoClientFactory),
        ExecutorContext::with_executors(network, processing),
    );
    JobManager::new(Arc::new(context)).unwrap()
}

fn noop_vertex() -> Vertex {
    Vertex::new("only", functions::noop)
}

#[test]
pub fn processing_submission_failure_rolls_back_test() {
    let network = FakeExecutor::new("network", None);
    let failure = JetError::Fatal("processing pool is broken".to_string());
    let processing = FakeExecutor::new("processing", Some(failure.clone()));
    let manager = manager_with(noop_vertex(), network.clone(), processing);

    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = manager.context().executor();
    let mut network_tasks = RecordingTask::batch("net", 3, &log);
    // a throwing interrupt must not keep the rest from being interrupted
    network_tasks[1] = Arc::new(RecordingTask {
        name: "net-1".to_string(),
        log: log.clone(),
        panics: true,
    });
    executor.add_network_tasks(network_tasks);
    executor.add_processing_tasks(RecordingTask::batch("proc", 2, &log));

    let e = manager.submit_tasks(None).unwrap_err();
    assert_eq!(e, failure);
    assert_eq!(e.category(), ErrorCategory::Fatal);
    assert_eq!(*network.admitted.lock().unwrap(), vec![3]);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["net-0", "net-1", "net-2", "proc-0", "proc-1"]
    );
    manager.close();
}

#[test]
pub fn network_submission_failure_keeps_category_test() {
    let failure = JetError::Submission("network pool is full".to_string());
    let network = FakeExecutor::new("network", Some(failure.clone()));
    let processing = FakeExecutor::new("processing", None);
    let manager = manager_with(noop_vertex(), network, processing.clone());

    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = manager.context().executor();
    executor.add_network_tasks(RecordingTask::batch("net", 2, &log));
    executor.add_processing_tasks(RecordingTask::batch("proc", 1, &log));

    let e = manager.submit_tasks(None).unwrap_err();
    assert_eq!(e, failure);
    assert_eq!(e.category(), ErrorCategory::Recoverable);
    assert!(processing.admitted.lock().unwrap().is_empty());
    assert_eq!(*log.lock().unwrap(), vec!["net-0", "net-1", "proc-0"]);
    manager.close();
}

#[test]
pub fn failed_run_interrupts_containers_test() {
    let failure = JetError::Fatal("processing pool is broken".to_string());
    let manager = manager_with(
        noop_vertex(),
        FakeExecutor::new("network", None),
        FakeExecutor::new("processing", Some(failure.clone())),
    );

    assert_eq!(manager.run().err().unwrap(), failure);
    let container = manager.container_by_name("only").unwrap();
    let state = container
        .handle_container_request(ContainerRequest::Interrupt(JetError::Cancelled))
        .wait()
        .unwrap();
    assert_eq!(state, ContainerState::Interrupted);
    assert_eq!(container.cause(), Some(failure));
    manager.close();
}

#[test]
pub fn register_execution_once_test() {
    let manager = manager_with(
        noop_vertex(),
        FakeExecutor::new("network", None),
        FakeExecutor::new("processing", None),
    );
    manager.register_execution().unwrap();
    match manager.register_execution() {
        Err(JetError::AlreadyRunning(_)) => {}
        other => panic!("second registration accepted: {:?}", other),
    }
    manager.close();
}

#[test]
pub fn container_interrupt_is_idempotent_test() {
    let manager = manager_with(
        noop_vertex(),
        FakeExecutor::new("network", None),
        FakeExecutor::new("processing", None),
    );
    manager.start_containers().unwrap();
    let container = manager.container_by_name("only").unwrap();
    assert_eq!(container.state(), ContainerState::Executing);
    assert_eq!(container.tasks().len(), 2);

    let first = container
        .handle_container_request(ContainerRequest::Interrupt(JetError::Cancelled))
        .wait()
        .unwrap();
    let second = container
        .handle_container_request(ContainerRequest::Interrupt(JetError::Fatal(
            "late".to_string(),
        )))
        .wait()
        .unwrap();
    assert_eq!(first, ContainerState::Interrupted);
    assert_eq!(second, first);
    assert_eq!(container.cause(), Some(JetError::Cancelled));

    // the interrupt reached the tasks, and only the first cause counts
    for task in container.tasks() {
        assert_eq!(
            task.call().unwrap_err(),
            JetError::interrupted(&JetError::Cancelled)
        );
    }
    manager.close();
}

#[test]
pub fn requests_are_serialized_test() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let inits = Arc::new(AtomicUsize::new(0));
    let vertex = Vertex::new(
        "only",
        Gauge {
            active: active.clone(),
            peak: peak.clone(),
            inits: inits.clone(),
        },
    );
    let manager = manager_with(
        vertex,
        FakeExecutor::new("network", None),
        FakeExecutor::new("processing", None),
    );
    let container = manager.container_by_name("only").unwrap();

    let first = container.handle_container_request(ContainerRequest::Execute);
    let second = container.handle_container_request(ContainerRequest::Execute);
    let third = container.handle_container_request(ContainerRequest::Interrupt(JetError::Cancelled));

    assert_eq!(first.wait().unwrap(), ContainerState::Executing);
    assert!(matches!(second.wait(), Err(JetError::IllegalState(_))));
    assert_eq!(third.wait().unwrap(), ContainerState::Interrupted);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(inits.load(Ordering::SeqCst), 1);

    // terminal: further requests change nothing
    let again = container
        .handle_container_request(ContainerRequest::Execute)
        .wait()
        .unwrap();
    assert_eq!(again, ContainerState::Interrupted);
    assert_eq!(inits.load(Ordering::SeqCst), 1);
    manager.close();
}
