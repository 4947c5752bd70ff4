use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{JetError, Result};

/// Result of one cooperative step of a [`Task`]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskProgress {
    MadeProgress,
    NoProgress,
    Done,
}

/// How a task left its pool
#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome {
    /// input exhausted
    Completed,
    Interrupted(JetError),
    Failed(JetError),
}

impl TaskOutcome {
    pub fn from_error(e: JetError) -> Self {
        match e {
            JetError::Interrupted(cause) => TaskOutcome::Interrupted(*cause),
            e => TaskOutcome::Failed(e),
        }
    }
}

/// A cancellable unit of scheduled work.
///
/// Pools call [`Task::call`] repeatedly from one worker thread; every call is a
/// yield point. Once [`Task::interrupt`] was observed the next call must return
/// `Err(JetError::Interrupted(cause))`.
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    fn call(&self) -> Result<TaskProgress>;

    /// Idempotent, the first cause wins
    fn interrupt(&self, cause: &JetError);
}

pub trait TaskListener: Send + Sync {
    /// Invoked exactly once per admitted task, from the worker thread that ran it
    fn on_task_done(&self, task_name: &str, outcome: TaskOutcome);
}

/// A batch of tasks submitted to one pool as a whole
pub struct TaskContext {
    tasks: Vec<Arc<dyn Task>>,
    listener: Option<Arc<dyn TaskListener>>,
}

impl TaskContext {
    pub fn new(tasks: Vec<Arc<dyn Task>>) -> Self {
        TaskContext {
            tasks,
            listener: None,
        }
    }

    pub fn with_listener(tasks: Vec<Arc<dyn Task>>, listener: Arc<dyn TaskListener>) -> Self {
        TaskContext {
            tasks,
            listener: Some(listener),
        }
    }

    pub fn tasks(&self) -> &[Arc<dyn Task>] {
        self.tasks.as_slice()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Arc<dyn Task>>, Option<Arc<dyn TaskListener>>) {
        (self.tasks, self.listener)
    }
}

#[derive(Default)]
struct InterruptInner {
    interrupted: AtomicBool,
    cause: Mutex<Option<JetError>>,
}

/// Cooperative cancellation flag shared by a task and whoever may stop it
#[derive(Clone, Default)]
pub struct InterruptSignal {
    inner: Arc<InterruptInner>,
}

impl InterruptSignal {
    pub fn new() -> Self {
        InterruptSignal::default()
    }

    /// Returns `true` only for the call that actually raised the signal
    pub fn interrupt(&self, cause: &JetError) -> bool {
        let mut guard = self
            .inner
            .cause
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_some() {
            return false;
        }

        *guard = Some(cause.clone());
        self.inner.interrupted.store(true, Ordering::Release);
        true
    }

    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::Acquire)
    }

    pub fn cause(&self) -> Option<JetError> {
        self.inner
            .cause
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// `Err(JetError::Interrupted(cause))` once interrupted
    #[inline]
    pub fn check(&self) -> Result<()> {
        if !self.is_interrupted() {
            return Ok(());
        }
        match self.cause() {
            Some(cause) => Err(JetError::interrupted(&cause)),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for InterruptSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptSignal")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}
