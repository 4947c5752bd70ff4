use rjet_core::task::TaskContext;
use rjet_core::Result;

pub mod context;
pub mod pool;

pub use context::ExecutorContext;
pub use pool::ExecutorPool;

/// A pool that runs batches of tasks
pub trait TaskExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Admits every task of the batch or none of them
    fn submit_task_context(&self, context: TaskContext) -> Result<()>;

    /// Refuses further batches and waits for the admitted tasks to leave
    fn shutdown(&self);
}
