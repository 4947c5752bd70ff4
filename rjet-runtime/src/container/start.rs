use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender};

use rjet_core::dag::VertexIndex;
use rjet_core::element::Record;
use rjet_core::task::{InterruptSignal, Task};
use rjet_core::{JetError, Result};

use crate::job::context::JobContext;
use crate::tasks::{NetworkTask, ProcessingTask};

/// Builds the processors of one vertex and the tasks that drive them.
///
/// Inbound edges get one queue per local instance, registered for the
/// producers to find. Outbound edges take over the queues their consumer
/// registered, so every consumer must be started first. Tasks reach the
/// executor context only when everything was built.
pub(crate) fn start_container(
    context: &JobContext,
    vertex_index: VertexIndex,
) -> Result<Vec<Arc<dyn Task>>> {
    let dag = context.dag();
    let vertex = dag.vertex(vertex_index);
    let queue_size = context.config().queue_size;
    let parallelism = context.local_parallelism(vertex_index);

    let supplier = vertex.supplier();
    let supplier_context = context.supplier_context(vertex_index);
    supplier.init(&supplier_context)?;
    let processors = supplier.get(&supplier_context, parallelism)?;
    if processors.len() != parallelism {
        return Err(JetError::IllegalState(format!(
            "supplier of `{}` returned {} processors, {} expected",
            vertex.name(),
            processors.len(),
            parallelism
        )));
    }

    let mut inboxes: Vec<Vec<Receiver<Record>>> = (0..parallelism).map(|_| Vec::new()).collect();
    for (_producer, edge) in dag.inbound_edges(vertex_index) {
        let mut senders = Vec::with_capacity(parallelism);
        for inbox in inboxes.iter_mut() {
            let (sender, receiver) = bounded(queue_size);
            senders.push(sender);
            inbox.push(receiver);
        }
        context.edges().register(edge, senders)?;
    }

    let mut outputs: Vec<Vec<Sender<Record>>> = (0..parallelism).map(|_| Vec::new()).collect();
    let mut network_tasks: Vec<Arc<dyn Task>> = Vec::new();
    for (_consumer, edge) in dag.outbound_edges(vertex_index) {
        let consumers = context.edges().take(edge)?;
        let mut receivers = Vec::with_capacity(parallelism);
        for output in outputs.iter_mut() {
            let (sender, receiver) = bounded(queue_size);
            output.push(sender);
            receivers.push(receiver);
        }
        network_tasks.push(Arc::new(NetworkTask::new(
            edge, receivers, consumers, queue_size,
        )));
    }

    let mut processing_tasks: Vec<Arc<dyn Task>> = Vec::with_capacity(parallelism);
    let instances = processors.into_iter().zip(inboxes).zip(outputs);
    for (local_index, ((mut processor, inbox), output)) in instances.enumerate() {
        let interrupt = InterruptSignal::new();
        let processor_context = supplier_context.processor_context(local_index, interrupt.clone());
        processor.init(&processor_context)?;

        processing_tasks.push(Arc::new(ProcessingTask::new(
            format!("{}#{}", vertex.name(), local_index).as_str(),
            processor,
            inbox,
            output,
            interrupt,
            queue_size,
        )));
    }

    debug!(
        "container `{}` built {} processing and {} network tasks",
        vertex.name(),
        processing_tasks.len(),
        network_tasks.len()
    );
    context.executor().add_network_tasks(network_tasks);
    context
        .executor()
        .add_processing_tasks(processing_tasks.clone());
    Ok(processing_tasks)
}
