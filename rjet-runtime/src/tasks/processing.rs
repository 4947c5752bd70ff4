use std::sync::{Mutex, MutexGuard};

use crossbeam::channel::{Receiver, Sender, TryRecvError, TrySendError};

use rjet_core::element::Record;
use rjet_core::processor::{Outbox, Processor};
use rjet_core::task::{InterruptSignal, Task, TaskProgress};
use rjet_core::{JetError, Result};

/// records taken from the inbox per call
const BATCH_SIZE: usize = 256;

struct ProcessingState {
    processor: Box<dyn Processor>,
    /// one per inbound ordinal, `None` once exhausted
    inbox: Vec<Option<Receiver<Record>>>,
    outbox: Outbox,
    /// one per outbound ordinal
    outputs: Vec<Sender<Record>>,
    completed: bool,
}

/// Runs one processor instance: pull from the inbound edges, process, push
/// to the outbound edges, and call `complete` once all input is exhausted.
pub struct ProcessingTask {
    name: String,
    interrupt: InterruptSignal,
    state: Mutex<ProcessingState>,
}

impl ProcessingTask {
    /// `interrupt` must be the signal handed to the processor in its context
    pub fn new(
        name: &str,
        processor: Box<dyn Processor>,
        inbox: Vec<Receiver<Record>>,
        outputs: Vec<Sender<Record>>,
        interrupt: InterruptSignal,
        high_water_mark: usize,
    ) -> Self {
        let outbox = Outbox::new(outputs.len(), high_water_mark);
        ProcessingTask {
            name: name.to_string(),
            interrupt,
            state: Mutex::new(ProcessingState {
                processor,
                inbox: inbox.into_iter().map(Some).collect(),
                outbox,
                outputs,
                completed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<ProcessingState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProcessingState {
    /// Returns whether anything was sent
    fn flush(&mut self, name: &str) -> Result<bool> {
        let mut sent = false;
        for (ordinal, output) in self.outputs.iter().enumerate() {
            let bucket = match self.outbox.bucket_mut(ordinal) {
                Some(bucket) => bucket,
                None => continue,
            };
            while let Some(record) = bucket.pop_front() {
                match output.try_send(record) {
                    Ok(()) => sent = true,
                    Err(TrySendError::Full(record)) => {
                        bucket.push_front(record);
                        break;
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        return Err(JetError::task_failed(
                            name,
                            format!("outbound edge {} closed", ordinal),
                        ));
                    }
                }
            }
        }
        Ok(sent)
    }

    fn process_inbox(&mut self) -> Result<bool> {
        let mut progress = false;
        let mut taken = 0;
        for ordinal in 0..self.inbox.len() {
            let receiver = match &self.inbox[ordinal] {
                Some(receiver) => receiver.clone(),
                None => continue,
            };

            while taken < BATCH_SIZE && !self.outbox.is_full() {
                match receiver.try_recv() {
                    Ok(record) => {
                        self.processor.process(ordinal, record, &mut self.outbox)?;
                        taken += 1;
                        progress = true;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.inbox[ordinal] = None;
                        progress = true;
                        break;
                    }
                }
            }
        }
        Ok(progress)
    }

    fn inbox_exhausted(&self) -> bool {
        self.inbox.iter().all(|receiver| receiver.is_none())
    }
}

impl Task for ProcessingTask {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn call(&self) -> Result<TaskProgress> {
        self.interrupt.check()?;

        let mut state = self.lock();
        let mut progress = state.flush(self.name.as_str())?;
        if !state.outbox.is_empty() {
            // downstream is slow, hold back until the outbox drains
            return Ok(if progress {
                TaskProgress::MadeProgress
            } else {
                TaskProgress::NoProgress
            });
        }

        if !state.inbox_exhausted() {
            progress |= state.process_inbox()?;
        }

        if state.inbox_exhausted() && !state.completed {
            let state = &mut *state;
            state.completed = state.processor.complete(&mut state.outbox)?;
            // a polling source that found nothing lets the worker back off
            progress |= state.completed || !state.outbox.is_empty();
        }

        progress |= state.flush(self.name.as_str())?;
        if state.completed && state.outbox.is_empty() {
            // disconnect the outbound edges
            state.outputs.clear();
            return Ok(TaskProgress::Done);
        }

        if progress {
            Ok(TaskProgress::MadeProgress)
        } else {
            Ok(TaskProgress::NoProgress)
        }
    }

    fn interrupt(&self, cause: &JetError) {
        if self.interrupt.interrupt(cause) {
            debug!("task `{}` interrupted: {}", self.name, cause);
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam::channel::bounded;

    use rjet_core::element::Record;
    use rjet_core::processor::{Outbox, Processor};
    use rjet_core::task::{InterruptSignal, Task, TaskProgress};
    use rjet_core::{functions, JetError, Result};

    use crate::tasks::processing::ProcessingTask;

    struct Counter {
        remaining: usize,
    }

    impl Processor for Counter {
        fn complete(&mut self, outbox: &mut Outbox) -> Result<bool> {
            while self.remaining > 0 && !outbox.is_full() {
                outbox.emit(Record::text(self.remaining.to_string().as_str()));
                self.remaining -= 1;
            }
            Ok(self.remaining == 0)
        }
    }

    #[test]
    pub fn source_to_sink_test() {
        let (sender, receiver) = bounded(4);
        let source = ProcessingTask::new(
            "source#0",
            Box::new(Counter { remaining: 10 }),
            vec![],
            vec![sender],
            InterruptSignal::new(),
            3,
        );

        let mut received = Vec::new();
        let mut done = false;
        for _ in 0..100 {
            if source.call().unwrap() == TaskProgress::Done {
                done = true;
            }
            received.extend(receiver.try_iter());
            if done {
                break;
            }
        }
        assert!(done);
        assert_eq!(received.len(), 10);
        assert!(receiver.recv().is_err());
    }

    #[test]
    pub fn map_until_exhausted_test() {
        let (input, inbox) = bounded(16);
        let (output, results) = bounded(16);
        let task = ProcessingTask::new(
            "upper#0",
            functions::map(|r: Record| {
                let upper = r.as_str().unwrap_or_default().to_uppercase();
                Ok(Record::text(upper.as_str()))
            }),
            vec![inbox],
            vec![output],
            InterruptSignal::new(),
            16,
        );

        input.send(Record::text("a")).unwrap();
        input.send(Record::text("b")).unwrap();
        assert_eq!(task.call().unwrap(), TaskProgress::MadeProgress);
        assert_eq!(task.call().unwrap(), TaskProgress::NoProgress);

        drop(input);
        let mut progress = task.call().unwrap();
        while progress != TaskProgress::Done {
            progress = task.call().unwrap();
        }
        let results: Vec<String> = results
            .try_iter()
            .map(|r| r.as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(results, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    pub fn failure_and_interrupt_test() {
        let (input, inbox) = bounded(4);
        let task = ProcessingTask::new(
            "failing#0",
            functions::map(|_r: Record| Err(JetError::Io {
                kind: std::io::ErrorKind::Other,
                message: "disk gone".to_string(),
            })),
            vec![inbox],
            vec![],
            InterruptSignal::new(),
            4,
        );
        input.send(Record::text("x")).unwrap();
        assert!(task.call().is_err());

        let signal = InterruptSignal::new();
        let (_input, inbox) = bounded::<Record>(4);
        let task = ProcessingTask::new("idle#0", functions::noop(), vec![inbox], vec![], signal.clone(), 4);
        task.interrupt(&JetError::Cancelled);
        assert!(signal.is_interrupted());
        assert_eq!(task.call().unwrap_err().root_cause(), &JetError::Cancelled);
    }
}
