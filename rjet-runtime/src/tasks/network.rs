use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crossbeam::channel::{Receiver, Sender, TryRecvError, TrySendError};

use rjet_core::dag::{Edge, Routing};
use rjet_core::element::Record;
use rjet_core::task::{InterruptSignal, Task, TaskProgress};
use rjet_core::utils::hash::bucket_of;
use rjet_core::{JetError, Result};

/// records pulled from the producers per call
const BATCH_SIZE: usize = 256;

struct NetworkState {
    /// one per producer instance, `None` once it disconnected
    sources: Vec<Option<Receiver<Record>>>,
    /// one per consumer instance
    targets: Vec<Sender<Record>>,
    pending: Vec<VecDeque<Record>>,
    pending_limit: usize,
    round_robin: usize,
}

/// Moves the records of one edge from every producer instance to the consumer
/// instances picked by the edge routing.
///
/// Done once every producer disconnected and everything was delivered; the
/// consumer senders are dropped then, which is how consumers learn the edge
/// is exhausted.
pub struct NetworkTask {
    name: String,
    routing: Routing,
    interrupt: InterruptSignal,
    state: Mutex<NetworkState>,
}

impl NetworkTask {
    pub fn new(
        edge: &Edge,
        sources: Vec<Receiver<Record>>,
        targets: Vec<Sender<Record>>,
        pending_limit: usize,
    ) -> Self {
        let pending = targets.iter().map(|_| VecDeque::new()).collect();
        NetworkTask {
            name: format!("network {}", edge.name()),
            routing: edge.routing,
            interrupt: InterruptSignal::new(),
            state: Mutex::new(NetworkState {
                sources: sources.into_iter().map(Some).collect(),
                targets,
                pending,
                pending_limit: pending_limit.max(1),
                round_robin: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<NetworkState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NetworkState {
    fn route(&mut self, routing: Routing, record: Record) {
        let n = self.pending.len();
        if n == 0 {
            return;
        }

        match routing {
            Routing::Broadcast => {
                for pending in &mut self.pending[..n - 1] {
                    pending.push_back(record.clone());
                }
                self.pending[n - 1].push_back(record);
            }
            Routing::AllToOne => self.pending[0].push_back(record),
            Routing::Partitioned if record.partition_key().is_some() => {
                let target = record
                    .partition_key()
                    .map(|key| bucket_of(key, n))
                    .unwrap_or(0);
                self.pending[target].push_back(record);
            }
            Routing::Partitioned | Routing::RoundRobin => {
                let target = self.round_robin % n;
                self.round_robin = self.round_robin.wrapping_add(1);
                self.pending[target].push_back(record);
            }
        }
    }

    /// Returns whether anything was delivered
    fn flush(&mut self, name: &str) -> Result<bool> {
        let mut delivered = false;
        for (target, pending) in self.targets.iter().zip(self.pending.iter_mut()) {
            while let Some(record) = pending.pop_front() {
                match target.try_send(record) {
                    Ok(()) => delivered = true,
                    Err(TrySendError::Full(record)) => {
                        pending.push_front(record);
                        break;
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        return Err(JetError::task_failed(name, "consumer went away"));
                    }
                }
            }
        }
        Ok(delivered)
    }

    fn is_backlogged(&self) -> bool {
        self.pending.iter().any(|p| p.len() >= self.pending_limit)
    }
}

impl Task for NetworkTask {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn call(&self) -> Result<TaskProgress> {
        self.interrupt.check()?;

        let mut state = self.lock();
        let mut progress = state.flush(self.name.as_str())?;

        let mut received = 0;
        let mut open_sources = 0;
        for i in 0..state.sources.len() {
            let source = match &state.sources[i] {
                Some(source) => source.clone(),
                None => continue,
            };

            open_sources += 1;
            while received < BATCH_SIZE && !state.is_backlogged() {
                match source.try_recv() {
                    Ok(record) => {
                        state.route(self.routing, record);
                        received += 1;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        state.sources[i] = None;
                        open_sources -= 1;
                        progress = true;
                        break;
                    }
                }
            }
        }

        if received > 0 {
            progress = true;
            state.flush(self.name.as_str())?;
        }

        if open_sources == 0 && state.pending.iter().all(|p| p.is_empty()) {
            // disconnect the consumers
            state.targets.clear();
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
            debug!("{} interrupted: {}", self.name, cause);
        }
    }
}
