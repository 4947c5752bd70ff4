use std::collections::HashMap;
use std::sync::Mutex;

use crossbeam::channel::Sender;

use rjet_core::dag::Edge;
use rjet_core::element::Record;
use rjet_core::{JetError, Result};

/// Receiving ends of the edges of one job.
///
/// A consumer container registers one sender per local instance when it
/// starts. The producer container, started later, takes them over for the
/// network task of the edge.
#[derive(Default)]
pub struct EdgeRegistry {
    consumers: Mutex<HashMap<String, Vec<Sender<Record>>>>,
}

impl EdgeRegistry {
    pub fn new() -> Self {
        EdgeRegistry::default()
    }

    pub fn register(&self, edge: &Edge, senders: Vec<Sender<Record>>) -> Result<()> {
        let mut consumers = self
            .consumers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let name = edge.name();
        if consumers.contains_key(name.as_str()) {
            return Err(JetError::IllegalState(format!(
                "edge {} registered twice",
                name
            )));
        }

        consumers.insert(name, senders);
        Ok(())
    }

    pub fn take(&self, edge: &Edge) -> Result<Vec<Sender<Record>>> {
        self.consumers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(edge.name().as_str())
            .ok_or_else(|| {
                JetError::IllegalState(format!(
                    "consumer `{}` of edge {} is not started",
                    edge.target,
                    edge.name()
                ))
            })
    }
}
