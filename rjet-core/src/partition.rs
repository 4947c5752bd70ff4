//! Parallel ingestion of a partitioned data set.
//!
//! Every member only looks at the partitions it owns and deals them out to its
//! local source instances round robin, so an owned partition is read by
//! exactly one local instance and no two members read the same partition.
//! Instances left without partitions complete immediately.

use std::collections::VecDeque;

use crate::element::Record;
use crate::error::{JetError, Result};
use crate::processor::Outbox;
use crate::utils::hash::bucket_of;
use crate::MemberId;

#[derive(
    Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Default, Ord, PartialOrd,
)]
pub struct PartitionId(pub u32);

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Partition ownership as published by cluster membership.
/// Treated as fixed for the duration of one partitioned read pass.
pub trait PartitionTable: Send + Sync {
    fn partition_count(&self) -> u32;

    fn owned_partitions(&self, member: &MemberId) -> Vec<PartitionId>;

    fn partition_of(&self, key: &str) -> PartitionId {
        let count = self.partition_count().max(1) as usize;
        PartitionId(bucket_of(key.as_bytes(), count) as u32)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PartitionAssignment {
    instances: Vec<Vec<PartitionId>>,
}

impl PartitionAssignment {
    /// Deal `owned` out to `local_parallelism` instances: the i-th partition in
    /// ascending id order goes to instance `i % local_parallelism`.
    pub fn assign(owned: &[PartitionId], local_parallelism: usize) -> Result<Self> {
        if local_parallelism == 0 {
            return Err(JetError::Config(
                "local parallelism must be positive".to_string(),
            ));
        }

        let mut owned = owned.to_vec();
        owned.sort();
        owned.dedup();

        let mut instances = vec![Vec::new(); local_parallelism];
        for (i, partition) in owned.into_iter().enumerate() {
            instances[i % local_parallelism].push(partition);
        }

        Ok(PartitionAssignment { instances })
    }

    pub fn local_parallelism(&self) -> usize {
        self.instances.len()
    }

    /// Partitions of one local instance, empty for instances beyond the needed count
    pub fn partitions_of(&self, local_index: usize) -> &[PartitionId] {
        self.instances
            .get(local_index)
            .map(|partitions| partitions.as_slice())
            .unwrap_or(&[])
    }

    pub fn instance_of(&self, partition: PartitionId) -> Option<usize> {
        self.instances
            .iter()
            .position(|partitions| partitions.contains(&partition))
    }

    pub fn idle_instances(&self) -> usize {
        self.instances.iter().filter(|p| p.is_empty()).count()
    }
}

/// Share of a remote cluster's partitions read by one local member:
/// partition `p` belongs to member `p % member_count`.
pub fn member_share(partition_count: u32, member_index: usize, member_count: usize) -> Vec<PartitionId> {
    let member_count = member_count.max(1) as u32;
    (0..partition_count)
        .filter(|p| p % member_count == member_index as u32)
        .map(PartitionId)
        .collect()
}

/// Recommended, not enforced: with fewer partitions some instances get nothing to read
pub fn check_partition_count(
    partition_count: u32,
    local_parallelism: usize,
    member_count: usize,
) -> bool {
    let required = local_parallelism * member_count;
    if (partition_count as usize) < required {
        warn!(
            "partition count {} is below local parallelism {} x members {}, some readers will stay idle",
            partition_count, local_parallelism, member_count
        );
        false
    } else {
        true
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SourceState {
    /// assignment not computed yet
    Init,
    /// iterating the assigned partitions
    Draining,
    Done,
}

/// Drives one source instance through `Init -> Draining -> Done`
#[derive(Debug)]
pub struct PartitionedReader {
    state: SourceState,
    partitions: Vec<PartitionId>,
    position: usize,
    pending: VecDeque<Record>,
}

impl PartitionedReader {
    pub fn new() -> Self {
        PartitionedReader {
            state: SourceState::Init,
            partitions: Vec::new(),
            position: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn partitions(&self) -> &[PartitionId] {
        self.partitions.as_slice()
    }

    pub fn init(&mut self, assignment: &PartitionAssignment, local_index: usize) -> Result<()> {
        if self.state != SourceState::Init {
            return Err(JetError::IllegalState(format!(
                "partitioned reader already in state {:?}",
                self.state
            )));
        }

        self.partitions = assignment.partitions_of(local_index).to_vec();
        self.state = if self.partitions.is_empty() {
            SourceState::Done
        } else {
            SourceState::Draining
        };
        Ok(())
    }

    /// Emit until the outbox is full or every assigned partition is drained.
    /// Returns `true` once `Done`.
    pub fn drain<F>(&mut self, outbox: &mut Outbox, mut fetch: F) -> Result<bool>
    where
        F: FnMut(PartitionId) -> Result<Vec<Record>>,
    {
        match self.state {
            SourceState::Init => {
                return Err(JetError::IllegalState(
                    "partitioned reader drained before init".to_string(),
                ))
            }
            SourceState::Done => return Ok(true),
            SourceState::Draining => {}
        }

        while !outbox.is_full() {
            match self.pending.pop_front() {
                Some(record) => outbox.emit(record),
                None => {
                    if self.position == self.partitions.len() {
                        self.state = SourceState::Done;
                        return Ok(true);
                    }
                    let partition = self.partitions[self.position];
                    self.position += 1;
                    self.pending = fetch(partition)?.into();
                }
            }
        }

        Ok(false)
    }
}
