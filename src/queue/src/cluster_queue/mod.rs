// Copyright 2024 The Admission Queue Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod best_effort_fifo;
mod core;
mod strict_fifo;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use crate::error::{QueueError, QueueResult};
use crate::local_queue::LocalQueue;
use crate::metrics::MetricRecorder;
use crate::workload::WorkloadInfo;

pub use best_effort_fifo::BestEffortFifoClusterQueue;
pub use strict_fifo::StrictFifoClusterQueue;

pub const STRICT_FIFO: &str = "StrictFIFO";
pub const BEST_EFFORT_FIFO: &str = "BestEffortFIFO";

/// Declares a cluster queue's cohort and queueing discipline, as read back
/// from the authoritative store. `queueing_strategy` is a raw string (rather
/// than a closed Rust enum) because an unrecognised value is a runtime
/// failure mode this crate must surface (§7, `UnknownStrategy`), exactly as
/// it would arrive as an unvalidated string field off a CRD.
#[derive(Debug, Clone)]
pub struct ClusterQueueSpec {
    pub name: String,
    pub cohort: String,
    pub queueing_strategy: String,
}

/// A cluster queue: an ordered admission candidate set ("ready") plus an
/// inadmissible holding area, behind one pluggable queueing strategy (§4.3).
/// All operations run under the Manager's write lock; implementations need
/// not be internally synchronised.
pub trait ClusterQueue: Send + Sync {
    fn name(&self) -> &str;
    fn cohort(&self) -> &str;
    fn update(&mut self, spec: &ClusterQueueSpec);

    fn add_from_queue(&mut self, local_queue: &LocalQueue) -> bool;
    fn delete_from_queue(&mut self, local_queue: &LocalQueue);

    fn push_or_update(&mut self, info: WorkloadInfo);
    fn delete(&mut self, key: &str);
    fn pop(&mut self) -> Option<WorkloadInfo>;

    /// Re-inserts a workload previously popped but not admitted. A no-op
    /// returning `false` if `info`'s key is already present in either set.
    fn requeue_if_not_present(&mut self, info: WorkloadInfo, immediate: bool) -> bool;

    /// Moves every element of *inadmissible* into *ready*. Returns whether at
    /// least one moved.
    fn queue_inadmissible_workloads(&mut self) -> bool;

    fn pending(&self) -> i32;
    fn dump(&self) -> (HashSet<String>, bool);
    fn info(&self, key: &str) -> Option<&WorkloadInfo>;
}

type Factory =
    fn(&ClusterQueueSpec, Option<Arc<dyn MetricRecorder>>) -> Box<dyn ClusterQueue>;

/// `strategy name -> factory`, consulted by [`new_cluster_queue`]. Mirrors
/// the source's `var registry = map[kueue.QueueingStrategy]func(...)` so a
/// third strategy could be registered here without touching `Manager` or
/// the `ClusterQueue` trait.
fn registry() -> &'static HashMap<&'static str, Factory> {
    static REGISTRY: OnceLock<HashMap<&'static str, Factory>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut m: HashMap<&'static str, Factory> = HashMap::new();
        m.insert(STRICT_FIFO, |spec, recorder| {
            Box::new(StrictFifoClusterQueue::new(spec, recorder))
        });
        m.insert(BEST_EFFORT_FIFO, |spec, recorder| {
            Box::new(BestEffortFifoClusterQueue::new(spec, recorder))
        });
        m
    })
}

/// Constructs a cluster queue for `spec`'s declared strategy. Fails only if
/// the strategy is unrecognised (§4.3).
pub(crate) fn new_cluster_queue(
    spec: &ClusterQueueSpec,
    metric_recorder: Option<Arc<dyn MetricRecorder>>,
) -> QueueResult<Box<dyn ClusterQueue>> {
    match registry().get(spec.queueing_strategy.as_str()) {
        Some(factory) => Ok(factory(spec, metric_recorder)),
        None => Err(QueueError::UnknownStrategy(spec.queueing_strategy.clone())),
    }
}
