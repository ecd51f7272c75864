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

use std::collections::HashSet;
use std::sync::Arc;

use super::core::ClusterQueueCore;
use super::{ClusterQueue, ClusterQueueSpec};
use crate::local_queue::LocalQueue;
use crate::metrics::MetricRecorder;
use crate::workload::WorkloadInfo;

/// Even non-immediate requeues go back to *ready* (§4.4): the scheduler
/// reconsiders the same head next cycle, and a younger workload must never
/// leapfrog one only tentatively held back. StrictFIFO therefore never
/// places a requeued workload into *inadmissible*.
pub struct StrictFifoClusterQueue {
    core: ClusterQueueCore,
}

impl StrictFifoClusterQueue {
    pub(crate) fn new(spec: &ClusterQueueSpec, metric_recorder: Option<Arc<dyn MetricRecorder>>) -> Self {
        Self {
            core: ClusterQueueCore::new(spec.name.clone(), spec.cohort.clone(), metric_recorder),
        }
    }
}

impl ClusterQueue for StrictFifoClusterQueue {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn cohort(&self) -> &str {
        &self.core.cohort
    }

    fn update(&mut self, spec: &ClusterQueueSpec) {
        self.core.cohort = spec.cohort.clone();
    }

    fn add_from_queue(&mut self, local_queue: &LocalQueue) -> bool {
        self.core.add_from_queue(local_queue)
    }

    fn delete_from_queue(&mut self, local_queue: &LocalQueue) {
        self.core.delete_from_queue(local_queue)
    }

    fn push_or_update(&mut self, info: WorkloadInfo) {
        self.core.push_or_update(info)
    }

    fn delete(&mut self, key: &str) {
        self.core.delete(key)
    }

    fn pop(&mut self) -> Option<WorkloadInfo> {
        self.core.pop()
    }

    fn requeue_if_not_present(&mut self, info: WorkloadInfo, _immediate: bool) -> bool {
        self.core.requeue_into_ready(info)
    }

    fn queue_inadmissible_workloads(&mut self) -> bool {
        self.core.queue_inadmissible_workloads()
    }

    fn pending(&self) -> i32 {
        self.core.pending()
    }

    fn dump(&self) -> (HashSet<String>, bool) {
        self.core.dump()
    }

    fn info(&self, key: &str) -> Option<&WorkloadInfo> {
        self.core.info(key)
    }
}
