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

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::local_queue::LocalQueue;
use crate::metrics::MetricRecorder;
use crate::workload::{OrderingKey, WorkloadInfo};

/// State and bookkeeping shared by every queueing strategy (§4.3). The two
/// concrete cluster queues compose this rather than inherit from it — they
/// differ only in `requeue_if_not_present`.
pub(crate) struct ClusterQueueCore {
    pub(crate) name: String,
    pub(crate) cohort: String,

    ready: BTreeMap<OrderingKey, WorkloadInfo>,
    ready_keys: HashMap<String, OrderingKey>,
    inadmissible: HashMap<String, WorkloadInfo>,

    metric_recorder: Option<Arc<dyn MetricRecorder>>,
}

impl ClusterQueueCore {
    pub(crate) fn new(
        name: impl Into<String>,
        cohort: impl Into<String>,
        metric_recorder: Option<Arc<dyn MetricRecorder>>,
    ) -> Self {
        Self {
            name: name.into(),
            cohort: cohort.into(),
            ready: BTreeMap::new(),
            ready_keys: HashMap::new(),
            inadmissible: HashMap::new(),
            metric_recorder,
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.ready_keys.contains_key(key) || self.inadmissible.contains_key(key)
    }

    fn inc_pending(&self) {
        if let Some(r) = &self.metric_recorder {
            r.inc();
        }
    }

    fn dec_pending(&self) {
        if let Some(r) = &self.metric_recorder {
            r.dec();
        }
    }

    fn insert_ready(&mut self, info: WorkloadInfo) {
        let ordering_key = info.ordering_key().clone();
        self.ready_keys.insert(info.key(), ordering_key.clone());
        self.ready.insert(ordering_key, info);
    }

    fn remove_ready(&mut self, key: &str) -> Option<WorkloadInfo> {
        let ordering_key = self.ready_keys.remove(key)?;
        self.ready.remove(&ordering_key)
    }

    /// If `key` is absent from both sets, inserts into *ready*. If present in
    /// *ready*, updates in place (re-heapifying to preserve order). If
    /// present in *inadmissible*, replaces there (stays held out).
    pub(crate) fn push_or_update(&mut self, info: WorkloadInfo) {
        let key = info.key();
        if self.inadmissible.contains_key(&key) {
            self.inadmissible.insert(key, info);
            return;
        }
        let newly_inserted = self.remove_ready(&key).is_none();
        self.insert_ready(info);
        if newly_inserted {
            self.inc_pending();
        }
    }

    pub(crate) fn delete(&mut self, key: &str) {
        if self.remove_ready(key).is_some() {
            self.dec_pending();
            return;
        }
        if self.inadmissible.remove(key).is_some() {
            self.dec_pending();
        }
    }

    /// For every workload in `local_queue` not already known here, inserts
    /// it. Returns whether at least one insertion happened.
    pub(crate) fn add_from_queue(&mut self, local_queue: &LocalQueue) -> bool {
        let mut added = false;
        for info in local_queue.iter() {
            if !self.contains(&info.key()) {
                self.push_or_update(info.clone());
                added = true;
            }
        }
        added
    }

    /// Removes every key of `local_queue` from both sets.
    pub(crate) fn delete_from_queue(&mut self, local_queue: &LocalQueue) {
        for info in local_queue.iter() {
            self.delete(&info.key());
        }
    }

    /// Extracts the ordering-minimum element of *ready*. Does not touch
    /// *inadmissible*.
    pub(crate) fn pop(&mut self) -> Option<WorkloadInfo> {
        let (ordering_key, info) = self.ready.pop_first()?;
        self.ready_keys.remove(&info.key());
        debug_assert_eq!(info.ordering_key(), &ordering_key);
        self.dec_pending();
        Some(info)
    }

    /// Inserts `info` into *ready* if absent from both sets. Returns whether
    /// it was inserted. The caller decides *ready* vs *inadmissible* placement
    /// up front; this only ever targets *ready* because that's the common
    /// "insert eligible" path shared by both strategies' `requeue_if_not_present`.
    pub(crate) fn requeue_into_ready(&mut self, info: WorkloadInfo) -> bool {
        if self.contains(&info.key()) {
            return false;
        }
        self.insert_ready(info);
        self.inc_pending();
        true
    }

    /// Inserts `info` into *inadmissible* if absent from both sets. Returns
    /// whether it was inserted.
    pub(crate) fn requeue_into_inadmissible(&mut self, info: WorkloadInfo) -> bool {
        if self.contains(&info.key()) {
            return false;
        }
        self.inadmissible.insert(info.key(), info);
        self.inc_pending();
        true
    }

    pub(crate) fn already_present(&self, key: &str) -> bool {
        self.contains(key)
    }

    /// Moves every element of *inadmissible* into *ready*. Returns whether at
    /// least one moved. Moving between the two internal sets never changes
    /// the total pending count, so the gauge is left untouched.
    pub(crate) fn queue_inadmissible_workloads(&mut self) -> bool {
        if self.inadmissible.is_empty() {
            return false;
        }
        for (_, info) in self.inadmissible.drain() {
            let ordering_key = info.ordering_key().clone();
            self.ready_keys.insert(info.key(), ordering_key.clone());
            self.ready.insert(ordering_key, info);
        }
        true
    }

    pub(crate) fn pending(&self) -> i32 {
        (self.ready.len() + self.inadmissible.len()) as i32
    }

    pub(crate) fn info(&self, key: &str) -> Option<&WorkloadInfo> {
        self.ready_keys
            .get(key)
            .and_then(|ok| self.ready.get(ok))
            .or_else(|| self.inadmissible.get(key))
    }

    pub(crate) fn dump(&self) -> (HashSet<String>, bool) {
        let mut keys: HashSet<String> = self.ready_keys.keys().cloned().collect();
        keys.extend(self.inadmissible.keys().cloned());
        let nonempty = !keys.is_empty();
        (keys, nonempty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::Workload;

    fn info(name: &str, priority: i64) -> WorkloadInfo {
        WorkloadInfo::new(Workload::new("ns", name, "lq").with_priority(priority))
    }

    #[test]
    fn push_or_update_replaces_in_place_without_changing_pending() {
        let mut core = ClusterQueueCore::new("cq", "", None);
        core.push_or_update(info("a", 0));
        assert_eq!(core.pending(), 1);
        core.push_or_update(info("a", 9));
        assert_eq!(core.pending(), 1);
        assert_eq!(core.info("ns/a").unwrap().workload.priority, 9);
    }

    #[test]
    fn pop_returns_ordering_minimum_and_leaves_inadmissible_untouched() {
        let mut core = ClusterQueueCore::new("cq", "", None);
        core.push_or_update(info("a", 0));
        core.push_or_update(info("b", 5));
        core.requeue_into_inadmissible(info("c", 100));

        let popped = core.pop().unwrap();
        assert_eq!(popped.key(), "ns/b");
        assert_eq!(core.pending(), 2);
    }

    #[test]
    fn queue_inadmissible_workloads_moves_everything_to_ready() {
        let mut core = ClusterQueueCore::new("cq", "", None);
        core.requeue_into_inadmissible(info("a", 0));
        assert!(core.queue_inadmissible_workloads());
        assert!(!core.queue_inadmissible_workloads());
        assert_eq!(core.pop().unwrap().key(), "ns/a");
    }

    #[test]
    fn dump_reports_keys_from_both_sets() {
        let mut core = ClusterQueueCore::new("cq", "", None);
        core.push_or_update(info("a", 0));
        core.requeue_into_inadmissible(info("b", 0));
        let (keys, nonempty) = core.dump();
        assert!(nonempty);
        assert_eq!(keys.len(), 2);
    }
}
