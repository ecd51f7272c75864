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

use std::collections::HashMap;
use std::sync::Arc;

use crate::metrics::MetricRecorder;
use crate::store::LocalQueueSpec;
use crate::workload::WorkloadInfo;

/// Namespace-scoped submission point, forwarding to exactly one cluster
/// queue (§3, §4.2). A bag with stable membership; it imposes no ordering
/// of its own.
pub struct LocalQueue {
    pub namespace: String,
    pub name: String,
    pub cluster_queue: String,

    items: HashMap<String, WorkloadInfo>,
    metric_recorder: Option<Arc<dyn MetricRecorder>>,
}

impl LocalQueue {
    pub fn new(spec: &LocalQueueSpec, metric_recorder: Option<Arc<dyn MetricRecorder>>) -> Self {
        Self {
            namespace: spec.namespace.clone(),
            name: spec.name.clone(),
            cluster_queue: spec.cluster_queue.clone(),
            items: HashMap::new(),
            metric_recorder,
        }
    }

    pub fn key(&self) -> String {
        crate::workload::key(&self.namespace, &self.name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn info(&self, key: &str) -> Option<&WorkloadInfo> {
        self.items.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkloadInfo> {
        self.items.values()
    }

    /// Inserts or replaces by key; increments the pending gauge iff the key
    /// was previously absent.
    pub fn add_or_update(&mut self, info: WorkloadInfo) {
        let key = info.key();
        let was_present = self.items.insert(key, info).is_some();
        if !was_present {
            if let Some(recorder) = &self.metric_recorder {
                recorder.inc();
            }
        }
    }

    /// Inserts only if the key is absent. Returns whether it was inserted.
    pub fn add_if_not_present(&mut self, info: WorkloadInfo) -> bool {
        let key = info.key();
        if self.items.contains_key(&key) {
            return false;
        }
        self.items.insert(key, info);
        if let Some(recorder) = &self.metric_recorder {
            recorder.inc();
        }
        true
    }

    /// Removes by key. Decrements the pending gauge iff the key was present.
    pub fn delete(&mut self, key: &str) {
        if self.items.remove(key).is_some() {
            if let Some(recorder) = &self.metric_recorder {
                recorder.dec();
            }
        }
    }

    /// Refreshes the forwarded cluster queue name. Does not move any
    /// workloads; relocation across cluster queues is the Manager's job
    /// (§4.5, `UpdateQueue`).
    pub fn update(&mut self, spec: &LocalQueueSpec) {
        self.cluster_queue = spec.cluster_queue.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::Workload;

    fn spec() -> LocalQueueSpec {
        LocalQueueSpec {
            namespace: "ns".into(),
            name: "lq".into(),
            cluster_queue: "cq1".into(),
        }
    }

    #[test]
    fn add_or_update_increments_gauge_only_on_first_insertion() {
        let mut lq = LocalQueue::new(&spec(), None);
        lq.add_or_update(WorkloadInfo::new(Workload::new("ns", "w1", "lq")));
        assert_eq!(lq.len(), 1);
        lq.add_or_update(WorkloadInfo::new(
            Workload::new("ns", "w1", "lq").with_priority(5),
        ));
        assert_eq!(lq.len(), 1);
        assert_eq!(lq.info("ns/w1").unwrap().workload.priority, 5);
    }

    #[test]
    fn add_if_not_present_rejects_existing_key() {
        let mut lq = LocalQueue::new(&spec(), None);
        assert!(lq.add_if_not_present(WorkloadInfo::new(Workload::new("ns", "w1", "lq"))));
        assert!(!lq.add_if_not_present(WorkloadInfo::new(Workload::new("ns", "w1", "lq"))));
        assert_eq!(lq.len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let mut lq = LocalQueue::new(&spec(), None);
        lq.add_or_update(WorkloadInfo::new(Workload::new("ns", "w1", "lq")));
        lq.delete("ns/w1");
        assert!(lq.is_empty());
        lq.delete("ns/w1");
        assert!(lq.is_empty());
    }

    #[test]
    fn update_rebinds_cluster_queue_without_touching_items() {
        let mut lq = LocalQueue::new(&spec(), None);
        lq.add_or_update(WorkloadInfo::new(Workload::new("ns", "w1", "lq")));
        lq.update(&LocalQueueSpec {
            namespace: "ns".into(),
            name: "lq".into(),
            cluster_queue: "cq2".into(),
        });
        assert_eq!(lq.cluster_queue, "cq2");
        assert_eq!(lq.len(), 1);
    }
}
