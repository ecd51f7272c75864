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

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

/// A resource request vector, e.g. `{"cpu": 4, "memory": 8192}`. Units are
/// caller-defined; the core never interprets the values.
pub type ResourceRequests = HashMap<String, i64>;

/// The admission record stamped on a workload once the out-of-scope quota
/// engine has admitted it. A workload carrying one is invisible to this
/// core; see [`crate::local_queue::LocalQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub cluster_queue: String,
}

/// Immutable snapshot of a submitted job, as received from the authoritative
/// object store. An update to a workload replaces the stored snapshot; the
/// core never mutates one in place.
#[derive(Debug, Clone)]
pub struct Workload {
    pub namespace: String,
    pub name: String,
    pub queue_name: String,
    pub priority: i64,
    pub creation_timestamp: DateTime<Utc>,
    pub resource_requests: ResourceRequests,
    pub admission: Option<Admission>,
}

impl Workload {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            queue_name: queue_name.into(),
            priority: 0,
            creation_timestamp: Utc::now(),
            resource_requests: ResourceRequests::default(),
            admission: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_creation_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.creation_timestamp = ts;
        self
    }

    pub fn with_resource_requests(mut self, requests: ResourceRequests) -> Self {
        self.resource_requests = requests;
        self
    }

    /// `namespace/name`, the globally unique key of this workload.
    pub fn key(&self) -> String {
        key(&self.namespace, &self.name)
    }

    /// `namespace/queueName`, the key of the local queue this workload targets.
    pub fn queue_key(&self) -> String {
        key(&self.namespace, &self.queue_name)
    }

    pub fn is_admitted(&self) -> bool {
        self.admission.is_some()
    }
}

/// Builds a `namespace/name`-style composite key.
pub fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// The total order cluster queues sort their ready set by: higher priority
/// first, then older first, then a lexicographic tiebreak on key. Stable and
/// total, per the data model's ordering-key contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingKey {
    priority: i64,
    creation_timestamp: DateTime<Utc>,
    key: String,
}

impl OrderingKey {
    fn new(priority: i64, creation_timestamp: DateTime<Utc>, key: String) -> Self {
        Self {
            priority,
            creation_timestamp,
            key,
        }
    }
}

impl PartialOrd for OrderingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority sorts first, hence the reversed comparison.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.creation_timestamp.cmp(&other.creation_timestamp))
            .then_with(|| self.key.cmp(&other.key))
    }
}

/// Read-only view of a workload held inside a cluster queue. Carries the
/// ordering key pre-computed so the ready set never recomputes it on
/// comparison, and (once returned from `Heads`) the name of the cluster
/// queue it was popped from.
#[derive(Debug, Clone)]
pub struct WorkloadInfo {
    pub workload: Workload,
    ordering_key: OrderingKey,
    pub cluster_queue: Option<String>,
}

impl WorkloadInfo {
    pub fn new(workload: Workload) -> Self {
        let ordering_key = OrderingKey::new(workload.priority, workload.creation_timestamp, workload.key());
        Self {
            workload,
            ordering_key,
            cluster_queue: None,
        }
    }

    pub fn key(&self) -> String {
        self.workload.key()
    }

    pub fn ordering_key(&self) -> &OrderingKey {
        &self.ordering_key
    }

    /// Stamps the cluster queue name this info was extracted from. Called
    /// only by `Manager::heads`.
    pub fn with_cluster_queue(mut self, name: impl Into<String>) -> Self {
        self.cluster_queue = Some(name.into());
        self
    }
}

impl PartialEq for WorkloadInfo {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for WorkloadInfo {}

impl fmt::Display for WorkloadInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_key_prefers_higher_priority() {
        let now = Utc::now();
        let low = OrderingKey::new(0, now, "a".into());
        let high = OrderingKey::new(5, now, "b".into());
        assert!(high < low);
    }

    #[test]
    fn ordering_key_prefers_older_timestamp_at_equal_priority() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::seconds(1);
        let a = OrderingKey::new(0, earlier, "a".into());
        let b = OrderingKey::new(0, later, "b".into());
        assert!(a < b);
    }

    #[test]
    fn ordering_key_breaks_ties_lexicographically() {
        let now = Utc::now();
        let a = OrderingKey::new(0, now, "a".into());
        let b = OrderingKey::new(0, now, "b".into());
        assert!(a < b);
    }

    #[test]
    fn workload_key_is_namespace_slash_name() {
        let w = Workload::new("ns", "w1", "lq");
        assert_eq!(w.key(), "ns/w1");
        assert_eq!(w.queue_key(), "ns/lq");
    }
}
