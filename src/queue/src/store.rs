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

//! The authoritative object store collaborator (§6.1). Out of scope for this
//! crate's own responsibilities, but its shape is fixed here so the Manager
//! compiles and tests stand alone without a real cluster behind it.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

use crate::workload::{key, Workload};

/// Declares which cluster queue a local queue forwards to, as read back from
/// the authoritative store. Mirrors the `spec.clusterQueue` field of the
/// source's `Queue` CRD.
#[derive(Debug, Clone)]
pub struct LocalQueueSpec {
    pub namespace: String,
    pub name: String,
    pub cluster_queue: String,
}

impl LocalQueueSpec {
    pub fn key(&self) -> String {
        key(&self.namespace, &self.name)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("listing workloads for queue {queue}: {message}")]
    ListWorkloads { queue: String, message: String },
    #[error("listing local queues for cluster queue {cluster_queue}: {message}")]
    ListLocalQueues {
        cluster_queue: String,
        message: String,
    },
}

/// Read-through access to the cluster's authoritative store, used by the
/// `Manager` to back-fill on queue creation (§4.5) and to re-verify
/// liveness on requeue (§4.5, `RequeueWorkload`). Expected to be backed by
/// an in-process, non-blocking cache (§5): methods are synchronous so the
/// Manager can call them without releasing its write lock (§9, "Resolved —
/// back-fill under lock").
pub trait ObjectStore: Send + Sync {
    /// Looks up a single workload by its `namespace/name` key.
    fn get_workload(&self, namespace: &str, name: &str) -> Option<Workload>;

    /// Lists every known, unadmitted workload whose `queueName` matches
    /// `queue_name` within `namespace`.
    fn list_workloads_for_queue(
        &self,
        namespace: &str,
        queue_name: &str,
    ) -> Result<Vec<Workload>, StoreError>;

    /// Lists every local queue that forwards to `cluster_queue`.
    fn list_queues_for_cluster_queue(
        &self,
        cluster_queue: &str,
    ) -> Result<Vec<LocalQueueSpec>, StoreError>;
}

/// A trivial in-memory `ObjectStore`, suitable for tests and as a starting
/// point for a real adapter. Never fails; errors are unreachable here but
/// the trait's `Result`s are still threaded through so call sites exercise
/// the real error path.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<InMemoryStoreInner>,
}

#[derive(Default)]
struct InMemoryStoreInner {
    workloads: HashMap<String, Workload>,
    local_queues: HashMap<String, LocalQueueSpec>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_workload(&self, workload: Workload) {
        let mut inner = self.inner.lock();
        inner.workloads.insert(workload.key(), workload);
    }

    pub fn remove_workload(&self, namespace: &str, name: &str) {
        self.inner.lock().workloads.remove(&key(namespace, name));
    }

    pub fn put_local_queue(&self, spec: LocalQueueSpec) {
        let mut inner = self.inner.lock();
        inner.local_queues.insert(spec.key(), spec);
    }
}

impl ObjectStore for InMemoryStore {
    fn get_workload(&self, namespace: &str, name: &str) -> Option<Workload> {
        self.inner.lock().workloads.get(&key(namespace, name)).cloned()
    }

    fn list_workloads_for_queue(
        &self,
        namespace: &str,
        queue_name: &str,
    ) -> Result<Vec<Workload>, StoreError> {
        Ok(self
            .inner
            .lock()
            .workloads
            .values()
            .filter(|w| w.namespace == namespace && w.queue_name == queue_name && !w.is_admitted())
            .cloned()
            .collect())
    }

    fn list_queues_for_cluster_queue(
        &self,
        cluster_queue: &str,
    ) -> Result<Vec<LocalQueueSpec>, StoreError> {
        Ok(self
            .inner
            .lock()
            .local_queues
            .values()
            .filter(|q| q.cluster_queue == cluster_queue)
            .cloned()
            .collect())
    }
}
