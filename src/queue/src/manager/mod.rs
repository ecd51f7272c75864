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

//! The top-level index over local queues, cluster queues and cohorts (§4.5).
//! One write lock guards all three; `Heads` is the sole blocking read,
//! waking on a condition broadcast whenever a mutation could have made a
//! workload admissible.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::cluster_queue::{new_cluster_queue, ClusterQueue, ClusterQueueSpec};
use crate::cohort::CohortIndex;
use crate::error::{QueueError, QueueResult};
use crate::local_queue::LocalQueue;
use crate::metrics::{MetricRecorder, PendingWorkloadsInClusterQueueRecorder, PendingWorkloadsInQueueRecorder};
use crate::store::{LocalQueueSpec, ObjectStore};
use crate::workload::{self, Workload, WorkloadInfo};

struct ManagerCore {
    local_queues: HashMap<String, LocalQueue>,
    cluster_queues: HashMap<String, Box<dyn ClusterQueue>>,
    cohorts: CohortIndex,
}

impl ManagerCore {
    fn new() -> Self {
        Self {
            local_queues: HashMap::new(),
            cluster_queues: HashMap::new(),
            cohorts: CohortIndex::new(),
        }
    }
}

/// Flushes every cluster queue in `cq_name`'s cohort (or just `cq_name`
/// itself, if it belongs to none) from *inadmissible* into *ready* (§4.4,
/// §4.5). Returns whether at least one workload moved anywhere in the
/// cohort; this is what decides whether the Manager broadcasts.
fn queue_all_inadmissible_in_cohort(core: &mut ManagerCore, cq_name: &str) -> bool {
    let cohort = match core.cluster_queues.get(cq_name) {
        Some(cq) => cq.cohort().to_string(),
        None => return false,
    };

    if cohort.is_empty() {
        return core
            .cluster_queues
            .get_mut(cq_name)
            .map(|cq| cq.queue_inadmissible_workloads())
            .unwrap_or(false);
    }

    let members: Vec<String> = core.cohorts.members(&cohort).cloned().collect();
    let mut queued = false;
    for name in members {
        if let Some(cq) = core.cluster_queues.get_mut(&name) {
            if cq.queue_inadmissible_workloads() {
                queued = true;
            }
        }
    }
    queued
}

/// Removes `workload_key` from its local queue and, if that queue still
/// forwards to a known cluster queue, from there too.
fn delete_workload_from_queue_and_cluster_queue(core: &mut ManagerCore, workload_key: &str, queue_key: &str) {
    let cluster_queue_name = match core.local_queues.get_mut(queue_key) {
        Some(lq) => {
            lq.delete(workload_key);
            lq.cluster_queue.clone()
        }
        None => return,
    };
    if let Some(cq) = core.cluster_queues.get_mut(&cluster_queue_name) {
        cq.delete(workload_key);
    }
}

/// Inserts/replaces `workload` in its local queue and pushes the update
/// through to the cluster queue it forwards to. Returns `false` without
/// broadcasting if either the local queue or its cluster queue is unknown —
/// the exact asymmetry of the source, which still records the local-queue
/// side effect even when the cluster-queue push is skipped.
fn add_or_update_workload_locked(core: &mut ManagerCore, workload: Workload) -> bool {
    let queue_key = workload.queue_key();
    let cluster_queue_name = match core.local_queues.get(&queue_key) {
        Some(lq) => lq.cluster_queue.clone(),
        None => return false,
    };

    let info = WorkloadInfo::new(workload);
    if let Some(lq) = core.local_queues.get_mut(&queue_key) {
        lq.add_or_update(info.clone());
    }

    match core.cluster_queues.get_mut(&cluster_queue_name) {
        Some(cq) => {
            cq.push_or_update(info);
            true
        }
        None => false,
    }
}

fn compute_heads(core: &mut ManagerCore) -> Vec<WorkloadInfo> {
    let mut heads = Vec::new();
    for (cq_name, cq) in core.cluster_queues.iter_mut() {
        let Some(info) = cq.pop() else { continue };
        let queue_key = info.workload.queue_key();
        if let Some(lq) = core.local_queues.get_mut(&queue_key) {
            lq.delete(&info.key());
        }
        heads.push(info.with_cluster_queue(cq_name.clone()));
    }
    heads
}

/// The admission-queueing core's single entry point (§2, §4.5). Cheap to
/// clone via [`ManagerRef`] and share across the async tasks that drive
/// reconciliation and admission.
pub struct Manager<S> {
    store: Arc<S>,
    core: parking_lot::RwLock<ManagerCore>,
    notify: Notify,
}

/// A shared handle to a [`Manager`], the shape every long-lived task holds.
pub type ManagerRef<S> = Arc<Manager<S>>;

impl<S: ObjectStore> Manager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            core: parking_lot::RwLock::new(ManagerCore::new()),
            notify: Notify::new(),
        }
    }

    /// Registers a cluster queue, back-fills it from every local queue
    /// already forwarding to it, and flushes its cohort's inadmissible
    /// holding areas (§4.5, `AddClusterQueue`).
    pub fn add_cluster_queue(&self, spec: &ClusterQueueSpec) -> QueueResult<()> {
        let mut core = self.core.write();
        if core.cluster_queues.contains_key(&spec.name) {
            return Err(QueueError::ClusterQueueAlreadyExists(spec.name.clone()));
        }

        let metric_recorder: Arc<dyn MetricRecorder> =
            Arc::new(PendingWorkloadsInClusterQueueRecorder::new(spec.name.clone()));
        let cq = new_cluster_queue(spec, Some(metric_recorder))?;
        core.cluster_queues.insert(spec.name.clone(), cq);
        core.cohorts.add(&spec.cohort, &spec.name);

        let forwarding_queues = self.store.list_queues_for_cluster_queue(&spec.name)?;
        let mut added_workloads = false;
        if let Some(cq) = core.cluster_queues.get_mut(&spec.name) {
            for q_spec in &forwarding_queues {
                if q_spec.cluster_queue != spec.name {
                    continue;
                }
                if let Some(local_queue) = core.local_queues.get(&q_spec.key()) {
                    if cq.add_from_queue(local_queue) {
                        added_workloads = true;
                    }
                }
            }
        }

        let queued = queue_all_inadmissible_in_cohort(&mut core, &spec.name);
        if queued || added_workloads {
            drop(core);
            self.notify.notify_waiters();
        }
        tracing::info!(cluster_queue = %spec.name, cohort = %spec.cohort, "added cluster queue");
        Ok(())
    }

    /// Applies `spec`'s cohort and strategy-specific fields to an existing
    /// cluster queue, moving its cohort membership if the cohort changed,
    /// then flushes the (possibly new) cohort's inadmissible workloads
    /// (§4.5, `UpdateClusterQueue`).
    pub fn update_cluster_queue(&self, spec: &ClusterQueueSpec) -> QueueResult<()> {
        let mut core = self.core.write();
        let old_cohort = core
            .cluster_queues
            .get(&spec.name)
            .ok_or_else(|| QueueError::ClusterQueueDoesNotExist(spec.name.clone()))?
            .cohort()
            .to_string();

        if let Some(cq) = core.cluster_queues.get_mut(&spec.name) {
            cq.update(spec);
        }
        if old_cohort != spec.cohort {
            core.cohorts.update(&old_cohort, &spec.cohort, &spec.name);
        }

        let queued = queue_all_inadmissible_in_cohort(&mut core, &spec.name);
        if queued {
            drop(core);
            self.notify.notify_waiters();
        }
        tracing::info!(cluster_queue = %spec.name, "updated cluster queue");
        Ok(())
    }

    /// Drops a cluster queue and its cohort membership (§4.5,
    /// `DeleteClusterQueue`). Resolved open question (§9): any local queue
    /// still forwarding to it is detached in the same step rather than left
    /// pointing at a name the Manager no longer recognises.
    pub fn delete_cluster_queue(&self, name: &str) {
        let mut core = self.core.write();
        let Some(cq) = core.cluster_queues.remove(name) else {
            return;
        };
        let cohort = cq.cohort().to_string();
        core.cohorts.remove(&cohort, name);

        let stale: Vec<String> = core
            .local_queues
            .values()
            .filter(|lq| lq.cluster_queue == name)
            .map(|lq| lq.key())
            .collect();
        let drained = stale.len();
        for key in stale {
            core.local_queues.remove(&key);
        }
        tracing::info!(cluster_queue = %name, drained_local_queues = drained, "deleted cluster queue");
    }

    /// Registers a local queue, seeds it from every unadmitted workload the
    /// store reports for it, and forwards those into its cluster queue if
    /// known (§4.5, `AddQueue`).
    pub fn add_queue(&self, spec: &LocalQueueSpec) -> QueueResult<()> {
        let mut core = self.core.write();
        let key = spec.key();
        if core.local_queues.contains_key(&key) {
            return Err(QueueError::QueueAlreadyExists(key));
        }

        let metric_recorder: Arc<dyn MetricRecorder> =
            Arc::new(PendingWorkloadsInQueueRecorder::new(spec.namespace.clone(), spec.name.clone()));
        let mut lq = LocalQueue::new(spec, Some(metric_recorder));
        for workload in self.store.list_workloads_for_queue(&spec.namespace, &spec.name)? {
            if workload.queue_name != spec.name || workload.is_admitted() {
                continue;
            }
            lq.add_or_update(WorkloadInfo::new(workload));
        }
        core.local_queues.insert(key.clone(), lq);

        let added = match core.local_queues.get(&key) {
            Some(local_queue) => match core.cluster_queues.get_mut(&spec.cluster_queue) {
                Some(cq) => cq.add_from_queue(local_queue),
                None => false,
            },
            None => false,
        };
        if added {
            drop(core);
            self.notify.notify_waiters();
        }
        tracing::info!(queue = %key, cluster_queue = %spec.cluster_queue, "added local queue");
        Ok(())
    }

    /// Rebinds a local queue to a (possibly different) cluster queue,
    /// moving its workloads across if the forwarding target changed (§4.5,
    /// `UpdateQueue`).
    pub fn update_queue(&self, spec: &LocalQueueSpec) -> QueueResult<()> {
        let mut core = self.core.write();
        let key = spec.key();
        let old_cluster_queue = core
            .local_queues
            .get(&key)
            .ok_or_else(|| QueueError::QueueDoesNotExist(key.clone()))?
            .cluster_queue
            .clone();

        let mut broadcast = false;
        if old_cluster_queue != spec.cluster_queue {
            if let Some(old_cq) = core.cluster_queues.get_mut(&old_cluster_queue) {
                if let Some(lq) = core.local_queues.get(&key) {
                    old_cq.delete_from_queue(lq);
                }
            }
            if let Some(new_cq) = core.cluster_queues.get_mut(&spec.cluster_queue) {
                if let Some(lq) = core.local_queues.get(&key) {
                    broadcast = new_cq.add_from_queue(lq);
                }
            }
        }

        if let Some(lq) = core.local_queues.get_mut(&key) {
            lq.update(spec);
        }

        if broadcast {
            drop(core);
            self.notify.notify_waiters();
        }
        Ok(())
    }

    /// Detaches a local queue, removing its workloads from whatever cluster
    /// queue it forwarded to (§4.5, `DeleteQueue`).
    pub fn delete_queue(&self, namespace: &str, name: &str) {
        let mut core = self.core.write();
        let key = workload::key(namespace, name);
        let Some(lq) = core.local_queues.get(&key) else {
            return;
        };
        let cluster_queue_name = lq.cluster_queue.clone();
        if let Some(cq) = core.cluster_queues.get_mut(&cluster_queue_name) {
            if let Some(lq) = core.local_queues.get(&key) {
                cq.delete_from_queue(lq);
            }
        }
        core.local_queues.remove(&key);
    }

    /// Inserts or replaces `workload` at both the local-queue and
    /// cluster-queue level, signalling liveness on success (§4.5,
    /// `AddOrUpdateWorkload`).
    pub fn add_or_update_workload(&self, workload: Workload) -> bool {
        let mut core = self.core.write();
        let inserted = add_or_update_workload_locked(&mut core, workload);
        if inserted {
            drop(core);
            self.notify.notify_waiters();
        }
        inserted
    }

    /// Removes `workload` from whichever local/cluster queue pair it
    /// currently sits in (§4.5, `DeleteWorkload`).
    pub fn delete_workload(&self, workload: &Workload) {
        let mut core = self.core.write();
        delete_workload_from_queue_and_cluster_queue(&mut core, &workload.key(), &workload.queue_key());
    }

    /// Moves a workload's local-queue membership from `old`'s queue to
    /// `new`'s queue when the target changed, then re-runs
    /// `add_or_update_workload` for `new` (§4.5, `UpdateWorkload`).
    pub fn update_workload(&self, old: &Workload, new: Workload) -> bool {
        let mut core = self.core.write();
        if old.queue_name != new.queue_name {
            delete_workload_from_queue_and_cluster_queue(&mut core, &new.key(), &old.queue_key());
        }
        let inserted = add_or_update_workload_locked(&mut core, new);
        if inserted {
            drop(core);
            self.notify.notify_waiters();
        }
        inserted
    }

    /// Re-inserts a workload previously handed out by [`Manager::heads`] but
    /// not admitted, after re-verifying against the store that it is still
    /// live and unadmitted (§4.5, `RequeueWorkload`; resolved open question
    /// §9, "back-fill under lock").
    pub fn requeue_workload(&self, info: WorkloadInfo, immediate: bool) -> bool {
        let mut core = self.core.write();
        let queue_key = info.workload.queue_key();
        if !core.local_queues.contains_key(&queue_key) {
            return false;
        }

        match self.store.get_workload(&info.workload.namespace, &info.workload.name) {
            Some(w) if !w.is_admitted() => {}
            _ => return false,
        }

        if let Some(lq) = core.local_queues.get_mut(&queue_key) {
            lq.add_if_not_present(info.clone());
        }

        let cluster_queue_name = core.local_queues.get(&queue_key).map(|lq| lq.cluster_queue.clone());
        let inserted = match cluster_queue_name.and_then(|name| core.cluster_queues.get_mut(&name)) {
            Some(cq) => cq.requeue_if_not_present(info, immediate),
            None => false,
        };
        if inserted {
            drop(core);
            self.notify.notify_waiters();
        }
        inserted
    }

    /// Flushes the cohort of the cluster queue `workload`'s local queue
    /// forwards to. Exposed for callers that observe the deletion of an
    /// *admitted* workload — one this core never held — so a slot freed
    /// elsewhere in the cohort can still resurface inadmissible workloads
    /// (§4.5, `QueueAssociatedInadmissibleWorkloads`).
    pub fn queue_associated_inadmissible_workloads(&self, workload: &Workload) {
        let mut core = self.core.write();
        let Some(cluster_queue_name) = core.local_queues.get(&workload.queue_key()).map(|lq| lq.cluster_queue.clone())
        else {
            return;
        };
        if !core.cluster_queues.contains_key(&cluster_queue_name) {
            return;
        }
        let queued = queue_all_inadmissible_in_cohort(&mut core, &cluster_queue_name);
        if queued {
            drop(core);
            self.notify.notify_waiters();
        }
    }

    /// Number of workloads pending in the local queue `namespace/name`
    /// (§4.5, `PendingWorkloads`).
    pub fn pending_workloads(&self, namespace: &str, name: &str) -> QueueResult<i32> {
        let core = self.core.read();
        let key = workload::key(namespace, name);
        core.local_queues
            .get(&key)
            .map(|lq| lq.len() as i32)
            .ok_or_else(|| QueueError::QueueDoesNotExist(key))
    }

    /// Number of workloads pending in cluster queue `cluster_queue`, or
    /// `None` if it isn't known (§4.5, `Pending`).
    pub fn pending(&self, cluster_queue: &str) -> Option<i32> {
        let core = self.core.read();
        core.cluster_queues.get(cluster_queue).map(|cq| cq.pending())
    }

    pub fn queue_for_workload_exists(&self, workload: &Workload) -> bool {
        let core = self.core.read();
        core.local_queues.contains_key(&workload.queue_key())
    }

    /// The cluster queue `workload`'s local queue forwards to, if both are
    /// currently known.
    pub fn cluster_queue_for_workload(&self, workload: &Workload) -> Option<String> {
        let core = self.core.read();
        let lq = core.local_queues.get(&workload.queue_key())?;
        core.cluster_queues
            .contains_key(&lq.cluster_queue)
            .then(|| lq.cluster_queue.clone())
    }

    /// Blocks until at least one cluster queue has a ready head, popping
    /// the head of every cluster queue that has one (§4.5, `Heads`).
    /// Cancelling `cancel` unblocks the wait early with an empty result.
    pub async fn heads(&self, cancel: &CancellationToken) -> Vec<WorkloadInfo> {
        loop {
            // Registering the notification before checking for work, rather
            // than after, is what keeps a broadcast that lands between the
            // check and the wait from being missed.
            let notified = self.notify.notified();
            {
                let mut core = self.core.write();
                let heads = compute_heads(&mut core);
                if !heads.is_empty() {
                    tracing::trace!(count = heads.len(), "returning cluster queue heads");
                    return heads;
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return Vec::new(),
            }
        }
    }

    /// Spawns a task that wakes every `heads()` waiter once `cancel` fires,
    /// so a shutdown doesn't leave them blocked forever.
    pub fn clean_up_on_context(self: Arc<Self>, cancel: CancellationToken)
    where
        S: 'static,
    {
        tokio::spawn(async move {
            cancel.cancelled().await;
            self.notify.notify_waiters();
        });
    }

    /// For every cluster queue with at least one pending workload, the set
    /// of workload keys it holds. Exposed for tests only.
    pub fn dump(&self) -> HashMap<String, HashSet<String>> {
        let core = self.core.read();
        core.cluster_queues
            .iter()
            .filter_map(|(name, cq)| {
                let (keys, nonempty) = cq.dump();
                nonempty.then(|| (name.clone(), keys))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cluster_queue::STRICT_FIFO;
    use crate::store::InMemoryStore;

    fn cq_spec(name: &str, cohort: &str) -> ClusterQueueSpec {
        ClusterQueueSpec {
            name: name.into(),
            cohort: cohort.into(),
            queueing_strategy: STRICT_FIFO.into(),
        }
    }

    fn lq_spec(name: &str, cluster_queue: &str) -> LocalQueueSpec {
        LocalQueueSpec {
            namespace: "ns".into(),
            name: name.into(),
            cluster_queue: cluster_queue.into(),
        }
    }

    #[test]
    fn adding_cluster_queue_backfills_from_existing_local_queues() {
        let store = Arc::new(InMemoryStore::new());
        let manager = Manager::new(store.clone());
        manager.add_queue(&lq_spec("lq1", "cq1")).unwrap();
        manager.add_or_update_workload(Workload::new("ns", "w1", "lq1"));

        manager.add_cluster_queue(&cq_spec("cq1", "")).unwrap();
        assert_eq!(manager.pending("cq1"), Some(1));
    }

    #[test]
    fn deleting_cluster_queue_detaches_its_local_queues() {
        let store = Arc::new(InMemoryStore::new());
        let manager = Manager::new(store);
        manager.add_cluster_queue(&cq_spec("cq1", "")).unwrap();
        manager.add_queue(&lq_spec("lq1", "cq1")).unwrap();

        manager.delete_cluster_queue("cq1");
        assert!(!manager.queue_for_workload_exists(&Workload::new("ns", "w1", "lq1")));
    }

    #[test]
    fn updating_cluster_queue_cohort_moves_membership_and_flushes() {
        let store = Arc::new(InMemoryStore::new());
        let manager = Manager::new(store);
        manager.add_cluster_queue(&cq_spec("cq1", "X")).unwrap();
        manager.add_cluster_queue(&cq_spec("cq2", "X")).unwrap();
        manager.add_queue(&lq_spec("lq1", "cq1")).unwrap();
        manager.add_or_update_workload(Workload::new("ns", "w1", "lq1"));

        let popped = manager.heads_sync_for_test();
        assert_eq!(popped.len(), 1);
        manager.requeue_workload(popped.into_iter().next().unwrap(), false);

        manager.update_cluster_queue(&cq_spec("cq1", "Y")).unwrap();
        assert_eq!(manager.dump().get("cq1").map(|s| s.len()), Some(1));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn heads_blocks_until_a_workload_is_admissible() {
        let store = Arc::new(InMemoryStore::new());
        let manager = Arc::new(Manager::new(store));
        manager.add_cluster_queue(&cq_spec("cq1", "")).unwrap();
        manager.add_queue(&lq_spec("lq1", "cq1")).unwrap();

        let cancel = CancellationToken::new();
        let waiter = tokio::spawn({
            let manager = manager.clone();
            let cancel = cancel.clone();
            async move { manager.heads(&cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.add_or_update_workload(Workload::new("ns", "w1", "lq1"));

        let heads = waiter.await.unwrap();
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].cluster_queue.as_deref(), Some("cq1"));
    }

    #[tokio::test]
    async fn heads_unblocks_on_cancellation_with_an_empty_result() {
        let store = Arc::new(InMemoryStore::new());
        let manager = Arc::new(Manager::new(store));
        manager.add_cluster_queue(&cq_spec("cq1", "")).unwrap();

        let cancel = CancellationToken::new();
        let waiter = tokio::spawn({
            let manager = manager.clone();
            let cancel = cancel.clone();
            async move { manager.heads(&cancel).await }
        });
        cancel.cancel();
        assert!(waiter.await.unwrap().is_empty());
    }

    impl<S: ObjectStore> Manager<S> {
        /// Non-blocking variant of `compute_heads` for tests that don't want
        /// to spin up a runtime just to drain a known-ready queue.
        fn heads_sync_for_test(&self) -> Vec<WorkloadInfo> {
            let mut core = self.core.write();
            compute_heads(&mut core)
        }
    }
}
