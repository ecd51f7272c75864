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

use std::sync::Arc;
use std::time::Duration;

use admission_queue::{
    ClusterQueueSpec, LocalQueueSpec, Manager, ObjectStore, Workload, BEST_EFFORT_FIFO, STRICT_FIFO,
};
use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;

fn strict_fifo(name: &str, cohort: &str) -> ClusterQueueSpec {
    ClusterQueueSpec {
        name: name.into(),
        cohort: cohort.into(),
        queueing_strategy: STRICT_FIFO.into(),
    }
}

fn best_effort_fifo(name: &str, cohort: &str) -> ClusterQueueSpec {
    ClusterQueueSpec {
        name: name.into(),
        cohort: cohort.into(),
        queueing_strategy: BEST_EFFORT_FIFO.into(),
    }
}

fn local_queue(name: &str, cluster_queue: &str) -> LocalQueueSpec {
    LocalQueueSpec {
        namespace: "ns".into(),
        name: name.into(),
        cluster_queue: cluster_queue.into(),
    }
}

fn workload_at(name: &str, queue: &str, priority: i64, ts_offset_secs: i64) -> Workload {
    Workload::new("ns", name, queue)
        .with_priority(priority)
        .with_creation_timestamp(Utc::now() + ChronoDuration::seconds(ts_offset_secs))
}

async fn next_head<S: ObjectStore>(manager: &Manager<S>) -> String {
    let cancel = CancellationToken::new();
    manager.heads(&cancel).await[0].key()
}

#[tokio::test]
async fn s1_basic_fifo_orders_by_arrival() {
    let store = Arc::new(admission_queue::store::InMemoryStore::new());
    let manager = Manager::new(store);
    manager.add_cluster_queue(&strict_fifo("cq1", "")).unwrap();
    manager.add_queue(&local_queue("lq", "cq1")).unwrap();

    manager.add_or_update_workload(workload_at("a", "lq", 0, 1));
    manager.add_or_update_workload(workload_at("b", "lq", 0, 2));

    assert_eq!(next_head(&manager).await, "ns/a");
    assert_eq!(next_head(&manager).await, "ns/b");

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(manager.heads(&cancel).await.is_empty());
}

#[tokio::test]
async fn s2_higher_priority_jumps_the_queue() {
    let store = Arc::new(admission_queue::store::InMemoryStore::new());
    let manager = Manager::new(store);
    manager.add_cluster_queue(&strict_fifo("cq1", "")).unwrap();
    manager.add_queue(&local_queue("lq", "cq1")).unwrap();

    manager.add_or_update_workload(workload_at("a", "lq", 0, 1));
    manager.add_or_update_workload(workload_at("b", "lq", 5, 2));

    assert_eq!(next_head(&manager).await, "ns/b");
    assert_eq!(next_head(&manager).await, "ns/a");
}

#[tokio::test]
async fn s3_updating_any_cohort_member_flushes_inadmissible_workloads() {
    let store = Arc::new(admission_queue::store::InMemoryStore::new());
    // `requeue_workload` re-verifies liveness against the store, so "a" must
    // be known there before it can be requeued below.
    store.put_workload(workload_at("a", "lq", 0, 1));
    let manager = Manager::new(store);
    manager.add_cluster_queue(&best_effort_fifo("cq1", "X")).unwrap();
    manager.add_cluster_queue(&best_effort_fifo("cq2", "X")).unwrap();
    manager.add_queue(&local_queue("lq", "cq1")).unwrap();
    manager.add_or_update_workload(workload_at("a", "lq", 0, 1));

    let cancel = CancellationToken::new();
    let popped = manager.heads(&cancel).await.into_iter().next().unwrap();
    assert!(manager.requeue_workload(popped, false));
    assert_eq!(manager.dump().get("cq1").map(|s| s.len()), Some(1));

    manager.update_cluster_queue(&best_effort_fifo("cq2", "X")).unwrap();
    assert_eq!(next_head(&manager).await, "ns/a");
}

#[tokio::test]
async fn s4_strict_fifo_keeps_the_requeued_head_best_effort_lets_the_next_one_through() {
    let strict_store = Arc::new(admission_queue::store::InMemoryStore::new());
    let strict = Manager::new(strict_store);
    strict.add_cluster_queue(&strict_fifo("cq", "")).unwrap();
    strict.add_queue(&local_queue("lq", "cq")).unwrap();
    strict.add_or_update_workload(workload_at("a", "lq", 0, 1));
    strict.add_or_update_workload(workload_at("b", "lq", 0, 2));

    let cancel = CancellationToken::new();
    let popped_a = strict.heads(&cancel).await.into_iter().next().unwrap();
    assert_eq!(popped_a.key(), "ns/a");
    assert!(strict.requeue_workload(popped_a, false));
    assert_eq!(next_head(&strict).await, "ns/a");

    let best_effort_store = Arc::new(admission_queue::store::InMemoryStore::new());
    best_effort_store.put_workload(workload_at("a", "lq", 0, 1));
    let best_effort = Manager::new(best_effort_store);
    best_effort.add_cluster_queue(&best_effort_fifo("cq", "")).unwrap();
    best_effort.add_queue(&local_queue("lq", "cq")).unwrap();
    best_effort.add_or_update_workload(workload_at("a", "lq", 0, 1));
    best_effort.add_or_update_workload(workload_at("b", "lq", 0, 2));

    let popped_a = best_effort.heads(&cancel).await.into_iter().next().unwrap();
    assert_eq!(popped_a.key(), "ns/a");
    assert!(best_effort.requeue_workload(popped_a, false));
    // "a" is held inadmissible; the next head is "b", not "a" again.
    assert_eq!(next_head(&best_effort).await, "ns/b");

    best_effort.update_cluster_queue(&best_effort_fifo("cq", "")).unwrap();
    assert_eq!(next_head(&best_effort).await, "ns/a");
}

#[tokio::test]
async fn s5_reassigning_a_local_queue_moves_its_workload_between_cluster_queues() {
    let store = Arc::new(admission_queue::store::InMemoryStore::new());
    let manager = Manager::new(store);
    manager.add_cluster_queue(&strict_fifo("cq1", "")).unwrap();
    manager.add_cluster_queue(&strict_fifo("cq2", "")).unwrap();
    manager.add_queue(&local_queue("lq1", "cq1")).unwrap();
    manager.add_queue(&local_queue("lq2", "cq2")).unwrap();

    let old = workload_at("w", "lq1", 0, 1);
    manager.add_or_update_workload(old.clone());
    assert_eq!(manager.pending("cq1"), Some(1));
    assert_eq!(manager.pending("cq2"), Some(0));

    let new = workload_at("w", "lq2", 0, 1);
    manager.update_workload(&old, new);

    assert_eq!(manager.pending("cq1"), Some(0));
    assert_eq!(manager.pending("cq2"), Some(1));
    assert_eq!(manager.pending_workloads("ns", "lq1").unwrap(), 0);
    assert_eq!(manager.pending_workloads("ns", "lq2").unwrap(), 1);
}

#[tokio::test]
async fn s6_cancelling_the_context_wakes_a_blocked_heads_call() {
    let store = Arc::new(admission_queue::store::InMemoryStore::new());
    let manager = Arc::new(Manager::new(store));
    manager.add_cluster_queue(&strict_fifo("cq1", "")).unwrap();

    let cancel = CancellationToken::new();
    manager.clone().clean_up_on_context(cancel.clone());

    let waiter = tokio::spawn({
        let manager = manager.clone();
        let cancel = cancel.clone();
        async move { manager.heads(&cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("heads() did not wake within the timeout")
        .unwrap();
    assert!(result.is_empty());
}
