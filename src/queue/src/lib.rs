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

//! Admission queueing: the in-memory index of local queues, cluster queues
//! and cohorts that decides which workload is considered next for admission,
//! and in what order. Admission itself — quota accounting, preemption,
//! actually binding a workload to a cluster queue — happens upstream of
//! this crate and is recorded back only as the `Admission` stamp on a
//! `Workload` (see [`workload::Admission`]).
//!
//! [`manager::Manager`] is the entry point. Everything else is either state
//! it owns ([`local_queue`], [`cluster_queue`], [`cohort`]) or a collaborator
//! it calls out to ([`store::ObjectStore`], [`metrics::MetricRecorder`]).

pub mod adapter;
pub mod cluster_queue;
mod cohort;
pub mod error;
pub mod local_queue;
pub mod manager;
pub mod metrics;
pub mod store;
pub mod workload;

pub use adapter::JobAdapter;
pub use cluster_queue::{ClusterQueue, ClusterQueueSpec, BEST_EFFORT_FIFO, STRICT_FIFO};
pub use error::{QueueError, QueueResult};
pub use local_queue::LocalQueue;
pub use manager::{Manager, ManagerRef};
pub use metrics::MetricRecorder;
pub use store::{LocalQueueSpec, ObjectStore, StoreError};
pub use workload::{Admission, ResourceRequests, Workload, WorkloadInfo};
