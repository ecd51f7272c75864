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

//! The job adapter contract (§6.3). Entirely outside the core: the
//! reconciler calls these to suspend/unsuspend a concrete job kind and
//! feeds the result back in through [`crate::manager::Manager`] as an
//! ordinary [`crate::workload::Workload`] update. Kept here, typed, only so
//! it has one discoverable home; no method is ever called by this crate.

use std::collections::HashMap;

/// One admission condition recorded against a finished job.
#[derive(Debug, Clone)]
pub struct JobCondition {
    pub reason: String,
    pub message: String,
}

/// A single pod template's resource ask, keyed by pod-set name.
pub type PodSets = HashMap<String, crate::workload::ResourceRequests>;

/// Bridges a concrete job kind (a Kubernetes `Job`, a Ray cluster, ...) to
/// the shape the reconciler needs to drive suspend/resume and to translate
/// a finished job into the workload update the core sees.
pub trait JobAdapter: Send + Sync {
    fn is_suspended(&self) -> bool;
    fn suspend(&mut self);
    fn unsuspend(&mut self);

    /// Pins the job to the nodes implied by `selectors` (e.g. the node
    /// affinity a quota reservation requires).
    fn inject_node_affinity(&mut self, selectors: &HashMap<String, String>);
    fn restore_node_affinity(&mut self, selectors: &HashMap<String, String>);

    /// `Some(condition)` once the job has a terminal status; the bool
    /// reports whether it finished successfully.
    fn finished(&self) -> Option<(JobCondition, bool)>;

    fn pod_sets(&self) -> PodSets;

    /// Whether `workload` already describes this job's current shape, so
    /// the reconciler can skip re-submitting an unchanged workload.
    fn equivalent_to_workload(&self, workload: &crate::workload::Workload) -> bool;

    fn priority_class(&self) -> Option<String>;
    fn queue_name(&self) -> Option<String>;

    /// Whether this job kind opts out of queueing entirely.
    fn ignored(&self) -> bool;
}
