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

use std::sync::OnceLock;

use prometheus::{register_int_gauge_vec_with_registry, IntGaugeVec, Registry};

/// A side-channel gauge for "pending workloads" per queue (§6.2). The core
/// calls `Inc` on first insertion of a key into a local queue and `Dec` on
/// removal; implementations are opaque and an absent recorder must be
/// tolerated, so call sites hold `Option<Arc<dyn MetricRecorder>>`.
pub trait MetricRecorder: Send + Sync {
    fn inc(&self);
    fn dec(&self);
    fn clear(&self);
}

static PENDING_WORKLOADS: OnceLock<IntGaugeVec> = OnceLock::new();
static REGISTERED: OnceLock<()> = OnceLock::new();

/// Registers the `pending_workloads` gauge with `registry`. Idempotent,
/// mirroring the source's `sync.Once`-guarded `Register()`: calling it more
/// than once, even with different registries, only takes effect the first
/// time.
pub fn register(registry: &Registry) {
    REGISTERED.get_or_init(|| {
        let gauge = register_int_gauge_vec_with_registry!(
            "pending_workloads",
            "Number of pending workloads, by the owner type. 'queue' means number of \
             workloads in a local queue; 'cluster_queue' means number of workloads in a \
             cluster queue.",
            &["type", "name", "namespace"],
            registry
        )
        .expect("pending_workloads gauge registration is infallible for a fresh registry");
        PENDING_WORKLOADS
            .set(gauge)
            .unwrap_or_else(|_| panic!("pending_workloads gauge set twice"));
    });
}

fn gauge() -> Option<&'static IntGaugeVec> {
    PENDING_WORKLOADS.get()
}

/// `MetricRecorder` for workloads pending in a local queue.
pub struct PendingWorkloadsInQueueRecorder {
    namespace: String,
    name: String,
}

impl PendingWorkloadsInQueueRecorder {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl MetricRecorder for PendingWorkloadsInQueueRecorder {
    fn inc(&self) {
        if let Some(g) = gauge() {
            g.with_label_values(&["queue", &self.name, &self.namespace]).inc();
        }
    }

    fn dec(&self) {
        if let Some(g) = gauge() {
            g.with_label_values(&["queue", &self.name, &self.namespace]).dec();
        }
    }

    fn clear(&self) {
        if let Some(g) = gauge() {
            g.with_label_values(&["queue", &self.name, &self.namespace]).set(0);
        }
    }
}

/// `MetricRecorder` for workloads pending in a cluster queue.
pub struct PendingWorkloadsInClusterQueueRecorder {
    name: String,
}

impl PendingWorkloadsInClusterQueueRecorder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl MetricRecorder for PendingWorkloadsInClusterQueueRecorder {
    fn inc(&self) {
        if let Some(g) = gauge() {
            g.with_label_values(&["cluster_queue", &self.name, ""]).inc();
        }
    }

    fn dec(&self) {
        if let Some(g) = gauge() {
            g.with_label_values(&["cluster_queue", &self.name, ""]).dec();
        }
    }

    fn clear(&self) {
        if let Some(g) = gauge() {
            g.with_label_values(&["cluster_queue", &self.name, ""]).set(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_methods_never_panic_even_if_unregistered() {
        // register() is process-wide and may or may not have run by the time
        // this test executes alongside others; Inc/Dec/Clear must tolerate both.
        let recorder = PendingWorkloadsInQueueRecorder::new("ns", "lq");
        recorder.inc();
        recorder.dec();
        recorder.clear();
    }
}
