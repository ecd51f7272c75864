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

use std::collections::{HashMap, HashSet};

/// `cohort name -> set of cluster queue names` (§3). Empty cohort names are
/// never indexed. Scopes the cohort-wide liveness flush of §4.5.
#[derive(Default)]
pub(crate) struct CohortIndex {
    cohorts: HashMap<String, HashSet<String>>,
}

impl CohortIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, cohort: &str, cluster_queue: &str) {
        if cohort.is_empty() {
            return;
        }
        self.cohorts
            .entry(cohort.to_string())
            .or_default()
            .insert(cluster_queue.to_string());
    }

    pub(crate) fn remove(&mut self, cohort: &str, cluster_queue: &str) {
        if cohort.is_empty() {
            return;
        }
        if let Some(members) = self.cohorts.get_mut(cohort) {
            members.remove(cluster_queue);
            if members.is_empty() {
                self.cohorts.remove(cohort);
            }
        }
    }

    pub(crate) fn update(&mut self, old_cohort: &str, new_cohort: &str, cluster_queue: &str) {
        self.remove(old_cohort, cluster_queue);
        self.add(new_cohort, cluster_queue);
    }

    /// The names of every cluster queue declared to be in `cohort`. Empty if
    /// `cohort` is empty or unknown.
    pub(crate) fn members(&self, cohort: &str) -> impl Iterator<Item = &String> {
        self.cohorts.get(cohort).into_iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cohort_name_is_never_indexed() {
        let mut idx = CohortIndex::new();
        idx.add("", "cq1");
        assert_eq!(idx.members("").count(), 0);
    }

    #[test]
    fn update_moves_membership_between_cohorts() {
        let mut idx = CohortIndex::new();
        idx.add("X", "cq1");
        idx.update("X", "Y", "cq1");
        assert_eq!(idx.members("X").count(), 0);
        assert_eq!(idx.members("Y").collect::<Vec<_>>(), vec!["cq1"]);
    }

    #[test]
    fn removing_last_member_drops_the_cohort_entry() {
        let mut idx = CohortIndex::new();
        idx.add("X", "cq1");
        idx.remove("X", "cq1");
        assert_eq!(idx.members("X").count(), 0);
    }
}
