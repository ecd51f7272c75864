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

use thiserror::Error;

use crate::store::StoreError;

pub type QueueResult<T> = Result<T, QueueError>;

/// Every error the admission-queueing core can surface. Mutators return this;
/// read-only probes never fail beyond a `bool`/zero value.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("unknown queueing strategy {0:?}")]
    UnknownStrategy(String),

    #[error("cluster queue {0} already exists")]
    ClusterQueueAlreadyExists(String),

    #[error("cluster queue {0} doesn't exist")]
    ClusterQueueDoesNotExist(String),

    #[error("queue {0} doesn't exist")]
    QueueDoesNotExist(String),

    #[error("queue {0} already exists")]
    QueueAlreadyExists(String),

    #[error("listing objects from the authoritative store: {0}")]
    Store(#[from] StoreError),
}
