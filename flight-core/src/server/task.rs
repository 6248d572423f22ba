// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::task::Waker;

use crate::resolver::context::ThenableState;
use crate::types::TaskStatus;
use crate::value::{Rejection, Value};

/// Unit of encoding work: one row id and the value that row describes.
pub(crate) struct Task {
    pub id: u32,
    pub status: TaskStatus,
    pub model: Value,
    pub key_path: Option<String>,
    pub implicit_slot: bool,
    /// Saved continuation of a suspended lazy root.
    pub thenable_state: Option<ThenableState>,
}

impl Task {
    pub fn new(id: u32, model: Value, key_path: Option<String>, implicit_slot: bool) -> Self {
        Task {
            id,
            status: TaskStatus::Pending,
            model,
            key_path,
            implicit_slot,
            thenable_state: None,
        }
    }
}

/// Notification that a task can make progress.
#[derive(Debug)]
pub(crate) enum Ping {
    /// Re-render the task; something it suspended on has settled.
    Retry(u32),
    /// The promise behind a task fulfilled.
    Fulfilled(u32, Value),
    /// The promise behind a task rejected.
    Rejected(u32, Rejection),
    /// A stream task has buffered events.
    Stream(u32),
}

#[derive(Default)]
struct PingQueueInner {
    pings: VecDeque<Ping>,
    waker: Option<Waker>,
}

/// Pings pushed from settlement callbacks, drained by `perform_work`.
///
/// Callbacks only enqueue; all rendering happens when the host drives the
/// request, so a callback never re-enters it.
#[derive(Clone, Default)]
pub(crate) struct PingQueue(Rc<RefCell<PingQueueInner>>);

impl PingQueue {
    pub fn push(&self, ping: Ping) {
        let waker = {
            let mut inner = self.0.borrow_mut();
            inner.pings.push_back(ping);
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub fn pop(&self) -> Option<Ping> {
        self.0.borrow_mut().pings.pop_front()
    }

    /// Registers the waker of the task polling the request's byte stream.
    pub fn set_waker(&self, waker: &Waker) {
        self.0.borrow_mut().waker = Some(waker.clone());
    }

    pub fn clear(&self) {
        self.0.borrow_mut().pings.clear();
    }
}
