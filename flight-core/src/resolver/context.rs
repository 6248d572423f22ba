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

use crate::error::Error;
use crate::server::hints::Hint;
use crate::value::{Rejection, Thenable, Value};

/// Why a lazy value stopped before producing a result.
#[derive(Debug)]
pub enum Interrupt {
    /// The value needs a thenable that has not settled yet. The task is
    /// retried once it does.
    Suspend(Thenable),
    /// The value failed, or was postponed.
    Throw(Rejection),
}

impl From<Rejection> for Interrupt {
    fn from(reason: Rejection) -> Self {
        Interrupt::Throw(reason)
    }
}

impl From<anyhow::Error> for Interrupt {
    fn from(err: anyhow::Error) -> Self {
        Interrupt::Throw(Rejection::from(err))
    }
}

impl From<Error> for Interrupt {
    fn from(err: Error) -> Self {
        Interrupt::Throw(Rejection::from(err))
    }
}

/// Thenables consumed by one lazy value, in call order.
///
/// This is the saved continuation of a suspended task: when the task is
/// retried, the n-th [`RenderContext::use_thenable`] call gets the n-th
/// thenable back, so earlier awaited work is not redone.
#[derive(Debug, Default)]
pub struct ThenableState {
    thenables: Vec<Thenable>,
}

impl ThenableState {
    pub fn len(&self) -> usize {
        self.thenables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thenables.is_empty()
    }
}

/// Handle passed to a [`Lazy`](crate::value::Lazy) thunk while it runs.
pub struct RenderContext<'a> {
    state: &'a mut ThenableState,
    index: usize,
    hints: &'a mut Vec<Hint>,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(state: &'a mut ThenableState, hints: &'a mut Vec<Hint>) -> Self {
        RenderContext {
            state,
            index: 0,
            hints,
        }
    }

    /// Reads a thenable, suspending the current task while it is pending.
    ///
    /// On a retry the thenable recorded at this position wins over the one
    /// passed in, so a thunk that creates a fresh thenable per call still
    /// observes the settled one.
    pub fn use_thenable(&mut self, thenable: &Thenable) -> Result<Value, Interrupt> {
        let index = self.index;
        self.index += 1;
        let tracked = match self.state.thenables.get(index) {
            Some(previous) => previous.clone(),
            None => {
                self.state.thenables.push(thenable.clone());
                thenable.clone()
            }
        };
        match tracked.outcome() {
            Some(Ok(value)) => Ok(value),
            Some(Err(reason)) => Err(Interrupt::Throw(reason)),
            None => Err(Interrupt::Suspend(tracked)),
        }
    }

    /// Queues a resource hint for the decoding side.
    pub fn hint(&mut self, hint: Hint) {
        self.hints.push(hint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_reuses_tracked_thenable() {
        let mut state = ThenableState::default();
        let mut hints = Vec::new();
        let first = Thenable::new();
        {
            let mut cx = RenderContext::new(&mut state, &mut hints);
            assert!(matches!(cx.use_thenable(&first), Err(Interrupt::Suspend(_))));
        }
        first.resolve(Value::from("ready"));
        let mut cx = RenderContext::new(&mut state, &mut hints);
        // A new, never-settled thenable at the same position is ignored.
        let value = cx.use_thenable(&Thenable::new()).unwrap();
        assert_eq!(value, Value::from("ready"));
    }
}
