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
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::Error;
use crate::value::Value;

/// A deliberate non-completion, distinct from a failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Postpone {
    pub reason: String,
}

/// Why a [`Thenable`] or stream did not produce a value.
///
/// Cheap to clone: the error is shared.
#[derive(Clone)]
pub enum Rejection {
    Error(Rc<anyhow::Error>),
    Postpone(Postpone),
}

impl Rejection {
    pub fn error(err: impl Into<anyhow::Error>) -> Self {
        Rejection::Error(Rc::new(err.into()))
    }

    pub fn postpone(reason: impl Into<String>) -> Self {
        Rejection::Postpone(Postpone {
            reason: reason.into(),
        })
    }

    pub fn is_postpone(&self) -> bool {
        matches!(self, Rejection::Postpone(_))
    }

    pub fn as_error(&self) -> Option<&anyhow::Error> {
        match self {
            Rejection::Error(err) => Some(err),
            Rejection::Postpone(_) => None,
        }
    }

    /// Downcasts the carried error, typically to [`Error`].
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.as_error().and_then(|err| err.downcast_ref::<E>())
    }

    /// The digest of a server error row, if this rejection came from one.
    pub fn digest(&self) -> Option<&str> {
        self.downcast_ref::<Error>().and_then(Error::digest)
    }
}

impl From<Error> for Rejection {
    fn from(err: Error) -> Self {
        Rejection::error(err)
    }
}

impl From<anyhow::Error> for Rejection {
    fn from(err: anyhow::Error) -> Self {
        Rejection::Error(Rc::new(err))
    }
}

impl fmt::Debug for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Error(err) => f.debug_tuple("Error").field(&err.to_string()).finish(),
            Rejection::Postpone(p) => f.debug_tuple("Postpone").field(&p.reason).finish(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Error(err) => write!(f, "{err}"),
            Rejection::Postpone(p) => write!(f, "postponed: {}", p.reason),
        }
    }
}

pub type Outcome = Result<Value, Rejection>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThenableStatus {
    Pending,
    Fulfilled,
    Rejected,
}

type Callback = Box<dyn FnOnce(Outcome)>;

struct Inner {
    outcome: Option<Outcome>,
    callbacks: Vec<Callback>,
    wakers: Vec<Waker>,
}

/// A single-assignment asynchronous value.
///
/// The same handle serves as encoder input (a promise still being computed)
/// and as decoder output (a value still arriving). Callbacks registered with
/// [`Thenable::then`] run synchronously on settlement, in registration order;
/// on an already settled thenable they run immediately.
#[derive(Clone)]
pub struct Thenable(Rc<RefCell<Inner>>);

impl Default for Thenable {
    fn default() -> Self {
        Thenable::new()
    }
}

impl Thenable {
    /// Creates a pending thenable.
    pub fn new() -> Self {
        Thenable(Rc::new(RefCell::new(Inner {
            outcome: None,
            callbacks: Vec::new(),
            wakers: Vec::new(),
        })))
    }

    pub fn fulfilled(value: Value) -> Self {
        let thenable = Thenable::new();
        thenable.resolve(value);
        thenable
    }

    pub fn rejected(reason: impl Into<Rejection>) -> Self {
        let thenable = Thenable::new();
        thenable.reject(reason);
        thenable
    }

    /// Fulfills the thenable. Returns `false` if it was already settled.
    pub fn resolve(&self, value: Value) -> bool {
        self.settle(Ok(value))
    }

    /// Rejects the thenable. Returns `false` if it was already settled.
    pub fn reject(&self, reason: impl Into<Rejection>) -> bool {
        self.settle(Err(reason.into()))
    }

    pub fn settle(&self, outcome: Outcome) -> bool {
        let (callbacks, wakers) = {
            let mut inner = self.0.borrow_mut();
            if inner.outcome.is_some() {
                return false;
            }
            inner.outcome = Some(outcome.clone());
            (
                std::mem::take(&mut inner.callbacks),
                std::mem::take(&mut inner.wakers),
            )
        };
        for callback in callbacks {
            callback(outcome.clone());
        }
        for waker in wakers {
            waker.wake();
        }
        true
    }

    pub fn status(&self) -> ThenableStatus {
        match &self.0.borrow().outcome {
            None => ThenableStatus::Pending,
            Some(Ok(_)) => ThenableStatus::Fulfilled,
            Some(Err(_)) => ThenableStatus::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.0.borrow().outcome.is_none()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.0.borrow().outcome.clone()
    }

    pub fn value(&self) -> Option<Value> {
        match &self.0.borrow().outcome {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<Rejection> {
        match &self.0.borrow().outcome {
            Some(Err(reason)) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Registers a settlement callback.
    pub fn then(&self, callback: impl FnOnce(Outcome) + 'static) {
        let settled = {
            let mut inner = self.0.borrow_mut();
            match &inner.outcome {
                Some(outcome) => Some(outcome.clone()),
                None => {
                    inner.callbacks.push(Box::new(callback));
                    return;
                }
            }
        };
        if let Some(outcome) = settled {
            callback(outcome);
        }
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &Thenable) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[inline(always)]
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl Future for Thenable {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.0.borrow_mut();
        match &inner.outcome {
            Some(outcome) => Poll::Ready(outcome.clone()),
            None => {
                if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for Thenable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.borrow().outcome {
            None => write!(f, "Thenable(<pending>)"),
            Some(Ok(value)) => f.debug_tuple("Thenable").field(value).finish(),
            Some(Err(reason)) => f.debug_tuple("Thenable").field(reason).finish(),
        }
    }
}
