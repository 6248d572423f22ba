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
use std::fmt;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::Error;
use crate::types::StreamKind;
use crate::value::thenable::Rejection;
use crate::value::Value;

/// One step of an [`AsyncStream`].
#[derive(Clone, Debug)]
pub enum StreamEvent {
    Item(Value),
    /// End of the stream. Iterators may carry a return value.
    Close(Option<Value>),
    Error(Rejection),
}

struct Inner {
    kind: StreamKind,
    buffer: VecDeque<StreamEvent>,
    /// A terminal event was pushed; later pushes are dropped.
    finished: bool,
    /// A terminal event was read.
    terminated: bool,
    return_value: Option<Value>,
    cancelled: Option<Rejection>,
    locked: bool,
    subscriber: Option<Rc<dyn Fn()>>,
    waker: Option<Waker>,
}

/// A single-reader queue of values produced over time.
///
/// Models readable streams, byte streams and async iterables. The producer
/// pushes items and finishes with [`close`](AsyncStream::close) or
/// [`error`](AsyncStream::error); the consumer either polls it as a
/// [`futures::Stream`] or pops events with
/// [`next_event`](AsyncStream::next_event).
#[derive(Clone)]
pub struct AsyncStream {
    inner: Rc<RefCell<Inner>>,
}

impl AsyncStream {
    pub fn new(kind: StreamKind) -> Self {
        AsyncStream {
            inner: Rc::new(RefCell::new(Inner {
                kind,
                buffer: VecDeque::new(),
                finished: false,
                terminated: false,
                return_value: None,
                cancelled: None,
                locked: false,
                subscriber: None,
                waker: None,
            })),
        }
    }

    pub fn readable() -> Self {
        AsyncStream::new(StreamKind::Readable)
    }

    pub fn readable_bytes() -> Self {
        AsyncStream::new(StreamKind::ReadableBytes)
    }

    pub fn async_iterable() -> Self {
        AsyncStream::new(StreamKind::AsyncIterable)
    }

    pub fn async_iterator() -> Self {
        AsyncStream::new(StreamKind::AsyncIterator)
    }

    /// A finished stream holding `items`.
    pub fn from_items(kind: StreamKind, items: impl IntoIterator<Item = Value>) -> Self {
        let stream = AsyncStream::new(kind);
        for item in items {
            stream.push(item);
        }
        stream.close();
        stream
    }

    pub fn kind(&self) -> StreamKind {
        self.inner.borrow().kind
    }

    /// Appends an item. Returns `false` once the stream is finished or cancelled.
    pub fn push(&self, item: Value) -> bool {
        self.enqueue(StreamEvent::Item(item))
    }

    pub fn close(&self) -> bool {
        self.enqueue(StreamEvent::Close(None))
    }

    /// Closes an iterator with a return value.
    pub fn close_with(&self, value: Value) -> bool {
        self.enqueue(StreamEvent::Close(Some(value)))
    }

    pub fn error(&self, reason: impl Into<Rejection>) -> bool {
        self.enqueue(StreamEvent::Error(reason.into()))
    }

    fn enqueue(&self, event: StreamEvent) -> bool {
        let (subscriber, waker) = {
            let mut inner = self.inner.borrow_mut();
            if inner.finished || inner.cancelled.is_some() {
                return false;
            }
            if !matches!(event, StreamEvent::Item(_)) {
                inner.finished = true;
            }
            inner.buffer.push_back(event);
            (inner.subscriber.clone(), inner.waker.take())
        };
        if let Some(notify) = subscriber {
            notify();
        }
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Whether the producer has pushed a terminal event.
    pub fn is_finished(&self) -> bool {
        self.inner.borrow().finished
    }

    /// Why the reader stopped reading, if it did.
    pub fn cancellation(&self) -> Option<Rejection> {
        self.inner.borrow().cancelled.clone()
    }

    /// Stops the stream from the reading side and drops buffered events.
    pub fn cancel(&self, reason: Rejection) {
        let mut inner = self.inner.borrow_mut();
        if inner.cancelled.is_none() {
            inner.cancelled = Some(reason);
            inner.buffer.clear();
            inner.subscriber = None;
        }
    }

    /// Pops the next buffered event without waiting.
    pub fn next_event(&self) -> Option<StreamEvent> {
        let mut inner = self.inner.borrow_mut();
        let event = inner.buffer.pop_front()?;
        match &event {
            StreamEvent::Close(value) => {
                inner.terminated = true;
                inner.return_value = value.clone();
            }
            StreamEvent::Error(_) => inner.terminated = true,
            StreamEvent::Item(_) => {}
        }
        Some(event)
    }

    /// Return value of a closed iterator, once the close event has been read.
    pub fn return_value(&self) -> Option<Value> {
        self.inner.borrow().return_value.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.borrow().locked
    }

    /// Locks the stream to a single reader that is notified on every push.
    ///
    /// Buffered events trigger one notification right away.
    pub(crate) fn subscribe(&self, notify: Rc<dyn Fn()>) -> Result<(), Error> {
        let has_events = {
            let mut inner = self.inner.borrow_mut();
            if inner.locked {
                return Err(Error::not_allowed(
                    "The stream is already locked to a reader.",
                ));
            }
            inner.locked = true;
            inner.subscriber = Some(notify.clone());
            !inner.buffer.is_empty()
        };
        if has_events {
            notify();
        }
        Ok(())
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &AsyncStream) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[inline(always)]
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

impl futures::Stream for AsyncStream {
    type Item = Result<Value, Rejection>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.inner.borrow().terminated {
            return Poll::Ready(None);
        }
        match self.next_event() {
            Some(StreamEvent::Item(value)) => Poll::Ready(Some(Ok(value))),
            Some(StreamEvent::Close(_)) => Poll::Ready(None),
            Some(StreamEvent::Error(reason)) => Poll::Ready(Some(Err(reason))),
            None => {
                let mut inner = self.inner.borrow_mut();
                if inner.cancelled.is_some() {
                    return Poll::Ready(None);
                }
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for AsyncStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("AsyncStream")
            .field("kind", &inner.kind)
            .field("buffered", &inner.buffer.len())
            .field("finished", &inner.finished)
            .finish()
    }
}
