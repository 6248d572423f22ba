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

use std::collections::VecDeque;
use std::future::Future;

use futures::{Stream, StreamExt};
use log::{debug, warn};

use super::chunk::{ChunkIndex, ChunkState, Listener};
use super::{Response, ResponseOptions};
use crate::error::Error;
use crate::types::StreamKind;
use crate::value::{AsyncStream, Rejection, Thenable, Value};

/// Something queued on a stream, delivered in arrival order.
enum StreamEntry {
    Ready(Value),
    /// A model item that may still be blocked.
    Chunk(ChunkIndex),
    /// Close, with the chunk of an iterator's return value.
    Close(Option<ChunkIndex>),
    Error(Rejection),
}

/// A stream whose open row arrived and whose close row has not been
/// delivered yet.
pub(super) struct OpenStream {
    pub stream: AsyncStream,
    queue: VecDeque<StreamEntry>,
    /// A listener is registered on the chunk at the front of the queue.
    waiting: bool,
}

impl Response {
    pub(super) fn start_stream(&mut self, id: u32, kind: StreamKind) {
        let Some(index) = self.open_chunk(id) else {
            return;
        };
        let stream = AsyncStream::new(kind);
        debug!("opened {kind:?} stream {id:x}");
        self.streams.insert(
            id,
            OpenStream {
                stream: stream.clone(),
                queue: VecDeque::new(),
                waiting: false,
            },
        );
        self.fulfill_chunk(index, Value::Stream(stream));
    }

    fn push_entry(&mut self, id: u32, entry: StreamEntry) {
        if let Some(open) = self.streams.get_mut(&id) {
            open.queue.push_back(entry);
            self.drain_stream(id);
        }
    }

    /// Model row on an open stream id.
    pub(super) fn enqueue_model(&mut self, id: u32, json: String) {
        let index = self.push_chunk(ChunkState::Pending);
        self.resolve_model(index, json);
        self.push_entry(id, StreamEntry::Chunk(index));
    }

    pub(super) fn enqueue_value(&mut self, id: u32, value: Result<Value, Rejection>) {
        let entry = match value {
            Ok(value) => StreamEntry::Ready(value),
            Err(reason) => StreamEntry::Error(reason),
        };
        self.push_entry(id, entry);
    }

    pub(super) fn close_stream(&mut self, id: u32, json: String) {
        if !self.streams.contains_key(&id) {
            warn!("Close row for {id:x}, which has no open stream");
            return;
        }
        let return_value = if json.is_empty() {
            None
        } else {
            let index = self.push_chunk(ChunkState::Pending);
            self.resolve_model(index, json);
            Some(index)
        };
        self.push_entry(id, StreamEntry::Close(return_value));
    }

    pub(super) fn error_stream(&mut self, id: u32, reason: Rejection) {
        self.push_entry(id, StreamEntry::Error(reason));
    }

    fn chunk_outcome(&self, index: ChunkIndex) -> Result<Value, Rejection> {
        match &self.chunks[index].state {
            ChunkState::Fulfilled(value) => Ok(value.clone()),
            ChunkState::Rejected(reason) => Err(reason.clone()),
            _ => Err(Rejection::from(Error::connection_closed())),
        }
    }

    /// Delivers queued entries until one is still waiting on its chunk.
    pub(super) fn drain_stream(&mut self, id: u32) {
        loop {
            let Some(open) = self.streams.get_mut(&id) else {
                return;
            };
            let Some(entry) = open.queue.front() else {
                return;
            };
            let pending = match entry {
                StreamEntry::Chunk(index) | StreamEntry::Close(Some(index)) => {
                    (!self.chunks[*index].state.is_terminal()).then_some(*index)
                }
                _ => None,
            };
            if let Some(index) = pending {
                if !open.waiting {
                    open.waiting = true;
                    self.chunks[index].listeners.push(Listener::Stream(id));
                }
                return;
            }
            open.waiting = false;
            let Some(entry) = open.queue.pop_front() else {
                return;
            };
            let stream = open.stream.clone();
            let finished = match entry {
                StreamEntry::Ready(value) => {
                    stream.push(value);
                    false
                }
                StreamEntry::Chunk(index) => match self.chunk_outcome(index) {
                    Ok(value) => {
                        stream.push(value);
                        false
                    }
                    Err(reason) => {
                        stream.error(reason);
                        true
                    }
                },
                StreamEntry::Close(None) => {
                    stream.close();
                    true
                }
                StreamEntry::Close(Some(index)) => {
                    match self.chunk_outcome(index) {
                        Ok(value) => stream.close_with(value),
                        Err(reason) => stream.error(reason),
                    };
                    true
                }
                StreamEntry::Error(reason) => {
                    stream.error(reason);
                    true
                }
            };
            if finished {
                debug!("stream {id:x} finished");
                self.streams.remove(&id);
                return;
            }
        }
    }
}

/// Decodes a byte stream.
///
/// Returns the root handle and the future that feeds the response; the root
/// settles while the future runs. The future closes the response when the
/// byte stream ends and fails on malformed input.
pub fn create_from_stream<S, B>(
    stream: S,
    options: ResponseOptions,
) -> (Thenable, impl Future<Output = Result<(), Error>>)
where
    S: Stream<Item = B>,
    B: AsRef<[u8]>,
{
    let mut response = Response::new(options);
    let root = response.get_root();
    let feed = async move {
        futures::pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            response.process_binary_chunk(chunk.as_ref())?;
        }
        response.close();
        Ok::<(), Error>(())
    };
    (root, feed)
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use futures::StreamExt;

    use crate::client::{Response, ResponseOptions};
    use crate::value::Value;

    #[test]
    fn test_items_keep_order_when_one_blocks() {
        let mut response = Response::new(ResponseOptions::new());
        let root = response.get_root();
        response
            .process_string_chunk("0:\"$1\"\n1:R\n1:\"$2\"\n1:\"b\"\n1:C\n")
            .unwrap();
        let stream = root.value().unwrap().as_stream().cloned().unwrap();
        assert_eq!(stream.next_event().map(|_| ()), None);

        response.process_string_chunk("2:\"a\"\n").unwrap();
        let items: Vec<_> = block_on(stream.collect::<Vec<_>>());
        let items: Vec<Value> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(items, vec![Value::from("a"), Value::from("b")]);
    }

    #[test]
    fn test_iterator_return_value() {
        let mut response = Response::new(ResponseOptions::new());
        let root = response.get_root();
        response
            .process_string_chunk("0:\"$1\"\n1:x\n1:1\n2:\"done\"\n1:C\"$2\"\n")
            .unwrap();
        let stream = root.value().unwrap().as_stream().cloned().unwrap();
        let items: Vec<_> = block_on(stream.clone().collect::<Vec<_>>());
        assert_eq!(items.len(), 1);
        assert_eq!(stream.return_value(), Some(Value::from("done")));
    }
}
