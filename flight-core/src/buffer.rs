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

use bytes::{Bytes, BytesMut};

use crate::config::DEFAULT_CHUNK_SIZE;

/// Byte sink an encoding request flushes into.
pub trait Destination {
    /// Accepts a chunk. Returns `false` when the sink wants the producer to
    /// stop until it is pulled again.
    fn write(&mut self, chunk: Bytes) -> bool;

    /// Ends the stream. Called exactly once per request.
    fn close(&mut self);
}

/// Batches small rows into views of a fixed size before they reach the sink.
///
/// Rows are never split: a row that does not fit the current view starts the
/// next one, and a row larger than a view is written on its own.
pub struct Writer {
    view: BytesMut,
    chunk_size: usize,
}

impl Default for Writer {
    fn default() -> Self {
        Writer::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Writer {
    pub fn new(chunk_size: usize) -> Self {
        Writer {
            view: BytesMut::with_capacity(chunk_size),
            chunk_size,
        }
    }

    pub fn len(&self) -> usize {
        self.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Writes one row. Returns the sink's answer if a write happened, `true`
    /// otherwise.
    pub fn write_chunk_and_return(&mut self, dest: &mut dyn Destination, chunk: &Bytes) -> bool {
        if chunk.len() > self.chunk_size {
            let ready = self.complete(dest);
            return dest.write(chunk.clone()) && ready;
        }
        if self.view.len() + chunk.len() > self.chunk_size {
            let ready = self.complete(dest);
            self.view.extend_from_slice(chunk);
            return ready;
        }
        self.view.extend_from_slice(chunk);
        true
    }

    /// Hands the partially filled view to the sink.
    pub fn complete(&mut self, dest: &mut dyn Destination) -> bool {
        if self.view.is_empty() {
            return true;
        }
        let view = self.view.split().freeze();
        self.view.reserve(self.chunk_size);
        dest.write(view)
    }
}

#[derive(Default)]
struct MemoryState {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    high_water_mark: Option<usize>,
    close_count: usize,
}

/// In-memory [`Destination`] with an optional high-water mark.
///
/// Clones share the same buffer, so a host can keep one handle while the
/// request owns another.
#[derive(Clone, Default)]
pub struct MemoryDestination(Rc<RefCell<MemoryState>>);

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals backpressure once `limit` bytes are buffered and not yet taken.
    pub fn with_high_water_mark(limit: usize) -> Self {
        let dest = Self::default();
        dest.0.borrow_mut().high_water_mark = Some(limit);
        dest
    }

    /// Removes and returns every buffered chunk.
    pub fn take_chunks(&self) -> Vec<Bytes> {
        let mut state = self.0.borrow_mut();
        state.buffered = 0;
        state.chunks.drain(..).collect()
    }

    pub fn pop_chunk(&self) -> Option<Bytes> {
        let mut state = self.0.borrow_mut();
        let chunk = state.chunks.pop_front()?;
        state.buffered -= chunk.len();
        Some(chunk)
    }

    /// Concatenation of the buffered chunks, without removing them.
    pub fn to_vec(&self) -> Vec<u8> {
        let state = self.0.borrow();
        let mut out = Vec::with_capacity(state.buffered);
        for chunk in &state.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }

    pub fn buffered(&self) -> usize {
        self.0.borrow().buffered
    }

    pub fn is_closed(&self) -> bool {
        self.0.borrow().close_count > 0
    }

    pub fn close_count(&self) -> usize {
        self.0.borrow().close_count
    }
}

impl Destination for MemoryDestination {
    fn write(&mut self, chunk: Bytes) -> bool {
        let mut state = self.0.borrow_mut();
        state.buffered += chunk.len();
        state.chunks.push_back(chunk);
        match state.high_water_mark {
            Some(limit) => state.buffered < limit,
            None => true,
        }
    }

    fn close(&mut self) {
        self.0.borrow_mut().close_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_rows_are_batched() {
        let mut dest = MemoryDestination::new();
        let mut writer = Writer::new(8);
        assert!(writer.write_chunk_and_return(&mut dest, &Bytes::from_static(b"0:1\n")));
        assert!(writer.write_chunk_and_return(&mut dest, &Bytes::from_static(b"1:2\n")));
        assert_eq!(dest.buffered(), 0);
        assert!(writer.write_chunk_and_return(&mut dest, &Bytes::from_static(b"2:3\n")));
        assert_eq!(dest.take_chunks(), vec![Bytes::from_static(b"0:1\n1:2\n")]);
        writer.complete(&mut dest);
        assert_eq!(dest.take_chunks(), vec![Bytes::from_static(b"2:3\n")]);
    }

    #[test]
    fn test_large_row_is_written_whole() {
        let mut dest = MemoryDestination::new();
        let mut writer = Writer::new(4);
        let row = Bytes::from_static(b"0:\"abcdef\"\n");
        writer.write_chunk_and_return(&mut dest, &row);
        assert_eq!(dest.take_chunks(), vec![row]);
    }

    #[test]
    fn test_high_water_mark_signals_backpressure() {
        let mut dest = MemoryDestination::with_high_water_mark(4);
        assert!(!dest.write(Bytes::from_static(b"12345")));
        dest.take_chunks();
        assert!(dest.write(Bytes::from_static(b"1")));
    }
}
