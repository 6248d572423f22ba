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

use bytes::Bytes;
use log::{debug, trace};

use super::Request;
use crate::types::RequestStatus;

/// Queue drained during a flush, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Queue {
    Import,
    Hint,
    Regular,
    Error,
}

impl Queue {
    const ORDER: [Queue; 4] = [Queue::Import, Queue::Hint, Queue::Regular, Queue::Error];

    /// Hint rows are not part of `pending_chunks`.
    fn is_counted(self) -> bool {
        self != Queue::Hint
    }
}

impl Request {
    fn queue_mut(&mut self, queue: Queue) -> &mut VecDeque<Bytes> {
        match queue {
            Queue::Import => &mut self.completed_import_chunks,
            Queue::Hint => &mut self.completed_hint_chunks,
            Queue::Regular => &mut self.completed_regular_chunks,
            Queue::Error => &mut self.completed_error_chunks,
        }
    }

    /// Writes completed rows to the destination.
    ///
    /// Imports go first so the decoder can start loading modules, then
    /// hints, regular rows and errors. Writing stops after the row on which
    /// the destination asked for backpressure; [`Request::pull`] resumes it.
    /// Once no rows are owed the destination is closed.
    pub(super) fn flush_completed_chunks(&mut self) {
        let Some(mut destination) = self.destination.take() else {
            return;
        };
        let mut written = 0usize;
        'queues: for queue in Queue::ORDER {
            while let Some(row) = self.queue_mut(queue).pop_front() {
                if queue.is_counted() {
                    self.pending_chunks = self.pending_chunks.saturating_sub(1);
                }
                written += 1;
                if !self.writer.write_chunk_and_return(destination.as_mut(), &row) {
                    trace!("destination signalled backpressure after {written} rows");
                    self.flowing = false;
                    break 'queues;
                }
            }
        }
        if !self.writer.complete(destination.as_mut()) {
            self.flowing = false;
        }
        let drained = self.completed_hint_chunks.is_empty();
        if self.pending_chunks == 0 && drained && self.status != RequestStatus::Closed {
            debug!("all rows written, closing the destination");
            self.status = RequestStatus::Closed;
            destination.close();
            return;
        }
        self.destination = Some(destination);
    }
}

#[cfg(test)]
mod tests {
    use crate::buffer::MemoryDestination;
    use crate::resolver::manifest::ClientManifest;
    use crate::server::{Hint, Request, RequestOptions};
    use crate::types::RequestStatus;
    use crate::value::{Thenable, Value};

    #[test]
    fn test_queues_flush_in_priority_order() {
        let pending = Thenable::new();
        let model = Value::object([("later", Value::promise(&pending))]);
        let mut request = Request::new(model, ClientManifest::new(), RequestOptions::new());
        request.perform_work().unwrap();
        request.hint(Hint::preconnect("https://cdn.example", None));

        let sink = MemoryDestination::new();
        request.start_flowing(sink.clone()).unwrap();
        let text = String::from_utf8(sink.to_vec()).unwrap();
        assert!(text.starts_with("2:HC"), "{text}");
        assert!(text.ends_with("0:{\"later\":\"$@1\"}\n"), "{text}");
        assert_eq!(request.pending_chunks(), 1);
        assert_ne!(request.status(), RequestStatus::Closed);

        pending.resolve(Value::Null);
        request.perform_work().unwrap();
        assert!(sink.is_closed());
        assert_eq!(sink.close_count(), 1);
    }

    #[test]
    fn test_backpressure_resumes_on_pull() {
        let items = (0..8).map(|i| Value::from(format!("item-{i}"))).collect();
        let mut request = Request::new(
            Value::array(items),
            ClientManifest::new(),
            RequestOptions::new().large_text_threshold(4).chunk_size(1),
        );
        request.perform_work().unwrap();
        let sink = MemoryDestination::with_high_water_mark(1);
        request.start_flowing(sink.clone()).unwrap();
        assert!(!sink.is_closed());

        while !sink.is_closed() {
            sink.take_chunks();
            request.pull();
        }
        assert_eq!(request.pending_chunks(), 0);
    }
}
