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

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use log::error;

use super::{Request, RequestOptions};
use crate::buffer::MemoryDestination;
use crate::resolver::manifest::ClientManifest;
use crate::value::{Rejection, Value};

/// A [`Request`] exposed as a stream of encoded chunks.
///
/// Each poll renders whatever has settled since the last one, so the stream
/// makes progress as long as the host executor keeps polling it.
pub struct FlightStream {
    request: Request,
    output: MemoryDestination,
}

impl FlightStream {
    pub fn new(mut request: Request) -> Self {
        let output = MemoryDestination::new();
        if let Err(err) = request.start_flowing(output.clone()) {
            error!("FlightStream created over a request that already flows: {err}");
        }
        FlightStream { request, output }
    }

    /// Aborts the underlying request; the stream ends once the abort rows
    /// are read.
    pub fn abort(&mut self, reason: Option<Rejection>) {
        self.request.abort(reason);
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }
}

impl Stream for FlightStream {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(chunk) = this.output.pop_chunk() {
            return Poll::Ready(Some(chunk));
        }
        this.request.pings.set_waker(cx.waker());
        if let Err(err) = this.request.perform_work() {
            error!("Failed to render the flight stream: {err}");
            return Poll::Ready(None);
        }
        this.request.pull();
        if let Some(chunk) = this.output.pop_chunk() {
            return Poll::Ready(Some(chunk));
        }
        if this.output.is_closed() {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

/// Renders `model` into a stream of encoded chunks.
pub fn render_to_stream(model: Value, manifest: ClientManifest, options: RequestOptions) -> FlightStream {
    FlightStream::new(Request::new(model, manifest, options))
}
