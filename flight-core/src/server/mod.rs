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

//! The encoding side.
//!
//! A [`Request`] turns one value graph into rows. The host drives it: call
//! [`Request::perform_work`] whenever something the graph waits on has
//! settled, and attach a sink with [`Request::start_flowing`]. The
//! [`FlightStream`] adapter does both from a `futures::Stream` poll.
//!
//! ```rust
//! use flight_core::buffer::MemoryDestination;
//! use flight_core::resolver::manifest::ClientManifest;
//! use flight_core::server::{Request, RequestOptions};
//! use flight_core::value::{Thenable, Value};
//!
//! let user = Thenable::new();
//! let model = Value::object([("user", Value::promise(&user))]);
//! let mut request = Request::new(model, ClientManifest::new(), RequestOptions::new());
//!
//! let sink = MemoryDestination::new();
//! request.start_flowing(sink.clone()).unwrap();
//! request.perform_work().unwrap();
//! assert!(!sink.is_closed());
//!
//! user.resolve(Value::from("ada"));
//! request.perform_work().unwrap();
//! assert_eq!(sink.to_vec(), b"0:{\"user\":\"$@1\"}\n1:\"ada\"\n");
//! assert!(sink.is_closed());
//! ```

mod emit;
mod flush;
mod guard;
pub mod hints;
mod render;
mod stream;
mod task;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use anyhow::anyhow;
use bytes::Bytes;
use log::{debug, warn};

use crate::buffer::{Destination, Writer};
use crate::config::Config;
use crate::error::Error;
use crate::not_allowed;
use crate::resolver::manifest::ClientManifest;
use crate::resolver::ref_resolver::RefWriter;
use crate::row::writer::{model_row, serialize_by_value_id};
use crate::types::{RequestStatus, TaskStatus};
use crate::value::{Rejection, TemporaryReferenceSet, Value};

pub use guard::{RendererLease, RendererSlot};
pub use hints::{Hint, HintOptions};
pub use stream::{render_to_stream, FlightStream};

use task::{Ping, PingQueue, Task};

/// Maps an error to the digest written in its place. `None` writes an
/// empty digest.
pub type OnError = Box<dyn FnMut(&anyhow::Error) -> Option<String>>;
pub type OnPostpone = Box<dyn FnMut(&str)>;

/// Options of a [`Request`], built by chaining.
///
/// ```rust
/// use flight_core::server::RequestOptions;
///
/// let options = RequestOptions::new()
///     .expose_error_details(true)
///     .on_error(|err| Some(format!("digest-{}", err.to_string().len())));
/// # let _ = options;
/// ```
#[derive(Default)]
pub struct RequestOptions {
    config: Config,
    on_error: Option<OnError>,
    on_postpone: Option<OnPostpone>,
    temporary_references: Option<TemporaryReferenceSet>,
    renderer: Option<RendererSlot>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn expose_error_details(mut self, expose: bool) -> Self {
        self.config.expose_error_details = expose;
        self
    }

    pub fn large_text_threshold(mut self, threshold: usize) -> Self {
        self.config.large_text_threshold = threshold;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&anyhow::Error) -> Option<String> + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_postpone(mut self, f: impl FnMut(&str) + 'static) -> Self {
        self.on_postpone = Some(Box::new(f));
        self
    }

    /// Values registered in `set` are written as `$T<id>` instead of by content.
    pub fn temporary_references(mut self, set: TemporaryReferenceSet) -> Self {
        self.temporary_references = Some(set);
        self
    }

    /// Shares a [`RendererSlot`] with other requests.
    pub fn renderer(mut self, slot: RendererSlot) -> Self {
        self.renderer = Some(slot);
        self
    }
}

/// One encoding of a value graph.
pub struct Request {
    status: RequestStatus,
    config: Config,
    manifest: ClientManifest,
    ref_writer: RefWriter,
    /// Tasks waiting for a ping. A task is out of this map while it renders.
    tasks: HashMap<u32, Task>,
    abortable: BTreeSet<u32>,
    /// Open stream tasks.
    streams: BTreeMap<u32, Task>,
    pings: PingQueue,
    /// Rows allocated and not yet written to the destination, hints excluded.
    pending_chunks: usize,
    completed_import_chunks: VecDeque<Bytes>,
    completed_hint_chunks: VecDeque<Bytes>,
    completed_regular_chunks: VecDeque<Bytes>,
    completed_error_chunks: VecDeque<Bytes>,
    fatal_error: Option<u32>,
    written_hints: HashSet<String>,
    on_error: OnError,
    on_postpone: OnPostpone,
    temporary_references: Option<TemporaryReferenceSet>,
    destination: Option<Box<dyn Destination>>,
    flowing: bool,
    writer: Writer,
    renderer: RendererSlot,
}

impl Request {
    pub fn new(model: Value, manifest: ClientManifest, options: RequestOptions) -> Self {
        let RequestOptions {
            config,
            on_error,
            on_postpone,
            temporary_references,
            renderer,
        } = options;
        let writer = Writer::new(config.chunk_size());
        let mut request = Request {
            status: RequestStatus::Open,
            config,
            manifest,
            ref_writer: RefWriter::new(),
            tasks: HashMap::new(),
            abortable: BTreeSet::new(),
            streams: BTreeMap::new(),
            pings: PingQueue::default(),
            pending_chunks: 0,
            completed_import_chunks: VecDeque::new(),
            completed_hint_chunks: VecDeque::new(),
            completed_regular_chunks: VecDeque::new(),
            completed_error_chunks: VecDeque::new(),
            fatal_error: None,
            written_hints: HashSet::new(),
            on_error: on_error.unwrap_or_else(|| Box::new(default_on_error)),
            on_postpone: on_postpone.unwrap_or_else(|| Box::new(|_| {})),
            temporary_references,
            destination: None,
            flowing: false,
            writer,
            renderer: renderer.unwrap_or_default(),
        };
        let root = request.create_task(model, None, false);
        let id = root.id;
        request.tasks.insert(id, root);
        request.pings.push(Ping::Retry(id));
        request
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn pending_chunks(&self) -> usize {
        self.pending_chunks
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Renders every pinged task, then flushes if the destination accepts
    /// data.
    ///
    /// Fails with [`Error::NotAllowed`] while another request sharing the
    /// same [`RendererSlot`] is rendering; the request is left untouched.
    pub fn perform_work(&mut self) -> Result<(), Error> {
        let _lease = self.renderer.install()?;
        while let Some(ping) = self.pings.pop() {
            match ping {
                Ping::Retry(id) => {
                    if let Some(task) = self.tasks.remove(&id) {
                        self.retry_task(task);
                    }
                }
                Ping::Fulfilled(id, value) => {
                    if let Some(mut task) = self.tasks.remove(&id) {
                        task.model = value;
                        self.retry_task(task);
                    }
                }
                Ping::Rejected(id, reason) => {
                    if let Some(mut task) = self.tasks.remove(&id) {
                        task.status = TaskStatus::Errored;
                        self.abortable.remove(&id);
                        self.emit_rejection(id, &reason);
                    }
                }
                Ping::Stream(id) => self.process_stream(id),
            }
        }
        if self.flowing {
            self.flush_completed_chunks();
        }
        Ok(())
    }

    /// Attaches the sink and writes everything completed so far.
    pub fn start_flowing(&mut self, destination: impl Destination + 'static) -> Result<(), Error> {
        if self.destination.is_some() {
            not_allowed!("The request is already flowing into a destination.");
        }
        if self.status == RequestStatus::Closed {
            warn!("Ignoring a destination attached to a closed request");
            return Ok(());
        }
        self.destination = Some(Box::new(destination));
        self.flowing = true;
        self.flush_completed_chunks();
        Ok(())
    }

    /// Resumes writing after the destination signalled backpressure.
    pub fn pull(&mut self) {
        if self.destination.is_some() && self.status != RequestStatus::Closed {
            self.flowing = true;
            self.flush_completed_chunks();
        }
    }

    /// Sends a resource hint, once per de-duplication key.
    ///
    /// Returns `false` when the hint was dropped, either as a duplicate or
    /// because the request is already closed.
    pub fn hint(&mut self, hint: Hint) -> bool {
        let queued = self.queue_hint(hint);
        if queued && self.flowing {
            self.flush_completed_chunks();
        }
        queued
    }

    /// Stops the request. Everything still outstanding refers to one shared
    /// error (or postpone) row, open streams are errored and their sources
    /// cancelled, and the queues are flushed.
    pub fn abort(&mut self, reason: Option<Rejection>) {
        if self.status == RequestStatus::Closed {
            return;
        }
        self.status = RequestStatus::Aborting;
        let reason = reason.unwrap_or_else(|| {
            Rejection::error(anyhow!("The render was aborted by the server without a reason."))
        });
        debug!(
            "Aborting request with {} outstanding tasks and {} open streams",
            self.abortable.len(),
            self.streams.len()
        );
        if !self.abortable.is_empty() {
            self.pending_chunks += 1;
            let fatal = self.ref_writer.next_id();
            self.fatal_error = Some(fatal);
            self.emit_rejection(fatal, &reason);
            let reference = serde_json::Value::from(serialize_by_value_id(fatal)).to_string();
            for id in std::mem::take(&mut self.abortable) {
                // A task outside the map is rendering and will finish on its own.
                if let Some(mut task) = self.tasks.remove(&id) {
                    task.status = TaskStatus::Aborted;
                    self.push_error_row(model_row(id, &reference));
                }
            }
        }
        if !self.streams.is_empty() {
            let stream_reason = if reason.is_postpone() {
                Rejection::error(anyhow!("The render was aborted due to being postponed."))
            } else {
                reason
            };
            for (id, task) in std::mem::take(&mut self.streams) {
                self.emit_rejection(id, &stream_reason);
                if let Value::Stream(source) = &task.model {
                    source.cancel(stream_reason.clone());
                }
            }
        }
        self.pings.clear();
        if self.destination.is_some() {
            self.flush_completed_chunks();
        }
    }
}

fn default_on_error(err: &anyhow::Error) -> Option<String> {
    log::error!("{err:#}");
    None
}
