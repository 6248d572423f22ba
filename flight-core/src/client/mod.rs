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

//! The decoding side.
//!
//! A [`Response`] consumes rows as bytes arrive and rebuilds the value graph
//! they describe. Every row id maps to one chunk; [`Response::get`] hands out
//! a [`Thenable`] that settles once that chunk and everything it depends on
//! has arrived. Rows may come in any order and split at any byte.
//!
//! ```rust
//! use flight_core::client::{Response, ResponseOptions};
//! use flight_core::value::Value;
//!
//! let mut response = Response::new(ResponseOptions::new());
//! let root = response.get_root();
//! response.process_string_chunk("0:[\"$1\",\"$1\"]\n1:{\"na").unwrap();
//! assert!(root.is_pending());
//! response.process_string_chunk("me\":\"ada\"}\n").unwrap();
//!
//! let value = root.value().unwrap();
//! let (first, second) = (value.at(0).unwrap(), value.at(1).unwrap());
//! assert!(first.same_identity(&second));
//! assert_eq!(first.get("name"), Some(Value::from("ada")));
//! ```

mod chunk;
mod model;
mod stream;

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use log::{debug, trace, warn};
use serde_json::Value as Json;

use crate::config::Config;
use crate::error::Error;
use crate::resolver::manifest::{DefaultModuleLoader, ImportMetadata, ModuleLoader};
use crate::row::{RawRow, RowParser};
use crate::server::Hint;
use crate::types::{ChunkStatus, RowTag, StreamKind, TypedArrayKind};
use crate::value::{Rejection, TemporaryReferenceSet, Thenable, TypedArray, Value};

use chunk::{Chunk, ChunkIndex, ChunkState, Listener, MapKind};
use stream::OpenStream;

pub use stream::create_from_stream;

pub type OnHint = Box<dyn FnMut(Hint)>;

/// Options of a [`Response`], built by chaining.
#[derive(Default)]
pub struct ResponseOptions {
    config: Config,
    module_loader: Option<Rc<dyn ModuleLoader>>,
    on_hint: Option<OnHint>,
    temporary_references: Option<TemporaryReferenceSet>,
}

impl ResponseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Resolves `I` rows. Defaults to [`DefaultModuleLoader`].
    pub fn module_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.module_loader = Some(Rc::new(loader));
        self
    }

    /// Receives every resource hint the encoder sent.
    pub fn on_hint(mut self, f: impl FnMut(Hint) + 'static) -> Self {
        self.on_hint = Some(Box::new(f));
        self
    }

    /// `$T` references resolve through `set`.
    pub fn temporary_references(mut self, set: TemporaryReferenceSet) -> Self {
        self.temporary_references = Some(set);
        self
    }
}

/// One decoding of a row stream.
pub struct Response {
    config: Config,
    parser: RowParser,
    chunks: Vec<Chunk>,
    /// Wire id to chunk. Stream items and return values have no wire id.
    ids: HashMap<u32, ChunkIndex>,
    streams: HashMap<u32, OpenStream>,
    /// Values derived from a chunk through a `$Q`, `$W`, `$K`, `$B`, `$F` or
    /// typed escape, so repeated references share one value.
    derived: HashMap<(ChunkIndex, MapKind), Value>,
    /// Chunks that just became terminal and still have listeners to run.
    wake: VecDeque<ChunkIndex>,
    module_loader: Rc<dyn ModuleLoader>,
    on_hint: Option<OnHint>,
    temporary_references: Option<TemporaryReferenceSet>,
    closed: Option<Rejection>,
}

impl Response {
    pub fn new(options: ResponseOptions) -> Self {
        let ResponseOptions {
            config,
            module_loader,
            on_hint,
            temporary_references,
        } = options;
        Response {
            config,
            parser: RowParser::new(),
            chunks: Vec::new(),
            ids: HashMap::new(),
            streams: HashMap::new(),
            derived: HashMap::new(),
            wake: VecDeque::new(),
            module_loader: module_loader.unwrap_or_else(|| Rc::new(DefaultModuleLoader)),
            on_hint,
            temporary_references,
            closed: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle of the root value, row 0.
    pub fn get_root(&mut self) -> Thenable {
        self.get(0)
    }

    /// Handle of the value on row `id`.
    pub fn get(&mut self, id: u32) -> Thenable {
        let index = self.chunk_index(id);
        self.chunks[index].handle.clone()
    }

    /// Status of the chunk for `id`, if anything referenced it yet.
    pub fn chunk_status(&self, id: u32) -> Option<ChunkStatus> {
        self.ids.get(&id).map(|&i| self.chunks[i].state.status())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    /// Feeds transport bytes. Rows may be split anywhere.
    ///
    /// A framing error is fatal: it is reported to every pending chunk and
    /// returned.
    pub fn process_binary_chunk(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if self.closed.is_some() {
            warn!("Ignoring {} bytes received after the response closed", chunk.len());
            return Ok(());
        }
        let mut rows = Vec::new();
        let parsed = self.parser.feed(chunk, |row| {
            rows.push(row);
            Ok(())
        });
        for row in rows {
            self.process_row(row);
        }
        if let Err(err) = parsed {
            self.report_global_error(err.clone());
            return Err(err);
        }
        Ok(())
    }

    pub fn process_string_chunk(&mut self, chunk: &str) -> Result<(), Error> {
        self.process_binary_chunk(chunk.as_bytes())
    }

    /// Ends the response. Chunks still waiting reject with
    /// [`Error::connection_closed`].
    pub fn close(&mut self) {
        if !self.parser.is_idle() {
            debug!("Response closed in the middle of a row");
        }
        self.report_global_error(Error::connection_closed());
    }

    /// Rejects every chunk that is still waiting and errors every open
    /// stream with `reason`.
    pub fn report_global_error(&mut self, reason: impl Into<Rejection>) {
        if self.closed.is_some() {
            return;
        }
        let reason = reason.into();
        debug!("Response failed: {reason}");
        self.closed = Some(reason.clone());
        for index in 0..self.chunks.len() {
            if matches!(self.chunks[index].state, ChunkState::Pending | ChunkState::ResolvedModel(_)) {
                self.reject_chunk(index, reason.clone());
            }
        }
        self.run_listeners();
        // Whatever is left only waits on itself.
        for index in 0..self.chunks.len() {
            if !self.chunks[index].state.is_terminal() {
                self.reject_chunk(index, reason.clone());
            }
        }
        self.run_listeners();
        for (_, open) in self.streams.drain() {
            open.stream.error(reason.clone());
        }
    }

    /// Chunk for a wire id, created pending on first use.
    fn chunk_index(&mut self, id: u32) -> ChunkIndex {
        if let Some(&index) = self.ids.get(&id) {
            return index;
        }
        let state = match &self.closed {
            Some(reason) => ChunkState::Rejected(reason.clone()),
            None => ChunkState::Pending,
        };
        let index = self.push_chunk(state);
        self.ids.insert(id, index);
        index
    }

    fn push_chunk(&mut self, state: ChunkState) -> ChunkIndex {
        let chunk = Chunk::new(state);
        match &chunk.state {
            ChunkState::Fulfilled(value) => {
                chunk.handle.resolve(value.clone());
            }
            ChunkState::Rejected(reason) => {
                chunk.handle.reject(reason.clone());
            }
            _ => {}
        }
        self.chunks.push(chunk);
        self.chunks.len() - 1
    }

    /// Index of the chunk `id` if it can still take a row.
    fn open_chunk(&mut self, id: u32) -> Option<ChunkIndex> {
        let index = self.chunk_index(id);
        match self.chunks[index].state {
            ChunkState::Pending => Some(index),
            _ => {
                warn!("Dropping a second row for id {id:x}");
                None
            }
        }
    }

    fn process_row(&mut self, row: RawRow) {
        let RawRow { id, tag, payload } = row;
        trace!("row {id:x} tag {:?} with {} bytes", tag as char, payload.len());
        if tag == 0 {
            let json = String::from_utf8_lossy(&payload).into_owned();
            if self.streams.contains_key(&id) {
                self.enqueue_model(id, json);
            } else if let Some(index) = self.open_chunk(id) {
                self.resolve_model(index, json);
            }
            self.run_listeners();
            return;
        }
        if let Ok(kind) = TypedArrayKind::try_from(tag) {
            let value = TypedArray::new(kind, payload).map(Value::TypedArray);
            self.resolve_buffer(id, value.map_err(Rejection::from));
            self.run_listeners();
            return;
        }
        match RowTag::try_from(tag) {
            Ok(RowTag::Text) => {
                let text = String::from_utf8_lossy(&payload).into_owned();
                self.resolve_buffer(id, Ok(Value::String(text)));
            }
            Ok(RowTag::Import) => self.resolve_import(id, &payload),
            Ok(RowTag::Hint) => self.dispatch_hint(&payload),
            Ok(RowTag::Error) => {
                let reason = parse_error_row(&payload);
                self.resolve_rejection(id, reason);
            }
            Ok(RowTag::Postpone) => {
                let reason = parse_postpone_row(&payload);
                self.resolve_rejection(id, reason);
            }
            Ok(tag @ (RowTag::ReadableStream
            | RowTag::ReadableByteStream
            | RowTag::AsyncIterable
            | RowTag::AsyncIterator)) => {
                if let Some(kind) = StreamKind::from_open_tag(tag) {
                    self.start_stream(id, kind);
                }
            }
            Ok(RowTag::Close) => {
                let json = String::from_utf8_lossy(&payload).into_owned();
                self.close_stream(id, json);
            }
            Ok(RowTag::Debug | RowTag::Console | RowTag::Timing) => {
                trace!("skipping dev-only row {id:x}");
            }
            Err(_) => warn!("Skipping row {id:x} with unknown tag {:?}", tag as char),
        }
        self.run_listeners();
    }

    /// Text and binary rows are stream items when their id has an open
    /// stream, and standalone values otherwise.
    fn resolve_buffer(&mut self, id: u32, value: Result<Value, Rejection>) {
        if self.streams.contains_key(&id) {
            self.enqueue_value(id, value);
            return;
        }
        let Some(index) = self.open_chunk(id) else {
            return;
        };
        match value {
            Ok(value) => self.fulfill_chunk(index, value),
            Err(reason) => self.reject_chunk(index, reason),
        }
    }

    fn resolve_import(&mut self, id: u32, payload: &[u8]) {
        let Some(index) = self.open_chunk(id) else {
            return;
        };
        let loaded = serde_json::from_slice::<Json>(payload)
            .map_err(Error::from)
            .and_then(|json| ImportMetadata::from_json(&json))
            .map_err(Rejection::from)
            .and_then(|metadata| self.module_loader.load(&metadata).map_err(Rejection::from));
        match loaded {
            Ok(value) => self.fulfill_chunk(index, value),
            Err(reason) => self.reject_chunk(index, reason),
        }
    }

    fn dispatch_hint(&mut self, payload: &[u8]) {
        let Some(on_hint) = self.on_hint.as_mut() else {
            return;
        };
        let Some((&code, json)) = payload.split_first() else {
            warn!("Skipping an empty hint row");
            return;
        };
        let hint = serde_json::from_slice::<Json>(json)
            .map_err(Error::from)
            .and_then(|json| Hint::from_payload(code as char, &json));
        match hint {
            Ok(hint) => on_hint(hint),
            Err(err) => warn!("Skipping hint: {err}"),
        }
    }

    fn resolve_rejection(&mut self, id: u32, reason: Rejection) {
        if self.streams.contains_key(&id) {
            self.error_stream(id, reason);
            return;
        }
        if let Some(index) = self.open_chunk(id) {
            self.reject_chunk(index, reason);
        }
    }

    pub(crate) fn fulfill_chunk(&mut self, index: ChunkIndex, value: Value) {
        let chunk = &mut self.chunks[index];
        if chunk.state.is_terminal() {
            return;
        }
        chunk.state = ChunkState::Fulfilled(value.clone());
        chunk.handle.resolve(value);
        self.wake.push_back(index);
    }

    pub(crate) fn reject_chunk(&mut self, index: ChunkIndex, reason: Rejection) {
        let chunk = &mut self.chunks[index];
        if chunk.state.is_terminal() {
            return;
        }
        chunk.state = ChunkState::Rejected(reason.clone());
        chunk.handle.reject(reason);
        self.wake.push_back(index);
    }

    /// Runs the listeners of every chunk that became terminal, including
    /// those settled by the listeners themselves.
    fn run_listeners(&mut self) {
        while let Some(index) = self.wake.pop_front() {
            let listeners = std::mem::take(&mut self.chunks[index].listeners);
            for listener in listeners {
                match listener {
                    Listener::Model {
                        handler,
                        slot,
                        path,
                        kind,
                        cyclic,
                    } => self.fulfill_reference(index, &handler, &slot, &path, kind, cyclic),
                    Listener::Stream(id) => self.drain_stream(id),
                }
            }
        }
    }
}

fn parse_error_row(payload: &[u8]) -> Rejection {
    let json = match serde_json::from_slice::<Json>(payload) {
        Ok(json) => json,
        Err(err) => return Rejection::from(Error::from(err)),
    };
    let text = |key: &str| json.get(key).and_then(Json::as_str).map(str::to_owned);
    Rejection::from(Error::server(
        text("digest").unwrap_or_default(),
        text("message"),
        text("stack"),
    ))
}

fn parse_postpone_row(payload: &[u8]) -> Rejection {
    match serde_json::from_slice::<Json>(payload) {
        Ok(json) => Rejection::postpone(json.get("reason").and_then(Json::as_str).unwrap_or_default()),
        Err(err) => Rejection::from(Error::from(err)),
    }
}
