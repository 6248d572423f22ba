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

//! Rendering of values into row payloads.
//!
//! `render_value` maps one value to JSON, outlining whatever needs its own
//! row. `render_model` wraps it at every child position and turns a
//! suspension there into a separate task, so that only the waiting value is
//! deferred and its siblings are written right away.

use std::rc::Rc;

use log::debug;
use serde_json::{Map, Value as Json};

use super::task::{Ping, Task};
use super::Request;
use crate::error::Error;
use crate::resolver::context::{Interrupt, RenderContext, ThenableState};
use crate::row::writer::{
    binary_row, close_row, escape_string, model_row, serialize_by_value_id, serialize_number,
    serialize_prefixed_id, serialize_promise_id, serialize_symbol, serialize_temporary_reference,
    stream_open_row, tagged_row, text_row,
};
use crate::types::{escape, RequestStatus, RowTag, TaskStatus};
use crate::util::format_date;
use crate::value::{
    AsyncStream, ClientReference, Lazy, Rejection, StreamEvent, Thenable, TypedArray, Value,
};

/// Why rendering a value stopped.
pub(super) enum Halt {
    /// A lazy value is waiting on `thenable`. `model` is the lazy value to
    /// retry and `state` its saved continuation.
    Suspend {
        model: Value,
        thenable: Thenable,
        state: ThenableState,
    },
    Throw(Rejection),
}

impl From<Error> for Halt {
    fn from(err: Error) -> Self {
        Halt::Throw(Rejection::from(err))
    }
}

type RenderResult = Result<Json, Halt>;

impl Request {
    /// Renders a task's value and writes its terminal row.
    pub(super) fn retry_task(&mut self, mut task: Task) {
        if task.status != TaskStatus::Pending {
            return;
        }
        task.status = TaskStatus::Rendering;
        let id = task.id;
        debug!("rendering task {id}");
        let result = match self.resolve_root(&mut task) {
            Ok(()) => {
                let model = task.model.clone();
                self.render_value(&task, None, "", &model, true)
            }
            Err(halt) => Err(halt),
        };
        match result {
            Ok(json) => {
                self.abortable.remove(&id);
                task.status = TaskStatus::Completed;
                self.emit_model_row(id, &json);
            }
            Err(Halt::Suspend {
                thenable, state, ..
            }) => {
                if self.status == RequestStatus::Aborting {
                    self.abortable.remove(&id);
                    task.status = TaskStatus::Aborted;
                    let fatal = self.fatal_reference();
                    self.emit_model_row(id, &Json::from(serialize_by_value_id(fatal)));
                    return;
                }
                debug!("task {id} suspended");
                task.status = TaskStatus::Pending;
                task.thenable_state = Some(state);
                self.tasks.insert(id, task);
                let pings = self.pings.clone();
                thenable.then(move |_| pings.push(Ping::Retry(id)));
            }
            Err(Halt::Throw(reason)) => {
                debug!("task {id} failed: {reason}");
                self.abortable.remove(&id);
                task.status = TaskStatus::Errored;
                self.emit_rejection(id, &reason);
            }
        }
    }

    /// Runs lazy values at the root of a task until a concrete value remains.
    fn resolve_root(&mut self, task: &mut Task) -> Result<(), Halt> {
        let mut state = task.thenable_state.take().unwrap_or_default();
        while let Value::Lazy(lazy) = &task.model {
            let lazy = lazy.clone();
            match self.call_lazy(&lazy, &mut state) {
                Ok(value) => {
                    task.model = value;
                    state = ThenableState::default();
                }
                Err(Interrupt::Suspend(thenable)) => {
                    return Err(Halt::Suspend {
                        model: task.model.clone(),
                        thenable,
                        state,
                    })
                }
                Err(Interrupt::Throw(reason)) => return Err(Halt::Throw(reason)),
            }
        }
        Ok(())
    }

    fn call_lazy(&mut self, lazy: &Lazy, state: &mut ThenableState) -> Result<Value, Interrupt> {
        let mut hints = Vec::new();
        let result = {
            let mut cx = RenderContext::new(state, &mut hints);
            lazy.call(&mut cx)
        };
        for hint in hints {
            self.queue_hint(hint);
        }
        result
    }

    /// Renders a value at a child position.
    ///
    /// A suspension becomes a new task referenced as `$<id>`, and a postpone
    /// becomes its own `P` row. Errors go up to the enclosing task.
    pub(super) fn render_model(
        &mut self,
        task: &Task,
        parent_ref: Option<&str>,
        key: &str,
        value: &Value,
    ) -> RenderResult {
        match self.render_value(task, parent_ref, key, value, false) {
            Err(Halt::Suspend {
                model,
                thenable,
                state,
            }) => {
                if self.status == RequestStatus::Aborting {
                    let fatal = self.fatal_reference();
                    return Ok(Json::from(serialize_by_value_id(fatal)));
                }
                let mut outlined = self.create_task(model, task.key_path.clone(), task.implicit_slot);
                outlined.thenable_state = Some(state);
                let id = outlined.id;
                debug!("outlined suspended value of task {} into task {id}", task.id);
                self.tasks.insert(id, outlined);
                let pings = self.pings.clone();
                thenable.then(move |_| pings.push(Ping::Retry(id)));
                Ok(Json::from(serialize_by_value_id(id)))
            }
            Err(Halt::Throw(reason)) if reason.is_postpone() => {
                let id = self.allocate_row();
                self.emit_rejection(id, &reason);
                Ok(Json::from(serialize_by_value_id(id)))
            }
            other => other,
        }
    }

    fn render_value(
        &mut self,
        task: &Task,
        parent_ref: Option<&str>,
        key: &str,
        value: &Value,
        is_root: bool,
    ) -> RenderResult {
        match value {
            Value::Undefined => Ok(Json::from(escape::UNDEFINED)),
            Value::Null => Ok(Json::Null),
            Value::Bool(b) => Ok(Json::Bool(*b)),
            Value::Number(n) => Ok(serialize_number(*n)),
            Value::String(s) => Ok(self.render_string(s)),
            Value::BigInt(n) => Ok(Json::from(format!("${}{n}", escape::BIGINT))),
            Value::Date(date) => Ok(Json::from(format!("${}{}", escape::DATE, format_date(date)))),
            Value::Symbol(name) => Ok(self.render_symbol(name)),
            Value::ClientReference(reference) => Ok(self.render_client_reference(reference)),
            Value::ServerReference(_) => Ok(self.render_server_reference(value)),
            Value::Lazy(lazy) => {
                let mut state = ThenableState::default();
                match self.call_lazy(lazy, &mut state) {
                    // The resolved value has no parent to be addressed through.
                    Ok(resolved) => self.render_value(task, None, "", &resolved, false),
                    Err(Interrupt::Suspend(thenable)) => Err(Halt::Suspend {
                        model: value.clone(),
                        thenable,
                        state,
                    }),
                    Err(Interrupt::Throw(reason)) => Err(Halt::Throw(reason)),
                }
            }
            _ => self.render_shared(task, parent_ref, key, value, is_root),
        }
    }

    /// Values with identity: de-duplicated through the reference table.
    fn render_shared(
        &mut self,
        task: &Task,
        parent_ref: Option<&str>,
        key: &str,
        value: &Value,
        is_root: bool,
    ) -> RenderResult {
        if let Some(id) = self
            .temporary_references
            .as_ref()
            .and_then(|set| set.id_of(value))
        {
            return Ok(Json::from(serialize_temporary_reference(&id)));
        }
        if let Value::TemporaryReference(_) = value {
            return Err(Error::type_error(
                "Could not reference an opaque temporary reference. \
                 The request has no temporary reference set that knows it.",
            )
            .into());
        }
        if let Value::Promise(thenable) = value {
            return Ok(self.render_promise(task, value, thenable, is_root));
        }

        match self.ref_writer.get(value).map(str::to_owned) {
            Some(existing) if !is_root => return Ok(Json::from(existing)),
            Some(_) => {}
            None => {
                if let Some(parent_ref) = parent_ref {
                    if !key.contains(':') {
                        self.ref_writer.record(value, format!("{parent_ref}:{key}"));
                    }
                }
            }
        }
        if is_root && matches!(value, Value::Array(_) | Value::Object(_)) {
            self.ref_writer.record(value, serialize_by_value_id(task.id));
        }

        match value {
            Value::Array(items) => {
                let own_ref = self.ref_writer.get(value).map(str::to_owned);
                let items = items.borrow().clone();
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(self.render_model(task, own_ref.as_deref(), &i.to_string(), item)?);
                }
                Ok(Json::Array(out))
            }
            Value::Object(entries) => {
                let own_ref = self.ref_writer.get(value).map(str::to_owned);
                let entries: Vec<(String, Value)> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let mut out = Map::with_capacity(entries.len());
                for (k, v) in &entries {
                    let json = self.render_model(task, own_ref.as_deref(), k, v)?;
                    out.insert(k.clone(), json);
                }
                Ok(Json::Object(out))
            }
            Value::Map(entries) => {
                let pairs: Vec<Value> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| Value::array(vec![k.clone(), v.clone()]))
                    .collect();
                Ok(self.outline_collection(value, escape::MAP, Value::array(pairs)))
            }
            Value::Set(items) => {
                let items = items.borrow().clone();
                Ok(self.outline_collection(value, escape::SET, Value::array(items)))
            }
            Value::FormData(entries) => {
                let pairs: Vec<Value> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| Value::array(vec![Value::from(k.as_str()), v.clone()]))
                    .collect();
                Ok(self.outline_collection(value, escape::FORM_DATA, Value::array(pairs)))
            }
            Value::Blob(blob) => {
                let parts = Value::array(vec![
                    Value::from(blob.mime_type()),
                    Value::TypedArray(TypedArray::from_u8(blob.bytes())),
                ]);
                Ok(self.outline_collection(value, escape::BLOB, parts))
            }
            Value::TypedArray(array) => {
                let id = self.allocate_row();
                self.push_regular_row(binary_row(id, array.kind(), array.bytes()));
                let reference = serialize_by_value_id(id);
                if self.ref_writer.get(value).is_none() {
                    self.ref_writer.record(value, reference.clone());
                }
                Ok(Json::from(reference))
            }
            Value::Stream(stream) => self.render_stream(task, value, stream),
            other => Err(Error::type_error(format!(
                "{} values cannot be serialized here.",
                other.type_name()
            ))
            .into()),
        }
    }

    fn render_string(&mut self, s: &str) -> Json {
        if s.len() >= self.config.large_text_threshold() {
            let id = self.allocate_row();
            self.push_regular_row(text_row(id, s));
            return Json::from(serialize_by_value_id(id));
        }
        Json::from(escape_string(s))
    }

    fn render_symbol(&mut self, name: &str) -> Json {
        if let Some(id) = self.ref_writer.symbol(name) {
            return Json::from(serialize_by_value_id(id));
        }
        let id = self.allocate_row();
        let json = Json::from(serialize_symbol(name)).to_string();
        self.push_import_row(model_row(id, &json));
        self.ref_writer.record_symbol(name, id);
        Json::from(serialize_by_value_id(id))
    }

    fn render_client_reference(&mut self, reference: &Rc<ClientReference>) -> Json {
        let key = reference.dedupe_key();
        if let Some(id) = self.ref_writer.client_reference(&key) {
            return Json::from(serialize_by_value_id(id));
        }
        let id = self.allocate_row();
        match self.manifest.resolve(reference) {
            Ok(metadata) => {
                let row = tagged_row(id, RowTag::Import, &metadata.to_json().to_string());
                self.push_import_row(row);
            }
            Err(err) => self.emit_rejection(id, &Rejection::from(err)),
        }
        self.ref_writer.record_client_reference(key, id);
        Json::from(serialize_by_value_id(id))
    }

    fn render_server_reference(&mut self, value: &Value) -> Json {
        if let Some(existing) = self.ref_writer.server_reference(value).map(str::to_owned) {
            return Json::from(existing);
        }
        let Value::ServerReference(reference) = value else {
            return Json::Null;
        };
        let model = Value::object([
            ("id", Value::from(reference.id())),
            ("bound", reference.bound().cloned().unwrap_or(Value::Null)),
        ]);
        let id = self.outline_model(model);
        let reference = serialize_prefixed_id(escape::SERVER_REFERENCE, id);
        self.ref_writer.record_server_reference(value, reference.clone());
        Json::from(reference)
    }

    fn render_promise(&mut self, task: &Task, value: &Value, thenable: &Thenable, is_root: bool) -> Json {
        if let Some(existing) = self.ref_writer.get(value).map(str::to_owned) {
            if task.key_path.is_some() || task.implicit_slot {
                let id = self.serialize_thenable(task, thenable);
                return Json::from(serialize_promise_id(id));
            }
            if !is_root {
                return Json::from(existing);
            }
        }
        let id = self.serialize_thenable(task, thenable);
        let reference = serialize_promise_id(id);
        self.ref_writer.record(value, reference.clone());
        Json::from(reference)
    }

    /// Gives a promise its own task, settled now or when the promise settles.
    fn serialize_thenable(&mut self, task: &Task, thenable: &Thenable) -> u32 {
        let mut pending = self.create_task(Value::Null, task.key_path.clone(), task.implicit_slot);
        let id = pending.id;
        match thenable.outcome() {
            Some(Ok(value)) => {
                pending.model = value;
                self.tasks.insert(id, pending);
                self.pings.push(Ping::Retry(id));
            }
            Some(Err(reason)) => {
                self.abortable.remove(&id);
                self.emit_rejection(id, &reason);
            }
            None if self.status == RequestStatus::Aborting => {
                self.abortable.remove(&id);
                let fatal = self.fatal_reference();
                self.emit_model_row(id, &Json::from(serialize_by_value_id(fatal)));
            }
            None => {
                self.tasks.insert(id, pending);
                let pings = self.pings.clone();
                thenable.then(move |outcome| match outcome {
                    Ok(value) => pings.push(Ping::Fulfilled(id, value)),
                    Err(reason) => pings.push(Ping::Rejected(id, reason)),
                });
            }
        }
        id
    }

    /// Renders `model` as its own row right away and returns the row id.
    pub(super) fn outline_model(&mut self, model: Value) -> u32 {
        let task = self.create_task(model, None, false);
        let id = task.id;
        self.retry_task(task);
        id
    }

    /// Outlines the entries of a collection and references them with
    /// `$<prefix><id>`. A reference recorded earlier through the parent stays
    /// in place so the decoder resolves both to one value.
    fn outline_collection(&mut self, value: &Value, prefix: char, entries: Value) -> Json {
        let id = self.outline_model(entries);
        let reference = serialize_prefixed_id(prefix, id);
        if self.ref_writer.get(value).is_none() {
            self.ref_writer.record(value, reference.clone());
        }
        Json::from(reference)
    }

    fn render_stream(&mut self, task: &Task, value: &Value, stream: &AsyncStream) -> RenderResult {
        if stream.is_locked() {
            return Err(Error::type_error("The stream is already locked to another reader.").into());
        }
        let stream_task = self.create_task(value.clone(), task.key_path.clone(), task.implicit_slot);
        let id = stream_task.id;
        // Streams end through their own rows, not through abort references.
        self.abortable.remove(&id);
        self.pending_chunks += 1;
        self.push_regular_row(stream_open_row(id, stream.kind()));
        self.streams.insert(id, stream_task);
        let pings = self.pings.clone();
        stream.subscribe(Rc::new(move || pings.push(Ping::Stream(id))))?;
        debug!("opened {:?} stream {id}", stream.kind());
        Ok(Json::from(serialize_by_value_id(id)))
    }

    /// Writes every event buffered on a stream task.
    pub(super) fn process_stream(&mut self, id: u32) {
        let Some(task) = self.streams.remove(&id) else {
            return;
        };
        let Value::Stream(stream) = task.model.clone() else {
            return;
        };
        while let Some(event) = stream.next_event() {
            match event {
                StreamEvent::Item(item) => {
                    if let Err(reason) = self.emit_stream_item(&task, &item) {
                        debug!("stream {id} failed on an item: {reason}");
                        self.emit_rejection(id, &reason);
                        stream.cancel(reason);
                        return;
                    }
                }
                StreamEvent::Close(None) => {
                    self.push_regular_row(close_row(id, None));
                    debug!("closed stream {id}");
                    return;
                }
                StreamEvent::Close(Some(return_value)) => {
                    let value_id = self.outline_model(return_value);
                    let json = Json::from(serialize_by_value_id(value_id)).to_string();
                    self.push_regular_row(close_row(id, Some(&json)));
                    debug!("closed stream {id} with a return value");
                    return;
                }
                StreamEvent::Error(reason) => {
                    self.emit_rejection(id, &reason);
                    return;
                }
            }
        }
        self.streams.insert(id, task);
    }

    fn emit_stream_item(&mut self, task: &Task, item: &Value) -> Result<(), Rejection> {
        let row = match item {
            Value::String(text) => text_row(task.id, text),
            Value::TypedArray(array) => binary_row(task.id, array.kind(), array.bytes()),
            _ => match self.render_model(task, None, "", item) {
                Ok(json) => model_row(task.id, &json.to_string()),
                Err(Halt::Throw(reason)) => return Err(reason),
                Err(Halt::Suspend { thenable, .. }) => {
                    // render_model outlines suspensions; only a bare one is left.
                    return Err(Rejection::error(anyhow::anyhow!(
                        "Stream item suspended on {thenable:?}"
                    )));
                }
            },
        };
        self.pending_chunks += 1;
        self.push_regular_row(row);
        Ok(())
    }
}
