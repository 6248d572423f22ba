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

//! Reviving model rows into values.
//!
//! A row is revived top-down. Every reference to a chunk that has not
//! fulfilled yet leaves a hole and registers a [`Listener::Model`] that fills
//! it later; the chunk stays blocked until its last hole is filled.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use serde_json::Value as Json;

use super::chunk::{ChunkIndex, ChunkState, Handler, Listener, MapKind, Slot};
use super::Response;
use crate::error::Error;
use crate::types::{escape, TypedArrayKind};
use crate::util::{parse_date, parse_hex_id};
use crate::value::{Array, Blob, Object, Rejection, ServerReference, Value};

type Revived = Result<Value, Rejection>;

impl Response {
    /// Revives a model row into chunk `index`.
    pub(super) fn resolve_model(&mut self, index: ChunkIndex, json: String) {
        self.chunks[index].state = ChunkState::ResolvedModel(json);
        self.initialize_model(index);
    }

    fn initialize_model(&mut self, index: ChunkIndex) {
        let ChunkState::ResolvedModel(json) = &self.chunks[index].state else {
            return;
        };
        let parsed = match serde_json::from_str::<Json>(json) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.reject_chunk(index, Rejection::from(Error::from(err)));
                return;
            }
        };
        let handler = Handler::new(index);
        self.chunks[index].state = ChunkState::Cyclic(handler.clone());
        match self.revive(&handler, &parsed, &Slot::Root) {
            Ok(value) => {
                let deps = {
                    let mut h = handler.borrow_mut();
                    h.value = value.clone();
                    h.deps
                };
                if deps == 0 {
                    self.fulfill_chunk(index, value);
                } else {
                    self.chunks[index].state = ChunkState::Blocked(handler);
                }
            }
            Err(reason) => {
                handler.borrow_mut().errored = true;
                self.reject_chunk(index, reason);
            }
        }
    }

    fn revive(&mut self, handler: &Rc<RefCell<Handler>>, json: &Json, slot: &Slot) -> Revived {
        match json {
            Json::Null => Ok(Value::Null),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => Ok(Value::Number(n.as_f64().unwrap_or(f64::NAN))),
            Json::String(s) => self.parse_model_string(handler, s, slot),
            Json::Array(items) => {
                let array: Array = Rc::new(RefCell::new(Vec::with_capacity(items.len())));
                for (i, item) in items.iter().enumerate() {
                    let value = self.revive(handler, item, &Slot::Array(array.clone(), i))?;
                    array.borrow_mut().push(value);
                }
                Ok(Value::Array(array))
            }
            Json::Object(entries) => {
                let object: Object = Rc::new(RefCell::new(IndexMap::with_capacity(entries.len())));
                for (key, item) in entries {
                    let value = self.revive(handler, item, &Slot::Object(object.clone(), key.clone()))?;
                    object.borrow_mut().insert(key.clone(), value);
                }
                Ok(Value::Object(object))
            }
        }
    }

    fn parse_model_string(&mut self, handler: &Rc<RefCell<Handler>>, s: &str, slot: &Slot) -> Revived {
        let Some(rest) = s.strip_prefix(escape::PREFIX) else {
            return Ok(Value::String(s.to_owned()));
        };
        match s {
            escape::UNDEFINED => return Ok(Value::Undefined),
            escape::NAN => return Ok(Value::Number(f64::NAN)),
            escape::INFINITY => return Ok(Value::Number(f64::INFINITY)),
            escape::NEG_INFINITY => return Ok(Value::Number(f64::NEG_INFINITY)),
            escape::NEG_ZERO => return Ok(Value::Number(-0.0)),
            _ => {}
        }
        let mut chars = rest.chars();
        let Some(marker) = chars.next() else {
            return Ok(Value::String(s.to_owned()));
        };
        let body = chars.as_str();
        match marker {
            escape::PREFIX => Ok(Value::String(rest.to_owned())),
            escape::PROMISE => {
                let index = self.chunk_index(parse_hex_id(body)?);
                Ok(Value::Promise(self.chunks[index].handle.clone()))
            }
            escape::SYMBOL => Ok(Value::Symbol(body.to_owned())),
            escape::TEMPORARY_REFERENCE => match &self.temporary_references {
                Some(set) => Ok(set.resolve(body)),
                None => Err(Error::type_error(
                    "Could not reference an opaque temporary reference. \
                     The response was created without a temporary reference set.",
                )
                .into()),
            },
            escape::SERVER_REFERENCE => self.outlined(handler, body, MapKind::ServerReference, slot),
            escape::MAP => self.outlined(handler, body, MapKind::Map, slot),
            escape::SET => self.outlined(handler, body, MapKind::Set, slot),
            escape::FORM_DATA => self.outlined(handler, body, MapKind::FormData, slot),
            escape::BLOB => self.outlined(handler, body, MapKind::Blob, slot),
            escape::DATE => Ok(Value::Date(parse_date(body)?)),
            escape::BIGINT => body
                .parse::<BigInt>()
                .map(Value::BigInt)
                .map_err(|_| Error::invalid_data(format!("Invalid bigint {body:?}")).into()),
            _ => match typed_escape(marker, body) {
                Some(kind) => self.outlined(handler, body, MapKind::Typed(kind), slot),
                None => {
                    let mut parts = rest.split(':');
                    let id = parse_hex_id(parts.next().unwrap_or_default())?;
                    let path = parts.map(str::to_owned).collect();
                    self.get_outlined_model(handler, id, path, MapKind::Plain, slot)
                }
            },
        }
    }

    fn outlined(&mut self, handler: &Rc<RefCell<Handler>>, body: &str, kind: MapKind, slot: &Slot) -> Revived {
        let id = parse_hex_id(body)?;
        self.get_outlined_model(handler, id, Vec::new(), kind, slot)
    }

    /// Value of a referenced chunk, or a hole plus a listener when the
    /// chunk is not there yet.
    fn get_outlined_model(
        &mut self,
        handler: &Rc<RefCell<Handler>>,
        id: u32,
        path: Vec<String>,
        kind: MapKind,
        slot: &Slot,
    ) -> Revived {
        let index = self.chunk_index(id);
        let cyclic = match &self.chunks[index].state {
            ChunkState::Fulfilled(value) => {
                let value = value.clone();
                return self.resolve_reference(index, value, &path, kind);
            }
            ChunkState::Rejected(reason) => return Err(reason.clone()),
            ChunkState::Cyclic(_) => true,
            ChunkState::Blocked(blocked) => {
                let current = handler.borrow().chunk;
                let cyclic = self.waits_on(index, current);
                // A row that is only a reference into a cycle takes the blocked
                // chunk's value as is; its holes fill in place.
                if cyclic && matches!(slot, Slot::Root) && kind == MapKind::Plain {
                    let partial = blocked.borrow().value.clone();
                    if let Ok(value) = walk_path(partial, &path) {
                        if !matches!(value, Value::Undefined) {
                            return Ok(value);
                        }
                    }
                }
                cyclic
            }
            ChunkState::Pending | ChunkState::ResolvedModel(_) => false,
        };
        if !cyclic {
            let mut h = handler.borrow_mut();
            h.deps += 1;
            h.waiting_on.push(index);
        }
        self.chunks[index].listeners.push(Listener::Model {
            handler: handler.clone(),
            slot: slot.clone(),
            path,
            kind,
            cyclic,
        });
        Ok(Value::Undefined)
    }

    /// Whether blocked chunk `from` waits, directly or through other
    /// blocked chunks, on `target`.
    fn waits_on(&self, from: ChunkIndex, target: ChunkIndex) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(index) = stack.pop() {
            if !seen.insert(index) {
                continue;
            }
            let Some(handler) = self.chunks[index].state.handler() else {
                continue;
            };
            for &dep in &handler.borrow().waiting_on {
                if dep == target {
                    return true;
                }
                if !self.chunks[dep].state.is_terminal() {
                    stack.push(dep);
                }
            }
        }
        false
    }

    fn resolve_reference(&mut self, index: ChunkIndex, value: Value, path: &[String], kind: MapKind) -> Revived {
        let value = walk_path(value, path)?;
        if kind == MapKind::Plain {
            return Ok(value);
        }
        if let Some(derived) = self.derived.get(&(index, kind)) {
            return Ok(derived.clone());
        }
        let derived = derive(kind, &value)?;
        self.derived.insert((index, kind), derived.clone());
        Ok(derived)
    }

    /// Fills the hole a listener stands for, now that chunk `index` is
    /// terminal.
    pub(super) fn fulfill_reference(
        &mut self,
        index: ChunkIndex,
        handler: &Rc<RefCell<Handler>>,
        slot: &Slot,
        path: &[String],
        kind: MapKind,
        cyclic: bool,
    ) {
        let outcome = match &self.chunks[index].state {
            ChunkState::Fulfilled(value) => Ok(value.clone()),
            ChunkState::Rejected(reason) => Err(reason.clone()),
            _ => return,
        };
        let target = handler.borrow().chunk;
        if handler.borrow().errored {
            return;
        }
        if !cyclic && self.chunks[target].state.is_terminal() {
            return;
        }
        match outcome.and_then(|value| self.resolve_reference(index, value, path, kind)) {
            Ok(value) => {
                slot.fill(handler, value);
                if cyclic {
                    return;
                }
                let (deps, value) = {
                    let mut h = handler.borrow_mut();
                    h.deps = h.deps.saturating_sub(1);
                    (h.deps, h.value.clone())
                };
                if deps == 0 && matches!(self.chunks[target].state, ChunkState::Blocked(_)) {
                    self.fulfill_chunk(target, value);
                }
            }
            Err(reason) => {
                handler.borrow_mut().errored = true;
                self.reject_chunk(target, reason);
            }
        }
    }
}

/// `$<tag><hex>` view of a binary row. `S` stays the symbol escape.
fn typed_escape(marker: char, body: &str) -> Option<TypedArrayKind> {
    if !marker.is_ascii() || marker == escape::SYMBOL || body.is_empty() {
        return None;
    }
    if !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    TypedArrayKind::try_from(marker as u8).ok()
}

fn walk_path(mut value: Value, path: &[String]) -> Revived {
    for key in path {
        let next = match &value {
            Value::Object(_) => value.get(key),
            Value::Array(_) => key.parse::<usize>().ok().and_then(|i| value.at(i)),
            _ => None,
        };
        value = match next {
            Some(next) => next,
            None => {
                return Err(Error::invalid_ref(format!(
                    "Reference path segment {key:?} does not exist on {}",
                    value.type_name()
                ))
                .into())
            }
        };
    }
    Ok(value)
}

fn items(kind: MapKind, value: &Value) -> Result<Vec<Value>, Rejection> {
    match value {
        Value::Array(items) => Ok(items.borrow().clone()),
        other => Err(Error::invalid_data(format!(
            "Expected an array behind a {kind:?} reference, got {}",
            other.type_name()
        ))
        .into()),
    }
}

fn pair(kind: MapKind, entry: &Value) -> Result<(Value, Value), Rejection> {
    match (entry.at(0), entry.at(1)) {
        (Some(key), Some(value)) => Ok((key, value)),
        _ => Err(Error::invalid_data(format!("Malformed {kind:?} entry {entry:?}")).into()),
    }
}

/// Builds the value a `$Q`, `$W`, `$K`, `$B`, `$F` or typed escape stands for.
fn derive(kind: MapKind, value: &Value) -> Revived {
    match kind {
        MapKind::Plain => Ok(value.clone()),
        MapKind::Map => {
            let entries = items(kind, value)?
                .iter()
                .map(|entry| pair(kind, entry))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::map(entries))
        }
        MapKind::Set => Ok(Value::set(items(kind, value)?)),
        MapKind::FormData => {
            let mut entries = Vec::new();
            for entry in items(kind, value)? {
                let (key, value) = pair(kind, &entry)?;
                let key = key
                    .as_str()
                    .ok_or_else(|| Error::invalid_data("FormData keys must be strings"))?
                    .to_owned();
                entries.push((key, value));
            }
            Ok(Value::form_data(entries))
        }
        MapKind::Blob => {
            let parts = items(kind, value)?;
            match (parts.first(), parts.get(1)) {
                (Some(Value::String(mime)), Some(Value::TypedArray(bytes))) => {
                    Ok(Value::Blob(Blob::new(mime.clone(), bytes.bytes().clone())))
                }
                _ => Err(Error::invalid_data("Malformed blob parts").into()),
            }
        }
        MapKind::ServerReference => {
            let id = value
                .get("id")
                .and_then(|id| id.as_str().map(str::to_owned))
                .ok_or_else(|| Error::invalid_data("Server reference without an id"))?;
            let bound = value
                .get("bound")
                .filter(|bound| !matches!(bound, Value::Null | Value::Undefined));
            Ok(Value::ServerReference(ServerReference::from_parts(id, bound)))
        }
        MapKind::Typed(kind) => match value {
            Value::TypedArray(array) => Ok(Value::TypedArray(array.with_kind(kind)?)),
            other => Err(Error::invalid_data(format!(
                "Expected binary data behind a {kind:?} reference, got {}",
                other.type_name()
            ))
            .into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::client::{Response, ResponseOptions};
    use crate::types::ChunkStatus;
    use crate::value::Value;

    fn root_of(rows: &str) -> Value {
        let mut response = Response::new(ResponseOptions::new());
        let root = response.get_root();
        response.process_string_chunk(rows).unwrap();
        root.value().expect("root fulfilled")
    }

    #[test]
    fn test_sentinels() {
        let value = root_of("0:[\"$undefined\",\"$NaN\",\"$-0\",\"$-Infinity\",\"$$x\",\"$n12\"]\n");
        assert_eq!(value.at(0), Some(Value::Undefined));
        assert!(value.at(1).unwrap().as_f64().unwrap().is_nan());
        assert_eq!(value.at(2), Some(Value::from(-0.0)));
        assert_eq!(value.at(3), Some(Value::from(f64::NEG_INFINITY)));
        assert_eq!(value.at(4), Some(Value::from("$x")));
        assert_eq!(value.at(5), Some(Value::BigInt(12.into())));
    }

    #[test]
    fn test_map_references_share_one_map() {
        let value = root_of("1:[[\"a\",1]]\n0:[\"$Q1\",\"$Q1\"]\n");
        let (first, second) = (value.at(0).unwrap(), value.at(1).unwrap());
        assert!(matches!(first, Value::Map(_)));
        assert!(first.same_identity(&second));
    }

    #[test]
    fn test_path_reference_into_fulfilled_chunk() {
        let value = root_of("1:{\"a\":[10,20]}\n0:\"$1:a:1\"\n");
        assert_eq!(value, Value::from(20));
    }

    #[test]
    fn test_bad_path_rejects() {
        let mut response = Response::new(ResponseOptions::new());
        response.process_string_chunk("1:{}\n0:\"$1:missing\"\n").unwrap();
        assert_eq!(response.chunk_status(0), Some(ChunkStatus::Rejected));
    }

    #[test]
    fn test_object_keeps_undefined_keys() {
        let value = root_of("0:{\"a\":\"$undefined\"}\n");
        assert_eq!(value.len(), Some(1));
    }
}
