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

//! Decoder chunks and the listener records that connect them.

use std::cell::RefCell;
use std::rc::Rc;

use crate::types::{ChunkStatus, TypedArrayKind};
use crate::value::{Array, Object, Rejection, Thenable, Value};

/// Index of a chunk in the response arena.
pub(crate) type ChunkIndex = usize;

pub(crate) enum ChunkState {
    Pending,
    /// Built, waiting for `Handler::deps` referenced chunks.
    Blocked(Rc<RefCell<Handler>>),
    /// Being initialized right now.
    Cyclic(Rc<RefCell<Handler>>),
    ResolvedModel(String),
    Fulfilled(Value),
    Rejected(Rejection),
}

impl ChunkState {
    pub fn status(&self) -> ChunkStatus {
        match self {
            ChunkState::Pending => ChunkStatus::Pending,
            ChunkState::Blocked(_) => ChunkStatus::Blocked,
            ChunkState::Cyclic(_) => ChunkStatus::Cyclic,
            ChunkState::ResolvedModel(_) => ChunkStatus::ResolvedModel,
            ChunkState::Fulfilled(_) => ChunkStatus::Fulfilled,
            ChunkState::Rejected(_) => ChunkStatus::Rejected,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkState::Fulfilled(_) | ChunkState::Rejected(_))
    }

    pub fn handler(&self) -> Option<&Rc<RefCell<Handler>>> {
        match self {
            ChunkState::Blocked(h) | ChunkState::Cyclic(h) => Some(h),
            _ => None,
        }
    }
}

/// One decoded row, or one value of a stream.
pub(crate) struct Chunk {
    pub state: ChunkState,
    pub listeners: Vec<Listener>,
    /// Handle given out to the host and to `$@` references.
    pub handle: Thenable,
}

impl Chunk {
    pub fn new(state: ChunkState) -> Self {
        Chunk {
            state,
            listeners: Vec::new(),
            handle: Thenable::new(),
        }
    }
}

/// Book-keeping for a chunk whose value is built but still has holes.
pub(crate) struct Handler {
    pub chunk: ChunkIndex,
    pub value: Value,
    /// Referenced chunks that must fulfill before this one can.
    pub deps: usize,
    /// Chunks this one registered a counted listener on.
    pub waiting_on: Vec<ChunkIndex>,
    pub errored: bool,
}

impl Handler {
    pub fn new(chunk: ChunkIndex) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Handler {
            chunk,
            value: Value::Undefined,
            deps: 0,
            waiting_on: Vec::new(),
            errored: false,
        }))
    }
}

/// Where a resolved reference is written.
#[derive(Clone)]
pub(crate) enum Slot {
    /// The whole value of the handler's chunk.
    Root,
    Array(Array, usize),
    Object(Object, String),
}

impl Slot {
    pub fn fill(&self, handler: &RefCell<Handler>, value: Value) {
        match self {
            Slot::Root => handler.borrow_mut().value = value,
            Slot::Array(items, index) => {
                if let Some(item) = items.borrow_mut().get_mut(*index) {
                    *item = value;
                }
            }
            Slot::Object(entries, key) => {
                entries.borrow_mut().insert(key.clone(), value);
            }
        }
    }
}

/// How a referenced chunk's value is turned into the value at the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum MapKind {
    Plain,
    Map,
    Set,
    FormData,
    Blob,
    ServerReference,
    Typed(TypedArrayKind),
}

/// Work to do once a chunk reaches a terminal state.
pub(crate) enum Listener {
    /// Write the chunk's value into a slot of another chunk.
    Model {
        handler: Rc<RefCell<Handler>>,
        slot: Slot,
        path: Vec<String>,
        kind: MapKind,
        /// The reference closes a cycle and is not counted in `deps`.
        cyclic: bool,
    },
    /// Resume draining the stream opened on this wire id.
    Stream(u32),
}
