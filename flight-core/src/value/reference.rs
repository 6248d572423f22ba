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

//! Values whose identity lives outside the graph.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// A placeholder for something only the decoding side can load, such as a
/// module export.
///
/// `id` is either a manifest key or `<module>#<export>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientReference {
    id: String,
    is_async: bool,
}

impl ClientReference {
    pub fn new(id: impl Into<String>) -> Rc<Self> {
        Rc::new(ClientReference {
            id: id.into(),
            is_async: false,
        })
    }

    /// A reference whose module must be awaited before use.
    pub fn new_async(id: impl Into<String>) -> Rc<Self> {
        Rc::new(ClientReference {
            id: id.into(),
            is_async: true,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Key used to de-duplicate import rows within one request.
    pub(crate) fn dedupe_key(&self) -> String {
        if self.is_async {
            format!("{}#async", self.id)
        } else {
            self.id.clone()
        }
    }
}

/// A callable that lives on the encoding side, optionally with bound
/// arguments.
#[derive(Debug, PartialEq)]
pub struct ServerReference {
    id: String,
    bound: Option<Value>,
}

impl ServerReference {
    pub fn new(id: impl Into<String>) -> Rc<Self> {
        Rc::new(ServerReference {
            id: id.into(),
            bound: None,
        })
    }

    pub fn with_bound(id: impl Into<String>, bound: Vec<Value>) -> Rc<Self> {
        Rc::new(ServerReference {
            id: id.into(),
            bound: Some(Value::array(bound)),
        })
    }

    pub(crate) fn from_parts(id: String, bound: Option<Value>) -> Rc<Self> {
        Rc::new(ServerReference { id, bound })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bound(&self) -> Option<&Value> {
        self.bound.as_ref()
    }
}

/// An opaque value that was received from the other side and is sent back
/// by id rather than by content.
#[derive(Clone)]
pub struct TemporaryReference(Rc<str>);

impl TemporaryReference {
    pub fn id(&self) -> &str {
        &self.0
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &TemporaryReference) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[inline(always)]
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for TemporaryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TemporaryReference").field(&&*self.0).finish()
    }
}

#[derive(Default)]
struct TemporaryReferences {
    ids: HashMap<usize, String>,
    values: HashMap<String, Value>,
}

/// Two-way table between opaque values and the ids they travel under.
///
/// Share one set between the decoder that receives temporary references and
/// the encoder that sends them back.
#[derive(Clone, Default)]
pub struct TemporaryReferenceSet(Rc<RefCell<TemporaryReferences>>);

impl TemporaryReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an identity-bearing value under `id`.
    ///
    /// Returns `false` for values without identity, which cannot be
    /// referenced this way.
    pub fn register(&self, value: &Value, id: impl Into<String>) -> bool {
        let Some(identity) = value.identity() else {
            return false;
        };
        let id = id.into();
        let mut refs = self.0.borrow_mut();
        refs.ids.insert(identity, id.clone());
        refs.values.insert(id, value.clone());
        true
    }

    /// Returns the registered value for `id`, creating an opaque
    /// [`TemporaryReference`] the first time an unknown id is seen.
    pub fn resolve(&self, id: &str) -> Value {
        if let Some(value) = self.get(id) {
            return value;
        }
        let value = Value::TemporaryReference(TemporaryReference(Rc::from(id)));
        self.register(&value, id);
        value
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.0.borrow().values.get(id).cloned()
    }

    pub fn id_of(&self, value: &Value) -> Option<String> {
        let identity = value.identity()?;
        self.0.borrow().ids.get(&identity).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
