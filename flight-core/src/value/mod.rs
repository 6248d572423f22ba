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

//! The value graph carried by the protocol.
//!
//! Composite values are shared handles, so the same array or object can sit
//! at several positions of a graph (or inside itself). The encoder sends
//! each such value once and refers back to it; the decoder rebuilds the same
//! sharing.

mod lazy;
mod reference;
mod stream;
mod thenable;
mod typed_array;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, SubsecRound, Utc};
use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::resolver::context::{Interrupt, RenderContext};

pub use lazy::Lazy;
pub use reference::{ClientReference, ServerReference, TemporaryReference, TemporaryReferenceSet};
pub use stream::{AsyncStream, StreamEvent};
pub use thenable::{Outcome, Postpone, Rejection, Thenable, ThenableStatus};
pub use typed_array::{Blob, TypedArray};

pub type Array = Rc<RefCell<Vec<Value>>>;
pub type Object = Rc<RefCell<IndexMap<String, Value>>>;
/// Insertion ordered key/value pairs.
pub type MapEntries = Rc<RefCell<Vec<(Value, Value)>>>;
pub type SetItems = Rc<RefCell<Vec<Value>>>;
pub type FormDataEntries = Rc<RefCell<Vec<(String, Value)>>>;

/// A node of the value graph.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    BigInt(BigInt),
    /// Travels with millisecond precision. `Value::from` truncates to
    /// milliseconds so a date compares equal after a round trip.
    Date(DateTime<Utc>),
    /// A globally registered symbol, by name.
    Symbol(String),
    Array(Array),
    Object(Object),
    Map(MapEntries),
    Set(SetItems),
    FormData(FormDataEntries),
    TypedArray(TypedArray),
    Blob(Blob),
    Promise(Thenable),
    Stream(AsyncStream),
    Lazy(Lazy),
    ClientReference(Rc<ClientReference>),
    ServerReference(Rc<ServerReference>),
    TemporaryReference(TemporaryReference),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object<K, I>(entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(Rc::new(RefCell::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Value {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn set(items: Vec<Value>) -> Value {
        Value::Set(Rc::new(RefCell::new(items)))
    }

    pub fn form_data<K: Into<String>>(entries: Vec<(K, Value)>) -> Value {
        Value::FormData(Rc::new(RefCell::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    pub fn promise(thenable: &Thenable) -> Value {
        Value::Promise(thenable.clone())
    }

    pub fn lazy<F>(thunk: F) -> Value
    where
        F: Fn(&mut RenderContext<'_>) -> Result<Value, Interrupt> + 'static,
    {
        Value::Lazy(Lazy::new(thunk))
    }

    /// Address of the shared allocation behind identity-bearing values.
    ///
    /// Primitives have no identity and are always encoded by content.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(Rc::as_ptr(a) as *const () as usize),
            Value::Object(o) => Some(Rc::as_ptr(o) as *const () as usize),
            Value::Map(m) => Some(Rc::as_ptr(m) as *const () as usize),
            Value::Set(s) => Some(Rc::as_ptr(s) as *const () as usize),
            Value::FormData(f) => Some(Rc::as_ptr(f) as *const () as usize),
            Value::TypedArray(t) => Some(t.identity()),
            Value::Blob(b) => Some(b.identity()),
            Value::Promise(p) => Some(p.identity()),
            Value::Stream(s) => Some(s.identity()),
            Value::Lazy(l) => Some(l.identity()),
            Value::ClientReference(c) => Some(Rc::as_ptr(c) as *const () as usize),
            Value::ServerReference(s) => Some(Rc::as_ptr(s) as *const () as usize),
            Value::TemporaryReference(t) => Some(t.identity()),
            _ => None,
        }
    }

    /// Whether both values are the same shared allocation.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::BigInt(_) => "bigint",
            Value::Date(_) => "Date",
            Value::Symbol(_) => "symbol",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Map(_) => "Map",
            Value::Set(_) => "Set",
            Value::FormData(_) => "FormData",
            Value::TypedArray(_) => "TypedArray",
            Value::Blob(_) => "Blob",
            Value::Promise(_) => "Promise",
            Value::Stream(_) => "Stream",
            Value::Lazy(_) => "Lazy",
            Value::ClientReference(_) => "ClientReference",
            Value::ServerReference(_) => "ServerReference",
            Value::TemporaryReference(_) => "TemporaryReference",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_thenable(&self) -> Option<&Thenable> {
        match self {
            Value::Promise(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&AsyncStream> {
        match self {
            Value::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Property of an object.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(o) => o.borrow().get(key).cloned(),
            _ => None,
        }
    }

    /// Element of an array or set.
    pub fn at(&self, index: usize) -> Option<Value> {
        match self {
            Value::Array(a) | Value::Set(a) => a.borrow().get(index).cloned(),
            _ => None,
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Array(a) | Value::Set(a) => Some(a.borrow().len()),
            Value::Object(o) => Some(o.borrow().len()),
            Value::Map(m) => Some(m.borrow().len()),
            Value::FormData(f) => Some(f.borrow().len()),
            _ => None,
        }
    }

    /// Converts plain JSON, without interpreting `$` escapes.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                Value::object(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))))
            }
        }
    }
}

/// `Object.is` semantics: NaN equals NaN, and `0` differs from `-0`.
#[inline(always)]
pub fn same_value(a: f64, b: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        return true;
    }
    a == b && a.is_sign_negative() == b.is_sign_negative()
}

/// Deep structural equality.
///
/// Numbers compare with [`same_value`]. Promises, streams, lazy values and
/// temporary references compare by identity. Shared handles short-circuit on
/// identity, so a graph compares equal to itself even when cyclic.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => same_value(*a, *b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Array(a), Value::Array(b)) | (Value::Set(a), Value::Set(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
                }
            }
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::FormData(a), Value::FormData(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (Value::TypedArray(a), Value::TypedArray(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            (Value::Stream(a), Value::Stream(b)) => a.ptr_eq(b),
            (Value::Lazy(a), Value::Lazy(b)) => a.ptr_eq(b),
            (Value::ClientReference(a), Value::ClientReference(b)) => a == b,
            (Value::ServerReference(a), Value::ServerReference(b)) => {
                Rc::ptr_eq(a, b) || a == b
            }
            (Value::TemporaryReference(a), Value::TemporaryReference(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if *n == 0.0 && n.is_sign_negative() {
                    write!(f, "-0")
                } else {
                    write!(f, "{n}")
                }
            }
            Value::String(s) => write!(f, "{s:?}"),
            Value::BigInt(n) => write!(f, "{n}n"),
            Value::Date(d) => write!(f, "Date({})", d.to_rfc3339()),
            Value::Symbol(name) => write!(f, "Symbol.for({name:?})"),
            Value::Array(a) => match a.try_borrow() {
                Ok(items) => f.debug_list().entries(items.iter()).finish(),
                Err(_) => write!(f, "[<borrowed>]"),
            },
            Value::Object(o) => match o.try_borrow() {
                Ok(entries) => f.debug_map().entries(entries.iter()).finish(),
                Err(_) => write!(f, "{{<borrowed>}}"),
            },
            Value::Map(m) => {
                write!(f, "Map ")?;
                f.debug_map()
                    .entries(m.borrow().iter().map(|(k, v)| (k, v)))
                    .finish()
            }
            Value::Set(s) => {
                write!(f, "Set ")?;
                f.debug_set().entries(s.borrow().iter()).finish()
            }
            Value::FormData(d) => {
                write!(f, "FormData ")?;
                f.debug_map()
                    .entries(d.borrow().iter().map(|(k, v)| (k, v)))
                    .finish()
            }
            Value::TypedArray(t) => fmt::Debug::fmt(t, f),
            Value::Blob(b) => fmt::Debug::fmt(b, f),
            Value::Promise(p) => fmt::Debug::fmt(p, f),
            Value::Stream(s) => fmt::Debug::fmt(s, f),
            Value::Lazy(l) => fmt::Debug::fmt(l, f),
            Value::ClientReference(c) => fmt::Debug::fmt(c, f),
            Value::ServerReference(s) => fmt::Debug::fmt(s, f),
            Value::TemporaryReference(t) => fmt::Debug::fmt(t, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::BigInt(n)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d.trunc_subsecs(3))
    }
}

impl From<TypedArray> for Value {
    fn from(t: TypedArray) -> Self {
        Value::TypedArray(t)
    }
}

impl From<Thenable> for Value {
    fn from(t: Thenable) -> Self {
        Value::Promise(t)
    }
}

impl From<AsyncStream> for Value {
    fn from(s: AsyncStream) -> Self {
        Value::Stream(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_value_numbers() {
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_ne!(Value::from(0.0), Value::from(-0.0));
    }

    #[test]
    fn test_date_keeps_millis_only() {
        let date = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let Value::Date(stored) = Value::from(date) else {
            panic!("expected a date");
        };
        assert_eq!(stored.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_cyclic_graph_equals_itself() {
        let array = Value::array(vec![Value::from(1)]);
        if let Value::Array(items) = &array {
            items.borrow_mut().push(array.clone());
        }
        assert_eq!(array, array.clone());
    }
}
