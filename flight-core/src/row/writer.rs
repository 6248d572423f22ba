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

//! Row framing and the `$` reference conventions used inside payloads.

use std::fmt::Write as _;

use bytes::{BufMut, Bytes, BytesMut};

use crate::types::{escape, RowTag, StreamKind, TypedArrayKind};

/// Largest integer a double represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[inline(always)]
pub fn serialize_by_value_id(id: u32) -> String {
    format!("${id:x}")
}

#[inline(always)]
pub fn serialize_promise_id(id: u32) -> String {
    format!("$@{id:x}")
}

/// `$<prefix><hexId>`, used for outlined maps, sets, form data, blobs and
/// server references.
#[inline(always)]
pub fn serialize_prefixed_id(prefix: char, id: u32) -> String {
    format!("${prefix}{id:x}")
}

#[inline(always)]
pub fn serialize_symbol(name: &str) -> String {
    format!("${}{name}", escape::SYMBOL)
}

#[inline(always)]
pub fn serialize_temporary_reference(id: &str) -> String {
    format!("${}{id}", escape::TEMPORARY_REFERENCE)
}

/// Strings starting with `$` get an extra `$` so they are not read as
/// references.
pub fn escape_string(s: &str) -> String {
    if s.starts_with('$') {
        let mut escaped = String::with_capacity(s.len() + 1);
        escaped.push('$');
        escaped.push_str(s);
        escaped
    } else {
        s.to_owned()
    }
}

/// JSON for a number, with string sentinels for values JSON cannot hold.
pub fn serialize_number(n: f64) -> serde_json::Value {
    if n.is_nan() {
        return serde_json::Value::from(escape::NAN);
    }
    if n.is_infinite() {
        return serde_json::Value::from(if n > 0.0 {
            escape::INFINITY
        } else {
            escape::NEG_INFINITY
        });
    }
    if n == 0.0 && n.is_sign_negative() {
        return serde_json::Value::from(escape::NEG_ZERO);
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn header(id: u32, capacity: usize) -> BytesMut {
    let mut row = BytesMut::with_capacity(capacity + 10);
    let mut head = String::with_capacity(10);
    let _ = write!(head, "{id:x}:");
    row.put_slice(head.as_bytes());
    row
}

/// `<id>:<json>\n`
pub fn model_row(id: u32, json: &str) -> Bytes {
    let mut row = header(id, json.len() + 1);
    row.put_slice(json.as_bytes());
    row.put_u8(b'\n');
    row.freeze()
}

/// `<id>:<tag><json>\n`
pub fn tagged_row(id: u32, tag: RowTag, json: &str) -> Bytes {
    let mut row = header(id, json.len() + 2);
    row.put_u8(tag.into());
    row.put_slice(json.as_bytes());
    row.put_u8(b'\n');
    row.freeze()
}

/// `<id>:H<code><json>\n`
pub fn hint_row(id: u32, code: char, json: &str) -> Bytes {
    let mut row = header(id, json.len() + 6);
    row.put_u8(RowTag::Hint.into());
    let mut buf = [0u8; 4];
    row.put_slice(code.encode_utf8(&mut buf).as_bytes());
    row.put_slice(json.as_bytes());
    row.put_u8(b'\n');
    row.freeze()
}

fn length_prefixed(id: u32, tag: u8, payload: &[u8]) -> Bytes {
    let mut row = header(id, payload.len() + 12);
    row.put_u8(tag);
    let mut len = String::with_capacity(8);
    let _ = write!(len, "{:x},", payload.len());
    row.put_slice(len.as_bytes());
    row.put_slice(payload);
    row.freeze()
}

/// `<id>:T<hexLen>,<utf8 bytes>`
pub fn text_row(id: u32, text: &str) -> Bytes {
    length_prefixed(id, RowTag::Text.into(), text.as_bytes())
}

/// `<id>:<tag><hexLen>,<bytes>`
pub fn binary_row(id: u32, kind: TypedArrayKind, bytes: &[u8]) -> Bytes {
    length_prefixed(id, kind.tag(), bytes)
}

/// `<id>:R\n` and friends.
pub fn stream_open_row(id: u32, kind: StreamKind) -> Bytes {
    tagged_row(id, kind.open_tag(), "")
}

/// `<id>:C\n`, or `<id>:C<json>\n` for an iterator return value.
pub fn close_row(id: u32, json: Option<&str>) -> Bytes {
    tagged_row(id, RowTag::Close, json.unwrap_or(""))
}
