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

//! Shared and cyclic references, forward references and split input.

mod test_helpers;

use flight::{ChunkStatus, Response, ResponseOptions, TypedArray, Value};
use pretty_assertions::assert_eq;
use test_helpers::{decode, decode_split, encode, roundtrip, text};

#[test]
fn test_shared_object_is_sent_once() {
    let shared = Value::object([("x", Value::from(1))]);
    let model = Value::object([("a", shared.clone()), ("b", shared)]);
    let bytes = encode(model);
    assert_eq!(text(&bytes), "0:{\"a\":{\"x\":1},\"b\":\"$0:a\"}\n");

    let decoded = decode(&bytes);
    let (a, b) = (decoded.get("a").unwrap(), decoded.get("b").unwrap());
    assert!(a.same_identity(&b));
}

#[test]
fn test_nested_shared_path() {
    let leaf = Value::array(vec![Value::from("leaf")]);
    let model = Value::array(vec![Value::object([("inner", leaf.clone())]), leaf]);
    let bytes = encode(model);
    assert_eq!(text(&bytes), "0:[{\"inner\":[\"leaf\"]},\"$0:0:inner\"]\n");

    let decoded = decode(&bytes);
    let inner = decoded.at(0).unwrap().get("inner").unwrap();
    assert!(inner.same_identity(&decoded.at(1).unwrap()));
}

#[test]
fn test_self_cycle() {
    let root = Value::object([("name", Value::from("root"))]);
    if let Value::Object(entries) = &root {
        entries.borrow_mut().insert("me".to_owned(), root.clone());
    }
    let bytes = encode(root);
    assert_eq!(text(&bytes), "0:{\"name\":\"root\",\"me\":\"$0\"}\n");

    let decoded = decode(&bytes);
    assert!(decoded.get("me").unwrap().same_identity(&decoded));
    assert_eq!(decoded.get("name"), Some(Value::from("root")));
}

#[test]
fn test_indirect_cycle() {
    let parent = Value::object([("kind", Value::from("parent"))]);
    let child = Value::object([("kind", Value::from("child")), ("parent", parent.clone())]);
    if let Value::Object(entries) = &parent {
        entries.borrow_mut().insert("child".to_owned(), child);
    }
    let decoded = roundtrip(parent);
    let child = decoded.get("child").unwrap();
    assert!(child.get("parent").unwrap().same_identity(&decoded));
}

#[test]
fn test_forward_reference_waits_for_row() {
    let mut response = Response::new(ResponseOptions::new());
    let root = response.get_root();
    response.process_string_chunk("0:{\"later\":\"$2\",\"now\":\"$1\"}\n").unwrap();
    response.process_string_chunk("1:\"here\"\n").unwrap();
    assert!(root.is_pending());
    assert_eq!(response.chunk_status(0), Some(ChunkStatus::Blocked));
    assert_eq!(response.chunk_status(2), Some(ChunkStatus::Pending));

    response.process_string_chunk("2:[1,2]\n").unwrap();
    let value = root.value().unwrap();
    assert_eq!(value.get("now"), Some(Value::from("here")));
    assert_eq!(value.get("later"), Some(Value::array(vec![Value::from(1), Value::from(2)])));
}

#[test]
fn test_rows_arriving_in_reverse_order() {
    let mut response = Response::new(ResponseOptions::new());
    let root = response.get_root();
    response
        .process_string_chunk("3:\"deep\"\n2:[\"$3\"]\n1:{\"list\":\"$2\"}\n0:[\"$1\",\"$2\"]\n")
        .unwrap();
    let value = root.value().unwrap();
    let list = value.at(0).unwrap().get("list").unwrap();
    assert!(list.same_identity(&value.at(1).unwrap()));
    assert_eq!(list.at(0), Some(Value::from("deep")));
}

#[test]
fn test_every_split_decodes_the_same() {
    let shared = Value::object([("text", Value::from("héllo wörld ✓"))]);
    let model = Value::object([
        ("first", shared.clone()),
        ("second", shared),
        ("bytes", Value::from(TypedArray::from_u32(&[1, 0xdead_beef, 3]))),
        ("map", Value::map(vec![(Value::from("k"), Value::from("v"))])),
        ("tail", Value::from("x".repeat(2000))),
    ]);
    let bytes = encode(model.clone());
    let whole = decode(&bytes);
    assert_eq!(whole, model);
    for split in [1, 2, 3, 5, 7, 64] {
        assert_eq!(decode_split(&bytes, split), whole, "split into {split} byte pieces");
    }
}
