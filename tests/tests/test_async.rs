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

//! Promises, lazy values, errors and postpones.

mod test_helpers;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::anyhow;
use flight::{
    ClientManifest, Error, Interrupt, Rejection, RequestOptions, Response, ResponseOptions,
    Thenable, Value,
};
use pretty_assertions::assert_eq;
use test_helpers::{decode, encode_with, start, text};

fn decode_root(bytes: &[u8]) -> Thenable {
    let mut response = Response::new(ResponseOptions::new());
    let root = response.get_root();
    response.process_binary_chunk(bytes).unwrap();
    response.close();
    root
}

#[test]
fn test_promise_written_when_it_settles() {
    let user = Thenable::new();
    let model = Value::object([("user", Value::promise(&user))]);
    let (mut request, sink) = start(model, ClientManifest::new(), RequestOptions::new());
    assert_eq!(sink.to_vec(), b"0:{\"user\":\"$@1\"}\n");
    assert!(!sink.is_closed());
    assert_eq!(request.pending_chunks(), 1);

    user.resolve(Value::object([("name", Value::from("ada"))]));
    request.perform_work().unwrap();
    assert!(sink.is_closed());

    let decoded = decode(&sink.to_vec());
    let user = decoded.get("user").unwrap();
    let user = user.as_thenable().unwrap().value().unwrap();
    assert_eq!(user.get("name"), Some(Value::from("ada")));
}

#[test]
fn test_same_promise_is_one_row() {
    let shared = Thenable::fulfilled(Value::from(42));
    let model = Value::array(vec![Value::promise(&shared), Value::promise(&shared)]);
    let bytes = encode_with(model, ClientManifest::new(), RequestOptions::new());
    assert_eq!(text(&bytes), "0:[\"$@1\",\"$@1\"]\n1:42\n");
}

#[test]
fn test_rejected_promise_carries_digest() {
    let failed = Thenable::rejected(anyhow!("database is down"));
    let options = RequestOptions::new().on_error(|err| {
        assert_eq!(err.to_string(), "database is down");
        Some("db-1".to_owned())
    });
    let bytes = encode_with(Value::promise(&failed), ClientManifest::new(), options);
    assert_eq!(text(&bytes), "0:\"$@1\"\n1:E{\"digest\":\"db-1\"}\n");

    let root = decode_root(&bytes);
    let promise = root.value().unwrap();
    let reason = promise.as_thenable().unwrap().reason().unwrap();
    assert_eq!(reason.digest(), Some("db-1"));
    assert_eq!(reason.to_string(), flight_core::error::OMITTED_MESSAGE);
}

#[test]
fn test_exposed_error_details() {
    let failed = Thenable::rejected(anyhow!("database is down"));
    let options = RequestOptions::new()
        .expose_error_details(true)
        .on_error(|_| Some("db-1".to_owned()));
    let bytes = encode_with(Value::promise(&failed), ClientManifest::new(), options);

    let root = decode_root(&bytes);
    let reason = root.value().unwrap().as_thenable().unwrap().reason().unwrap();
    match reason.downcast_ref::<Error>() {
        Some(Error::Server { digest, message, .. }) => {
            assert_eq!(digest, "db-1");
            assert_eq!(message, "database is down");
        }
        other => panic!("expected a server error, got {other:?}"),
    }
}

#[test]
fn test_lazy_value_suspends_into_its_own_row() {
    let data = Thenable::new();
    let source = data.clone();
    let model = Value::object([(
        "data",
        Value::lazy(move |cx| {
            let value = cx.use_thenable(&source)?;
            Ok(Value::array(vec![value]))
        }),
    )]);
    let (mut request, sink) = start(model, ClientManifest::new(), RequestOptions::new());
    assert_eq!(sink.to_vec(), b"0:{\"data\":\"$1\"}\n");

    data.resolve(Value::from("ok"));
    request.perform_work().unwrap();
    assert!(sink.is_closed());
    assert_eq!(sink.to_vec(), b"0:{\"data\":\"$1\"}\n1:[\"ok\"]\n");

    let decoded = decode(&sink.to_vec());
    assert_eq!(decoded.get("data"), Some(Value::array(vec![Value::from("ok")])));
}

#[test]
fn test_lazy_root_resolves_in_place() {
    let model = Value::lazy(|_| Ok(Value::object([("ready", Value::from(true))])));
    let bytes = encode_with(model, ClientManifest::new(), RequestOptions::new());
    assert_eq!(text(&bytes), "0:{\"ready\":true}\n");
}

#[test]
fn test_error_in_child_fails_the_row() {
    let model = Value::object([
        ("fine", Value::from(1)),
        ("broken", Value::lazy(|_| Err(anyhow!("boom").into()))),
    ]);
    let options = RequestOptions::new().on_error(|_| Some("boom-digest".to_owned()));
    let bytes = encode_with(model, ClientManifest::new(), options);
    assert_eq!(text(&bytes), "0:E{\"digest\":\"boom-digest\"}\n");

    let root = decode_root(&bytes);
    assert_eq!(root.reason().unwrap().digest(), Some("boom-digest"));
}

#[test]
fn test_postponed_child_gets_its_own_row() {
    let postponed = Rc::new(RefCell::new(Vec::new()));
    let seen = postponed.clone();
    let model = Value::object([(
        "dynamic",
        Value::lazy(|_| Err(Interrupt::Throw(Rejection::postpone("needs cookies")))),
    )]);
    let options = RequestOptions::new().on_postpone(move |reason| seen.borrow_mut().push(reason.to_owned()));
    let bytes = encode_with(model, ClientManifest::new(), options);
    assert_eq!(text(&bytes), "0:{\"dynamic\":\"$1\"}\n1:P{\"reason\":\"needs cookies\"}\n");
    assert_eq!(*postponed.borrow(), vec!["needs cookies".to_owned()]);

    let root = decode_root(&bytes);
    assert!(root.reason().unwrap().is_postpone());
}
