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

mod test_helpers;

use std::cell::RefCell;
use std::rc::Rc;

use flight::{AsyncStream, ClientManifest, Rejection, RequestOptions, Thenable, Value};
use flight_core::types::RequestStatus;
use futures::executor::block_on;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use test_helpers::{decode, start};

#[test]
fn test_abort_points_pending_rows_at_one_error() {
    let first = Thenable::new();
    let second = Thenable::new();
    let model = Value::object([
        ("first", Value::promise(&first)),
        ("second", Value::promise(&second)),
    ]);
    let options = RequestOptions::new().on_error(|_| Some("aborted".to_owned()));
    let (mut request, sink) = start(model, ClientManifest::new(), options);
    assert_eq!(sink.to_vec(), b"0:{\"first\":\"$@1\",\"second\":\"$@2\"}\n");

    request.abort(None);
    assert!(sink.is_closed());
    assert_eq!(request.status(), RequestStatus::Closed);
    assert_eq!(
        String::from_utf8(sink.to_vec()).unwrap(),
        "0:{\"first\":\"$@1\",\"second\":\"$@2\"}\n\
         3:E{\"digest\":\"aborted\"}\n\
         1:\"$3\"\n\
         2:\"$3\"\n"
    );

    let decoded = decode(&sink.to_vec());
    for key in ["first", "second"] {
        let promise = decoded.get(key).unwrap();
        let reason = promise.as_thenable().unwrap().reason().unwrap();
        assert_eq!(reason.digest(), Some("aborted"));
    }
}

#[test]
fn test_settlement_after_abort_is_ignored() {
    let pending = Thenable::new();
    let (mut request, sink) = start(
        Value::array(vec![Value::promise(&pending)]),
        ClientManifest::new(),
        RequestOptions::new(),
    );
    request.abort(None);
    let written = sink.to_vec();

    pending.resolve(Value::from("too late"));
    request.perform_work().unwrap();
    assert_eq!(sink.to_vec(), written);
    assert_eq!(sink.close_count(), 1);
}

#[test]
fn test_abort_with_postpone() {
    let postponed = Rc::new(RefCell::new(Vec::new()));
    let seen = postponed.clone();
    let pending = Thenable::new();
    let options = RequestOptions::new().on_postpone(move |reason| seen.borrow_mut().push(reason.to_owned()));
    let (mut request, sink) = start(Value::promise(&pending), ClientManifest::new(), options);

    request.abort(Some(Rejection::postpone("prerender")));
    let text = String::from_utf8(sink.to_vec()).unwrap();
    assert!(text.contains(":P{\"reason\":\"prerender\"}\n"), "{text}");
    assert_eq!(*postponed.borrow(), vec!["prerender".to_owned()]);
}

#[test]
fn test_abort_errors_open_streams_and_cancels_source() {
    let source = AsyncStream::readable();
    source.push(Value::from("first"));
    let (mut request, sink) = start(
        Value::object([("s", Value::from(source.clone()))]),
        ClientManifest::new(),
        RequestOptions::new(),
    );
    assert!(!sink.is_closed());

    request.abort(Some(Rejection::error(anyhow::anyhow!("client went away"))));
    assert!(sink.is_closed());
    assert!(source.cancellation().is_some());
    assert!(!source.push(Value::from("ignored")));

    let decoded = decode(&sink.to_vec());
    let stream = decoded.get("s").unwrap().as_stream().cloned().unwrap();
    let items = block_on(stream.collect::<Vec<_>>());
    assert_eq!(items.len(), 2);
    assert!(items[1].is_err());
}

#[test]
fn test_abort_after_close_is_a_no_op() {
    let (mut request, sink) = start(Value::from("done"), ClientManifest::new(), RequestOptions::new());
    assert!(sink.is_closed());
    request.abort(None);
    assert_eq!(sink.to_vec(), b"0:\"done\"\n");
    assert_eq!(sink.close_count(), 1);
}
