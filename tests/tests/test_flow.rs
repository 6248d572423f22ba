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

//! Flushing, hints, backpressure and driving a request as a stream.

mod test_helpers;

use std::cell::RefCell;
use std::rc::Rc;

use flight::{
    create_from_stream, render_to_stream, ClientManifest, Error, Hint, MemoryDestination, Request,
    RequestOptions, RendererSlot, Response, ResponseOptions, Thenable, Value,
};
use futures::executor::block_on;
use pretty_assertions::assert_eq;
use test_helpers::{encode_with, init_logger, start, text};

#[test]
fn test_hints_are_written_once_before_rows() {
    let model = Value::object([(
        "styled",
        Value::lazy(|cx| {
            cx.hint(Hint::preload("/style.css", "style"));
            cx.hint(Hint::preload("/style.css", "style"));
            Ok(Value::from("x"))
        }),
    )]);
    let bytes = encode_with(model, ClientManifest::new(), RequestOptions::new());
    assert_eq!(text(&bytes), "1:HL[\"/style.css\",\"style\"]\n0:{\"styled\":\"x\"}\n");

    let hints = Rc::new(RefCell::new(Vec::new()));
    let seen = hints.clone();
    let mut response = Response::new(ResponseOptions::new().on_hint(move |hint| seen.borrow_mut().push(hint)));
    let root = response.get_root();
    response.process_binary_chunk(&bytes).unwrap();
    assert_eq!(*hints.borrow(), vec![Hint::preload("/style.css", "style")]);
    assert_eq!(root.value().unwrap().get("styled"), Some(Value::from("x")));
}

#[test]
fn test_host_hints_while_open() {
    let pending = Thenable::new();
    let (mut request, sink) = start(
        Value::array(vec![Value::promise(&pending)]),
        ClientManifest::new(),
        RequestOptions::new(),
    );
    assert!(request.hint(Hint::prefetch_dns("cdn.example")));
    assert!(!request.hint(Hint::prefetch_dns("cdn.example")));
    assert_eq!(sink.to_vec(), b"0:[\"$@1\"]\n2:HD\"cdn.example\"\n");

    pending.resolve(Value::Null);
    request.perform_work().unwrap();
    assert!(sink.is_closed());
    assert!(!request.hint(Hint::prefetch_dns("late.example")));
}

fn wide_model() -> Value {
    Value::array((0..20).map(|i| Value::from(format!("row number {i}"))).collect())
}

#[test]
fn test_backpressure_preserves_output() {
    let options = || RequestOptions::new().large_text_threshold(8).chunk_size(16);
    let expected = encode_with(wide_model(), ClientManifest::new(), options());

    init_logger();
    let mut request = Request::new(wide_model(), ClientManifest::new(), options());
    request.perform_work().unwrap();
    let sink = MemoryDestination::with_high_water_mark(1);
    request.start_flowing(sink.clone()).unwrap();

    let mut out = Vec::new();
    let mut pulls = 0;
    loop {
        for chunk in sink.take_chunks() {
            out.extend_from_slice(&chunk);
        }
        if sink.is_closed() {
            break;
        }
        request.pull();
        pulls += 1;
    }
    assert!(pulls > 1);
    assert_eq!(out, expected);
}

#[test]
fn test_busy_renderer_is_rejected() {
    let slot = RendererSlot::new();
    let pending = Thenable::new();
    let mut request = Request::new(
        Value::promise(&pending),
        ClientManifest::new(),
        RequestOptions::new().renderer(slot.clone()),
    );

    let lease = slot.install().unwrap();
    assert!(slot.is_busy());
    assert!(matches!(request.perform_work(), Err(Error::NotAllowed(_))));
    assert_eq!(request.pending_chunks(), 1);
    drop(lease);

    assert!(!slot.is_busy());
    request.perform_work().unwrap();
    assert_eq!(request.pending_chunks(), 2);
}

#[test]
fn test_stream_to_response_with_late_value() {
    init_logger();
    let later = Thenable::new();
    let model = Value::object([
        ("now", Value::from("ready")),
        ("later", Value::promise(&later)),
    ]);
    let encoded = render_to_stream(model, ClientManifest::new(), RequestOptions::new());
    let (root, feed) = create_from_stream(encoded, ResponseOptions::new());

    let resolver = {
        let later = later.clone();
        async move {
            later.resolve(Value::from("eventually"));
        }
    };
    let (fed, ()) = block_on(async { futures::join!(feed, resolver) });
    fed.unwrap();

    let value = root.value().unwrap();
    assert_eq!(value.get("now"), Some(Value::from("ready")));
    let late = value.get("later").unwrap();
    assert_eq!(late.as_thenable().unwrap().value(), Some(Value::from("eventually")));
}
