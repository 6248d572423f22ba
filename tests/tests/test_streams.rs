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

use anyhow::anyhow;
use flight::{AsyncStream, ClientManifest, RequestOptions, StreamKind, TypedArray, Value};
use futures::executor::block_on;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use test_helpers::{decode, encode, start};

fn stream_at(value: &Value, key: &str) -> AsyncStream {
    value.get(key).unwrap().as_stream().cloned().unwrap()
}

#[test]
fn test_readable_stream_roundtrip() {
    let source = AsyncStream::from_items(
        StreamKind::Readable,
        vec![Value::from("text item"), Value::object([("k", Value::from(1))])],
    );
    let decoded = decode(&encode(Value::object([("s", Value::from(source))])));

    let stream = stream_at(&decoded, "s");
    assert_eq!(stream.kind(), StreamKind::Readable);
    let items: Vec<Value> = block_on(stream.collect::<Vec<_>>())
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(
        items,
        vec![Value::from("text item"), Value::object([("k", Value::from(1))])]
    );
}

#[test]
fn test_byte_stream_items() {
    let source = AsyncStream::from_items(
        StreamKind::ReadableBytes,
        vec![
            Value::from(TypedArray::from_u8(&[1, 2, 3])),
            Value::from(TypedArray::from_u8(&[4])),
        ],
    );
    let decoded = decode(&encode(Value::object([("bytes", Value::from(source))])));
    let items: Vec<Value> = block_on(stream_at(&decoded, "bytes").collect::<Vec<_>>())
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(
        items,
        vec![
            Value::from(TypedArray::from_u8(&[1, 2, 3])),
            Value::from(TypedArray::from_u8(&[4])),
        ]
    );
}

#[test]
fn test_iterator_return_value() {
    let source = AsyncStream::async_iterator();
    source.push(Value::from(1));
    source.push(Value::from(2));
    source.close_with(Value::from("done"));
    let decoded = decode(&encode(Value::object([("it", Value::from(source))])));

    let stream = stream_at(&decoded, "it");
    assert_eq!(stream.kind(), StreamKind::AsyncIterator);
    let items = block_on(stream.clone().collect::<Vec<_>>());
    assert_eq!(items.len(), 2);
    assert_eq!(stream.return_value(), Some(Value::from("done")));
}

#[test]
fn test_stream_items_arrive_as_they_are_pushed() {
    let source = AsyncStream::readable();
    let (mut request, sink) = start(
        Value::object([("s", Value::from(source.clone()))]),
        ClientManifest::new(),
        RequestOptions::new(),
    );
    let opened = sink.to_vec();
    assert!(!sink.is_closed());

    source.push(Value::from(1));
    request.perform_work().unwrap();
    assert!(sink.to_vec().len() > opened.len());
    assert!(!sink.is_closed());

    source.close();
    request.perform_work().unwrap();
    assert!(sink.is_closed());
}

#[test]
fn test_stream_error_reaches_reader() {
    let source = AsyncStream::readable();
    source.push(Value::from("before"));
    source.error(anyhow!("producer failed"));
    let bytes = encode(Value::object([("s", Value::from(source))]));

    let decoded = decode(&bytes);
    let items = block_on(stream_at(&decoded, "s").collect::<Vec<_>>());
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().ok(), Some(&Value::from("before")));
    assert!(items[1].is_err());
}

#[test]
fn test_shared_stream_is_opened_once() {
    let source = AsyncStream::readable();
    source.close();
    let model = Value::object([
        ("first", Value::from(source.clone())),
        ("second", Value::from(source)),
    ]);
    let bytes = encode(model);
    // The second position reuses the reference of the first.
    let decoded = decode(&bytes);
    assert!(decoded
        .get("first")
        .unwrap()
        .same_identity(&decoded.get("second").unwrap()));
}
