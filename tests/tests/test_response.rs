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

use anyhow::anyhow;
use flight::{ChunkStatus, Error, Response, ResponseOptions, Value};
use pretty_assertions::assert_eq;

#[test]
fn test_close_rejects_what_never_arrived() {
    let mut response = Response::new(ResponseOptions::new());
    let root = response.get_root();
    response.process_string_chunk("0:{\"a\":\"$1\"}\n").unwrap();
    response.close();

    let reason = root.reason().unwrap();
    assert_eq!(reason.downcast_ref::<Error>(), Some(&Error::ConnectionClosed));
    assert_eq!(response.chunk_status(1), Some(ChunkStatus::Rejected));
    assert!(response.is_closed());
}

#[test]
fn test_get_after_close_is_rejected() {
    let mut response = Response::new(ResponseOptions::new());
    response.close();
    assert!(response.get(5).reason().is_some());
}

#[test]
fn test_rows_after_close_are_ignored() {
    let mut response = Response::new(ResponseOptions::new());
    let root = response.get_root();
    response.close();
    response.process_string_chunk("0:\"late\"\n").unwrap();
    assert!(root.reason().is_some());
}

#[test]
fn test_bad_header_fails_the_response() {
    let mut response = Response::new(ResponseOptions::new());
    let root = response.get_root();
    let err = response.process_string_chunk("zz:1\n").unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)), "{err}");
    assert!(root.reason().is_some());
    assert!(response.is_closed());
}

#[test]
fn test_global_error_reaches_every_waiting_chunk() {
    let mut response = Response::new(ResponseOptions::new());
    let root = response.get_root();
    let other = response.get(3);
    response.process_string_chunk("0:[\"$2\"]\n1:\"kept\"\n").unwrap();
    let kept = response.get(1);
    response.report_global_error(anyhow!("transport reset"));

    assert_eq!(root.reason().unwrap().to_string(), "transport reset");
    assert_eq!(other.reason().unwrap().to_string(), "transport reset");
    assert_eq!(kept.value(), Some(Value::from("kept")));
}

#[test]
fn test_dev_rows_are_skipped() {
    let mut response = Response::new(ResponseOptions::new());
    let root = response.get_root();
    response
        .process_string_chunk("1:D{\"name\":\"Page\"}\n0:\"visible\"\n")
        .unwrap();
    assert_eq!(root.value(), Some(Value::from("visible")));
}
