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

//! Client, server and temporary references.

mod test_helpers;

use std::cell::Cell;
use std::rc::Rc;

use flight::{
    ClientManifest, ClientModuleProxy, ClientReference, RequestOptions, Response, ResponseOptions,
    ServerReference, TemporaryReferenceSet, Value,
};
use flight_core::resolver::manifest::ImportMetadata;
use pretty_assertions::assert_eq;
use test_helpers::{decode, encode, encode_with, roundtrip, text};

fn manifest() -> ClientManifest {
    ClientManifest::from_json(
        r#"{
            "./Button.js": {"id": "btn", "chunks": ["c1", "c1.js"], "name": "*"},
            "./Lazy.js#default": {"id": "lazy", "chunks": [], "name": "default", "async": true}
        }"#,
    )
    .unwrap()
}

#[test]
fn test_client_reference_import_row() {
    let module = ClientModuleProxy::new("./Button.js");
    let model = Value::array(vec![module.export("Button"), module.export("Button")]);
    let bytes = encode_with(model, manifest(), RequestOptions::new());
    assert_eq!(
        text(&bytes),
        "1:I[\"btn\",[\"c1\",\"c1.js\"],\"Button\"]\n0:[\"$1\",\"$1\"]\n"
    );
    assert_eq!(module.materialized(), 1);

    let decoded = decode(&bytes);
    assert_eq!(decoded.at(0), Some(Value::ClientReference(ClientReference::new("btn#Button"))));
}

#[test]
fn test_async_client_reference() {
    let model = Value::ClientReference(ClientReference::new_async("./Lazy.js#default"));
    let bytes = encode_with(model, manifest(), RequestOptions::new());
    assert_eq!(text(&bytes), "1:I[\"lazy\",[],\"default\",1]\n0:\"$1\"\n");
}

#[test]
fn test_unknown_client_reference_errors_its_row() {
    let model = Value::object([("missing", Value::ClientReference(ClientReference::new("./Nope.js#X")))]);
    let options = RequestOptions::new().on_error(|_| Some("no-module".to_owned()));
    let bytes = encode_with(model, manifest(), options);
    assert_eq!(text(&bytes), "0:{\"missing\":\"$1\"}\n1:E{\"digest\":\"no-module\"}\n");
}

#[test]
fn test_unknown_client_reference_errors_once() {
    let missing = || Value::ClientReference(ClientReference::new("./Nope.js#X"));
    let model = Value::object([("first", missing()), ("second", missing())]);
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let options = RequestOptions::new().on_error(move |_| {
        counter.set(counter.get() + 1);
        Some("no-module".to_owned())
    });
    let bytes = encode_with(model, manifest(), options);
    assert_eq!(
        text(&bytes),
        "0:{\"first\":\"$1\",\"second\":\"$1\"}\n1:E{\"digest\":\"no-module\"}\n"
    );
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_custom_module_loader() {
    let module = ClientModuleProxy::new("./Button.js");
    let bytes = encode_with(module.export("Icon"), manifest(), RequestOptions::new());

    let options = ResponseOptions::new().module_loader(|metadata: &ImportMetadata| -> anyhow::Result<Value> {
        Ok(Value::from(format!("{}/{}", metadata.id, metadata.name)))
    });
    let mut response = Response::new(options);
    let root = response.get_root();
    response.process_binary_chunk(&bytes).unwrap();
    assert_eq!(root.value(), Some(Value::from("btn/Icon")));
}

#[test]
fn test_server_reference_roundtrip() {
    let action = Value::ServerReference(ServerReference::with_bound(
        "actions#save",
        vec![Value::from(1), Value::from("draft")],
    ));
    let model = Value::object([("save", action.clone()), ("again", action.clone())]);
    let decoded = roundtrip(model);

    let save = decoded.get("save").unwrap();
    assert_eq!(save, action);
    assert!(save.same_identity(&decoded.get("again").unwrap()));

    let bare = Value::ServerReference(ServerReference::new("actions#ping"));
    assert_eq!(roundtrip(bare.clone()), bare);
}

#[test]
fn test_temporary_reference_goes_back_by_id() {
    let set = TemporaryReferenceSet::new();
    let mut response = Response::new(ResponseOptions::new().temporary_references(set.clone()));
    let root = response.get_root();
    response.process_string_chunk("0:{\"opaque\":\"$Tform.0\"}\n").unwrap();
    let opaque = root.value().unwrap().get("opaque").unwrap();
    assert_eq!(set.len(), 1);

    let options = RequestOptions::new().temporary_references(set);
    let bytes = encode_with(Value::array(vec![opaque]), ClientManifest::new(), options);
    assert_eq!(text(&bytes), "0:[\"$Tform.0\"]\n");
}

#[test]
fn test_temporary_reference_without_a_set_fails() {
    let set = TemporaryReferenceSet::new();
    let opaque = set.resolve("x");
    let bytes = encode(Value::array(vec![opaque]));
    assert!(text(&bytes).starts_with("0:E"), "{}", text(&bytes));
}
