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

use flight::{
    ClientManifest, MemoryDestination, Request, RequestOptions, Response, ResponseOptions, Value,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Renders everything that is ready and returns the request with the bytes
/// written so far.
pub fn start(model: Value, manifest: ClientManifest, options: RequestOptions) -> (Request, MemoryDestination) {
    init_logger();
    let mut request = Request::new(model, manifest, options);
    let sink = MemoryDestination::new();
    request.start_flowing(sink.clone()).unwrap();
    request.perform_work().unwrap();
    (request, sink)
}

/// Encodes a model whose values are all settled.
pub fn encode(model: Value) -> Vec<u8> {
    encode_with(model, ClientManifest::new(), RequestOptions::new())
}

pub fn encode_with(model: Value, manifest: ClientManifest, options: RequestOptions) -> Vec<u8> {
    let (_request, sink) = start(model, manifest, options);
    assert!(sink.is_closed(), "the request still has pending rows");
    sink.to_vec()
}

/// Views an encoded payload that carries no binary rows as text.
pub fn text(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).unwrap()
}

/// Decodes a complete payload, fed in pieces of `split` bytes.
pub fn decode_split(bytes: &[u8], split: usize) -> Value {
    init_logger();
    let mut response = Response::new(ResponseOptions::new());
    let root = response.get_root();
    for part in bytes.chunks(split.max(1)) {
        response.process_binary_chunk(part).unwrap();
    }
    response.close();
    root.value().expect("root did not fulfill")
}

pub fn decode(bytes: &[u8]) -> Value {
    decode_split(bytes, bytes.len())
}

/// Generic helper for encode then decode testing
pub fn roundtrip(model: Value) -> Value {
    decode(&encode(model))
}
