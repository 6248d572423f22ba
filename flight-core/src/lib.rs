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

//! # Flight Core
//!
//! Encoder and decoder for the flight streaming model protocol: a value
//! graph, possibly cyclic and partly asynchronous, is written as a sequence
//! of self-describing rows over one ordered byte stream, and rebuilt on the
//! other side with the same reference topology as bytes arrive.
//!
//! ## Architecture
//!
//! - **`value`**: the value graph (`Value`, `Thenable`, `AsyncStream`, `Lazy`)
//! - **`server`**: the encoder, `Request`, and its flush loop
//! - **`client`**: the decoder, `Response`, and its chunk state machine
//! - **`row`**: row framing, both ways
//! - **`resolver`**: reference table, client manifest and render context
//! - **`buffer`**: destinations and the batching writer
//! - **`config`**, **`error`**, **`types`**, **`util`**
//!
//! ## Rows
//!
//! Every row starts with a hexadecimal id and a colon. Plain model rows carry
//! JSON; tagged rows carry imports (`I`), hints (`H`), errors (`E`),
//! postpones (`P`), text (`T`), binary data and stream markers. Values that
//! need a row of their own are referenced from JSON with `$` escapes, such as
//! `"$1"`, `"$@2"` or `"$Q3"`.
//!
//! ## Usage
//!
//! ```rust
//! use flight_core::buffer::MemoryDestination;
//! use flight_core::client::{Response, ResponseOptions};
//! use flight_core::resolver::manifest::ClientManifest;
//! use flight_core::server::{Request, RequestOptions};
//! use flight_core::value::Value;
//!
//! let shared = Value::object([("name", Value::from("ada"))]);
//! let model = Value::array(vec![shared.clone(), shared]);
//!
//! let mut request = Request::new(model, ClientManifest::new(), RequestOptions::new());
//! let sink = MemoryDestination::new();
//! request.start_flowing(sink.clone()).unwrap();
//! request.perform_work().unwrap();
//!
//! let mut response = Response::new(ResponseOptions::new());
//! let root = response.get_root();
//! response.process_binary_chunk(&sink.to_vec()).unwrap();
//! let decoded = root.value().unwrap();
//! assert!(decoded.at(0).unwrap().same_identity(&decoded.at(1).unwrap()));
//! ```

pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod resolver;
pub mod row;
pub mod server;
pub mod types;
pub mod util;
pub mod value;

pub use client::{create_from_stream, Response, ResponseOptions};
pub use config::Config;
pub use error::Error;
pub use server::{render_to_stream, FlightStream, Request, RequestOptions};
pub use value::{AsyncStream, Lazy, Rejection, Thenable, Value};
