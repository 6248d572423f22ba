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

//! # Flight
//!
//! Streaming model serialization. A server renders a graph of values into
//! rows with [`render_to_stream`]; a client turns those bytes back into the
//! same graph with [`create_from_stream`], resolving each part as soon as its
//! rows have arrived.
//!
//! ## Features
//!
//! - **Shared and cyclic graphs**: a value reached twice is sent once and
//!   decoded as one value
//! - **Asynchronous values**: promises, lazy values and streams are written
//!   when they settle, each on its own row
//! - **Incremental decoding**: rows may be split at any byte; forward
//!   references wait for their row
//! - **Client and server references**: module exports travel as import rows
//!   through a [`ClientManifest`]
//!
//! ## Round trip
//!
//! ```rust
//! use flight::{create_from_stream, render_to_stream, ClientManifest, Value};
//! use flight::{RequestOptions, ResponseOptions, Thenable};
//! use futures::executor::block_on;
//!
//! let later = Thenable::fulfilled(Value::from("world"));
//! let model = Value::object([
//!     ("greeting", Value::from("hello")),
//!     ("later", Value::promise(&later)),
//! ]);
//!
//! let bytes = render_to_stream(model, ClientManifest::new(), RequestOptions::new());
//! let (root, feed) = create_from_stream(bytes, ResponseOptions::new());
//! block_on(feed).unwrap();
//!
//! let root = root.value().unwrap();
//! assert_eq!(root.get("greeting"), Some(Value::from("hello")));
//! let later = root.get("later").unwrap();
//! assert_eq!(later.as_thenable().unwrap().value(), Some(Value::from("world")));
//! ```
//!
//! ## Errors
//!
//! Values that fail on the server reach the client as rejections carrying
//! only a digest, unless the request exposes error details:
//!
//! ```rust
//! use flight::{render_to_stream, ClientManifest, RequestOptions, Thenable, Value};
//!
//! let failed = Thenable::rejected(anyhow::anyhow!("database is down"));
//! let options = RequestOptions::new().on_error(|_| Some("db-1".to_owned()));
//! let stream = render_to_stream(Value::promise(&failed), ClientManifest::new(), options);
//! # let _ = stream;
//! ```

pub use flight_core::{
    buffer::{Destination, MemoryDestination},
    client::{create_from_stream, Response, ResponseOptions},
    config::Config,
    error::Error,
    resolver::context::{Interrupt, RenderContext},
    resolver::manifest::{ClientManifest, ClientModuleProxy, ClientReferenceMetadata, ModuleLoader},
    server::{render_to_stream, FlightStream, Hint, RendererSlot, Request, RequestOptions},
    types::{ChunkStatus, StreamKind, TypedArrayKind},
    value::{
        AsyncStream, Blob, ClientReference, Lazy, Rejection, ServerReference, TemporaryReferenceSet,
        Thenable, TypedArray, Value,
    },
};
