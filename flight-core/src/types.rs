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

use crate::error::Error;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Tag byte following `<hexId>:` on rows that are not plain model rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RowTag {
    Import = b'I',
    Hint = b'H',
    Error = b'E',
    Postpone = b'P',
    Text = b'T',
    ReadableStream = b'R',
    ReadableByteStream = b'r',
    AsyncIterable = b'X',
    AsyncIterator = b'x',
    Close = b'C',
    // Dev-only rows. Decoded and dropped.
    Debug = b'D',
    Console = b'W',
    Timing = b'N',
}

impl RowTag {
    /// Whether the row payload is length prefixed rather than newline terminated.
    #[inline(always)]
    pub fn is_length_prefixed(tag: u8) -> bool {
        tag == RowTag::Text as u8 || TypedArrayKind::try_from(tag).is_ok()
    }

    /// Whether `tag` is consumed as a tag byte in a newline terminated row.
    ///
    /// Any other byte is the first byte of a JSON payload.
    #[inline(always)]
    pub fn is_newline_tag(tag: u8) -> bool {
        tag.is_ascii_uppercase() || tag == b'#' || tag == b'r' || tag == b'x'
    }
}

/// Element layout of a typed array, keyed by its wire tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum TypedArrayKind {
    ArrayBuffer = b'A',
    Int8 = b'O',
    Uint8 = b'o',
    Uint8Clamped = b'U',
    Int16 = b'S',
    Uint16 = b's',
    Int32 = b'L',
    Uint32 = b'l',
    Float32 = b'G',
    Float64 = b'g',
    BigInt64 = b'M',
    BigUint64 = b'm',
    DataView = b'V',
}

impl TypedArrayKind {
    pub const ALL: [TypedArrayKind; 13] = [
        TypedArrayKind::ArrayBuffer,
        TypedArrayKind::Int8,
        TypedArrayKind::Uint8,
        TypedArrayKind::Uint8Clamped,
        TypedArrayKind::Int16,
        TypedArrayKind::Uint16,
        TypedArrayKind::Int32,
        TypedArrayKind::Uint32,
        TypedArrayKind::Float32,
        TypedArrayKind::Float64,
        TypedArrayKind::BigInt64,
        TypedArrayKind::BigUint64,
        TypedArrayKind::DataView,
    ];

    /// Size in bytes of one element.
    #[inline(always)]
    pub fn element_size(self) -> usize {
        match self {
            TypedArrayKind::ArrayBuffer
            | TypedArrayKind::Int8
            | TypedArrayKind::Uint8
            | TypedArrayKind::Uint8Clamped
            | TypedArrayKind::DataView => 1,
            TypedArrayKind::Int16 | TypedArrayKind::Uint16 => 2,
            TypedArrayKind::Int32 | TypedArrayKind::Uint32 | TypedArrayKind::Float32 => 4,
            TypedArrayKind::Float64 | TypedArrayKind::BigInt64 | TypedArrayKind::BigUint64 => 8,
        }
    }

    #[inline(always)]
    pub fn tag(self) -> u8 {
        self.into()
    }

    pub fn from_tag(tag: u8) -> Result<Self, Error> {
        TypedArrayKind::try_from(tag)
            .map_err(|_| Error::invalid_data(format!("Unknown typed array tag {:?}", tag as char)))
    }
}

/// Flavor of an [`AsyncStream`](crate::value::AsyncStream).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    /// A readable stream of arbitrary values.
    Readable,
    /// A readable byte stream; items are `Uint8Array`s.
    ReadableBytes,
    /// An async iterable that may be iterated again on the other side.
    AsyncIterable,
    /// A one-shot async iterator.
    AsyncIterator,
}

impl StreamKind {
    /// Row tag opening a stream of this kind.
    #[inline(always)]
    pub fn open_tag(self) -> RowTag {
        match self {
            StreamKind::Readable => RowTag::ReadableStream,
            StreamKind::ReadableBytes => RowTag::ReadableByteStream,
            StreamKind::AsyncIterable => RowTag::AsyncIterable,
            StreamKind::AsyncIterator => RowTag::AsyncIterator,
        }
    }

    pub fn from_open_tag(tag: RowTag) -> Option<Self> {
        match tag {
            RowTag::ReadableStream => Some(StreamKind::Readable),
            RowTag::ReadableByteStream => Some(StreamKind::ReadableBytes),
            RowTag::AsyncIterable => Some(StreamKind::AsyncIterable),
            RowTag::AsyncIterator => Some(StreamKind::AsyncIterator),
            _ => None,
        }
    }

    /// Whether the stream can end with a return value (`C<json>`).
    #[inline(always)]
    pub fn is_iterator(self) -> bool {
        matches!(self, StreamKind::AsyncIterable | StreamKind::AsyncIterator)
    }
}

/// Lifecycle of an encoder task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Rendering,
    Completed,
    Aborted,
    Errored,
}

/// Lifecycle of an encoding request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    Open,
    Aborting,
    Closed,
}

/// Observable status of a decoder chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    Blocked,
    Cyclic,
    ResolvedModel,
    Fulfilled,
    Rejected,
}

/// Second character of a `$`-escaped model string.
pub mod escape {
    pub const PREFIX: char = '$';
    pub const PROMISE: char = '@';
    pub const SYMBOL: char = 'S';
    pub const SERVER_REFERENCE: char = 'F';
    pub const TEMPORARY_REFERENCE: char = 'T';
    pub const MAP: char = 'Q';
    pub const SET: char = 'W';
    pub const FORM_DATA: char = 'K';
    pub const BLOB: char = 'B';
    pub const DATE: char = 'D';
    pub const BIGINT: char = 'n';
    pub const INFINITY: &str = "$Infinity";
    pub const NEG_INFINITY: &str = "$-Infinity";
    pub const NEG_ZERO: &str = "$-0";
    pub const NAN: &str = "$NaN";
    pub const UNDEFINED: &str = "$undefined";
}
