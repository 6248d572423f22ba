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

/// Strings at least this many bytes long are outlined into text rows.
pub const DEFAULT_LARGE_TEXT_THRESHOLD: usize = 1024;

/// Size of the views small rows are batched into before reaching the sink.
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Configuration for flight encoding and decoding.
///
/// This struct holds the options that change what goes on the wire. It is
/// shared by a [`Request`](crate::server::Request) and the writer that
/// batches its rows, so both see the same thresholds.
#[derive(Clone, Debug)]
pub struct Config {
    /// Whether error rows carry the error message and stack in addition to
    /// the digest. Off by default so internal details do not leak.
    pub expose_error_details: bool,
    /// Strings at or above this byte length are sent as `T` rows.
    pub large_text_threshold: usize,
    /// Byte size of the batching views used when flushing.
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            expose_error_details: false,
            large_text_threshold: DEFAULT_LARGE_TEXT_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    /// Creates a new Config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if error messages and stacks are written to error rows.
    #[inline(always)]
    pub fn is_expose_error_details(&self) -> bool {
        self.expose_error_details
    }

    /// Get the byte length from which strings are outlined.
    #[inline(always)]
    pub fn large_text_threshold(&self) -> usize {
        self.large_text_threshold
    }

    /// Get the batching view size.
    #[inline(always)]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
