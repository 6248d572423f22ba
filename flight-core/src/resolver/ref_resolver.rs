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

use std::collections::HashMap;

use crate::value::Value;

/// Reference table for one encoding request.
///
/// RefWriter allocates row ids and maps value identities (pointer addresses
/// of shared handles) to the reference string their first serialization
/// produced, so a revisited value is written as a back-reference. Each entry
/// keeps a clone of its value alive, which keeps the address from being
/// reused for a different value while the request runs.
///
/// # Examples
///
/// ```rust
/// use flight_core::resolver::ref_resolver::RefWriter;
/// use flight_core::value::Value;
///
/// let mut ref_writer = RefWriter::new();
/// let list = Value::array(vec![]);
///
/// assert_eq!(ref_writer.get(&list), None);
/// let id = ref_writer.next_id();
/// ref_writer.record(&list, format!("${id:x}"));
/// assert_eq!(ref_writer.get(&list), Some("$0"));
/// ```
#[derive(Default)]
pub struct RefWriter {
    /// Maps pointer addresses to reference strings
    objects: HashMap<usize, (Value, String)>,
    /// Import row ids of symbols, by name
    symbols: HashMap<String, u32>,
    /// Import row ids of client references, by id (`#async` suffixed when async)
    client_references: HashMap<String, u32>,
    /// Outlined server references, by address
    server_references: HashMap<usize, (Value, String)>,
    /// Next row id to assign
    next_id: u32,
}

impl RefWriter {
    /// Creates a new RefWriter instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next row id. Ids are never reused within a request.
    #[inline(always)]
    pub fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Reference recorded for `value`, if it was seen before.
    pub fn get(&self, value: &Value) -> Option<&str> {
        let identity = value.identity()?;
        self.objects.get(&identity).map(|(_, r)| r.as_str())
    }

    /// Records (or overwrites) the reference of an identity-bearing value.
    ///
    /// Values without identity are ignored.
    pub fn record(&mut self, value: &Value, reference: String) {
        if let Some(identity) = value.identity() {
            self.objects.insert(identity, (value.clone(), reference));
        }
    }

    pub fn symbol(&self, name: &str) -> Option<u32> {
        self.symbols.get(name).copied()
    }

    pub fn record_symbol(&mut self, name: &str, id: u32) {
        self.symbols.insert(name.to_owned(), id);
    }

    pub fn client_reference(&self, key: &str) -> Option<u32> {
        self.client_references.get(key).copied()
    }

    pub fn record_client_reference(&mut self, key: String, id: u32) {
        self.client_references.insert(key, id);
    }

    pub fn server_reference(&self, value: &Value) -> Option<&str> {
        let identity = value.identity()?;
        self.server_references.get(&identity).map(|(_, r)| r.as_str())
    }

    pub fn record_server_reference(&mut self, value: &Value, reference: String) {
        if let Some(identity) = value.identity() {
            self.server_references
                .insert(identity, (value.clone(), reference));
        }
    }
}
