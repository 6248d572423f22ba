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

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A map whose entries are produced by a resolver on first access and cached.
///
/// ```rust
/// use flight_core::util::LazyMap;
///
/// let squares = LazyMap::new(|n: &u32| n * n);
/// assert!(!squares.is_materialized(&4));
/// assert_eq!(squares.get(&4), 16);
/// assert!(squares.is_materialized(&4));
/// ```
pub struct LazyMap<K, V> {
    resolver: Box<dyn Fn(&K) -> V>,
    cache: RefCell<HashMap<K, V>>,
}

impl<K, V> LazyMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(resolver: impl Fn(&K) -> V + 'static) -> Self {
        LazyMap {
            resolver: Box::new(resolver),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Returns the cached entry, resolving it first if needed.
    pub fn get(&self, key: &K) -> V {
        if let Some(value) = self.cache.borrow().get(key) {
            return value.clone();
        }
        let value = (self.resolver)(key);
        self.cache
            .borrow_mut()
            .entry(key.clone())
            .or_insert(value)
            .clone()
    }

    pub fn is_materialized(&self, key: &K) -> bool {
        self.cache.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }
}

impl<K: fmt::Debug, V> fmt::Debug for LazyMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyMap")
            .field("materialized", &self.cache.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}
