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

use std::cell::Cell;
use std::rc::Rc;

use crate::error::Error;
use crate::not_allowed;

/// Allows one encode pass at a time among the requests sharing it.
///
/// Requests get their own slot unless the host passes a shared one through
/// [`RequestOptions::renderer`](crate::server::RequestOptions::renderer).
#[derive(Clone, Debug, Default)]
pub struct RendererSlot(Rc<Cell<bool>>);

impl RendererSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.0.get()
    }

    /// Claims the slot until the returned lease is dropped.
    pub fn install(&self) -> Result<RendererLease, Error> {
        if self.0.get() {
            not_allowed!("Another request is already rendering on this renderer.");
        }
        self.0.set(true);
        Ok(RendererLease(self.0.clone()))
    }
}

/// Releases its [`RendererSlot`] on drop.
#[derive(Debug)]
pub struct RendererLease(Rc<Cell<bool>>);

impl Drop for RendererLease {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
