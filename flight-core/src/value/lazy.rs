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

use std::fmt;
use std::rc::Rc;

use crate::resolver::context::{Interrupt, RenderContext};
use crate::value::Value;

type Thunk = dyn Fn(&mut RenderContext<'_>) -> Result<Value, Interrupt>;

/// A value computed while it is being encoded.
///
/// The thunk may run several times: once per attempt, until every
/// thenable it reads through [`RenderContext::use_thenable`] has settled.
/// It must therefore be free of side effects other than reading thenables.
///
/// ```rust
/// use flight_core::value::{Lazy, Thenable, Value};
///
/// let user = Thenable::new();
/// let source = user.clone();
/// let greeting = Lazy::new(move |cx| {
///     let name = cx.use_thenable(&source)?;
///     Ok(Value::from(format!("hello {}", name.as_str().unwrap_or("?"))))
/// });
/// # let _ = (greeting, user);
/// ```
#[derive(Clone)]
pub struct Lazy(Rc<Thunk>);

impl Lazy {
    pub fn new<F>(thunk: F) -> Self
    where
        F: Fn(&mut RenderContext<'_>) -> Result<Value, Interrupt> + 'static,
    {
        Lazy(Rc::new(thunk))
    }

    pub(crate) fn call(&self, cx: &mut RenderContext<'_>) -> Result<Value, Interrupt> {
        (self.0)(cx)
    }

    #[inline(always)]
    pub fn ptr_eq(&self, other: &Lazy) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[inline(always)]
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Lazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lazy(..)")
    }
}
