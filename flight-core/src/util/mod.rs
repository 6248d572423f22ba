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

mod lazy_map;

pub use lazy_map::LazyMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::Error;

/// Parses a lowercase or uppercase hexadecimal row id.
pub fn parse_hex_id(s: &str) -> Result<u32, Error> {
    u32::from_str_radix(s, 16).map_err(|_| Error::invalid_ref(format!("Invalid reference id {s:?}")))
}

/// ISO-8601 with millisecond precision, the way `Date.prototype.toJSON` prints.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_date(s: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::invalid_data(format!("Invalid date {s:?}: {e}")))
}
