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

//! Resource hints sent ahead of the model.

use serde_json::{json, Map, Value as Json};

use crate::error::Error;

/// Extra attributes of a hint, such as `crossOrigin` or `integrity`.
pub type HintOptions = Map<String, Json>;

/// A resource the decoding side may start fetching before it needs it.
///
/// Each hint is written once per request; a second hint with the same
/// [`dedupe_key`](Hint::dedupe_key) is dropped.
#[derive(Clone, Debug, PartialEq)]
pub enum Hint {
    PrefetchDns {
        href: String,
    },
    Preconnect {
        href: String,
        cross_origin: Option<String>,
    },
    Preload {
        href: String,
        as_type: String,
        options: Option<HintOptions>,
    },
    PreloadModule {
        href: String,
        options: Option<HintOptions>,
    },
    PreinitScript {
        src: String,
        options: Option<HintOptions>,
    },
    PreinitStyle {
        href: String,
        precedence: Option<String>,
        options: Option<HintOptions>,
    },
    PreinitModuleScript {
        src: String,
        options: Option<HintOptions>,
    },
}

fn non_empty(options: &Option<HintOptions>) -> Option<&HintOptions> {
    options.as_ref().filter(|o| !o.is_empty())
}

impl Hint {
    pub fn prefetch_dns(href: impl Into<String>) -> Self {
        Hint::PrefetchDns { href: href.into() }
    }

    pub fn preconnect(href: impl Into<String>, cross_origin: Option<String>) -> Self {
        Hint::Preconnect {
            href: href.into(),
            cross_origin,
        }
    }

    pub fn preload(href: impl Into<String>, as_type: impl Into<String>) -> Self {
        Hint::Preload {
            href: href.into(),
            as_type: as_type.into(),
            options: None,
        }
    }

    /// Code following the `H` tag on the wire.
    pub fn code(&self) -> char {
        match self {
            Hint::PrefetchDns { .. } => 'D',
            Hint::Preconnect { .. } => 'C',
            Hint::Preload { .. } => 'L',
            Hint::PreloadModule { .. } => 'm',
            Hint::PreinitScript { .. } => 'X',
            Hint::PreinitStyle { .. } => 'S',
            Hint::PreinitModuleScript { .. } => 'M',
        }
    }

    pub fn dedupe_key(&self) -> String {
        match self {
            Hint::PrefetchDns { href } => format!("D|{href}"),
            Hint::Preconnect { href, cross_origin } => format!(
                "C|{}|{href}",
                cross_origin.as_deref().unwrap_or("null")
            ),
            Hint::Preload {
                href,
                as_type,
                options,
            } => {
                if as_type == "image" {
                    if let Some(options) = options {
                        let src_set = options.get("imageSrcSet").and_then(Json::as_str);
                        let sizes = options.get("imageSizes").and_then(Json::as_str);
                        return match src_set.filter(|s| !s.is_empty()) {
                            Some(src_set) => match sizes {
                                Some(sizes) => format!("L[image][{src_set}][{sizes}]"),
                                None => format!("L[image][{src_set}]"),
                            },
                            None => format!("L[image][][]{href}"),
                        };
                    }
                }
                format!("L[{as_type}]{href}")
            }
            Hint::PreloadModule { href, .. } => format!("m|{href}"),
            Hint::PreinitScript { src, .. } => format!("X|{src}"),
            Hint::PreinitStyle { href, .. } => format!("S|{href}"),
            Hint::PreinitModuleScript { src, .. } => format!("M|{src}"),
        }
    }

    /// JSON written after the hint code.
    pub fn payload(&self) -> Json {
        match self {
            Hint::PrefetchDns { href } => json!(href),
            Hint::Preconnect { href, cross_origin } => match cross_origin {
                Some(co) => json!([href, co]),
                None => json!(href),
            },
            Hint::Preload {
                href,
                as_type,
                options,
            } => match non_empty(options) {
                Some(o) => json!([href, as_type, o]),
                None => json!([href, as_type]),
            },
            Hint::PreloadModule { href: s, options }
            | Hint::PreinitScript { src: s, options }
            | Hint::PreinitModuleScript { src: s, options } => match non_empty(options) {
                Some(o) => json!([s, o]),
                None => json!(s),
            },
            Hint::PreinitStyle {
                href,
                precedence,
                options,
            } => match (non_empty(options), precedence) {
                (Some(o), Some(p)) => json!([href, p, o]),
                (Some(o), None) => json!([href, 0, o]),
                (None, Some(p)) => json!([href, p]),
                (None, None) => json!(href),
            },
        }
    }

    /// Rebuilds a hint from a received `H` row.
    pub fn from_payload(code: char, payload: &Json) -> Result<Self, Error> {
        let invalid = || Error::invalid_data(format!("Invalid hint payload {payload} for code {code:?}"));
        let (first, rest): (&str, &[Json]) = match payload {
            Json::String(s) => (s.as_str(), &[]),
            Json::Array(items) => match items.split_first() {
                Some((Json::String(s), rest)) => (s.as_str(), rest),
                _ => return Err(invalid()),
            },
            _ => return Err(invalid()),
        };
        let text = |i: usize| rest.get(i).and_then(Json::as_str).map(str::to_owned);
        let options = |i: usize| rest.get(i).and_then(Json::as_object).cloned();
        let first = first.to_owned();
        Ok(match code {
            'D' => Hint::PrefetchDns { href: first },
            'C' => Hint::Preconnect {
                href: first,
                cross_origin: text(0),
            },
            'L' => Hint::Preload {
                href: first,
                as_type: text(0).ok_or_else(invalid)?,
                options: options(1),
            },
            'm' => Hint::PreloadModule {
                href: first,
                options: options(0),
            },
            'X' => Hint::PreinitScript {
                src: first,
                options: options(0),
            },
            'S' => Hint::PreinitStyle {
                href: first,
                precedence: text(0),
                options: options(1),
            },
            'M' => Hint::PreinitModuleScript {
                src: first,
                options: options(0),
            },
            _ => return Err(Error::invalid_data(format!("Unknown hint code {code:?}"))),
        })
    }
}
