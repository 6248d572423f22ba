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

//! Client references and the manifest that maps them to loadable modules.

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::util::LazyMap;
use crate::value::{ClientReference, Value};

/// Manifest entry for one module (or one export of a module).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientReferenceMetadata {
    pub id: String,
    #[serde(default)]
    pub chunks: Vec<String>,
    pub name: String,
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

/// Maps client reference ids to module metadata.
///
/// Keys are either a full `<module>#<export>` id or a bare module id; a
/// lookup that misses the full id falls back to the module entry and takes
/// the export name from the part after the last `#`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientManifest(HashMap<String, ClientReferenceMetadata>);

impl ClientManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn insert(&mut self, key: impl Into<String>, metadata: ClientReferenceMetadata) {
        self.0.insert(key.into(), metadata);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves the import row payload for `reference`.
    pub fn resolve(&self, reference: &ClientReference) -> Result<ImportMetadata, Error> {
        let path = reference.id();
        let (entry, name) = match self.0.get(path) {
            Some(entry) => (entry, entry.name.clone()),
            None => {
                let found = path.rfind('#').and_then(|idx| {
                    self.0
                        .get(&path[..idx])
                        .map(|entry| (entry, path[idx + 1..].to_owned()))
                });
                found.ok_or_else(|| {
                    Error::invalid_ref(format!(
                        "Could not find the module \"{path}\" in the client manifest."
                    ))
                })?
            }
        };
        Ok(ImportMetadata {
            id: entry.id.clone(),
            chunks: entry.chunks.clone(),
            name,
            is_async: reference.is_async(),
        })
    }
}

/// Payload of an `I` row: `[id, chunks, name]`, with a trailing `1` when the
/// module must be loaded asynchronously.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportMetadata {
    pub id: String,
    pub chunks: Vec<String>,
    pub name: String,
    pub is_async: bool,
}

impl ImportMetadata {
    pub fn to_json(&self) -> serde_json::Value {
        let mut row = vec![
            serde_json::Value::from(self.id.as_str()),
            serde_json::Value::from(self.chunks.clone()),
            serde_json::Value::from(self.name.as_str()),
        ];
        if self.is_async {
            row.push(serde_json::Value::from(1));
        }
        serde_json::Value::Array(row)
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self, Error> {
        let invalid = || Error::invalid_data(format!("Invalid import row {json}"));
        let row = json.as_array().ok_or_else(invalid)?;
        let id = row.first().and_then(|v| v.as_str()).ok_or_else(invalid)?;
        let chunks = row
            .get(1)
            .and_then(|v| v.as_array())
            .ok_or_else(invalid)?
            .iter()
            .map(|c| c.as_str().map(str::to_owned).ok_or_else(invalid))
            .collect::<Result<Vec<_>, _>>()?;
        let name = row.get(2).and_then(|v| v.as_str()).ok_or_else(invalid)?;
        let is_async = row.get(3).and_then(|v| v.as_i64()) == Some(1);
        Ok(ImportMetadata {
            id: id.to_owned(),
            chunks,
            name: name.to_owned(),
            is_async,
        })
    }
}

/// Turns import rows into values on the decoding side.
pub trait ModuleLoader {
    fn load(&self, metadata: &ImportMetadata) -> anyhow::Result<Value>;
}

impl<F> ModuleLoader for F
where
    F: Fn(&ImportMetadata) -> anyhow::Result<Value>,
{
    fn load(&self, metadata: &ImportMetadata) -> anyhow::Result<Value> {
        self(metadata)
    }
}

/// Loader used when the host registers none: every import decodes to a
/// [`ClientReference`] with id `<module id>#<export name>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultModuleLoader;

impl ModuleLoader for DefaultModuleLoader {
    fn load(&self, metadata: &ImportMetadata) -> anyhow::Result<Value> {
        let id = format!("{}#{}", metadata.id, metadata.name);
        let reference = if metadata.is_async {
            ClientReference::new_async(id)
        } else {
            ClientReference::new(id)
        };
        Ok(Value::ClientReference(reference))
    }
}

/// Stand-in for a client module on the encoding side.
///
/// Each export is materialized into a [`ClientReference`] the first time it
/// is read and the same reference is returned afterwards, so repeated uses
/// de-duplicate into one import row.
pub struct ClientModuleProxy {
    module_id: String,
    is_async: bool,
    exports: LazyMap<String, Rc<ClientReference>>,
}

impl ClientModuleProxy {
    pub fn new(module_id: impl Into<String>) -> Self {
        Self::with_async(module_id.into(), false)
    }

    pub fn new_async(module_id: impl Into<String>) -> Self {
        Self::with_async(module_id.into(), true)
    }

    fn with_async(module_id: String, is_async: bool) -> Self {
        let prefix = module_id.clone();
        ClientModuleProxy {
            module_id,
            is_async,
            exports: LazyMap::new(move |name: &String| {
                let id = format!("{prefix}#{name}");
                if is_async {
                    ClientReference::new_async(id)
                } else {
                    ClientReference::new(id)
                }
            }),
        }
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Reference to the whole module.
    pub fn module(&self) -> Value {
        Value::ClientReference(if self.is_async {
            ClientReference::new_async(self.module_id.clone())
        } else {
            ClientReference::new(self.module_id.clone())
        })
    }

    /// Reference to one named export.
    pub fn export(&self, name: &str) -> Value {
        Value::ClientReference(self.exports.get(&name.to_owned()))
    }

    /// Number of exports read so far.
    pub fn materialized(&self) -> usize {
        self.exports.len()
    }
}
