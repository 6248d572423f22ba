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

use anyhow::anyhow;
use bytes::Bytes;
use log::{trace, warn};
use serde_json::{json, Value as Json};

use super::task::Task;
use super::{Hint, Request};
use crate::row::writer::{hint_row, model_row, serialize_by_value_id, tagged_row};
use crate::types::{RequestStatus, RowTag};
use crate::value::{Rejection, Value};

impl Request {
    /// Allocates a task and its row id.
    ///
    /// The task's row is owed from here on, so `pending_chunks` counts it
    /// until that row is flushed.
    pub(super) fn create_task(
        &mut self,
        model: Value,
        key_path: Option<String>,
        implicit_slot: bool,
    ) -> Task {
        self.pending_chunks += 1;
        let id = self.ref_writer.next_id();
        if key_path.is_none() && !implicit_slot {
            self.ref_writer.record(&model, serialize_by_value_id(id));
        }
        self.abortable.insert(id);
        trace!("created task {id} for {}", model.type_name());
        Task::new(id, model, key_path, implicit_slot)
    }

    /// Allocates an id for a standalone row.
    pub(super) fn allocate_row(&mut self) -> u32 {
        self.pending_chunks += 1;
        self.ref_writer.next_id()
    }

    pub(super) fn push_import_row(&mut self, row: Bytes) {
        trace!("queued import row {:?}", String::from_utf8_lossy(&row));
        self.completed_import_chunks.push_back(row);
    }

    pub(super) fn push_regular_row(&mut self, row: Bytes) {
        trace!("queued row of {} bytes", row.len());
        self.completed_regular_chunks.push_back(row);
    }

    pub(super) fn push_error_row(&mut self, row: Bytes) {
        trace!("queued error row {:?}", String::from_utf8_lossy(&row));
        self.completed_error_chunks.push_back(row);
    }

    pub(super) fn emit_model_row(&mut self, id: u32, json: &Json) {
        self.push_regular_row(model_row(id, &json.to_string()));
    }

    /// Writes the hint unless an equal one was already sent.
    pub(super) fn queue_hint(&mut self, hint: Hint) -> bool {
        if self.status == RequestStatus::Closed {
            warn!("Dropping {:?} hint sent after the request closed", hint.code());
            return false;
        }
        if !self.written_hints.insert(hint.dedupe_key()) {
            return false;
        }
        // Hints take an id but are never counted as pending.
        let id = self.ref_writer.next_id();
        let row = hint_row(id, hint.code(), &hint.payload().to_string());
        trace!("queued hint row {:?}", String::from_utf8_lossy(&row));
        self.completed_hint_chunks.push_back(row);
        true
    }

    pub(super) fn log_recoverable_error(&mut self, err: &anyhow::Error) -> String {
        (self.on_error)(err).unwrap_or_default()
    }

    fn emit_error_row(&mut self, id: u32, digest: String, err: &anyhow::Error) {
        let payload = if self.config.is_expose_error_details() {
            let stack = err
                .chain()
                .skip(1)
                .map(|cause| format!("    caused by: {cause}"))
                .collect::<Vec<_>>()
                .join("\n");
            json!({"digest": digest, "message": err.to_string(), "stack": stack})
        } else {
            json!({ "digest": digest })
        };
        self.push_error_row(tagged_row(id, RowTag::Error, &payload.to_string()));
    }

    fn emit_postpone_row(&mut self, id: u32, reason: &str) {
        let payload = json!({ "reason": reason });
        self.push_error_row(tagged_row(id, RowTag::Postpone, &payload.to_string()));
    }

    /// Writes the terminal row of a failed or postponed value on `id`.
    pub(super) fn emit_rejection(&mut self, id: u32, reason: &Rejection) {
        match reason {
            Rejection::Postpone(postpone) => {
                (self.on_postpone)(&postpone.reason);
                self.emit_postpone_row(id, &postpone.reason);
            }
            Rejection::Error(err) => {
                let digest = self.log_recoverable_error(err);
                self.emit_error_row(id, digest, err);
            }
        }
    }

    /// Id of the row every aborted reference points at, written on first use.
    pub(super) fn fatal_reference(&mut self) -> u32 {
        if let Some(id) = self.fatal_error {
            return id;
        }
        let id = self.allocate_row();
        self.fatal_error = Some(id);
        let err = anyhow!("The render was aborted by the server without a reason.");
        let digest = self.log_recoverable_error(&err);
        self.emit_error_row(id, digest, &err);
        id
    }
}
