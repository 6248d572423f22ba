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
use crate::types::RowTag;

/// One complete row as it came off the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRow {
    pub id: u32,
    /// Tag byte, or 0 for a plain model row.
    pub tag: u8,
    pub payload: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RowState {
    Id,
    Tag,
    Length,
    ChunkByNewline,
    ChunkByLength,
}

/// Incremental row splitter.
///
/// Bytes may arrive in any chunking, including splits inside the id, the
/// length prefix, a UTF-8 sequence or a binary payload; a row is only
/// handed out once all of its bytes are buffered.
pub struct RowParser {
    state: RowState,
    row_id: u32,
    row_tag: u8,
    /// Bytes still expected for a length-prefixed row.
    row_length: usize,
    buffer: Vec<u8>,
}

impl Default for RowParser {
    fn default() -> Self {
        RowParser {
            state: RowState::Id,
            row_id: 0,
            row_tag: 0,
            row_length: 0,
            buffer: Vec::new(),
        }
    }
}

#[inline(always)]
fn hex_digit(b: u8) -> Result<u32, Error> {
    (b as char)
        .to_digit(16)
        .ok_or_else(|| Error::invalid_data(format!("Invalid hex digit {:?} in row header", b as char)))
}

impl RowParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no row is partially buffered.
    pub fn is_idle(&self) -> bool {
        self.state == RowState::Id && self.row_id == 0 && self.buffer.is_empty()
    }

    fn take_row(&mut self) -> RawRow {
        let row = RawRow {
            id: self.row_id,
            tag: self.row_tag,
            payload: std::mem::take(&mut self.buffer),
        };
        self.state = RowState::Id;
        self.row_id = 0;
        self.row_tag = 0;
        self.row_length = 0;
        row
    }

    /// Splits `chunk` into rows, calling `on_row` for each completed one.
    pub fn feed(
        &mut self,
        chunk: &[u8],
        mut on_row: impl FnMut(RawRow) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let mut i = 0;
        while i < chunk.len() {
            let end = match self.state {
                RowState::Id => {
                    let b = chunk[i];
                    i += 1;
                    if b == b':' {
                        self.state = RowState::Tag;
                    } else {
                        self.row_id = self
                            .row_id
                            .checked_mul(16)
                            .ok_or_else(|| Error::invalid_data("Row id overflows u32"))?
                            | hex_digit(b)?;
                    }
                    continue;
                }
                RowState::Tag => {
                    let b = chunk[i];
                    if RowTag::is_length_prefixed(b) {
                        self.row_tag = b;
                        self.state = RowState::Length;
                        i += 1;
                    } else if RowTag::is_newline_tag(b) {
                        self.row_tag = b;
                        self.state = RowState::ChunkByNewline;
                        i += 1;
                    } else {
                        // Not a tag: the first byte of a JSON payload.
                        self.row_tag = 0;
                        self.state = RowState::ChunkByNewline;
                    }
                    continue;
                }
                RowState::Length => {
                    let b = chunk[i];
                    i += 1;
                    if b == b',' {
                        self.state = RowState::ChunkByLength;
                    } else {
                        self.row_length = self
                            .row_length
                            .checked_mul(16)
                            .ok_or_else(|| Error::invalid_data("Row length overflows usize"))?
                            | hex_digit(b)? as usize;
                    }
                    continue;
                }
                RowState::ChunkByNewline => chunk[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map(|pos| i + pos),
                RowState::ChunkByLength => {
                    if chunk.len() - i >= self.row_length {
                        Some(i + self.row_length)
                    } else {
                        None
                    }
                }
            };
            match end {
                Some(end) => {
                    let by_newline = self.state == RowState::ChunkByNewline;
                    self.buffer.extend_from_slice(&chunk[i..end]);
                    let row = self.take_row();
                    on_row(row)?;
                    i = if by_newline { end + 1 } else { end };
                }
                None => {
                    let rest = &chunk[i..];
                    self.buffer.extend_from_slice(rest);
                    if self.state == RowState::ChunkByLength {
                        self.row_length -= rest.len();
                    }
                    break;
                }
            }
        }
        // An empty binary payload completes as soon as its header does.
        if self.state == RowState::ChunkByLength && self.row_length == 0 {
            let row = self.take_row();
            on_row(row)?;
        }
        Ok(())
    }
}
