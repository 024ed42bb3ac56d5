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
//! Cache-friendly grouper for all-fixed-width keys: the whole batch is
//! encoded into one contiguous buffer of constant-width rows, and stored
//! group keys live side by side in a second one.

use arrow::array::{ArrayRef, UInt32Array};
use arrow::datatypes::DataType;
use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::raw::RawTable;

use crate::common::error::{ExecError, ExecResult};

use super::encoder::{encode_fixed_cell, fixed_row_width};
use super::hash::{hash_bytes_with_seed, seed_from_hasher};
use super::{broadcast_id, normalize_key_columns, Grouper, KeyRows, RetainedKeys};

#[derive(Clone, Copy)]
struct KeyEntry {
    hash: u64,
    group_id: u32,
}

pub(super) struct GrouperFastImpl {
    key_types: Vec<DataType>,
    row_width: usize,
    table: RawTable<KeyEntry>,
    /// Group keys, `row_width` bytes each, addressed by `group_id * row_width`.
    rows: Vec<u8>,
    retained: RetainedKeys,
    hash_seed: u64,
    scratch: Vec<u8>,
}

impl GrouperFastImpl {
    pub(super) fn new(key_types: Vec<DataType>) -> Self {
        let row_width =
            fixed_row_width(&key_types).expect("fast grouper requires fixed-width keys");
        Self {
            retained: RetainedKeys::new(key_types.clone()),
            key_types,
            row_width,
            table: RawTable::new(),
            rows: Vec::new(),
            hash_seed: seed_from_hasher(&DefaultHashBuilder::default()),
            scratch: Vec::new(),
        }
    }

    fn consume_rows(&mut self, columns: &[ArrayRef], num_rows: usize) -> ExecResult<UInt32Array> {
        // Encode column-by-column into the row-major scratch buffer.
        self.scratch.clear();
        self.scratch
            .try_reserve(self.row_width * num_rows)
            .map_err(|e| ExecError::OutOfMemory(e.to_string()))?;
        self.scratch.resize(self.row_width * num_rows, 0);
        let mut cell = Vec::with_capacity(self.row_width);
        let mut offset = 0;
        for column in columns {
            let width = 1 + super::encoder::fixed_cell_width(column.data_type())
                .ok_or_else(|| ExecError::internal("fast grouper saw a non-fixed key column"))?;
            for row in 0..num_rows {
                cell.clear();
                encode_fixed_cell(column, row, &mut cell)?;
                let start = row * self.row_width + offset;
                self.scratch[start..start + width].copy_from_slice(&cell);
            }
            offset += width;
        }

        let batch = self.retained.begin_batch(columns);
        let groups_at_begin = self.retained.num_groups();
        let mut ids = Vec::with_capacity(num_rows);

        for row in 0..num_rows {
            let encoded = &self.scratch[row * self.row_width..(row + 1) * self.row_width];
            let hash = hash_bytes_with_seed(self.hash_seed, encoded);

            let rows = &self.rows;
            let row_width = self.row_width;
            let found = self.table.find_or_find_insert_slot(
                hash,
                |entry| {
                    let start = entry.group_id as usize * row_width;
                    &rows[start..start + row_width] == encoded
                },
                |entry| entry.hash,
            );

            let group_id = match found {
                Ok(bucket) => unsafe { bucket.as_ref().group_id },
                Err(slot) => {
                    let group_id = (self.rows.len() / self.row_width) as u32;
                    self.rows.try_reserve(self.row_width)?;
                    self.rows.extend_from_slice(encoded);
                    self.retained.push_group(batch, row);
                    unsafe {
                        self.table
                            .insert_in_slot(hash, slot, KeyEntry { hash, group_id });
                    }
                    group_id
                }
            };
            ids.push(group_id);
        }

        self.retained.end_batch(batch, groups_at_begin);
        Ok(UInt32Array::from(ids))
    }
}

impl Grouper for GrouperFastImpl {
    fn key_types(&self) -> &[DataType] {
        &self.key_types
    }

    fn consume(&mut self, keys: &[ArrayRef], num_rows: usize) -> ExecResult<UInt32Array> {
        match normalize_key_columns(&self.key_types, keys, num_rows)? {
            KeyRows::Full(columns) => self.consume_rows(&columns, num_rows),
            KeyRows::SingleRow(columns) => {
                let ids = self.consume_rows(&columns, 1)?;
                Ok(broadcast_id(ids.value(0), num_rows))
            }
        }
    }

    fn num_groups(&self) -> u32 {
        (self.rows.len() / self.row_width) as u32
    }

    fn get_uniques(&self) -> ExecResult<Vec<ArrayRef>> {
        self.retained.uniques()
    }
}
