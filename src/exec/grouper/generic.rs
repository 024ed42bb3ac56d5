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
//! General grouper over per-row variable-width key encodings.

use std::sync::Arc;

use arrow::array::{new_empty_array, ArrayRef, DictionaryArray, PrimitiveArray, UInt32Array};
use arrow::datatypes::DataType;
use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::raw::RawTable;

use crate::common::error::{ExecError, ExecResult};

use super::encoder::{dictionary_values, encode_key_cell};
use super::hash::{hash_bytes_with_seed, seed_from_hasher};
use super::storage::{RowKey, RowStorage};
use super::{
    broadcast_id, normalize_key_columns, Grouper, KeyRows, RetainedKeys,
};

#[derive(Clone, Copy)]
struct KeyEntry {
    hash: u64,
    group_id: u32,
}

/// Per-column dictionary bookkeeping. All batches fed to one grouper must
/// share a bit-identical dictionary; uniques are rebuilt against it so that
/// merge-time re-consumption sees the same dictionary again.
enum DictState {
    NotDict,
    Dict {
        values: Option<ArrayRef>,
        group_indices: Vec<Option<i64>>,
    },
}

pub(super) struct GrouperImpl {
    key_types: Vec<DataType>,
    table: RawTable<KeyEntry>,
    storage: RowStorage,
    keys: Vec<RowKey>,
    retained: RetainedKeys,
    dicts: Vec<DictState>,
    hash_seed: u64,
    scratch: Vec<u8>,
}

impl GrouperImpl {
    pub(super) fn new(key_types: Vec<DataType>) -> Self {
        let dicts = key_types
            .iter()
            .map(|t| match t {
                DataType::Dictionary(_, _) => DictState::Dict {
                    values: None,
                    group_indices: Vec::new(),
                },
                _ => DictState::NotDict,
            })
            .collect();
        Self {
            retained: RetainedKeys::new(key_types.clone()),
            key_types,
            table: RawTable::new(),
            storage: RowStorage::new(64 * 1024),
            keys: Vec::new(),
            dicts,
            hash_seed: seed_from_hasher(&DefaultHashBuilder::default()),
            scratch: Vec::new(),
        }
    }

    fn check_dictionaries(&mut self, columns: &[ArrayRef]) -> ExecResult<()> {
        for (col, column) in columns.iter().enumerate() {
            let DictState::Dict { values, .. } = &mut self.dicts[col] else {
                continue;
            };
            let incoming = dictionary_values(column)?;
            match values {
                None => *values = Some(incoming),
                Some(stored) => {
                    if stored.to_data() != incoming.to_data() {
                        return Err(ExecError::not_implemented(
                            "Unifying differing dictionaries",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn consume_rows(&mut self, columns: &[ArrayRef], num_rows: usize) -> ExecResult<UInt32Array> {
        self.check_dictionaries(columns)?;

        let batch = self.retained.begin_batch(columns);
        let groups_at_begin = self.retained.num_groups();
        let mut ids = Vec::with_capacity(num_rows);

        for row in 0..num_rows {
            self.scratch.clear();
            for column in columns {
                encode_key_cell(column, row, &mut self.scratch)?;
            }
            let hash = hash_bytes_with_seed(self.hash_seed, &self.scratch);

            let keys = &self.keys;
            let storage = &self.storage;
            let scratch = &self.scratch;
            let found = self
                .table
                .find_or_find_insert_slot(
                    hash,
                    |entry| storage.get(keys[entry.group_id as usize]) == scratch.as_slice(),
                    |entry| entry.hash,
                );

            let group_id = match found {
                Ok(bucket) => unsafe { bucket.as_ref().group_id },
                Err(slot) => {
                    let group_id = self.keys.len() as u32;
                    let stored = self.storage.alloc_copy(&self.scratch)?;
                    self.keys.push(stored);
                    self.retained.push_group(batch, row);
                    for (col, column) in columns.iter().enumerate() {
                        if let DictState::Dict { group_indices, .. } = &mut self.dicts[col] {
                            group_indices.push(super::encoder::dictionary_index(column, row)?);
                        }
                    }
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

    fn dictionary_uniques(
        &self,
        data_type: &DataType,
        values: Option<&ArrayRef>,
        group_indices: &[Option<i64>],
    ) -> ExecResult<ArrayRef> {
        use arrow::datatypes::*;

        let Some(values) = values else {
            return Ok(new_empty_array(data_type));
        };
        let DataType::Dictionary(index_type, _) = data_type else {
            return Err(ExecError::internal("dictionary uniques on non-dictionary"));
        };

        macro_rules! rebuild {
            ($key_ty:ty, $native:ty) => {{
                let keys: PrimitiveArray<$key_ty> = group_indices
                    .iter()
                    .map(|v| v.map(|i| i as $native))
                    .collect();
                let array = DictionaryArray::<$key_ty>::try_new(keys, Arc::clone(values))?;
                Ok(Arc::new(array) as ArrayRef)
            }};
        }

        match index_type.as_ref() {
            DataType::Int8 => rebuild!(Int8Type, i8),
            DataType::Int16 => rebuild!(Int16Type, i16),
            DataType::Int32 => rebuild!(Int32Type, i32),
            DataType::Int64 => rebuild!(Int64Type, i64),
            DataType::UInt8 => rebuild!(UInt8Type, u8),
            DataType::UInt16 => rebuild!(UInt16Type, u16),
            DataType::UInt32 => rebuild!(UInt32Type, u32),
            DataType::UInt64 => rebuild!(UInt64Type, u64),
            other => Err(ExecError::not_implemented(format!(
                "dictionary index type {other:?}"
            ))),
        }
    }
}

impl Grouper for GrouperImpl {
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
        self.keys.len() as u32
    }

    fn get_uniques(&self) -> ExecResult<Vec<ArrayRef>> {
        let mut columns = self.retained.uniques()?;
        for (col, dict) in self.dicts.iter().enumerate() {
            if let DictState::Dict {
                values,
                group_indices,
            } = dict
            {
                columns[col] = self.dictionary_uniques(
                    &self.key_types[col],
                    values.as_ref(),
                    group_indices,
                )?;
            }
        }
        Ok(columns)
    }
}
