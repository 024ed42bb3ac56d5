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
//! Hash grouper: maps rows of a key batch to dense u32 group ids.
//!
//! Responsibilities:
//! - Assigns ids in order of first appearance, with null-aware per-column
//!   equality (bit-pattern equality for floats: one group for all NaNs,
//!   distinct groups for -0.0 and +0.0).
//! - Recovers the distinct key tuples in id order (`get_uniques`).
//! - Provides the `make_groupings` / `apply_groupings` reshaping utilities.
//!
//! Key exported interfaces:
//! - Types: `Grouper`; functions: `make_grouper`, `make_groupings`,
//!   `apply_groupings`.
//!
//! Two implementations sit behind `make_grouper`: a general one for every
//! supported key type and a cache-friendly one restricted to all-fixed-width
//! keys. Selection is internal; observable behavior is identical.

mod encoder;
mod fast;
mod generic;
mod hash;
mod storage;

use std::sync::Arc;

use arrow::array::{
    new_empty_array, Array, ArrayRef, Int32Array, ListArray, UInt32Array,
};
use arrow::buffer::OffsetBuffer;
use arrow::compute::{interleave, take};
use arrow::datatypes::{DataType, Field};

use crate::common::error::{ExecError, ExecResult};

pub(crate) use encoder::is_supported_key_type;
use fast::GrouperFastImpl;
use generic::GrouperImpl;

/// Maps rows of a key batch to dense group identifiers.
///
/// Invariant: after any sequence of `consume` calls, `num_groups` equals the
/// count of distinct key tuples observed and every emitted id lies in
/// `[0, num_groups)`.
pub trait Grouper: Send {
    /// Key column types this grouper was constructed with.
    fn key_types(&self) -> &[DataType];

    /// Assign one id per row. Each column must be full-length or a length-1
    /// broadcast; broadcast rows receive the single tuple's id replicated.
    fn consume(&mut self, keys: &[ArrayRef], num_rows: usize) -> ExecResult<UInt32Array>;

    fn num_groups(&self) -> u32;

    /// The distinct key tuples in id order; each column has `num_groups`
    /// rows. A later call extends an earlier one.
    fn get_uniques(&self) -> ExecResult<Vec<ArrayRef>>;
}

impl std::fmt::Debug for dyn Grouper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Grouper")
    }
}

/// Construct a grouper for the given key column types, rejecting nested
/// types with `NotImplemented`. All-fixed-width descriptors select the fast
/// implementation.
pub fn make_grouper(key_types: &[DataType]) -> ExecResult<Box<dyn Grouper>> {
    for data_type in key_types {
        if !is_supported_key_type(data_type) {
            return Err(ExecError::not_implemented(format!(
                "Keys of type {data_type:?}"
            )));
        }
    }
    if !key_types.is_empty() && encoder::fixed_row_width(key_types).is_some() {
        Ok(Box::new(GrouperFastImpl::new(key_types.to_vec())))
    } else {
        Ok(Box::new(GrouperImpl::new(key_types.to_vec())))
    }
}

/// Given an id column, build one ascending row-index list per group:
/// element `i` of the result holds the positions where `ids == i`.
pub fn make_groupings(ids: &UInt32Array, num_groups: u32) -> ExecResult<ListArray> {
    if ids.null_count() != 0 {
        return Err(ExecError::invalid("MakeGroupings with null ids"));
    }
    let mut counts = vec![0usize; num_groups as usize];
    for row in 0..ids.len() {
        let id = ids.value(row);
        if id >= num_groups {
            return Err(ExecError::invalid(format!(
                "group id {id} out of range [0, {num_groups})"
            )));
        }
        counts[id as usize] += 1;
    }

    let offsets = OffsetBuffer::<i32>::from_lengths(counts.iter().copied());
    let mut cursors: Vec<usize> = offsets
        .iter()
        .take(num_groups as usize)
        .map(|o| *o as usize)
        .collect();
    let mut positions = vec![0i32; ids.len()];
    for row in 0..ids.len() {
        let id = ids.value(row) as usize;
        positions[cursors[id]] = row as i32;
        cursors[id] += 1;
    }

    Ok(ListArray::new(
        Arc::new(Field::new_list_field(DataType::Int32, true)),
        offsets,
        Arc::new(Int32Array::from(positions)),
        None,
    ))
}

/// Reshape a values column by the row-index lists of `make_groupings`:
/// `result[i] = values.take(groupings[i])`.
pub fn apply_groupings(groupings: &ListArray, values: &ArrayRef) -> ExecResult<ListArray> {
    let indices = groupings
        .values()
        .as_any()
        .downcast_ref::<Int32Array>()
        .ok_or_else(|| ExecError::invalid("ApplyGroupings expects int32 groupings"))?;
    let taken = take(values.as_ref(), indices, None)?;
    Ok(ListArray::new(
        Arc::new(Field::new_list_field(values.data_type().clone(), true)),
        groupings.offsets().clone(),
        taken,
        None,
    ))
}

/// Key columns of the consume call after broadcast normalization.
pub(crate) enum KeyRows {
    /// Columns are full-length; consume row by row.
    Full(Vec<ArrayRef>),
    /// Every column was a length-1 broadcast: consume the single tuple and
    /// replicate its id to the batch length.
    SingleRow(Vec<ArrayRef>),
}

pub(crate) fn normalize_key_columns(
    key_types: &[DataType],
    keys: &[ArrayRef],
    num_rows: usize,
) -> ExecResult<KeyRows> {
    if keys.len() != key_types.len() {
        return Err(ExecError::invalid(format!(
            "expected {} key columns, got {}",
            key_types.len(),
            keys.len()
        )));
    }
    for (data_type, column) in key_types.iter().zip(keys.iter()) {
        if column.data_type() != data_type {
            return Err(ExecError::type_error(format!(
                "key column type mismatch: expected {data_type:?}, got {:?}",
                column.data_type()
            )));
        }
        if column.len() != num_rows && column.len() != 1 {
            return Err(ExecError::invalid(format!(
                "key column length {} does not match batch length {num_rows}",
                column.len()
            )));
        }
    }

    if num_rows > 1 && !keys.is_empty() && keys.iter().all(|c| c.len() == 1) {
        return Ok(KeyRows::SingleRow(keys.to_vec()));
    }

    let mut columns = Vec::with_capacity(keys.len());
    for column in keys {
        if column.len() == num_rows {
            columns.push(Arc::clone(column));
        } else {
            // Lone broadcast column among full-length ones: materialize it.
            let zeros = UInt32Array::from(vec![0u32; num_rows]);
            columns.push(take(column.as_ref(), &zeros, None)?);
        }
    }
    Ok(KeyRows::Full(columns))
}

pub(crate) fn broadcast_id(id: u32, num_rows: usize) -> UInt32Array {
    UInt32Array::from(vec![id; num_rows])
}

/// First-occurrence bookkeeping behind `get_uniques`: retains the key
/// columns of batches that introduced groups and, per group, the position of
/// its first row. Uniques are materialized columnarly with `interleave`.
pub(crate) struct RetainedKeys {
    key_types: Vec<DataType>,
    batches: Vec<Vec<ArrayRef>>,
    first_rows: Vec<(usize, usize)>,
}

impl RetainedKeys {
    pub(crate) fn new(key_types: Vec<DataType>) -> Self {
        Self {
            key_types,
            batches: Vec::new(),
            first_rows: Vec::new(),
        }
    }

    /// Start tracking a consume call's columns; returns the batch slot.
    pub(crate) fn begin_batch(&mut self, columns: &[ArrayRef]) -> usize {
        self.batches.push(columns.to_vec());
        self.batches.len() - 1
    }

    /// Drop the batch again if it introduced no groups, so long input
    /// streams with few distinct keys do not pin every batch.
    pub(crate) fn end_batch(&mut self, batch: usize, groups_at_begin: u32) {
        if self.batches.len() == batch + 1 && self.num_groups() == groups_at_begin {
            self.batches.pop();
        }
    }

    pub(crate) fn push_group(&mut self, batch: usize, row: usize) {
        self.first_rows.push((batch, row));
    }

    pub(crate) fn num_groups(&self) -> u32 {
        self.first_rows.len() as u32
    }

    pub(crate) fn uniques(&self) -> ExecResult<Vec<ArrayRef>> {
        let mut columns = Vec::with_capacity(self.key_types.len());
        for (col, data_type) in self.key_types.iter().enumerate() {
            if self.first_rows.is_empty() {
                columns.push(new_empty_array(data_type));
                continue;
            }
            let arrays: Vec<&dyn Array> = self
                .batches
                .iter()
                .map(|batch| batch[col].as_ref())
                .collect();
            columns.push(interleave(&arrays, &self.first_rows)?);
        }
        Ok(columns)
    }
}
