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
//! count_distinct / distinct.
//!
//! Both kernels ride on an internal grouper keyed by `(group id, value)`:
//! each distinct pair gets its own inner id, so the inner uniques table *is*
//! the per-group distinct set, in first-seen order. Value distinct-ness
//! therefore follows the key encoding, including the collapse of every NaN
//! bit pattern into one value.

use std::any::Any;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, ListArray, UInt32Array};
use arrow::buffer::OffsetBuffer;
use arrow::compute::take;
use arrow::datatypes::{DataType, Field};

use crate::common::error::{ExecError, ExecResult};
use crate::exec::grouper::{make_grouper, Grouper};

use super::{
    downcast_merge, normalize_value_column, CountMode, CountOptions, GroupedAggregator,
};

struct DistinctState {
    inner: Box<dyn Grouper>,
    num_groups: u32,
    mode: CountMode,
}

impl DistinctState {
    fn new(mode: CountMode, input_type: &DataType) -> ExecResult<Self> {
        let inner = make_grouper(&[DataType::UInt32, input_type.clone()])?;
        Ok(Self {
            inner,
            num_groups: 0,
            mode,
        })
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        let values = normalize_value_column(values, group_ids.len())?;
        let ids: ArrayRef = Arc::new(group_ids.clone());
        self.inner.consume(&[ids, values], group_ids.len())?;
        Ok(())
    }

    fn merge(&mut self, other: &DistinctState, transposition: &UInt32Array) -> ExecResult<()> {
        let uniques = other.inner.get_uniques()?;
        let src_ids = uniques[0]
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| ExecError::internal("inner grouper uniques lost the id column"))?;
        let remapped: UInt32Array = (0..src_ids.len())
            .map(|row| Some(transposition.value(src_ids.value(row) as usize)))
            .collect();
        let remapped: ArrayRef = Arc::new(remapped);
        let num_rows = src_ids.len();
        self.inner
            .consume(&[remapped, Arc::clone(&uniques[1])], num_rows)?;
        Ok(())
    }

    /// The `(group, value-row)` pairs surviving the count mode, in inner
    /// first-seen order, plus the uniques value column they index into.
    fn filtered_pairs(&self) -> ExecResult<(Vec<(u32, usize)>, ArrayRef)> {
        let uniques = self.inner.get_uniques()?;
        let gids = uniques[0]
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| ExecError::internal("inner grouper uniques lost the id column"))?;
        let values = Arc::clone(&uniques[1]);
        let value_is_null =
            |row: usize| values.data_type() == &DataType::Null || values.is_null(row);
        let mut pairs = Vec::with_capacity(gids.len());
        for row in 0..gids.len() {
            let keep = match self.mode {
                CountMode::All => true,
                CountMode::OnlyValid => !value_is_null(row),
                CountMode::OnlyNull => value_is_null(row),
            };
            if keep {
                pairs.push((gids.value(row), row));
            }
        }
        Ok((pairs, values))
    }
}

pub(super) struct GroupedCountDistinct {
    state: DistinctState,
}

pub(super) fn grouped_count_distinct(
    options: CountOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    Ok(Box::new(GroupedCountDistinct {
        state: DistinctState::new(options.mode, input_type)?,
    }))
}

impl GroupedAggregator for GroupedCountDistinct {
    fn output_type(&self) -> DataType {
        DataType::Int64
    }

    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()> {
        self.state.num_groups = self.state.num_groups.max(new_num_groups);
        Ok(())
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        self.state.consume(values, group_ids)
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        transposition: &UInt32Array,
    ) -> ExecResult<()> {
        let other = downcast_merge::<Self>(other)?;
        self.state.merge(&other.state, transposition)
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        let (pairs, _) = self.state.filtered_pairs()?;
        let mut counts = vec![0i64; self.state.num_groups as usize];
        for (group, _) in pairs {
            counts[group as usize] += 1;
        }
        Ok(Arc::new(Int64Array::from(counts)))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub(super) struct GroupedDistinct {
    state: DistinctState,
    input_type: DataType,
}

pub(super) fn grouped_distinct(
    options: CountOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    Ok(Box::new(GroupedDistinct {
        state: DistinctState::new(options.mode, input_type)?,
        input_type: input_type.clone(),
    }))
}

impl GroupedAggregator for GroupedDistinct {
    fn output_type(&self) -> DataType {
        DataType::List(Arc::new(Field::new_list_field(self.input_type.clone(), true)))
    }

    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()> {
        self.state.num_groups = self.state.num_groups.max(new_num_groups);
        Ok(())
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        self.state.consume(values, group_ids)
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        transposition: &UInt32Array,
    ) -> ExecResult<()> {
        let other = downcast_merge::<Self>(other)?;
        self.state.merge(&other.state, transposition)
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        let (pairs, values) = self.state.filtered_pairs()?;
        let num_groups = self.state.num_groups as usize;

        // Bucket the surviving value rows per group, preserving first-seen
        // order within each bucket.
        let mut lengths = vec![0usize; num_groups];
        for (group, _) in &pairs {
            lengths[*group as usize] += 1;
        }
        let offsets = OffsetBuffer::<i32>::from_lengths(lengths.iter().copied());
        let mut cursors: Vec<usize> = offsets
            .iter()
            .take(num_groups)
            .map(|o| *o as usize)
            .collect();
        let mut indices = vec![0i32; pairs.len()];
        for (group, row) in &pairs {
            indices[cursors[*group as usize]] = *row as i32;
            cursors[*group as usize] += 1;
        }

        let child = take(
            values.as_ref(),
            &arrow::array::Int32Array::from(indices),
            None,
        )?;
        Ok(Arc::new(ListArray::new(
            Arc::new(Field::new_list_field(self.input_type.clone(), true)),
            offsets,
            child,
            None,
        )))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::StringArray;

    #[test]
    fn count_distinct_by_mode() {
        let values: ArrayRef = Arc::new(StringArray::from(vec![
            Some("a"),
            Some("a"),
            None,
            Some("b"),
            None,
        ]));
        let ids = UInt32Array::from(vec![0, 0, 0, 1, 1]);

        let run = |mode: CountMode| -> Vec<i64> {
            let mut kernel = grouped_count_distinct(CountOptions { mode }, &DataType::Utf8).unwrap();
            kernel.resize(2).unwrap();
            kernel.consume(&values, &ids).unwrap();
            let out = kernel.finalize().unwrap();
            let out = out.as_any().downcast_ref::<Int64Array>().unwrap();
            (0..out.len()).map(|i| out.value(i)).collect()
        };

        assert_eq!(run(CountMode::OnlyValid), vec![1, 1]);
        assert_eq!(run(CountMode::OnlyNull), vec![1, 1]);
        assert_eq!(run(CountMode::All), vec![2, 2]);
    }

    #[test]
    fn distinct_preserves_first_seen_order() {
        let values: ArrayRef = Arc::new(StringArray::from(vec!["b", "a", "b", "c"]));
        let ids = UInt32Array::from(vec![0, 0, 0, 0]);
        let mut kernel = grouped_distinct(CountOptions::default(), &DataType::Utf8).unwrap();
        kernel.resize(1).unwrap();
        kernel.consume(&values, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        let out = out.as_any().downcast_ref::<ListArray>().unwrap();
        let row = out.value(0);
        let row = row.as_any().downcast_ref::<StringArray>().unwrap();
        let got: Vec<&str> = (0..row.len()).map(|i| row.value(i)).collect();
        assert_eq!(got, vec!["b", "a", "c"]);
    }
}
