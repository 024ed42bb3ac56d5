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
//! list: collect each group's values into a `List<input>` cell.
//!
//! The state keeps the consumed value columns alive and records, per group,
//! the `(batch, row)` positions that belong to it; finalize flattens those
//! positions with `interleave`. Sub-list order follows consume order within
//! a partition; merged partitions append in merge order.

use std::any::Any;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, ListArray, UInt32Array};
use arrow::buffer::OffsetBuffer;
use arrow::compute::interleave;
use arrow::datatypes::{DataType, Field};

use crate::common::error::ExecResult;

use super::{
    downcast_merge, is_null_at, normalize_value_column, GroupedAggregator,
    ScalarAggregateOptions,
};

pub(super) struct GroupedList {
    options: ScalarAggregateOptions,
    input_type: DataType,
    batches: Vec<ArrayRef>,
    groups: Vec<Vec<(usize, usize)>>,
}

pub(super) fn grouped_list(
    options: ScalarAggregateOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    Ok(Box::new(GroupedList {
        options,
        input_type: input_type.clone(),
        batches: Vec::new(),
        groups: Vec::new(),
    }))
}

impl GroupedAggregator for GroupedList {
    fn output_type(&self) -> DataType {
        DataType::List(Arc::new(Field::new_list_field(self.input_type.clone(), true)))
    }

    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()> {
        if self.groups.len() < new_num_groups as usize {
            self.groups.resize(new_num_groups as usize, Vec::new());
        }
        Ok(())
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        let values = normalize_value_column(values, group_ids.len())?;
        let batch = self.batches.len();
        let mut used = false;
        for row in 0..group_ids.len() {
            if self.options.skip_nulls && is_null_at(&values, row) {
                continue;
            }
            self.groups[group_ids.value(row) as usize].push((batch, row));
            used = true;
        }
        if used {
            self.batches.push(values);
        }
        Ok(())
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        transposition: &UInt32Array,
    ) -> ExecResult<()> {
        let other = *downcast_merge::<Self>(other)?;
        let offset = self.batches.len();
        self.batches.extend(other.batches);
        for (j, rows) in other.groups.into_iter().enumerate() {
            let dst = transposition.value(j) as usize;
            self.groups[dst]
                .extend(rows.into_iter().map(|(batch, row)| (batch + offset, row)));
        }
        Ok(())
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        let lengths: Vec<usize> = self.groups.iter().map(|rows| rows.len()).collect();
        let offsets = OffsetBuffer::<i32>::from_lengths(lengths.iter().copied());
        let indices: Vec<(usize, usize)> = self.groups.iter().flatten().copied().collect();

        let child: ArrayRef = if indices.is_empty() {
            arrow::array::new_empty_array(&self.input_type)
        } else {
            let arrays: Vec<&dyn Array> = self.batches.iter().map(|a| a.as_ref()).collect();
            interleave(&arrays, &indices)?
        };

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
    use arrow::array::Int64Array;

    #[test]
    fn collects_per_group_in_consume_order() {
        let mut kernel = grouped_list(ScalarAggregateOptions::default(), &DataType::Int64).unwrap();
        let values: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), Some(2), None, Some(3)]));
        let ids = UInt32Array::from(vec![0, 1, 0, 0]);
        kernel.resize(2).unwrap();
        kernel.consume(&values, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        let out = out.as_any().downcast_ref::<ListArray>().unwrap();

        let row = out.value(0);
        let row = row.as_any().downcast_ref::<Int64Array>().unwrap();
        let got: Vec<i64> = (0..row.len()).map(|i| row.value(i)).collect();
        assert_eq!(got, vec![1, 3]);
        let row = out.value(1);
        let row = row.as_any().downcast_ref::<Int64Array>().unwrap();
        let got: Vec<i64> = (0..row.len()).map(|i| row.value(i)).collect();
        assert_eq!(got, vec![2]);
    }

    #[test]
    fn keeps_nulls_when_not_skipping() {
        let options = ScalarAggregateOptions {
            skip_nulls: false,
            min_count: 1,
        };
        let mut kernel = grouped_list(options, &DataType::Int64).unwrap();
        let values: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), None]));
        let ids = UInt32Array::from(vec![0, 0]);
        kernel.resize(1).unwrap();
        kernel.consume(&values, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        let out = out.as_any().downcast_ref::<ListArray>().unwrap();
        let row = out.value(0);
        assert_eq!(row.len(), 2);
        assert!(row.is_null(1));
    }
}
