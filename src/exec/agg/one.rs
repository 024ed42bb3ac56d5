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
//! one: the first non-null value seen per group (null if only nulls).

use std::any::Any;

use arrow::array::{new_null_array, Array, ArrayRef, UInt32Array};
use arrow::compute::interleave;
use arrow::datatypes::DataType;

use crate::common::error::ExecResult;

use super::{downcast_merge, is_null_at, normalize_value_column, GroupedAggregator};

pub(super) struct GroupedOne {
    input_type: DataType,
    batches: Vec<ArrayRef>,
    /// Per group, the retained `(batch, row)` of its first non-null value.
    slots: Vec<Option<(usize, usize)>>,
}

pub(super) fn grouped_one(
    _options: super::ScalarAggregateOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    Ok(Box::new(GroupedOne {
        input_type: input_type.clone(),
        batches: Vec::new(),
        slots: Vec::new(),
    }))
}

impl GroupedAggregator for GroupedOne {
    fn output_type(&self) -> DataType {
        self.input_type.clone()
    }

    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()> {
        if self.slots.len() < new_num_groups as usize {
            self.slots.resize(new_num_groups as usize, None);
        }
        Ok(())
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        let values = normalize_value_column(values, group_ids.len())?;
        let batch = self.batches.len();
        let mut used = false;
        for row in 0..group_ids.len() {
            let group = group_ids.value(row) as usize;
            if self.slots[group].is_none() && !is_null_at(&values, row) {
                self.slots[group] = Some((batch, row));
                used = true;
            }
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
        for (j, slot) in other.slots.into_iter().enumerate() {
            let dst = transposition.value(j) as usize;
            if self.slots[dst].is_none() {
                if let Some((batch, row)) = slot {
                    self.slots[dst] = Some((batch + offset, row));
                }
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        // Unset groups pull from a one-row null array appended last.
        let null_batch = self.batches.len();
        let mut arrays: Vec<ArrayRef> = self.batches.clone();
        arrays.push(new_null_array(&self.input_type, 1));
        let refs: Vec<&dyn Array> = arrays.iter().map(|a| a.as_ref()).collect();
        let indices: Vec<(usize, usize)> = self
            .slots
            .iter()
            .map(|slot| slot.unwrap_or((null_batch, 0)))
            .collect();
        Ok(interleave(&refs, &indices)?)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use arrow::array::StringArray;
    use super::super::ScalarAggregateOptions;

    #[test]
    fn keeps_first_non_null() {
        let mut kernel = grouped_one(ScalarAggregateOptions::default(), &DataType::Utf8).unwrap();
        let values: ArrayRef = Arc::new(StringArray::from(vec![
            None,
            Some("first"),
            Some("second"),
            None,
        ]));
        let ids = UInt32Array::from(vec![0, 0, 0, 1]);
        kernel.resize(2).unwrap();
        kernel.consume(&values, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        let out = out.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(out.value(0), "first");
        assert!(out.is_null(1));
    }
}
