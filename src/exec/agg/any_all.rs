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
use std::any::Any;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, UInt32Array};
use arrow::datatypes::DataType;

use crate::common::error::{ExecError, ExecResult};

use super::{
    downcast_merge, normalize_value_column, GroupedAggregator, ScalarAggregateOptions, ValueCounts,
};

/// Boolean any/all. One state serves both: the fold records whether a group
/// saw true and whether it saw false.
pub(super) struct GroupedAnyAll {
    options: ScalarAggregateOptions,
    is_any: bool,
    saw_true: Vec<bool>,
    saw_false: Vec<bool>,
    counts: ValueCounts,
}

fn build(
    options: ScalarAggregateOptions,
    input_type: &DataType,
    is_any: bool,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    if input_type != &DataType::Boolean {
        let name = if is_any { "any" } else { "all" };
        return Err(ExecError::type_error(format!(
            "{name} unsupported input type: {input_type:?}"
        )));
    }
    Ok(Box::new(GroupedAnyAll {
        options,
        is_any,
        saw_true: Vec::new(),
        saw_false: Vec::new(),
        counts: ValueCounts::default(),
    }))
}

pub(super) fn grouped_any(
    options: ScalarAggregateOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    build(options, input_type, true)
}

pub(super) fn grouped_all(
    options: ScalarAggregateOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    build(options, input_type, false)
}

impl GroupedAggregator for GroupedAnyAll {
    fn output_type(&self) -> DataType {
        DataType::Boolean
    }

    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()> {
        self.saw_true.resize(new_num_groups as usize, false);
        self.saw_false.resize(new_num_groups as usize, false);
        self.counts.resize(new_num_groups as usize);
        Ok(())
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        let values = normalize_value_column(values, group_ids.len())?;
        let arr = values
            .as_any()
            .downcast_ref::<BooleanArray>()
            .ok_or_else(|| ExecError::internal("boolean input downcast failed"))?;
        for row in 0..group_ids.len() {
            let group = group_ids.value(row) as usize;
            if arr.is_null(row) {
                self.counts.add_null(group);
            } else {
                if arr.value(row) {
                    self.saw_true[group] = true;
                } else {
                    self.saw_false[group] = true;
                }
                self.counts.add_valid(group);
            }
        }
        Ok(())
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        transposition: &UInt32Array,
    ) -> ExecResult<()> {
        let other = downcast_merge::<Self>(other)?;
        for j in 0..other.saw_true.len() {
            let d = transposition.value(j) as usize;
            self.saw_true[d] |= other.saw_true[j];
            self.saw_false[d] |= other.saw_false[j];
        }
        self.counts.merge_from(&other.counts, transposition);
        Ok(())
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        let out: BooleanArray = (0..self.counts.len())
            .map(|group| {
                if self
                    .counts
                    .output_is_null(group, self.options.skip_nulls, self.options.min_count)
                {
                    None
                } else if self.is_any {
                    Some(self.saw_true[group])
                } else {
                    Some(!self.saw_false[group])
                }
            })
            .collect();
        Ok(Arc::new(out))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_and_all_fold() {
        let values: ArrayRef = Arc::new(BooleanArray::from(vec![
            Some(true),
            Some(false),
            Some(false),
            None,
        ]));
        let ids = UInt32Array::from(vec![0, 0, 1, 1]);

        let mut any = grouped_any(ScalarAggregateOptions::default(), &DataType::Boolean).unwrap();
        any.resize(2).unwrap();
        any.consume(&values, &ids).unwrap();
        let out = any.finalize().unwrap();
        let out = out.as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(out.value(0));
        assert!(!out.value(1));

        let mut all = grouped_all(ScalarAggregateOptions::default(), &DataType::Boolean).unwrap();
        all.resize(2).unwrap();
        all.consume(&values, &ids).unwrap();
        let out = all.finalize().unwrap();
        let out = out.as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(!out.value(0));
        assert!(!out.value(1));
    }
}
