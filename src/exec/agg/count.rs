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

use arrow::array::{ArrayRef, Int64Array, UInt32Array};
use arrow::datatypes::DataType;

use crate::common::error::ExecResult;

use super::{
    downcast_merge, is_null_at, normalize_value_column, CountMode, CountOptions,
    GroupedAggregator, ValueCounts,
};

/// Counts rows per group, keeping valid and null tallies separately so a
/// single state serves every `CountMode`. Count output is never null and
/// ignores the skip_nulls/min_count policy.
pub(super) struct GroupedCount {
    options: CountOptions,
    counts: ValueCounts,
}

impl GroupedCount {
    pub(super) fn new(options: CountOptions) -> Self {
        Self {
            options,
            counts: ValueCounts::default(),
        }
    }
}

impl GroupedAggregator for GroupedCount {
    fn output_type(&self) -> DataType {
        DataType::Int64
    }

    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()> {
        self.counts.resize(new_num_groups as usize);
        Ok(())
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        let values = normalize_value_column(values, group_ids.len())?;
        for row in 0..group_ids.len() {
            let group = group_ids.value(row) as usize;
            if is_null_at(&values, row) {
                self.counts.add_null(group);
            } else {
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
        self.counts.merge_from(&other.counts, transposition);
        Ok(())
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        let mut out = Vec::with_capacity(self.counts.len());
        for group in 0..self.counts.len() {
            let count = match self.options.mode {
                CountMode::All => self.counts.valid(group) + self.counts.nulls(group),
                CountMode::OnlyValid => self.counts.valid(group),
                CountMode::OnlyNull => self.counts.nulls(group),
            };
            out.push(count);
        }
        Ok(Arc::new(Int64Array::from(out)))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Float64Array;

    fn run(mode: CountMode) -> Vec<i64> {
        let mut kernel = GroupedCount::new(CountOptions { mode });
        let values: ArrayRef = Arc::new(Float64Array::from(vec![
            Some(1.0),
            None,
            Some(2.0),
            None,
            None,
        ]));
        let ids = UInt32Array::from(vec![0, 0, 1, 1, 1]);
        kernel.resize(2).unwrap();
        kernel.consume(&values, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        let out = out.as_any().downcast_ref::<Int64Array>().unwrap();
        (0..out.len()).map(|i| out.value(i)).collect()
    }

    #[test]
    fn count_modes() {
        assert_eq!(run(CountMode::All), vec![2, 3]);
        assert_eq!(run(CountMode::OnlyValid), vec![1, 1]);
        assert_eq!(run(CountMode::OnlyNull), vec![1, 2]);
    }
}
