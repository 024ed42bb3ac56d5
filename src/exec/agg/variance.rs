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

use arrow::array::{ArrayRef, Float64Array, UInt32Array};
use arrow::datatypes::DataType;

use crate::common::error::{ExecError, ExecResult};

use super::views::F64CastView;
use super::{
    downcast_merge, normalize_value_column, GroupedAggregator, ValueCounts, VarianceOptions,
};

/// Welford online moments per group: running count, mean and M2. Merging
/// partitions uses the parallel combination of the two sub-results.
pub(super) struct GroupedVarStd {
    options: VarianceOptions,
    take_sqrt: bool,
    mean: Vec<f64>,
    m2: Vec<f64>,
    counts: ValueCounts,
}

fn build(
    options: VarianceOptions,
    input_type: &DataType,
    take_sqrt: bool,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    if !F64CastView::is_numeric(input_type) {
        let name = if take_sqrt { "stddev" } else { "variance" };
        return Err(ExecError::type_error(format!(
            "{name} unsupported input type: {input_type:?}"
        )));
    }
    Ok(Box::new(GroupedVarStd {
        options,
        take_sqrt,
        mean: Vec::new(),
        m2: Vec::new(),
        counts: ValueCounts::default(),
    }))
}

pub(super) fn grouped_variance(
    options: VarianceOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    build(options, input_type, false)
}

pub(super) fn grouped_stddev(
    options: VarianceOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    build(options, input_type, true)
}

impl GroupedAggregator for GroupedVarStd {
    fn output_type(&self) -> DataType {
        DataType::Float64
    }

    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()> {
        self.mean.resize(new_num_groups as usize, 0.0);
        self.m2.resize(new_num_groups as usize, 0.0);
        self.counts.resize(new_num_groups as usize);
        Ok(())
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        let values = normalize_value_column(values, group_ids.len())?;
        let view = F64CastView::new(&values)?;
        for row in 0..group_ids.len() {
            let group = group_ids.value(row) as usize;
            match view.value_at(row) {
                Some(v) => {
                    self.counts.add_valid(group);
                    let n = self.counts.valid(group) as f64;
                    let delta = v - self.mean[group];
                    self.mean[group] += delta / n;
                    self.m2[group] += delta * (v - self.mean[group]);
                }
                None => self.counts.add_null(group),
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
        for j in 0..other.mean.len() {
            let d = transposition.value(j) as usize;
            let nb = other.counts.valid(j) as f64;
            if nb == 0.0 {
                continue;
            }
            let na = self.counts.valid(d) as f64;
            if na == 0.0 {
                self.mean[d] = other.mean[j];
                self.m2[d] = other.m2[j];
                continue;
            }
            let delta = other.mean[j] - self.mean[d];
            let total = na + nb;
            self.mean[d] += delta * nb / total;
            self.m2[d] += other.m2[j] + delta * delta * na * nb / total;
        }
        self.counts.merge_from(&other.counts, transposition);
        Ok(())
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        let ddof = self.options.ddof as i64;
        let out: Float64Array = (0..self.counts.len())
            .map(|group| {
                let n = self.counts.valid(group);
                if self.counts.output_is_null(
                    group,
                    self.options.skip_nulls,
                    self.options.min_count,
                ) || n <= ddof
                {
                    None
                } else {
                    let variance = self.m2[group] / (n - ddof) as f64;
                    Some(if self.take_sqrt {
                        variance.sqrt()
                    } else {
                        variance
                    })
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
    use arrow::array::Int64Array;

    #[test]
    fn variance_matches_two_pass() {
        let mut kernel = grouped_variance(VarianceOptions::default(), &DataType::Int64).unwrap();
        let values: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5]));
        let ids = UInt32Array::from(vec![0, 0, 0, 0, 0]);
        kernel.resize(1).unwrap();
        kernel.consume(&values, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        let out = out.as_any().downcast_ref::<Float64Array>().unwrap();
        assert!((out.value(0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn ddof_at_or_above_count_is_null() {
        let options = VarianceOptions {
            ddof: 1,
            ..VarianceOptions::default()
        };
        let mut kernel = grouped_variance(options, &DataType::Int64).unwrap();
        let values: ArrayRef = Arc::new(Int64Array::from(vec![7]));
        let ids = UInt32Array::from(vec![0]);
        kernel.resize(1).unwrap();
        kernel.consume(&values, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        assert!(out.is_null(0));
    }

    #[test]
    fn split_consume_merge_matches_single_pass() {
        let all: ArrayRef = Arc::new(Int64Array::from(vec![3, 1, 4, 1, 5, 9, 2, 6]));
        let ids_all = UInt32Array::from(vec![0u32; 8]);
        let mut whole = grouped_variance(VarianceOptions::default(), &DataType::Int64).unwrap();
        whole.resize(1).unwrap();
        whole.consume(&all, &ids_all).unwrap();
        let expected = whole.finalize().unwrap();
        let expected = expected.as_any().downcast_ref::<Float64Array>().unwrap();

        let left: ArrayRef = Arc::new(Int64Array::from(vec![3, 1, 4, 1]));
        let right: ArrayRef = Arc::new(Int64Array::from(vec![5, 9, 2, 6]));
        let ids = UInt32Array::from(vec![0u32; 4]);
        let mut a = grouped_variance(VarianceOptions::default(), &DataType::Int64).unwrap();
        a.resize(1).unwrap();
        a.consume(&left, &ids).unwrap();
        let mut b = grouped_variance(VarianceOptions::default(), &DataType::Int64).unwrap();
        b.resize(1).unwrap();
        b.consume(&right, &ids).unwrap();
        a.merge(b, &UInt32Array::from(vec![0])).unwrap();
        let merged = a.finalize().unwrap();
        let merged = merged.as_any().downcast_ref::<Float64Array>().unwrap();
        assert!((merged.value(0) - expected.value(0)).abs() < 1e-9);
    }
}
