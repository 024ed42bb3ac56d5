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
//! Hash-aggregate kernels.
//!
//! Responsibilities:
//! - Defines the grouped-aggregator contract (resize / consume / merge /
//!   finalize) and the per-kernel options records.
//! - Builds kernels by registered name ("hash_count", "hash_sum", ...) and
//!   rejects direct scalar execution of hash kernels.
//!
//! Key exported interfaces:
//! - Types: `GroupedAggregator`, `AggregateOptions`, `FunctionRegistry`.
//! - Functions: `build_grouped_aggregator`, `resolve_output_type`.

mod any_all;
mod count;
mod distinct;
mod list;
mod min_max;
mod one;
mod sum;
mod tdigest;
mod variance;
mod views;

use std::any::Any;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::DataType;

use crate::common::error::{ExecError, ExecResult};

/// A stateful grouped aggregate operator. State is an array of per-group
/// accumulators indexed by the dense ids a grouper hands out; it grows
/// monotonically via `resize` and merges across partitions via a
/// transposition relabeling source ids into destination ids.
pub trait GroupedAggregator: Send {
    fn output_type(&self) -> DataType;

    /// Grow to at least `new_num_groups` accumulators, initializing new
    /// slots to the kernel's identity.
    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()>;

    /// Fold `values[r]` into the accumulator of `group_ids[r]` for each row.
    /// `values` may be a length-1 broadcast of the id column's length.
    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()>;

    /// Fold `other` into `self`, relabeling source group `j` to
    /// `transposition[j]`. `other` must come from the same kernel factory;
    /// it is consumed.
    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        transposition: &UInt32Array,
    ) -> ExecResult<()>;

    /// Produce one output cell per group in id order.
    fn finalize(&mut self) -> ExecResult<ArrayRef>;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl std::fmt::Debug for dyn GroupedAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GroupedAggregator")
    }
}

#[derive(Clone, Debug)]
pub struct ScalarAggregateOptions {
    /// When false, any null input makes the group's result null.
    pub skip_nulls: bool,
    /// Groups with fewer considered inputs than this produce null.
    pub min_count: u32,
}

impl Default for ScalarAggregateOptions {
    fn default() -> Self {
        Self {
            skip_nulls: true,
            min_count: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountMode {
    /// Count every input row.
    All,
    /// Count non-null inputs.
    OnlyValid,
    /// Count null inputs.
    OnlyNull,
}

#[derive(Clone, Debug)]
pub struct CountOptions {
    pub mode: CountMode,
}

impl Default for CountOptions {
    fn default() -> Self {
        Self {
            mode: CountMode::OnlyValid,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VarianceOptions {
    /// Denominator offset: result is M2 / (n - ddof).
    pub ddof: u32,
    pub skip_nulls: bool,
    pub min_count: u32,
}

impl Default for VarianceOptions {
    fn default() -> Self {
        Self {
            ddof: 0,
            skip_nulls: true,
            min_count: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TDigestOptions {
    /// Quantiles to report, each in [0, 1].
    pub q: Vec<f64>,
    /// Digest compression factor.
    pub delta: u32,
    /// Input buffer size before centroids are re-merged.
    pub buffer_size: u32,
    pub skip_nulls: bool,
    pub min_count: u32,
}

impl Default for TDigestOptions {
    fn default() -> Self {
        Self {
            q: vec![0.5],
            delta: 100,
            buffer_size: 500,
            skip_nulls: true,
            min_count: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub enum AggregateOptions {
    Scalar(ScalarAggregateOptions),
    Count(CountOptions),
    Variance(VarianceOptions),
    TDigest(TDigestOptions),
}

impl AggregateOptions {
    fn scalar(options: Option<&AggregateOptions>) -> ExecResult<ScalarAggregateOptions> {
        match options {
            None => Ok(ScalarAggregateOptions::default()),
            Some(AggregateOptions::Scalar(opts)) => Ok(opts.clone()),
            Some(_) => Err(ExecError::invalid(
                "expected ScalarAggregateOptions for this aggregate",
            )),
        }
    }

    fn count(options: Option<&AggregateOptions>) -> ExecResult<CountOptions> {
        match options {
            None => Ok(CountOptions::default()),
            Some(AggregateOptions::Count(opts)) => Ok(opts.clone()),
            Some(_) => Err(ExecError::invalid("expected CountOptions for this aggregate")),
        }
    }

    fn variance(options: Option<&AggregateOptions>) -> ExecResult<VarianceOptions> {
        match options {
            None => Ok(VarianceOptions::default()),
            Some(AggregateOptions::Variance(opts)) => Ok(opts.clone()),
            Some(_) => Err(ExecError::invalid(
                "expected VarianceOptions for this aggregate",
            )),
        }
    }

    fn tdigest(options: Option<&AggregateOptions>) -> ExecResult<TDigestOptions> {
        match options {
            None => Ok(TDigestOptions::default()),
            Some(AggregateOptions::TDigest(opts)) => {
                if opts.q.is_empty() || opts.q.iter().any(|q| !(0.0..=1.0).contains(q)) {
                    return Err(ExecError::invalid("malformed t-digest quantiles"));
                }
                if opts.delta == 0 || opts.buffer_size == 0 {
                    return Err(ExecError::invalid("malformed t-digest options"));
                }
                Ok(opts.clone())
            }
            Some(_) => Err(ExecError::invalid(
                "expected TDigestOptions for this aggregate",
            )),
        }
    }
}

/// Per-group valid/null bookkeeping shared by the kernels that honor the
/// skip_nulls / min_count policy.
#[derive(Default)]
pub(crate) struct ValueCounts {
    valid: Vec<i64>,
    nulls: Vec<i64>,
}

impl ValueCounts {
    pub(crate) fn resize(&mut self, num_groups: usize) {
        self.valid.resize(num_groups, 0);
        self.nulls.resize(num_groups, 0);
    }

    pub(crate) fn len(&self) -> usize {
        self.valid.len()
    }

    pub(crate) fn add_valid(&mut self, group: usize) {
        self.valid[group] += 1;
    }

    pub(crate) fn add_null(&mut self, group: usize) {
        self.nulls[group] += 1;
    }

    pub(crate) fn valid(&self, group: usize) -> i64 {
        self.valid[group]
    }

    pub(crate) fn nulls(&self, group: usize) -> i64 {
        self.nulls[group]
    }

    pub(crate) fn merge_from(&mut self, other: &ValueCounts, transposition: &UInt32Array) {
        for src in 0..other.valid.len() {
            let dst = transposition.value(src) as usize;
            self.valid[dst] += other.valid[src];
            self.nulls[dst] += other.nulls[src];
        }
    }

    /// The shared output-null rule: below min_count, or any null seen while
    /// skip_nulls is off.
    pub(crate) fn output_is_null(&self, group: usize, skip_nulls: bool, min_count: u32) -> bool {
        (!skip_nulls && self.nulls[group] > 0) || self.valid[group] < min_count as i64
    }
}

/// Resolve a possibly length-1 broadcast value column against the id column
/// length, materializing the broadcast when needed.
pub(crate) fn normalize_value_column(
    values: &ArrayRef,
    num_rows: usize,
) -> ExecResult<ArrayRef> {
    if values.len() == num_rows {
        Ok(Arc::clone(values))
    } else if values.len() == 1 {
        let zeros = UInt32Array::from(vec![0u32; num_rows]);
        Ok(take(values.as_ref(), &zeros, None)?)
    } else {
        Err(ExecError::invalid(format!(
            "aggregate value column length {} does not match id column length {num_rows}",
            values.len()
        )))
    }
}

pub(crate) fn downcast_merge<T: GroupedAggregator + 'static>(
    other: Box<dyn GroupedAggregator>,
) -> ExecResult<Box<T>> {
    other
        .into_any()
        .downcast::<T>()
        .map_err(|_| ExecError::internal("merged aggregate kernels have different states"))
}

/// True when the array has no valid values at all (physically null columns
/// and the null data type both count).
pub(crate) fn is_null_at(values: &ArrayRef, row: usize) -> bool {
    values.data_type() == &DataType::Null || values.is_null(row)
}

pub const HASH_AGGREGATE_FUNCTIONS: &[&str] = &[
    "hash_all",
    "hash_any",
    "hash_approximate_median",
    "hash_count",
    "hash_count_distinct",
    "hash_distinct",
    "hash_list",
    "hash_max",
    "hash_mean",
    "hash_min",
    "hash_min_max",
    "hash_one",
    "hash_product",
    "hash_stddev",
    "hash_sum",
    "hash_tdigest",
    "hash_variance",
];

/// Build a kernel by registered name for the given value column type.
/// Unknown names fail `Invalid`; a name/type mismatch fails `TypeError`.
pub fn build_grouped_aggregator(
    function: &str,
    options: Option<&AggregateOptions>,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    match function {
        "hash_count" => Ok(Box::new(count::GroupedCount::new(AggregateOptions::count(
            options,
        )?))),
        "hash_sum" => sum::grouped_sum(AggregateOptions::scalar(options)?, input_type),
        "hash_product" => sum::grouped_product(AggregateOptions::scalar(options)?, input_type),
        "hash_mean" => sum::grouped_mean(AggregateOptions::scalar(options)?, input_type),
        "hash_min_max" => min_max::grouped_min_max(AggregateOptions::scalar(options)?, input_type),
        "hash_min" => min_max::grouped_min(AggregateOptions::scalar(options)?, input_type),
        "hash_max" => min_max::grouped_max(AggregateOptions::scalar(options)?, input_type),
        "hash_any" => any_all::grouped_any(AggregateOptions::scalar(options)?, input_type),
        "hash_all" => any_all::grouped_all(AggregateOptions::scalar(options)?, input_type),
        "hash_variance" => {
            variance::grouped_variance(AggregateOptions::variance(options)?, input_type)
        }
        "hash_stddev" => variance::grouped_stddev(AggregateOptions::variance(options)?, input_type),
        "hash_tdigest" => tdigest::grouped_tdigest(AggregateOptions::tdigest(options)?, input_type),
        "hash_approximate_median" => {
            tdigest::grouped_approximate_median(AggregateOptions::scalar(options)?, input_type)
        }
        "hash_count_distinct" => {
            distinct::grouped_count_distinct(AggregateOptions::count(options)?, input_type)
        }
        "hash_distinct" => distinct::grouped_distinct(AggregateOptions::count(options)?, input_type),
        "hash_list" => list::grouped_list(AggregateOptions::scalar(options)?, input_type),
        "hash_one" => one::grouped_one(AggregateOptions::scalar(options)?, input_type),
        other => Err(ExecError::invalid(format!(
            "no hash aggregate function registered with name '{other}'"
        ))),
    }
}

/// Output type a kernel will produce for the given input, resolved without
/// consuming anything.
pub fn resolve_output_type(
    function: &str,
    options: Option<&AggregateOptions>,
    input_type: &DataType,
) -> ExecResult<DataType> {
    Ok(build_grouped_aggregator(function, options, input_type)?.output_type())
}

/// Function registry handed to nodes through the context. Hash-aggregate
/// kernels are registered by name but can only run inside an aggregate
/// node; invoking one as a scalar function is rejected.
#[derive(Debug)]
pub struct FunctionRegistry {
    hash_functions: Vec<&'static str>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self {
            hash_functions: HASH_AGGREGATE_FUNCTIONS.to_vec(),
        }
    }
}

impl FunctionRegistry {
    pub fn contains(&self, name: &str) -> bool {
        self.hash_functions.iter().any(|f| *f == name)
    }

    /// Entry point for scalar execution requests. Hash-aggregate functions
    /// are stateful and only meaningful inside an aggregate node.
    pub fn execute_scalar(&self, name: &str, _args: &[ArrayRef]) -> ExecResult<ArrayRef> {
        if self.contains(name) {
            Err(ExecError::not_implemented(format!(
                "Direct execution of HASH_AGGREGATE functions is not supported; \
                 '{name}' must run inside an aggregate node"
            )))
        } else {
            Err(ExecError::invalid(format!(
                "no function registered with name '{name}'"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_rejects_direct_hash_execution() {
        let registry = FunctionRegistry::default();
        let err = registry.execute_scalar("hash_sum", &[]).unwrap_err();
        assert!(matches!(err, ExecError::NotImplemented(_)), "{err}");
        assert!(err.to_string().contains("Direct execution of HASH_AGGREGATE"));
    }

    #[test]
    fn registry_reports_unknown_functions() {
        let registry = FunctionRegistry::default();
        let err = registry.execute_scalar("no_such_fn", &[]).unwrap_err();
        assert!(matches!(err, ExecError::Invalid(_)), "{err}");
    }

    #[test]
    fn unknown_kernel_name_is_invalid() {
        let err =
            build_grouped_aggregator("hash_bogus", None, &DataType::Int64).unwrap_err();
        assert!(matches!(err, ExecError::Invalid(_)), "{err}");
    }
}
