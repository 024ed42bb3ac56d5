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
//! sum / product / mean over numerics, decimals and (for sum) durations.
//!
//! Signed integers widen to Int64, unsigned to UInt64, floats to Float64;
//! decimals keep their precision and scale. Integer folds wrap on overflow.
//! Decimal product rescales after every fold (truncating); decimal mean
//! divides once at finalize, rounding half away from zero. The null data
//! type is accepted and yields all-null results of the widened type.

use std::any::Any;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Decimal128Array, Decimal256Array, Float64Array, Int64Array, UInt32Array,
    UInt64Array,
};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow_buffer::i256;

use crate::common::error::{ExecError, ExecResult};

use super::views::{F64CastView, IntArrayView, UIntArrayView};
use super::{
    downcast_merge, normalize_value_column, GroupedAggregator, ScalarAggregateOptions, ValueCounts,
};

fn i256_pow10(scale: u32) -> i256 {
    let ten = i256::from_i128(10);
    (0..scale).fold(i256::ONE, |acc, _| acc.wrapping_mul(ten))
}

fn i128_pow10(scale: u32) -> i128 {
    10i128.wrapping_pow(scale)
}

/// Division rounding half away from zero; `divisor` is a positive count.
fn div_round_i128(sum: i128, divisor: i128) -> i128 {
    let quotient = sum / divisor;
    let remainder = sum % divisor;
    if remainder.abs() * 2 >= divisor {
        quotient + if sum < 0 { -1 } else { 1 }
    } else {
        quotient
    }
}

fn div_round_i256(sum: i256, divisor: i256) -> i256 {
    let quotient = sum / divisor;
    let remainder = sum % divisor;
    let two = i256::from_i128(2);
    if remainder.wrapping_abs().wrapping_mul(two) >= divisor {
        let adjust = if sum < i256::ZERO {
            i256::MINUS_ONE
        } else {
            i256::ONE
        };
        quotient.wrapping_add(adjust)
    } else {
        quotient
    }
}

/// Widened per-group accumulators shared by sum, product and mean.
enum Accum {
    Int(Vec<i64>),
    UInt(Vec<u64>),
    Float(Vec<f64>),
    Decimal128 {
        values: Vec<i128>,
        precision: u8,
        scale: i8,
    },
    Decimal256 {
        values: Vec<i256>,
        precision: u8,
        scale: i8,
    },
    /// Null-typed input: only the counts matter.
    Null,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Fold {
    Sum,
    Product,
}

impl Accum {
    fn for_type(data_type: &DataType, fold: Fold, allow_duration: bool) -> ExecResult<Accum> {
        match data_type {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                Ok(Accum::Int(Vec::new()))
            }
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
                Ok(Accum::UInt(Vec::new()))
            }
            DataType::Float16 | DataType::Float32 | DataType::Float64 => {
                Ok(Accum::Float(Vec::new()))
            }
            DataType::Duration(_) if allow_duration => Ok(Accum::Int(Vec::new())),
            DataType::Decimal128(precision, scale) => Ok(Accum::Decimal128 {
                values: Vec::new(),
                precision: *precision,
                scale: *scale,
            }),
            DataType::Decimal256(precision, scale) => Ok(Accum::Decimal256 {
                values: Vec::new(),
                precision: *precision,
                scale: *scale,
            }),
            DataType::Null => Ok(Accum::Null),
            other => {
                let name = match fold {
                    Fold::Sum => "sum",
                    Fold::Product => "product",
                };
                Err(ExecError::type_error(format!(
                    "{name} unsupported input type: {other:?}"
                )))
            }
        }
    }

    fn resize(&mut self, num_groups: usize, fold: Fold) {
        match self {
            Accum::Int(values) => {
                values.resize(num_groups, if fold == Fold::Product { 1 } else { 0 })
            }
            Accum::UInt(values) => {
                values.resize(num_groups, if fold == Fold::Product { 1 } else { 0 })
            }
            Accum::Float(values) => {
                values.resize(num_groups, if fold == Fold::Product { 1.0 } else { 0.0 })
            }
            Accum::Decimal128 { values, scale, .. } => {
                let identity = if fold == Fold::Product {
                    i128_pow10((*scale).max(0) as u32)
                } else {
                    0
                };
                values.resize(num_groups, identity);
            }
            Accum::Decimal256 { values, scale, .. } => {
                let identity = if fold == Fold::Product {
                    i256_pow10((*scale).max(0) as u32)
                } else {
                    i256::ZERO
                };
                values.resize(num_groups, identity);
            }
            Accum::Null => {}
        }
    }

    fn consume(
        &mut self,
        values: &ArrayRef,
        group_ids: &UInt32Array,
        counts: &mut ValueCounts,
        fold: Fold,
    ) -> ExecResult<()> {
        match self {
            Accum::Int(accum) => {
                // Durations fold through their underlying i64 representation.
                let values = if matches!(values.data_type(), DataType::Duration(_)) {
                    cast(values.as_ref(), &DataType::Int64)?
                } else {
                    Arc::clone(values)
                };
                let view = IntArrayView::new(&values)?;
                for row in 0..group_ids.len() {
                    let group = group_ids.value(row) as usize;
                    match view.value_at(row) {
                        Some(v) => {
                            accum[group] = match fold {
                                Fold::Sum => accum[group].wrapping_add(v),
                                Fold::Product => accum[group].wrapping_mul(v),
                            };
                            counts.add_valid(group);
                        }
                        None => counts.add_null(group),
                    }
                }
            }
            Accum::UInt(accum) => {
                let view = UIntArrayView::new(values)?;
                for row in 0..group_ids.len() {
                    let group = group_ids.value(row) as usize;
                    match view.value_at(row) {
                        Some(v) => {
                            accum[group] = match fold {
                                Fold::Sum => accum[group].wrapping_add(v),
                                Fold::Product => accum[group].wrapping_mul(v),
                            };
                            counts.add_valid(group);
                        }
                        None => counts.add_null(group),
                    }
                }
            }
            Accum::Float(accum) => {
                let view = F64CastView::new(values)?;
                for row in 0..group_ids.len() {
                    let group = group_ids.value(row) as usize;
                    match view.value_at(row) {
                        Some(v) => {
                            accum[group] = match fold {
                                Fold::Sum => accum[group] + v,
                                Fold::Product => accum[group] * v,
                            };
                            counts.add_valid(group);
                        }
                        None => counts.add_null(group),
                    }
                }
            }
            Accum::Decimal128 { values: accum, scale, .. } => {
                let arr = values
                    .as_any()
                    .downcast_ref::<Decimal128Array>()
                    .ok_or_else(|| ExecError::internal("decimal128 input downcast failed"))?;
                let rescale = i128_pow10((*scale).max(0) as u32);
                for row in 0..group_ids.len() {
                    let group = group_ids.value(row) as usize;
                    if arr.is_null(row) {
                        counts.add_null(group);
                        continue;
                    }
                    let v = arr.value(row);
                    accum[group] = match fold {
                        Fold::Sum => accum[group].wrapping_add(v),
                        Fold::Product => accum[group].wrapping_mul(v) / rescale,
                    };
                    counts.add_valid(group);
                }
            }
            Accum::Decimal256 { values: accum, scale, .. } => {
                let arr = values
                    .as_any()
                    .downcast_ref::<Decimal256Array>()
                    .ok_or_else(|| ExecError::internal("decimal256 input downcast failed"))?;
                let rescale = i256_pow10((*scale).max(0) as u32);
                for row in 0..group_ids.len() {
                    let group = group_ids.value(row) as usize;
                    if arr.is_null(row) {
                        counts.add_null(group);
                        continue;
                    }
                    let v = arr.value(row);
                    accum[group] = match fold {
                        Fold::Sum => accum[group].wrapping_add(v),
                        Fold::Product => accum[group].wrapping_mul(v) / rescale,
                    };
                    counts.add_valid(group);
                }
            }
            Accum::Null => {
                for row in 0..group_ids.len() {
                    counts.add_null(group_ids.value(row) as usize);
                }
            }
        }
        Ok(())
    }

    fn merge(
        &mut self,
        other: &Accum,
        transposition: &UInt32Array,
        fold: Fold,
    ) -> ExecResult<()> {
        match (self, other) {
            (Accum::Int(dst), Accum::Int(src)) => {
                for (j, v) in src.iter().enumerate() {
                    let d = transposition.value(j) as usize;
                    dst[d] = match fold {
                        Fold::Sum => dst[d].wrapping_add(*v),
                        Fold::Product => dst[d].wrapping_mul(*v),
                    };
                }
            }
            (Accum::UInt(dst), Accum::UInt(src)) => {
                for (j, v) in src.iter().enumerate() {
                    let d = transposition.value(j) as usize;
                    dst[d] = match fold {
                        Fold::Sum => dst[d].wrapping_add(*v),
                        Fold::Product => dst[d].wrapping_mul(*v),
                    };
                }
            }
            (Accum::Float(dst), Accum::Float(src)) => {
                for (j, v) in src.iter().enumerate() {
                    let d = transposition.value(j) as usize;
                    dst[d] = match fold {
                        Fold::Sum => dst[d] + *v,
                        Fold::Product => dst[d] * *v,
                    };
                }
            }
            (
                Accum::Decimal128 { values: dst, scale, .. },
                Accum::Decimal128 { values: src, .. },
            ) => {
                let rescale = i128_pow10((*scale).max(0) as u32);
                for (j, v) in src.iter().enumerate() {
                    let d = transposition.value(j) as usize;
                    dst[d] = match fold {
                        Fold::Sum => dst[d].wrapping_add(*v),
                        Fold::Product => dst[d].wrapping_mul(*v) / rescale,
                    };
                }
            }
            (
                Accum::Decimal256 { values: dst, scale, .. },
                Accum::Decimal256 { values: src, .. },
            ) => {
                let rescale = i256_pow10((*scale).max(0) as u32);
                for (j, v) in src.iter().enumerate() {
                    let d = transposition.value(j) as usize;
                    dst[d] = match fold {
                        Fold::Sum => dst[d].wrapping_add(*v),
                        Fold::Product => dst[d].wrapping_mul(*v) / rescale,
                    };
                }
            }
            (Accum::Null, Accum::Null) => {}
            _ => return Err(ExecError::internal("merged sum kernels disagree on type")),
        }
        Ok(())
    }
}

/// Widened output type for sum/product.
fn widened_type(input_type: &DataType) -> DataType {
    match input_type {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 | DataType::Null => {
            DataType::Int64
        }
        DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
            DataType::UInt64
        }
        DataType::Float16 | DataType::Float32 | DataType::Float64 => DataType::Float64,
        other => other.clone(),
    }
}

pub(super) struct GroupedSumProduct {
    options: ScalarAggregateOptions,
    out_type: DataType,
    accum: Accum,
    counts: ValueCounts,
    fold: Fold,
}

pub(super) fn grouped_sum(
    options: ScalarAggregateOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    Ok(Box::new(GroupedSumProduct {
        options,
        out_type: widened_type(input_type),
        accum: Accum::for_type(input_type, Fold::Sum, true)?,
        counts: ValueCounts::default(),
        fold: Fold::Sum,
    }))
}

pub(super) fn grouped_product(
    options: ScalarAggregateOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    if matches!(input_type, DataType::Duration(_)) {
        return Err(ExecError::type_error(
            "product unsupported input type: Duration",
        ));
    }
    Ok(Box::new(GroupedSumProduct {
        options,
        out_type: widened_type(input_type),
        accum: Accum::for_type(input_type, Fold::Product, false)?,
        counts: ValueCounts::default(),
        fold: Fold::Product,
    }))
}

impl GroupedAggregator for GroupedSumProduct {
    fn output_type(&self) -> DataType {
        self.out_type.clone()
    }

    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()> {
        self.accum.resize(new_num_groups as usize, self.fold);
        self.counts.resize(new_num_groups as usize);
        Ok(())
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        let values = normalize_value_column(values, group_ids.len())?;
        self.accum
            .consume(&values, group_ids, &mut self.counts, self.fold)
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        transposition: &UInt32Array,
    ) -> ExecResult<()> {
        let other = downcast_merge::<Self>(other)?;
        self.accum.merge(&other.accum, transposition, self.fold)?;
        self.counts.merge_from(&other.counts, transposition);
        Ok(())
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        let counts = &self.counts;
        let options = &self.options;
        let is_null =
            |group: usize| counts.output_is_null(group, options.skip_nulls, options.min_count);

        let array: ArrayRef = match &self.accum {
            Accum::Int(values) => {
                let out: Int64Array = values
                    .iter()
                    .enumerate()
                    .map(|(g, v)| (!is_null(g)).then_some(*v))
                    .collect();
                if matches!(self.out_type, DataType::Duration(_)) {
                    cast(&out, &self.out_type)?
                } else {
                    Arc::new(out)
                }
            }
            Accum::UInt(values) => {
                let out: UInt64Array = values
                    .iter()
                    .enumerate()
                    .map(|(g, v)| (!is_null(g)).then_some(*v))
                    .collect();
                Arc::new(out)
            }
            Accum::Float(values) => {
                let out: Float64Array = values
                    .iter()
                    .enumerate()
                    .map(|(g, v)| (!is_null(g)).then_some(*v))
                    .collect();
                Arc::new(out)
            }
            Accum::Decimal128 {
                values,
                precision,
                scale,
            } => {
                let out: Decimal128Array = values
                    .iter()
                    .enumerate()
                    .map(|(g, v)| (!is_null(g)).then_some(*v))
                    .collect();
                Arc::new(out.with_precision_and_scale(*precision, *scale)?)
            }
            Accum::Decimal256 {
                values,
                precision,
                scale,
            } => {
                let out: Decimal256Array = values
                    .iter()
                    .enumerate()
                    .map(|(g, v)| (!is_null(g)).then_some(*v))
                    .collect();
                Arc::new(out.with_precision_and_scale(*precision, *scale)?)
            }
            Accum::Null => Arc::new(Int64Array::from(vec![None::<i64>; self.counts.len()])),
        };
        Ok(array)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Mean: exact widened sums, one division at finalize.
pub(super) struct GroupedMean {
    options: ScalarAggregateOptions,
    out_type: DataType,
    accum: Accum,
    counts: ValueCounts,
}

pub(super) fn grouped_mean(
    options: ScalarAggregateOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    if matches!(input_type, DataType::Duration(_)) {
        return Err(ExecError::type_error(
            "mean unsupported input type: Duration",
        ));
    }
    let out_type = match input_type {
        DataType::Decimal128(p, s) => DataType::Decimal128(*p, *s),
        DataType::Decimal256(p, s) => DataType::Decimal256(*p, *s),
        _ => DataType::Float64,
    };
    Ok(Box::new(GroupedMean {
        options,
        out_type,
        accum: Accum::for_type(input_type, Fold::Sum, false)?,
        counts: ValueCounts::default(),
    }))
}

impl GroupedAggregator for GroupedMean {
    fn output_type(&self) -> DataType {
        self.out_type.clone()
    }

    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()> {
        self.accum.resize(new_num_groups as usize, Fold::Sum);
        self.counts.resize(new_num_groups as usize);
        Ok(())
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        let values = normalize_value_column(values, group_ids.len())?;
        self.accum
            .consume(&values, group_ids, &mut self.counts, Fold::Sum)
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        transposition: &UInt32Array,
    ) -> ExecResult<()> {
        let other = downcast_merge::<Self>(other)?;
        self.accum.merge(&other.accum, transposition, Fold::Sum)?;
        self.counts.merge_from(&other.counts, transposition);
        Ok(())
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        let counts = &self.counts;
        let options = &self.options;
        let cell = |group: usize| -> Option<i64> {
            let valid = counts.valid(group);
            if counts.output_is_null(group, options.skip_nulls, options.min_count) || valid == 0 {
                None
            } else {
                Some(valid)
            }
        };

        let array: ArrayRef = match &self.accum {
            Accum::Int(values) => {
                let out: Float64Array = values
                    .iter()
                    .enumerate()
                    .map(|(g, v)| cell(g).map(|n| *v as f64 / n as f64))
                    .collect();
                Arc::new(out)
            }
            Accum::UInt(values) => {
                let out: Float64Array = values
                    .iter()
                    .enumerate()
                    .map(|(g, v)| cell(g).map(|n| *v as f64 / n as f64))
                    .collect();
                Arc::new(out)
            }
            Accum::Float(values) => {
                let out: Float64Array = values
                    .iter()
                    .enumerate()
                    .map(|(g, v)| cell(g).map(|n| *v / n as f64))
                    .collect();
                Arc::new(out)
            }
            Accum::Decimal128 {
                values,
                precision,
                scale,
            } => {
                let out: Decimal128Array = values
                    .iter()
                    .enumerate()
                    .map(|(g, v)| cell(g).map(|n| div_round_i128(*v, n as i128)))
                    .collect();
                Arc::new(out.with_precision_and_scale(*precision, *scale)?)
            }
            Accum::Decimal256 {
                values,
                precision,
                scale,
            } => {
                let out: Decimal256Array = values
                    .iter()
                    .enumerate()
                    .map(|(g, v)| cell(g).map(|n| div_round_i256(*v, i256::from_i128(n as i128))))
                    .collect();
                Arc::new(out.with_precision_and_scale(*precision, *scale)?)
            }
            Accum::Null => Arc::new(Float64Array::from(vec![None::<f64>; self.counts.len()])),
        };
        Ok(array)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Float64Array;

    #[test]
    fn sum_skips_nulls_by_default() {
        let mut kernel = grouped_sum(ScalarAggregateOptions::default(), &DataType::Float64).unwrap();
        let values: ArrayRef = Arc::new(Float64Array::from(vec![
            Some(1.0),
            None,
            Some(2.5),
            Some(-0.5),
        ]));
        let ids = UInt32Array::from(vec![0, 0, 1, 0]);
        kernel.resize(2).unwrap();
        kernel.consume(&values, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        let out = out.as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(out.value(0), 0.5);
        assert_eq!(out.value(1), 2.5);
    }

    #[test]
    fn sum_keep_nulls_poisons_group() {
        let options = ScalarAggregateOptions {
            skip_nulls: false,
            min_count: 1,
        };
        let mut kernel = grouped_sum(options, &DataType::Int64).unwrap();
        let values: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), None, Some(5)]));
        let ids = UInt32Array::from(vec![0, 0, 1]);
        kernel.resize(2).unwrap();
        kernel.consume(&values, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        assert!(out.is_null(0));
        assert_eq!(
            out.as_any().downcast_ref::<Int64Array>().unwrap().value(1),
            5
        );
    }

    #[test]
    fn decimal_mean_rounds_half_away_from_zero() {
        assert_eq!(div_round_i128(425, 2), 213);
        assert_eq!(div_round_i128(-13, 3), -4);
        assert_eq!(div_round_i128(475, 2), 238);
    }

    #[test]
    fn scalar_value_columns_broadcast_to_the_id_length() {
        let mut kernel = grouped_sum(ScalarAggregateOptions::default(), &DataType::Int64).unwrap();
        let scalar: ArrayRef = Arc::new(Int64Array::from(vec![7]));
        let ids = UInt32Array::from(vec![0, 1, 0]);
        kernel.resize(2).unwrap();
        kernel.consume(&scalar, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        let out = out.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(out.value(0), 14);
        assert_eq!(out.value(1), 7);
    }

    #[test]
    fn product_identity_is_one() {
        let mut kernel =
            grouped_product(ScalarAggregateOptions::default(), &DataType::Int32).unwrap();
        let values: ArrayRef = Arc::new(arrow::array::Int32Array::from(vec![3, 5]));
        let ids = UInt32Array::from(vec![0, 0]);
        kernel.resize(2).unwrap();
        kernel.consume(&values, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        let out = out.as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(out.value(0), 15);
        // Group 1 saw no rows: below min_count, so null rather than the identity.
        assert!(out.is_null(1));
    }
}
