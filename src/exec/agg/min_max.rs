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
//! min / max / min_max over every ordered input type.
//!
//! `hash_min_max` reports a `Struct{min, max}` of the input type; `hash_min`
//! and `hash_max` are projections of the same state. NaN is neither less nor
//! greater than any number: it is ignored unless a group saw only NaNs, in
//! which case the group reports NaN.

use std::any::Any;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BinaryArray, BinaryBuilder, BooleanArray, Decimal128Array, Decimal256Array,
    FixedSizeBinaryArray, FixedSizeBinaryBuilder, Float64Array, Int64Array, LargeBinaryArray,
    LargeBinaryBuilder, LargeStringArray, LargeStringBuilder, StringArray, StringBuilder,
    StructArray, UInt32Array, UInt64Array,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Fields, IntervalUnit};
use arrow_buffer::i256;

use crate::common::error::{ExecError, ExecResult};

use super::views::{F64CastView, UIntArrayView};
use super::{
    downcast_merge, normalize_value_column, GroupedAggregator, ScalarAggregateOptions, ValueCounts,
};

/// True for types whose values are stored widened to i64.
fn is_i64_family(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Date32
            | DataType::Date64
            | DataType::Time32(_)
            | DataType::Time64(_)
            | DataType::Timestamp(_, _)
            | DataType::Duration(_)
    )
}

/// Types backed by a 4-byte integer, reached through an Int32 cast hop.
fn is_i32_backed(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Date32 | DataType::Time32(_)
    )
}

fn to_i64_array(values: &ArrayRef) -> ExecResult<Int64Array> {
    let widened = if is_i32_backed(values.data_type()) {
        let narrow = cast(values.as_ref(), &DataType::Int32)?;
        cast(narrow.as_ref(), &DataType::Int64)?
    } else {
        cast(values.as_ref(), &DataType::Int64)?
    };
    widened
        .as_any()
        .downcast_ref::<Int64Array>()
        .cloned()
        .ok_or_else(|| ExecError::internal("int64 widening produced a non-int64 array"))
}

fn from_i64_values(values: Vec<Option<i64>>, data_type: &DataType) -> ExecResult<ArrayRef> {
    let wide: ArrayRef = Arc::new(Int64Array::from(values));
    if data_type == &DataType::Int64 {
        return Ok(wide);
    }
    if is_i32_backed(data_type) {
        let narrow = cast(wide.as_ref(), &DataType::Int32)?;
        Ok(cast(narrow.as_ref(), data_type)?)
    } else {
        Ok(cast(wide.as_ref(), data_type)?)
    }
}

fn bytes_at<'a>(values: &'a ArrayRef, row: usize) -> ExecResult<Option<&'a [u8]>> {
    let dc = || ExecError::internal(format!("binary input downcast failed for {:?}", values.data_type()));
    let out = match values.data_type() {
        DataType::Utf8 => {
            let arr = values.as_any().downcast_ref::<StringArray>().ok_or_else(dc)?;
            (!arr.is_null(row)).then(|| arr.value(row).as_bytes())
        }
        DataType::LargeUtf8 => {
            let arr = values
                .as_any()
                .downcast_ref::<LargeStringArray>()
                .ok_or_else(dc)?;
            (!arr.is_null(row)).then(|| arr.value(row).as_bytes())
        }
        DataType::Binary => {
            let arr = values.as_any().downcast_ref::<BinaryArray>().ok_or_else(dc)?;
            (!arr.is_null(row)).then(|| arr.value(row))
        }
        DataType::LargeBinary => {
            let arr = values
                .as_any()
                .downcast_ref::<LargeBinaryArray>()
                .ok_or_else(dc)?;
            (!arr.is_null(row)).then(|| arr.value(row))
        }
        DataType::FixedSizeBinary(_) => {
            let arr = values
                .as_any()
                .downcast_ref::<FixedSizeBinaryArray>()
                .ok_or_else(dc)?;
            (!arr.is_null(row)).then(|| arr.value(row))
        }
        other => {
            return Err(ExecError::internal(format!(
                "bytes_at on non-binary type {other:?}"
            )))
        }
    };
    Ok(out)
}

fn bytes_array(values: &[Option<Vec<u8>>], data_type: &DataType) -> ExecResult<ArrayRef> {
    match data_type {
        DataType::Utf8 => {
            let mut builder = StringBuilder::new();
            for value in values {
                match value {
                    Some(bytes) => builder.append_value(
                        std::str::from_utf8(bytes)
                            .map_err(|_| ExecError::internal("min/max produced invalid utf8"))?,
                    ),
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::LargeUtf8 => {
            let mut builder = LargeStringBuilder::new();
            for value in values {
                match value {
                    Some(bytes) => builder.append_value(
                        std::str::from_utf8(bytes)
                            .map_err(|_| ExecError::internal("min/max produced invalid utf8"))?,
                    ),
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Binary => {
            let mut builder = BinaryBuilder::new();
            for value in values {
                match value {
                    Some(bytes) => builder.append_value(bytes),
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::LargeBinary => {
            let mut builder = LargeBinaryBuilder::new();
            for value in values {
                match value {
                    Some(bytes) => builder.append_value(bytes),
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::FixedSizeBinary(width) => {
            let mut builder = FixedSizeBinaryBuilder::new(*width);
            for value in values {
                match value {
                    Some(bytes) => builder.append_value(bytes)?,
                    None => builder.append_null(),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        other => Err(ExecError::internal(format!(
            "bytes_array on non-binary type {other:?}"
        ))),
    }
}

enum Extrema {
    Bool {
        min: Vec<Option<bool>>,
        max: Vec<Option<bool>>,
    },
    Int {
        min: Vec<Option<i64>>,
        max: Vec<Option<i64>>,
    },
    UInt {
        min: Vec<Option<u64>>,
        max: Vec<Option<u64>>,
    },
    Float {
        min: Vec<Option<f64>>,
        max: Vec<Option<f64>>,
        saw_nan: Vec<bool>,
    },
    Decimal128 {
        min: Vec<Option<i128>>,
        max: Vec<Option<i128>>,
    },
    Decimal256 {
        min: Vec<Option<i256>>,
        max: Vec<Option<i256>>,
    },
    Bytes {
        min: Vec<Option<Vec<u8>>>,
        max: Vec<Option<Vec<u8>>>,
    },
}

fn fold_min<T: PartialOrd + Copy>(slot: &mut Option<T>, v: T) {
    match slot {
        Some(current) if *current <= v => {}
        _ => *slot = Some(v),
    }
}

fn fold_max<T: PartialOrd + Copy>(slot: &mut Option<T>, v: T) {
    match slot {
        Some(current) if *current >= v => {}
        _ => *slot = Some(v),
    }
}

fn fold_min_bytes(slot: &mut Option<Vec<u8>>, v: &[u8]) {
    match slot {
        Some(current) if current.as_slice() <= v => {}
        _ => *slot = Some(v.to_vec()),
    }
}

fn fold_max_bytes(slot: &mut Option<Vec<u8>>, v: &[u8]) {
    match slot {
        Some(current) if current.as_slice() >= v => {}
        _ => *slot = Some(v.to_vec()),
    }
}

impl Extrema {
    fn for_type(data_type: &DataType) -> ExecResult<Extrema> {
        match data_type {
            DataType::Boolean => Ok(Extrema::Bool {
                min: Vec::new(),
                max: Vec::new(),
            }),
            t if is_i64_family(t) => Ok(Extrema::Int {
                min: Vec::new(),
                max: Vec::new(),
            }),
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
                Ok(Extrema::UInt {
                    min: Vec::new(),
                    max: Vec::new(),
                })
            }
            DataType::Float16 | DataType::Float32 | DataType::Float64 => Ok(Extrema::Float {
                min: Vec::new(),
                max: Vec::new(),
                saw_nan: Vec::new(),
            }),
            DataType::Decimal128(_, _) => Ok(Extrema::Decimal128 {
                min: Vec::new(),
                max: Vec::new(),
            }),
            DataType::Decimal256(_, _) => Ok(Extrema::Decimal256 {
                min: Vec::new(),
                max: Vec::new(),
            }),
            DataType::Utf8
            | DataType::LargeUtf8
            | DataType::Binary
            | DataType::LargeBinary
            | DataType::FixedSizeBinary(_) => Ok(Extrema::Bytes {
                min: Vec::new(),
                max: Vec::new(),
            }),
            DataType::Interval(IntervalUnit::YearMonth)
            | DataType::Interval(IntervalUnit::DayTime)
            | DataType::Interval(IntervalUnit::MonthDayNano) => Err(ExecError::type_error(
                "min/max does not order interval values",
            )),
            other => Err(ExecError::type_error(format!(
                "min/max unsupported input type: {other:?}"
            ))),
        }
    }

    fn resize(&mut self, n: usize) {
        match self {
            Extrema::Bool { min, max } => {
                min.resize(n, None);
                max.resize(n, None);
            }
            Extrema::Int { min, max } => {
                min.resize(n, None);
                max.resize(n, None);
            }
            Extrema::UInt { min, max } => {
                min.resize(n, None);
                max.resize(n, None);
            }
            Extrema::Float { min, max, saw_nan } => {
                min.resize(n, None);
                max.resize(n, None);
                saw_nan.resize(n, false);
            }
            Extrema::Decimal128 { min, max } => {
                min.resize(n, None);
                max.resize(n, None);
            }
            Extrema::Decimal256 { min, max } => {
                min.resize(n, None);
                max.resize(n, None);
            }
            Extrema::Bytes { min, max } => {
                min.resize(n, None);
                max.resize(n, None);
            }
        }
    }

    fn consume(
        &mut self,
        values: &ArrayRef,
        group_ids: &UInt32Array,
        counts: &mut ValueCounts,
    ) -> ExecResult<()> {
        let num_rows = group_ids.len();
        match self {
            Extrema::Bool { min, max } => {
                let arr = values
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .ok_or_else(|| ExecError::internal("boolean input downcast failed"))?;
                for row in 0..num_rows {
                    let group = group_ids.value(row) as usize;
                    if arr.is_null(row) {
                        counts.add_null(group);
                        continue;
                    }
                    let v = arr.value(row);
                    fold_min(&mut min[group], v);
                    fold_max(&mut max[group], v);
                    counts.add_valid(group);
                }
            }
            Extrema::Int { min, max } => {
                let arr = to_i64_array(values)?;
                for row in 0..num_rows {
                    let group = group_ids.value(row) as usize;
                    if arr.is_null(row) {
                        counts.add_null(group);
                        continue;
                    }
                    let v = arr.value(row);
                    fold_min(&mut min[group], v);
                    fold_max(&mut max[group], v);
                    counts.add_valid(group);
                }
            }
            Extrema::UInt { min, max } => {
                let view = UIntArrayView::new(values)?;
                for row in 0..num_rows {
                    let group = group_ids.value(row) as usize;
                    match view.value_at(row) {
                        Some(v) => {
                            fold_min(&mut min[group], v);
                            fold_max(&mut max[group], v);
                            counts.add_valid(group);
                        }
                        None => counts.add_null(group),
                    }
                }
            }
            Extrema::Float { min, max, saw_nan } => {
                let view = F64CastView::new(values)?;
                for row in 0..num_rows {
                    let group = group_ids.value(row) as usize;
                    match view.value_at(row) {
                        Some(v) if v.is_nan() => {
                            saw_nan[group] = true;
                            counts.add_valid(group);
                        }
                        Some(v) => {
                            fold_min(&mut min[group], v);
                            fold_max(&mut max[group], v);
                            counts.add_valid(group);
                        }
                        None => counts.add_null(group),
                    }
                }
            }
            Extrema::Decimal128 { min, max } => {
                let arr = values
                    .as_any()
                    .downcast_ref::<Decimal128Array>()
                    .ok_or_else(|| ExecError::internal("decimal128 input downcast failed"))?;
                for row in 0..num_rows {
                    let group = group_ids.value(row) as usize;
                    if arr.is_null(row) {
                        counts.add_null(group);
                        continue;
                    }
                    let v = arr.value(row);
                    fold_min(&mut min[group], v);
                    fold_max(&mut max[group], v);
                    counts.add_valid(group);
                }
            }
            Extrema::Decimal256 { min, max } => {
                let arr = values
                    .as_any()
                    .downcast_ref::<Decimal256Array>()
                    .ok_or_else(|| ExecError::internal("decimal256 input downcast failed"))?;
                for row in 0..num_rows {
                    let group = group_ids.value(row) as usize;
                    if arr.is_null(row) {
                        counts.add_null(group);
                        continue;
                    }
                    let v = arr.value(row);
                    fold_min(&mut min[group], v);
                    fold_max(&mut max[group], v);
                    counts.add_valid(group);
                }
            }
            Extrema::Bytes { min, max } => {
                for row in 0..num_rows {
                    let group = group_ids.value(row) as usize;
                    match bytes_at(values, row)? {
                        Some(v) => {
                            fold_min_bytes(&mut min[group], v);
                            fold_max_bytes(&mut max[group], v);
                            counts.add_valid(group);
                        }
                        None => counts.add_null(group),
                    }
                }
            }
        }
        Ok(())
    }

    fn merge(&mut self, other: &Extrema, transposition: &UInt32Array) -> ExecResult<()> {
        macro_rules! merge_pairs {
            ($dmin:expr, $dmax:expr, $smin:expr, $smax:expr, $fmin:ident, $fmax:ident) => {
                for j in 0..$smin.len() {
                    let d = transposition.value(j) as usize;
                    if let Some(v) = &$smin[j] {
                        $fmin(&mut $dmin[d], v.clone());
                    }
                    if let Some(v) = &$smax[j] {
                        $fmax(&mut $dmax[d], v.clone());
                    }
                }
            };
        }

        match (self, other) {
            (Extrema::Bool { min, max }, Extrema::Bool { min: smin, max: smax }) => {
                merge_pairs!(min, max, smin, smax, fold_min, fold_max)
            }
            (Extrema::Int { min, max }, Extrema::Int { min: smin, max: smax }) => {
                merge_pairs!(min, max, smin, smax, fold_min, fold_max)
            }
            (Extrema::UInt { min, max }, Extrema::UInt { min: smin, max: smax }) => {
                merge_pairs!(min, max, smin, smax, fold_min, fold_max)
            }
            (
                Extrema::Float { min, max, saw_nan },
                Extrema::Float {
                    min: smin,
                    max: smax,
                    saw_nan: snan,
                },
            ) => {
                merge_pairs!(min, max, smin, smax, fold_min, fold_max);
                for (j, nan) in snan.iter().enumerate() {
                    if *nan {
                        saw_nan[transposition.value(j) as usize] = true;
                    }
                }
            }
            (
                Extrema::Decimal128 { min, max },
                Extrema::Decimal128 { min: smin, max: smax },
            ) => merge_pairs!(min, max, smin, smax, fold_min, fold_max),
            (
                Extrema::Decimal256 { min, max },
                Extrema::Decimal256 { min: smin, max: smax },
            ) => merge_pairs!(min, max, smin, smax, fold_min, fold_max),
            (Extrema::Bytes { min, max }, Extrema::Bytes { min: smin, max: smax }) => {
                for j in 0..smin.len() {
                    let d = transposition.value(j) as usize;
                    if let Some(v) = &smin[j] {
                        fold_min_bytes(&mut min[d], v);
                    }
                    if let Some(v) = &smax[j] {
                        fold_max_bytes(&mut max[d], v);
                    }
                }
            }
            _ => return Err(ExecError::internal("merged min/max kernels disagree on type")),
        }
        Ok(())
    }
}

pub(super) struct GroupedMinMax {
    options: ScalarAggregateOptions,
    input_type: DataType,
    state: Extrema,
    counts: ValueCounts,
}

impl GroupedMinMax {
    /// Finalized (min, max) columns of the input type, applying the null
    /// policy and the NaN-only rule.
    fn min_max_columns(&self) -> ExecResult<(ArrayRef, ArrayRef)> {
        let counts = &self.counts;
        let options = &self.options;
        let is_null =
            |group: usize| counts.output_is_null(group, options.skip_nulls, options.min_count);

        macro_rules! project {
            ($min:expr, $max:expr, $build:expr) => {{
                let min_cells: Vec<_> = $min
                    .iter()
                    .enumerate()
                    .map(|(g, v)| if is_null(g) { None } else { v.clone() })
                    .collect();
                let max_cells: Vec<_> = $max
                    .iter()
                    .enumerate()
                    .map(|(g, v)| if is_null(g) { None } else { v.clone() })
                    .collect();
                ($build(min_cells)?, $build(max_cells)?)
            }};
        }

        let (min_array, max_array): (ArrayRef, ArrayRef) = match &self.state {
            Extrema::Bool { min, max } => project!(min, max, |cells: Vec<Option<bool>>| {
                Ok::<ArrayRef, ExecError>(Arc::new(BooleanArray::from(cells)))
            }),
            Extrema::Int { min, max } => project!(min, max, |cells: Vec<Option<i64>>| {
                from_i64_values(cells, &self.input_type)
            }),
            Extrema::UInt { min, max } => project!(min, max, |cells: Vec<Option<u64>>| {
                let wide: ArrayRef = Arc::new(UInt64Array::from(cells));
                if self.input_type == DataType::UInt64 {
                    Ok::<ArrayRef, ExecError>(wide)
                } else {
                    Ok(cast(wide.as_ref(), &self.input_type)?)
                }
            }),
            Extrema::Float { min, max, saw_nan } => {
                let fill = |cells: &[Option<f64>]| -> Vec<Option<f64>> {
                    cells
                        .iter()
                        .enumerate()
                        .map(|(g, v)| {
                            if is_null(g) {
                                None
                            } else {
                                // A group that saw only NaNs reports NaN.
                                v.or_else(|| saw_nan[g].then_some(f64::NAN))
                            }
                        })
                        .collect()
                };
                let build = |cells: Vec<Option<f64>>| -> ExecResult<ArrayRef> {
                    let wide: ArrayRef = Arc::new(Float64Array::from(cells));
                    if self.input_type == DataType::Float64 {
                        Ok(wide)
                    } else {
                        Ok(cast(wide.as_ref(), &self.input_type)?)
                    }
                };
                (build(fill(min))?, build(fill(max))?)
            }
            Extrema::Decimal128 { min, max } => {
                let DataType::Decimal128(precision, scale) = &self.input_type else {
                    return Err(ExecError::internal("decimal128 state with non-decimal type"));
                };
                project!(min, max, |cells: Vec<Option<i128>>| {
                    let arr = Decimal128Array::from(cells)
                        .with_precision_and_scale(*precision, *scale)?;
                    Ok::<ArrayRef, ExecError>(Arc::new(arr))
                })
            }
            Extrema::Decimal256 { min, max } => {
                let DataType::Decimal256(precision, scale) = &self.input_type else {
                    return Err(ExecError::internal("decimal256 state with non-decimal type"));
                };
                project!(min, max, |cells: Vec<Option<i256>>| {
                    let arr = Decimal256Array::from(cells)
                        .with_precision_and_scale(*precision, *scale)?;
                    Ok::<ArrayRef, ExecError>(Arc::new(arr))
                })
            }
            Extrema::Bytes { min, max } => project!(min, max, |cells: Vec<Option<Vec<u8>>>| {
                bytes_array(&cells, &self.input_type)
            }),
        };
        Ok((min_array, max_array))
    }

    fn struct_fields(&self) -> Fields {
        Fields::from(vec![
            Field::new("min", self.input_type.clone(), true),
            Field::new("max", self.input_type.clone(), true),
        ])
    }
}

impl GroupedAggregator for GroupedMinMax {
    fn output_type(&self) -> DataType {
        DataType::Struct(self.struct_fields())
    }

    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()> {
        self.state.resize(new_num_groups as usize);
        self.counts.resize(new_num_groups as usize);
        Ok(())
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        let values = normalize_value_column(values, group_ids.len())?;
        if values.data_type() != &self.input_type {
            return Err(ExecError::type_error(format!(
                "min/max expected {:?}, got {:?}",
                self.input_type,
                values.data_type()
            )));
        }
        self.state.consume(&values, group_ids, &mut self.counts)
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        transposition: &UInt32Array,
    ) -> ExecResult<()> {
        let other = downcast_merge::<Self>(other)?;
        self.state.merge(&other.state, transposition)?;
        self.counts.merge_from(&other.counts, transposition);
        Ok(())
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        let (min_array, max_array) = self.min_max_columns()?;
        Ok(Arc::new(StructArray::new(
            self.struct_fields(),
            vec![min_array, max_array],
            None,
        )))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Projection of the shared min/max state onto one side.
pub(super) struct GroupedMinOrMax {
    inner: GroupedMinMax,
    take_min: bool,
}

impl GroupedAggregator for GroupedMinOrMax {
    fn output_type(&self) -> DataType {
        self.inner.input_type.clone()
    }

    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()> {
        self.inner.resize(new_num_groups)
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        self.inner.consume(values, group_ids)
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        transposition: &UInt32Array,
    ) -> ExecResult<()> {
        let other = *downcast_merge::<Self>(other)?;
        self.inner.merge(Box::new(other.inner), transposition)
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        let (min_array, max_array) = self.inner.min_max_columns()?;
        Ok(if self.take_min { min_array } else { max_array })
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub(super) fn grouped_min_max(
    options: ScalarAggregateOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    Ok(Box::new(GroupedMinMax {
        options,
        input_type: input_type.clone(),
        state: Extrema::for_type(input_type)?,
        counts: ValueCounts::default(),
    }))
}

pub(super) fn grouped_min(
    options: ScalarAggregateOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    Ok(Box::new(GroupedMinOrMax {
        inner: GroupedMinMax {
            options,
            input_type: input_type.clone(),
            state: Extrema::for_type(input_type)?,
            counts: ValueCounts::default(),
        },
        take_min: true,
    }))
}

pub(super) fn grouped_max(
    options: ScalarAggregateOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    Ok(Box::new(GroupedMinOrMax {
        inner: GroupedMinMax {
            options,
            input_type: input_type.clone(),
            state: Extrema::for_type(input_type)?,
            counts: ValueCounts::default(),
        },
        take_min: false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Float64Array;

    #[test]
    fn nan_is_ignored_unless_alone() {
        let mut kernel =
            grouped_min_max(ScalarAggregateOptions::default(), &DataType::Float64).unwrap();
        let values: ArrayRef = Arc::new(Float64Array::from(vec![
            Some(f64::NAN),
            Some(1.0),
            Some(f64::NAN),
        ]));
        let ids = UInt32Array::from(vec![0, 0, 1]);
        kernel.resize(2).unwrap();
        kernel.consume(&values, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        let out = out.as_any().downcast_ref::<StructArray>().unwrap();
        let min = out.column(0).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(min.value(0), 1.0);
        assert!(min.value(1).is_nan());
    }

    #[test]
    fn string_min_max() {
        let mut kernel = grouped_min_max(ScalarAggregateOptions::default(), &DataType::Utf8).unwrap();
        let values: ArrayRef = Arc::new(StringArray::from(vec![
            Some("pear"),
            Some("apple"),
            None,
        ]));
        let ids = UInt32Array::from(vec![0, 0, 0]);
        kernel.resize(1).unwrap();
        kernel.consume(&values, &ids).unwrap();
        let out = kernel.finalize().unwrap();
        let out = out.as_any().downcast_ref::<StructArray>().unwrap();
        let min = out.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        let max = out.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(min.value(0), "apple");
        assert_eq!(max.value(0), "pear");
    }
}
