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
//! Key-row byte signatures.
//!
//! Each cell contributes a validity byte (1 = valid, 0 = null) followed by
//! its payload: native little-endian bytes for fixed-width cells, a u32
//! length prefix plus bytes for variable-width cells. Null-typed cells
//! contribute nothing. Equality of encodings is equivalent to null-aware row
//! equality; floats are canonicalized so every NaN encodes identically while
//! -0.0 and +0.0 stay distinct. Encodings are only compared against other
//! encodings produced by the same grouper.

use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Date64Array, Decimal128Array,
    Decimal256Array, DurationMicrosecondArray, DurationMillisecondArray, DurationNanosecondArray,
    DurationSecondArray, FixedSizeBinaryArray, Float16Array, Float32Array, Float64Array,
    Int16Array, Int32Array, Int64Array, Int8Array, IntervalDayTimeArray, IntervalMonthDayNanoArray,
    IntervalYearMonthArray, LargeBinaryArray, LargeStringArray, StringArray, Time32MillisecondArray,
    Time32SecondArray, Time64MicrosecondArray, Time64NanosecondArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray, UInt16Array,
    UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, IntervalUnit, TimeUnit};

use crate::common::error::{ExecError, ExecResult};

use super::hash::{canonical_f16_bits, canonical_f32_bits, canonical_f64_bits};

/// Key column types the groupers accept. Nested types are rejected at
/// grouper construction with `NotImplemented`.
pub(crate) fn is_supported_key_type(data_type: &DataType) -> bool {
    match data_type {
        DataType::Null
        | DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Binary
        | DataType::LargeBinary
        | DataType::FixedSizeBinary(_)
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _)
        | DataType::Date32
        | DataType::Date64
        | DataType::Time32(_)
        | DataType::Time64(_)
        | DataType::Timestamp(_, _)
        | DataType::Duration(_)
        | DataType::Interval(_) => true,
        DataType::Dictionary(index, value) => {
            matches!(
                index.as_ref(),
                DataType::Int8
                    | DataType::Int16
                    | DataType::Int32
                    | DataType::Int64
                    | DataType::UInt8
                    | DataType::UInt16
                    | DataType::UInt32
                    | DataType::UInt64
            ) && matches!(value.as_ref(), DataType::Utf8 | DataType::LargeUtf8)
        }
        _ => false,
    }
}

/// Payload width for fixed-width cells; `None` for variable-width,
/// dictionary and null-typed columns.
pub(crate) fn fixed_cell_width(data_type: &DataType) -> Option<usize> {
    match data_type {
        DataType::Boolean | DataType::Int8 | DataType::UInt8 => Some(1),
        DataType::Int16 | DataType::UInt16 | DataType::Float16 => Some(2),
        DataType::Int32
        | DataType::UInt32
        | DataType::Float32
        | DataType::Date32
        | DataType::Time32(_)
        | DataType::Interval(IntervalUnit::YearMonth) => Some(4),
        DataType::Int64
        | DataType::UInt64
        | DataType::Float64
        | DataType::Date64
        | DataType::Time64(_)
        | DataType::Timestamp(_, _)
        | DataType::Duration(_)
        | DataType::Interval(IntervalUnit::DayTime) => Some(8),
        DataType::Decimal128(_, _) | DataType::Interval(IntervalUnit::MonthDayNano) => Some(16),
        DataType::Decimal256(_, _) => Some(32),
        DataType::FixedSizeBinary(width) => Some(*width as usize),
        _ => None,
    }
}

/// Row width of the all-fixed-width fast layout, counting one validity byte
/// per column. `None` when any column falls outside the fast path.
pub(crate) fn fixed_row_width(key_types: &[DataType]) -> Option<usize> {
    key_types
        .iter()
        .map(|t| fixed_cell_width(t).map(|w| w + 1))
        .sum()
}

fn downcast_err(data_type: &DataType) -> ExecError {
    ExecError::internal(format!("key column downcast failed for {data_type:?}"))
}

macro_rules! put_primitive {
    ($array:expr, $row:expr, $out:expr, $arr_ty:ty, $width:expr, $convert:expr) => {{
        let arr = $array
            .as_any()
            .downcast_ref::<$arr_ty>()
            .ok_or_else(|| downcast_err($array.data_type()))?;
        if arr.is_null($row) {
            $out.push(0);
            $out.extend_from_slice(&[0u8; $width]);
        } else {
            $out.push(1);
            let bytes = $convert(arr.value($row));
            $out.extend_from_slice(&bytes);
        }
        Ok(())
    }};
}

/// Append the fixed-layout signature of one cell: validity byte plus exactly
/// `fixed_cell_width` payload bytes (zeroed when null).
pub(crate) fn encode_fixed_cell(array: &ArrayRef, row: usize, out: &mut Vec<u8>) -> ExecResult<()> {
    match array.data_type() {
        DataType::Boolean => {
            let arr = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| downcast_err(array.data_type()))?;
            if arr.is_null(row) {
                out.extend_from_slice(&[0, 0]);
            } else {
                out.push(1);
                out.push(arr.value(row) as u8);
            }
            Ok(())
        }
        DataType::Int8 => put_primitive!(array, row, out, Int8Array, 1, |v: i8| v.to_le_bytes()),
        DataType::Int16 => put_primitive!(array, row, out, Int16Array, 2, |v: i16| v.to_le_bytes()),
        DataType::Int32 => put_primitive!(array, row, out, Int32Array, 4, |v: i32| v.to_le_bytes()),
        DataType::Int64 => put_primitive!(array, row, out, Int64Array, 8, |v: i64| v.to_le_bytes()),
        DataType::UInt8 => put_primitive!(array, row, out, UInt8Array, 1, |v: u8| v.to_le_bytes()),
        DataType::UInt16 => {
            put_primitive!(array, row, out, UInt16Array, 2, |v: u16| v.to_le_bytes())
        }
        DataType::UInt32 => {
            put_primitive!(array, row, out, UInt32Array, 4, |v: u32| v.to_le_bytes())
        }
        DataType::UInt64 => {
            put_primitive!(array, row, out, UInt64Array, 8, |v: u64| v.to_le_bytes())
        }
        DataType::Float16 => {
            put_primitive!(array, row, out, Float16Array, 2, |v: half::f16| {
                canonical_f16_bits(v).to_le_bytes()
            })
        }
        DataType::Float32 => {
            put_primitive!(array, row, out, Float32Array, 4, |v: f32| {
                canonical_f32_bits(v).to_le_bytes()
            })
        }
        DataType::Float64 => {
            put_primitive!(array, row, out, Float64Array, 8, |v: f64| {
                canonical_f64_bits(v).to_le_bytes()
            })
        }
        DataType::Decimal128(_, _) => {
            put_primitive!(array, row, out, Decimal128Array, 16, |v: i128| v
                .to_le_bytes())
        }
        DataType::Decimal256(_, _) => {
            put_primitive!(
                array,
                row,
                out,
                Decimal256Array,
                32,
                |v: arrow_buffer::i256| v.to_le_bytes()
            )
        }
        DataType::Date32 => {
            put_primitive!(array, row, out, Date32Array, 4, |v: i32| v.to_le_bytes())
        }
        DataType::Date64 => {
            put_primitive!(array, row, out, Date64Array, 8, |v: i64| v.to_le_bytes())
        }
        DataType::Time32(TimeUnit::Second) => {
            put_primitive!(array, row, out, Time32SecondArray, 4, |v: i32| v
                .to_le_bytes())
        }
        DataType::Time32(TimeUnit::Millisecond) => {
            put_primitive!(array, row, out, Time32MillisecondArray, 4, |v: i32| v
                .to_le_bytes())
        }
        DataType::Time32(unit) => Err(ExecError::invalid(format!(
            "Time32 does not support unit {unit:?}"
        ))),
        DataType::Time64(TimeUnit::Microsecond) => {
            put_primitive!(array, row, out, Time64MicrosecondArray, 8, |v: i64| v
                .to_le_bytes())
        }
        DataType::Time64(TimeUnit::Nanosecond) => {
            put_primitive!(array, row, out, Time64NanosecondArray, 8, |v: i64| v
                .to_le_bytes())
        }
        DataType::Time64(unit) => Err(ExecError::invalid(format!(
            "Time64 does not support unit {unit:?}"
        ))),
        DataType::Timestamp(TimeUnit::Second, _) => {
            put_primitive!(array, row, out, TimestampSecondArray, 8, |v: i64| v
                .to_le_bytes())
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            put_primitive!(array, row, out, TimestampMillisecondArray, 8, |v: i64| v
                .to_le_bytes())
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            put_primitive!(array, row, out, TimestampMicrosecondArray, 8, |v: i64| v
                .to_le_bytes())
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            put_primitive!(array, row, out, TimestampNanosecondArray, 8, |v: i64| v
                .to_le_bytes())
        }
        DataType::Duration(TimeUnit::Second) => {
            put_primitive!(array, row, out, DurationSecondArray, 8, |v: i64| v
                .to_le_bytes())
        }
        DataType::Duration(TimeUnit::Millisecond) => {
            put_primitive!(array, row, out, DurationMillisecondArray, 8, |v: i64| v
                .to_le_bytes())
        }
        DataType::Duration(TimeUnit::Microsecond) => {
            put_primitive!(array, row, out, DurationMicrosecondArray, 8, |v: i64| v
                .to_le_bytes())
        }
        DataType::Duration(TimeUnit::Nanosecond) => {
            put_primitive!(array, row, out, DurationNanosecondArray, 8, |v: i64| v
                .to_le_bytes())
        }
        DataType::Interval(IntervalUnit::YearMonth) => {
            put_primitive!(array, row, out, IntervalYearMonthArray, 4, |v: i32| v
                .to_le_bytes())
        }
        DataType::Interval(IntervalUnit::DayTime) => {
            let arr = array
                .as_any()
                .downcast_ref::<IntervalDayTimeArray>()
                .ok_or_else(|| downcast_err(array.data_type()))?;
            if arr.is_null(row) {
                out.push(0);
                out.extend_from_slice(&[0u8; 8]);
            } else {
                out.push(1);
                let v = arr.value(row);
                out.extend_from_slice(&v.days.to_le_bytes());
                out.extend_from_slice(&v.milliseconds.to_le_bytes());
            }
            Ok(())
        }
        DataType::Interval(IntervalUnit::MonthDayNano) => {
            let arr = array
                .as_any()
                .downcast_ref::<IntervalMonthDayNanoArray>()
                .ok_or_else(|| downcast_err(array.data_type()))?;
            if arr.is_null(row) {
                out.push(0);
                out.extend_from_slice(&[0u8; 16]);
            } else {
                out.push(1);
                let v = arr.value(row);
                out.extend_from_slice(&v.months.to_le_bytes());
                out.extend_from_slice(&v.days.to_le_bytes());
                out.extend_from_slice(&v.nanoseconds.to_le_bytes());
            }
            Ok(())
        }
        DataType::FixedSizeBinary(width) => {
            let arr = array
                .as_any()
                .downcast_ref::<FixedSizeBinaryArray>()
                .ok_or_else(|| downcast_err(array.data_type()))?;
            if arr.is_null(row) {
                out.push(0);
                out.extend(std::iter::repeat(0u8).take(*width as usize));
            } else {
                out.push(1);
                out.extend_from_slice(arr.value(row));
            }
            Ok(())
        }
        other => Err(ExecError::internal(format!(
            "fixed-width key encoding does not cover {other:?}"
        ))),
    }
}

fn put_varlen(out: &mut Vec<u8>, value: Option<&[u8]>) {
    match value {
        None => out.push(0),
        Some(bytes) => {
            out.push(1);
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(bytes);
        }
    }
}

/// Logical key index of a dictionary cell, normalized to i64.
pub(crate) fn dictionary_index(array: &ArrayRef, row: usize) -> ExecResult<Option<i64>> {
    use arrow::array::DictionaryArray;
    use arrow::datatypes::*;

    macro_rules! index_of {
        ($key_ty:ty) => {{
            let arr = array
                .as_any()
                .downcast_ref::<DictionaryArray<$key_ty>>()
                .ok_or_else(|| downcast_err(array.data_type()))?;
            if arr.keys().is_null(row) {
                Ok(None)
            } else {
                Ok(Some(arr.keys().value(row) as i64))
            }
        }};
    }

    match array.data_type() {
        DataType::Dictionary(index, _) => match index.as_ref() {
            DataType::Int8 => index_of!(Int8Type),
            DataType::Int16 => index_of!(Int16Type),
            DataType::Int32 => index_of!(Int32Type),
            DataType::Int64 => index_of!(Int64Type),
            DataType::UInt8 => index_of!(UInt8Type),
            DataType::UInt16 => index_of!(UInt16Type),
            DataType::UInt32 => index_of!(UInt32Type),
            DataType::UInt64 => index_of!(UInt64Type),
            other => Err(ExecError::not_implemented(format!(
                "dictionary index type {other:?}"
            ))),
        },
        other => Err(ExecError::internal(format!(
            "dictionary_index on non-dictionary {other:?}"
        ))),
    }
}

/// The dictionary values array backing a dictionary-encoded key column.
pub(crate) fn dictionary_values(array: &ArrayRef) -> ExecResult<ArrayRef> {
    use arrow::array::DictionaryArray;
    use arrow::datatypes::*;

    macro_rules! values_of {
        ($key_ty:ty) => {{
            let arr = array
                .as_any()
                .downcast_ref::<DictionaryArray<$key_ty>>()
                .ok_or_else(|| downcast_err(array.data_type()))?;
            Ok(arr.values().clone())
        }};
    }

    match array.data_type() {
        DataType::Dictionary(index, _) => match index.as_ref() {
            DataType::Int8 => values_of!(Int8Type),
            DataType::Int16 => values_of!(Int16Type),
            DataType::Int32 => values_of!(Int32Type),
            DataType::Int64 => values_of!(Int64Type),
            DataType::UInt8 => values_of!(UInt8Type),
            DataType::UInt16 => values_of!(UInt16Type),
            DataType::UInt32 => values_of!(UInt32Type),
            DataType::UInt64 => values_of!(UInt64Type),
            other => Err(ExecError::not_implemented(format!(
                "dictionary index type {other:?}"
            ))),
        },
        other => Err(ExecError::internal(format!(
            "dictionary_values on non-dictionary {other:?}"
        ))),
    }
}

/// Append the general signature of one cell. Fixed-width cells reuse the
/// fixed layout; variable-width cells are length prefixed; null-typed cells
/// contribute nothing; dictionary cells encode their key index (callers are
/// responsible for verifying dictionaries are shared).
pub(crate) fn encode_key_cell(array: &ArrayRef, row: usize, out: &mut Vec<u8>) -> ExecResult<()> {
    match array.data_type() {
        DataType::Null => Ok(()),
        DataType::Utf8 => {
            let arr = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| downcast_err(array.data_type()))?;
            let value = (!arr.is_null(row)).then(|| arr.value(row).as_bytes());
            put_varlen(out, value);
            Ok(())
        }
        DataType::LargeUtf8 => {
            let arr = array
                .as_any()
                .downcast_ref::<LargeStringArray>()
                .ok_or_else(|| downcast_err(array.data_type()))?;
            let value = (!arr.is_null(row)).then(|| arr.value(row).as_bytes());
            put_varlen(out, value);
            Ok(())
        }
        DataType::Binary => {
            let arr = array
                .as_any()
                .downcast_ref::<BinaryArray>()
                .ok_or_else(|| downcast_err(array.data_type()))?;
            let value = (!arr.is_null(row)).then(|| arr.value(row));
            put_varlen(out, value);
            Ok(())
        }
        DataType::LargeBinary => {
            let arr = array
                .as_any()
                .downcast_ref::<LargeBinaryArray>()
                .ok_or_else(|| downcast_err(array.data_type()))?;
            let value = (!arr.is_null(row)).then(|| arr.value(row));
            put_varlen(out, value);
            Ok(())
        }
        DataType::Dictionary(_, _) => {
            match dictionary_index(array, row)? {
                None => out.push(0),
                Some(index) => {
                    out.push(1);
                    out.extend_from_slice(&index.to_le_bytes());
                }
            }
            Ok(())
        }
        _ => encode_fixed_cell(array, row, out),
    }
}
