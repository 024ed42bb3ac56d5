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
use arrow::array::{
    Array, ArrayRef, Decimal128Array, Decimal256Array, Float16Array, Float32Array, Float64Array,
    Int16Array, Int32Array, Int64Array, Int8Array, UInt16Array, UInt32Array, UInt64Array,
    UInt8Array,
};
use arrow::datatypes::DataType;

use crate::common::error::{ExecError, ExecResult};

fn downcast_err(data_type: &DataType) -> ExecError {
    ExecError::internal(format!("aggregate input downcast failed for {data_type:?}"))
}

#[derive(Clone)]
pub(crate) enum IntArrayView<'a> {
    Int8(&'a Int8Array),
    Int16(&'a Int16Array),
    Int32(&'a Int32Array),
    Int64(&'a Int64Array),
}

impl<'a> IntArrayView<'a> {
    pub(crate) fn new(array: &'a ArrayRef) -> ExecResult<Self> {
        let dc = || downcast_err(array.data_type());
        match array.data_type() {
            DataType::Int8 => array
                .as_any()
                .downcast_ref::<Int8Array>()
                .map(Self::Int8)
                .ok_or_else(dc),
            DataType::Int16 => array
                .as_any()
                .downcast_ref::<Int16Array>()
                .map(Self::Int16)
                .ok_or_else(dc),
            DataType::Int32 => array
                .as_any()
                .downcast_ref::<Int32Array>()
                .map(Self::Int32)
                .ok_or_else(dc),
            DataType::Int64 => array
                .as_any()
                .downcast_ref::<Int64Array>()
                .map(Self::Int64)
                .ok_or_else(dc),
            other => Err(ExecError::type_error(format!(
                "expected a signed integer column, got {other:?}"
            ))),
        }
    }

    pub(crate) fn value_at(&self, row: usize) -> Option<i64> {
        match self {
            Self::Int8(arr) => (!arr.is_null(row)).then(|| arr.value(row) as i64),
            Self::Int16(arr) => (!arr.is_null(row)).then(|| arr.value(row) as i64),
            Self::Int32(arr) => (!arr.is_null(row)).then(|| arr.value(row) as i64),
            Self::Int64(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
        }
    }
}

#[derive(Clone)]
pub(crate) enum UIntArrayView<'a> {
    UInt8(&'a UInt8Array),
    UInt16(&'a UInt16Array),
    UInt32(&'a UInt32Array),
    UInt64(&'a UInt64Array),
}

impl<'a> UIntArrayView<'a> {
    pub(crate) fn new(array: &'a ArrayRef) -> ExecResult<Self> {
        let dc = || downcast_err(array.data_type());
        match array.data_type() {
            DataType::UInt8 => array
                .as_any()
                .downcast_ref::<UInt8Array>()
                .map(Self::UInt8)
                .ok_or_else(dc),
            DataType::UInt16 => array
                .as_any()
                .downcast_ref::<UInt16Array>()
                .map(Self::UInt16)
                .ok_or_else(dc),
            DataType::UInt32 => array
                .as_any()
                .downcast_ref::<UInt32Array>()
                .map(Self::UInt32)
                .ok_or_else(dc),
            DataType::UInt64 => array
                .as_any()
                .downcast_ref::<UInt64Array>()
                .map(Self::UInt64)
                .ok_or_else(dc),
            other => Err(ExecError::type_error(format!(
                "expected an unsigned integer column, got {other:?}"
            ))),
        }
    }

    pub(crate) fn value_at(&self, row: usize) -> Option<u64> {
        match self {
            Self::UInt8(arr) => (!arr.is_null(row)).then(|| arr.value(row) as u64),
            Self::UInt16(arr) => (!arr.is_null(row)).then(|| arr.value(row) as u64),
            Self::UInt32(arr) => (!arr.is_null(row)).then(|| arr.value(row) as u64),
            Self::UInt64(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
        }
    }
}

#[derive(Clone)]
pub(crate) enum FloatArrayView<'a> {
    Float32(&'a Float32Array),
    Float64(&'a Float64Array),
}

impl<'a> FloatArrayView<'a> {
    pub(crate) fn new(array: &'a ArrayRef) -> ExecResult<Self> {
        let dc = || downcast_err(array.data_type());
        match array.data_type() {
            DataType::Float32 => array
                .as_any()
                .downcast_ref::<Float32Array>()
                .map(Self::Float32)
                .ok_or_else(dc),
            DataType::Float64 => array
                .as_any()
                .downcast_ref::<Float64Array>()
                .map(Self::Float64)
                .ok_or_else(dc),
            other => Err(ExecError::type_error(format!(
                "expected a floating point column, got {other:?}"
            ))),
        }
    }

    pub(crate) fn value_at(&self, row: usize) -> Option<f64> {
        match self {
            Self::Float32(arr) => (!arr.is_null(row)).then(|| arr.value(row) as f64),
            Self::Float64(arr) => (!arr.is_null(row)).then(|| arr.value(row)),
        }
    }
}

/// Lossy view of any numeric column as f64, used by the moment and
/// quantile kernels. Decimals are rescaled by their declared scale.
#[derive(Clone)]
pub(crate) enum F64CastView<'a> {
    Int(IntArrayView<'a>),
    UInt(UIntArrayView<'a>),
    Float(FloatArrayView<'a>),
    Float16(&'a Float16Array),
    Decimal128(&'a Decimal128Array, i8),
    Decimal256(&'a Decimal256Array, i8),
}

impl<'a> F64CastView<'a> {
    pub(crate) fn new(array: &'a ArrayRef) -> ExecResult<Self> {
        let dc = || downcast_err(array.data_type());
        match array.data_type() {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                Ok(Self::Int(IntArrayView::new(array)?))
            }
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
                Ok(Self::UInt(UIntArrayView::new(array)?))
            }
            DataType::Float32 | DataType::Float64 => Ok(Self::Float(FloatArrayView::new(array)?)),
            DataType::Float16 => array
                .as_any()
                .downcast_ref::<Float16Array>()
                .map(Self::Float16)
                .ok_or_else(dc),
            DataType::Decimal128(_, scale) => array
                .as_any()
                .downcast_ref::<Decimal128Array>()
                .map(|arr| Self::Decimal128(arr, *scale))
                .ok_or_else(dc),
            DataType::Decimal256(_, scale) => array
                .as_any()
                .downcast_ref::<Decimal256Array>()
                .map(|arr| Self::Decimal256(arr, *scale))
                .ok_or_else(dc),
            other => Err(ExecError::type_error(format!(
                "expected a numeric column, got {other:?}"
            ))),
        }
    }

    pub(crate) fn is_numeric(data_type: &DataType) -> bool {
        matches!(
            data_type,
            DataType::Int8
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
                | DataType::Decimal128(_, _)
                | DataType::Decimal256(_, _)
        )
    }

    pub(crate) fn value_at(&self, row: usize) -> Option<f64> {
        match self {
            Self::Int(view) => view.value_at(row).map(|v| v as f64),
            Self::UInt(view) => view.value_at(row).map(|v| v as f64),
            Self::Float(view) => view.value_at(row),
            Self::Float16(arr) => (!arr.is_null(row)).then(|| arr.value(row).to_f64()),
            Self::Decimal128(arr, scale) => (!arr.is_null(row))
                .then(|| arr.value(row) as f64 / 10f64.powi(*scale as i32)),
            Self::Decimal256(arr, scale) => (!arr.is_null(row))
                .then(|| i256_to_f64(arr.value(row)) / 10f64.powi(*scale as i32)),
        }
    }
}

fn i256_to_f64(value: arrow_buffer::i256) -> f64 {
    let (low, high) = value.to_parts();
    (high as f64) * 2f64.powi(128) + (low as f64)
}
