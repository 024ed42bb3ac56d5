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
//! Execution error kinds shared by the grouper, kernels and nodes.
//!
//! Construction-time errors (unsupported key types, unresolved field
//! references, malformed options) abort node assembly; runtime errors are
//! forwarded downstream via `ExecSink::on_error`. Per-row null handling is
//! data, not an error.

use arrow::error::ArrowError;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecError {
    /// Functionality the engine deliberately does not provide.
    #[error("NotImplemented: {0}")]
    NotImplemented(String),

    /// Malformed request: bad options, null group ids, unresolved fields.
    #[error("Invalid: {0}")]
    Invalid(String),

    /// A worker thread index fell outside the pre-allocated partition range.
    #[error("IndexError: {0}")]
    IndexError(String),

    /// Declared input type incompatible with the resolved column.
    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("OutOfMemory: {0}")]
    OutOfMemory(String),

    /// Invariant violation inside the engine. Seeing this is a bug.
    #[error("Internal: {0}")]
    Internal(String),
}

impl ExecError {
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<ArrowError> for ExecError {
    fn from(e: ArrowError) -> Self {
        ExecError::Internal(e.to_string())
    }
}

impl From<std::collections::TryReserveError> for ExecError {
    fn from(e: std::collections::TryReserveError) -> Self {
        ExecError::OutOfMemory(e.to_string())
    }
}
