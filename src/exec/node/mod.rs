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
//! Pipeline node contracts.
//!
//! Responsibilities:
//! - Defines the push-style node surface (`ExecNode`) and the downstream
//!   sink surface (`ExecSink`) the aggregate nodes deliver into.
//! - Defines the aggregate specification record and field references
//!   resolved against the input schema at construction.

pub mod aggregate;

use arrow::array::RecordBatch;
use arrow::datatypes::{Schema, SchemaRef};

use crate::common::error::{ExecError, ExecResult};
use crate::exec::agg::AggregateOptions;

/// Downstream consumer of a node's output. Deliveries may come from any
/// worker thread; the total batch count arrives exactly once.
pub trait ExecSink: Send + Sync {
    fn on_input(&self, batch: RecordBatch);
    fn on_input_total(&self, total: usize);
    fn on_error(&self, error: ExecError);
}

/// Push-style pipeline node surface. Upstream drives `on_input` /
/// `on_input_total` / `on_error` / `stop`; the node resolves its finished
/// latch in every outcome so both sides can join.
pub trait ExecNode: Send + Sync {
    fn start(&self) -> ExecResult<()>;
    fn on_input(&self, batch: RecordBatch);
    fn on_input_total(&self, total: usize);
    fn on_error(&self, error: ExecError);
    fn stop(&self);
    fn output_schema(&self) -> SchemaRef;
    fn wait_finished(&self);
    fn is_finished(&self) -> bool;
}

impl std::fmt::Debug for dyn ExecNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExecNode")
    }
}

/// Reference to one input column, by unique name or position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldRef {
    Name(String),
    Index(usize),
}

impl FieldRef {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn index(index: usize) -> Self {
        Self::Index(index)
    }

    /// Resolve against a schema; ambiguous or missing references are
    /// construction-time errors.
    pub fn find_one(&self, schema: &Schema) -> ExecResult<usize> {
        match self {
            FieldRef::Index(index) => {
                if *index < schema.fields().len() {
                    Ok(*index)
                } else {
                    Err(ExecError::invalid(format!(
                        "field index {index} out of range for schema with {} fields",
                        schema.fields().len()
                    )))
                }
            }
            FieldRef::Name(name) => {
                let matches: Vec<usize> = schema
                    .fields()
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| f.name() == name)
                    .map(|(i, _)| i)
                    .collect();
                match matches.as_slice() {
                    [index] => Ok(*index),
                    [] => Err(ExecError::invalid(format!(
                        "no field named '{name}' in input schema"
                    ))),
                    _ => Err(ExecError::invalid(format!(
                        "field reference '{name}' is ambiguous in input schema"
                    ))),
                }
            }
        }
    }
}

/// External configuration record for one aggregate: which kernel, its
/// options, the value column it folds, and the output field name.
#[derive(Clone, Debug)]
pub struct Aggregate {
    pub function: String,
    pub options: Option<AggregateOptions>,
    pub target: FieldRef,
    pub name: String,
}

impl Aggregate {
    pub fn new(function: impl Into<String>, target: FieldRef, name: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            options: None,
            target,
            name: name.into(),
        }
    }

    pub fn with_options(mut self, options: AggregateOptions) -> Self {
        self.options = Some(options);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field};

    #[test]
    fn field_ref_resolution() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("b", DataType::Int64, true),
            Field::new("a", DataType::Utf8, true),
        ]);
        assert_eq!(FieldRef::name("b").find_one(&schema).unwrap(), 1);
        assert_eq!(FieldRef::index(2).find_one(&schema).unwrap(), 2);
        assert!(matches!(
            FieldRef::name("a").find_one(&schema),
            Err(ExecError::Invalid(_))
        ));
        assert!(matches!(
            FieldRef::name("missing").find_one(&schema),
            Err(ExecError::Invalid(_))
        ));
        assert!(matches!(
            FieldRef::index(3).find_one(&schema),
            Err(ExecError::Invalid(_))
        ));
    }
}
