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
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use arrow::array::{ArrayRef, RecordBatch};
use arrow::compute::{concat_batches, sort_to_indices, take, SortOptions};
use arrow::datatypes::SchemaRef;

use granite::exec::node::{Aggregate, ExecNode, ExecSink, FieldRef};
use granite::{make_aggregate_node, ExecContext, ExecError, ExecResult};

/// Sink that records everything the node delivers.
#[derive(Default)]
pub struct CollectSink {
    pub batches: Mutex<Vec<RecordBatch>>,
    pub total: Mutex<Option<usize>>,
    pub errors: Mutex<Vec<ExecError>>,
}

impl ExecSink for CollectSink {
    fn on_input(&self, batch: RecordBatch) {
        self.batches.lock().unwrap().push(batch);
    }

    fn on_input_total(&self, total: usize) {
        *self.total.lock().unwrap() = Some(total);
    }

    fn on_error(&self, error: ExecError) {
        self.errors.lock().unwrap().push(error);
    }
}

impl CollectSink {
    pub fn first_error(&self) -> Option<ExecError> {
        self.errors.lock().unwrap().first().cloned()
    }

    pub fn announced_total(&self) -> Option<usize> {
        *self.total.lock().unwrap()
    }

    pub fn concatenated(&self, schema: &SchemaRef) -> RecordBatch {
        let batches = self.batches.lock().unwrap();
        concat_batches(schema, batches.iter()).expect("concat output batches")
    }
}

/// Drive an aggregate node over the given batches on the calling thread and
/// return the concatenated output.
pub fn run_group_by(
    ctx: ExecContext,
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    keys: Vec<FieldRef>,
    aggregates: Vec<Aggregate>,
) -> ExecResult<RecordBatch> {
    let sink = Arc::new(CollectSink::default());
    let node = make_aggregate_node(ctx, schema, keys, aggregates, Arc::clone(&sink) as _)?;
    node.start()?;
    let total = batches.len();
    for batch in batches {
        node.on_input(batch);
    }
    node.on_input_total(total);
    node.wait_finished();
    if let Some(error) = sink.first_error() {
        return Err(error);
    }
    Ok(sink.concatenated(&node.output_schema()))
}

/// Sort a result batch by one column, nulls last, for order-insensitive
/// comparisons (parallel input makes row order non-deterministic).
pub fn sort_batch_by(batch: &RecordBatch, column: usize) -> RecordBatch {
    let options = SortOptions {
        descending: false,
        nulls_first: false,
    };
    let indices = sort_to_indices(batch.column(column), Some(options), None).expect("sort");
    let columns: Vec<ArrayRef> = batch
        .columns()
        .iter()
        .map(|c| take(c.as_ref(), &indices, None).expect("take"))
        .collect();
    RecordBatch::try_new(batch.schema(), columns).expect("sorted batch")
}
