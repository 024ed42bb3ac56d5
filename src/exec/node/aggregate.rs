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
//! Grouped and scalar aggregate pipeline nodes.
//!
//! Responsibilities:
//! - Partitions incoming batches across worker threads, each with a local
//!   grouper and kernel states; merges partials into partition 0 once the
//!   input counter completes; finalizes and emits the result in chunks.
//! - Collapses to one accumulator set per thread when no keys are present.
//!
//! Key exported interfaces:
//! - Types: `GroupByNode`, `ScalarAggregateNode`; function:
//!   `make_aggregate_node`.
//!
//! Back-pressure is not propagated: without spill-to-disk the node has to
//! absorb its whole input before producing anything.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use arrow::array::{ArrayRef, RecordBatch, RecordBatchOptions, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use tracing::debug;

use crate::common::error::{ExecError, ExecResult};
use crate::exec::agg::{build_grouped_aggregator, resolve_output_type, GroupedAggregator};
use crate::exec::grouper::{make_grouper, Grouper};
use crate::exec::node::{Aggregate, ExecNode, ExecSink};
use crate::runtime::{AtomicCounter, ExecContext, FinishedLatch, ThreadIndexer};

const CREATED: u8 = 0;
const PRODUCING: u8 = 1;
const FINALIZING: u8 = 2;
const FINISHED: u8 = 3;
const STOPPED: u8 = 4;

/// Lifecycle byte plus the latch both ends join on.
struct NodeLifecycle {
    state: AtomicU8,
    latch: FinishedLatch,
}

impl NodeLifecycle {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(CREATED),
            latch: FinishedLatch::default(),
        }
    }

    fn begin_producing(&self) -> ExecResult<()> {
        self.state
            .compare_exchange(CREATED, PRODUCING, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| ExecError::invalid("node already started"))
    }

    fn begin_finalizing(&self) {
        let _ = self.state.compare_exchange(
            PRODUCING,
            FINALIZING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn finish(&self, terminal: u8) {
        self.state.store(terminal, Ordering::SeqCst);
        self.latch.mark();
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Resolve key/target field ids and the output schema shared by both node
/// shapes: aggregate result fields first (named by the aggregate records),
/// key fields last (named by the input schema).
fn resolve_fields(
    input_schema: &SchemaRef,
    keys: &[super::FieldRef],
    aggs: &[Aggregate],
) -> ExecResult<(Vec<usize>, Vec<usize>, SchemaRef)> {
    let mut key_field_ids = Vec::with_capacity(keys.len());
    for key in keys {
        key_field_ids.push(key.find_one(input_schema)?);
    }

    let mut agg_src_field_ids = Vec::with_capacity(aggs.len());
    let mut fields = Vec::with_capacity(aggs.len() + keys.len());
    for agg in aggs {
        let field_id = agg.target.find_one(input_schema)?;
        agg_src_field_ids.push(field_id);
        let out_type = resolve_output_type(
            &agg.function,
            agg.options.as_ref(),
            input_schema.field(field_id).data_type(),
        )?;
        fields.push(Field::new(&agg.name, out_type, true));
    }
    for &key_field_id in &key_field_ids {
        fields.push(input_schema.field(key_field_id).clone());
    }

    Ok((key_field_ids, agg_src_field_ids, Arc::new(Schema::new(fields))))
}

fn build_kernels(
    aggs: &[Aggregate],
    input_schema: &SchemaRef,
    agg_src_field_ids: &[usize],
) -> ExecResult<Vec<Box<dyn GroupedAggregator>>> {
    aggs.iter()
        .zip(agg_src_field_ids.iter())
        .map(|(agg, &field_id)| {
            build_grouped_aggregator(
                &agg.function,
                agg.options.as_ref(),
                input_schema.field(field_id).data_type(),
            )
        })
        .collect()
}

/// Construct the node matching the key list: a `GroupByNode` for grouped
/// aggregation, a `ScalarAggregateNode` when no keys are present.
pub fn make_aggregate_node(
    ctx: ExecContext,
    input_schema: SchemaRef,
    keys: Vec<super::FieldRef>,
    aggregates: Vec<Aggregate>,
    output: Arc<dyn ExecSink>,
) -> ExecResult<Arc<dyn ExecNode>> {
    if keys.is_empty() {
        Ok(Arc::new(ScalarAggregateNode::try_new(
            ctx,
            input_schema,
            aggregates,
            output,
        )?))
    } else {
        Ok(Arc::new(GroupByNode::try_new(
            ctx,
            input_schema,
            keys,
            aggregates,
            output,
        )?))
    }
}

/// One worker thread's partition: a grouper plus one kernel state per
/// aggregate, created lazily on the partition's first batch.
#[derive(Default)]
struct LocalState {
    grouper: Option<Box<dyn Grouper>>,
    agg_states: Vec<Box<dyn GroupedAggregator>>,
}

pub struct GroupByNode {
    ctx: ExecContext,
    output: Arc<dyn ExecSink>,
    input_schema: SchemaRef,
    output_schema: SchemaRef,
    key_field_ids: Vec<usize>,
    key_types: Vec<DataType>,
    agg_src_field_ids: Vec<usize>,
    aggs: Vec<Aggregate>,
    lifecycle: Arc<NodeLifecycle>,
    thread_indexer: ThreadIndexer,
    input_counter: AtomicCounter,
    output_counter: Arc<AtomicCounter>,
    local_states: OnceLock<Vec<Mutex<LocalState>>>,
}

impl GroupByNode {
    pub fn try_new(
        ctx: ExecContext,
        input_schema: SchemaRef,
        keys: Vec<super::FieldRef>,
        aggregates: Vec<Aggregate>,
        output: Arc<dyn ExecSink>,
    ) -> ExecResult<Self> {
        let (key_field_ids, agg_src_field_ids, output_schema) =
            resolve_fields(&input_schema, &keys, &aggregates)?;
        let key_types: Vec<DataType> = key_field_ids
            .iter()
            .map(|&id| input_schema.field(id).data_type().clone())
            .collect();
        // Probe the grouper now so unsupported key types abort plan
        // assembly instead of failing on the first batch.
        make_grouper(&key_types)?;

        Ok(Self {
            ctx,
            output,
            input_schema,
            output_schema,
            key_field_ids,
            key_types,
            agg_src_field_ids,
            aggs: aggregates,
            lifecycle: Arc::new(NodeLifecycle::new()),
            thread_indexer: ThreadIndexer::default(),
            input_counter: AtomicCounter::default(),
            output_counter: Arc::new(AtomicCounter::default()),
            local_states: OnceLock::new(),
        })
    }

    fn init_local_state(&self, state: &mut LocalState) -> ExecResult<()> {
        if state.grouper.is_some() {
            return Ok(());
        }
        state.grouper = Some(make_grouper(&self.key_types)?);
        state.agg_states =
            build_kernels(&self.aggs, &self.input_schema, &self.agg_src_field_ids)?;
        Ok(())
    }

    fn consume(&self, batch: &RecordBatch) -> ExecResult<()> {
        let states = self
            .local_states
            .get()
            .ok_or_else(|| ExecError::invalid("aggregate node received input before start"))?;
        let thread_index = self.thread_indexer.get();
        if thread_index >= states.len() {
            return Err(ExecError::IndexError(format!(
                "thread index {thread_index} is out of range [0, {})",
                states.len()
            )));
        }

        let mut state = lock(&states[thread_index]);
        self.init_local_state(&mut state)?;

        let keys: Vec<ArrayRef> = self
            .key_field_ids
            .iter()
            .map(|&id| Arc::clone(batch.column(id)))
            .collect();
        let grouper = state
            .grouper
            .as_mut()
            .ok_or_else(|| ExecError::internal("partition grouper missing"))?;
        let ids = grouper.consume(&keys, batch.num_rows())?;
        let num_groups = grouper.num_groups();

        for (i, agg_state) in state.agg_states.iter_mut().enumerate() {
            agg_state.resize(num_groups)?;
            agg_state.consume(batch.column(self.agg_src_field_ids[i]), &ids)?;
        }
        Ok(())
    }

    fn merge(&self, states: &[Mutex<LocalState>]) -> ExecResult<()> {
        let mut leader = lock(&states[0]);
        self.init_local_state(&mut leader)?;

        for partition in states.iter().skip(1) {
            let mut other = lock(partition);
            let Some(other_grouper) = other.grouper.take() else {
                continue;
            };
            let other_states = std::mem::take(&mut other.agg_states);
            drop(other);

            let uniques = other_grouper.get_uniques()?;
            let other_groups = other_grouper.num_groups() as usize;
            let leader_grouper = leader
                .grouper
                .as_mut()
                .ok_or_else(|| ExecError::internal("leader grouper missing"))?;
            let transposition = leader_grouper.consume(&uniques, other_groups)?;
            let num_groups = leader_grouper.num_groups();

            for (leader_state, other_state) in
                leader.agg_states.iter_mut().zip(other_states.into_iter())
            {
                leader_state.resize(num_groups)?;
                leader_state.merge(other_state, &transposition)?;
            }
        }
        Ok(())
    }

    fn finalize(&self, states: &[Mutex<LocalState>]) -> ExecResult<RecordBatch> {
        let mut leader = lock(&states[0]);
        let grouper = leader
            .grouper
            .as_mut()
            .ok_or_else(|| ExecError::internal("leader grouper missing"))?;
        let num_groups = grouper.num_groups();
        let uniques = grouper.get_uniques()?;

        let mut columns = Vec::with_capacity(self.aggs.len() + uniques.len());
        for agg_state in leader.agg_states.iter_mut() {
            agg_state.resize(num_groups)?;
            columns.push(agg_state.finalize()?);
        }
        columns.extend(uniques);

        leader.grouper = None;
        leader.agg_states.clear();

        let options = RecordBatchOptions::new().with_row_count(Some(num_groups as usize));
        Ok(RecordBatch::try_new_with_options(
            Arc::clone(&self.output_schema),
            columns,
            &options,
        )?)
    }

    fn output_result(&self) -> ExecResult<()> {
        self.lifecycle.begin_finalizing();
        let states = self
            .local_states
            .get()
            .ok_or_else(|| ExecError::invalid("aggregate node finalized before start"))?;

        self.merge(states)?;
        let out_data = self.finalize(states)?;

        let batch_size = self.ctx.output_batch_size();
        let num_chunks = out_data.num_rows().div_ceil(batch_size);
        debug!(
            groups = out_data.num_rows(),
            chunks = num_chunks,
            "aggregate finalized"
        );

        if self.output_counter.set_total(num_chunks) {
            // Zero-length result: announce and resolve without emitting.
            self.lifecycle.finish(FINISHED);
        }
        self.output.on_input_total(num_chunks);

        for n in 0..num_chunks {
            let output = Arc::clone(&self.output);
            let counter = Arc::clone(&self.output_counter);
            let lifecycle = Arc::clone(&self.lifecycle);
            let out = out_data.clone();
            let emit = move || {
                // Bail if stop() got there first.
                if lifecycle.latch.is_finished() {
                    return;
                }
                let offset = n * batch_size;
                let length = batch_size.min(out.num_rows() - offset);
                output.on_input(out.slice(offset, length));
                if counter.increment() {
                    lifecycle.finish(FINISHED);
                }
            };
            match self.ctx.executor.as_ref() {
                Some(pool) => pool.execute(emit),
                None => emit(),
            }
        }
        Ok(())
    }

    fn error(&self, error: ExecError) {
        debug!(%error, "aggregate node forwarding error");
        self.output.on_error(error);
        self.input_counter.cancel();
        if self.output_counter.cancel() {
            self.lifecycle.finish(FINISHED);
        }
    }
}

impl ExecNode for GroupByNode {
    fn start(&self) -> ExecResult<()> {
        self.lifecycle.begin_producing()?;
        let capacity = self.ctx.thread_capacity();
        let mut states = Vec::with_capacity(capacity);
        states.resize_with(capacity, || Mutex::new(LocalState::default()));
        self.local_states
            .set(states)
            .map_err(|_| ExecError::invalid("node already started"))?;
        Ok(())
    }

    fn on_input(&self, batch: RecordBatch) {
        if self.lifecycle.latch.is_finished() {
            return;
        }
        if let Err(error) = self.consume(&batch) {
            self.error(error);
            return;
        }
        if self.input_counter.increment() {
            if let Err(error) = self.output_result() {
                self.error(error);
            }
        }
    }

    fn on_input_total(&self, total: usize) {
        if self.lifecycle.latch.is_finished() {
            return;
        }
        if self.input_counter.set_total(total) {
            if let Err(error) = self.output_result() {
                self.error(error);
            }
        }
    }

    fn on_error(&self, error: ExecError) {
        self.error(error);
    }

    fn stop(&self) {
        self.input_counter.cancel();
        if self.output_counter.cancel() {
            self.lifecycle.finish(STOPPED);
        }
    }

    fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.output_schema)
    }

    fn wait_finished(&self) {
        self.lifecycle.latch.wait();
    }

    fn is_finished(&self) -> bool {
        self.lifecycle.latch.is_finished()
    }
}

pub struct ScalarAggregateNode {
    ctx: ExecContext,
    output: Arc<dyn ExecSink>,
    input_schema: SchemaRef,
    output_schema: SchemaRef,
    agg_src_field_ids: Vec<usize>,
    aggs: Vec<Aggregate>,
    lifecycle: Arc<NodeLifecycle>,
    thread_indexer: ThreadIndexer,
    input_counter: AtomicCounter,
    output_counter: Arc<AtomicCounter>,
    local_states: OnceLock<Vec<Mutex<Vec<Box<dyn GroupedAggregator>>>>>,
}

impl ScalarAggregateNode {
    pub fn try_new(
        ctx: ExecContext,
        input_schema: SchemaRef,
        aggregates: Vec<Aggregate>,
        output: Arc<dyn ExecSink>,
    ) -> ExecResult<Self> {
        let (_, agg_src_field_ids, output_schema) =
            resolve_fields(&input_schema, &[], &aggregates)?;
        Ok(Self {
            ctx,
            output,
            input_schema,
            output_schema,
            agg_src_field_ids,
            aggs: aggregates,
            lifecycle: Arc::new(NodeLifecycle::new()),
            thread_indexer: ThreadIndexer::default(),
            input_counter: AtomicCounter::default(),
            output_counter: Arc::new(AtomicCounter::default()),
            local_states: OnceLock::new(),
        })
    }

    fn init_state(&self, state: &mut Vec<Box<dyn GroupedAggregator>>) -> ExecResult<()> {
        if !state.is_empty() {
            return Ok(());
        }
        let mut kernels = build_kernels(&self.aggs, &self.input_schema, &self.agg_src_field_ids)?;
        for kernel in kernels.iter_mut() {
            kernel.resize(1)?;
        }
        *state = kernels;
        Ok(())
    }

    fn consume(&self, batch: &RecordBatch) -> ExecResult<()> {
        let states = self
            .local_states
            .get()
            .ok_or_else(|| ExecError::invalid("aggregate node received input before start"))?;
        let thread_index = self.thread_indexer.get();
        if thread_index >= states.len() {
            return Err(ExecError::IndexError(format!(
                "thread index {thread_index} is out of range [0, {})",
                states.len()
            )));
        }

        let mut state = lock(&states[thread_index]);
        self.init_state(&mut state)?;

        let ids = UInt32Array::from(vec![0u32; batch.num_rows()]);
        for (i, kernel) in state.iter_mut().enumerate() {
            kernel.consume(batch.column(self.agg_src_field_ids[i]), &ids)?;
        }
        Ok(())
    }

    /// Fold every thread's accumulators into partition 0 with the identity
    /// transposition, then emit the single result row.
    fn finish(&self) -> ExecResult<()> {
        self.lifecycle.begin_finalizing();
        let states = self
            .local_states
            .get()
            .ok_or_else(|| ExecError::invalid("aggregate node finalized before start"))?;

        let mut leader = lock(&states[0]);
        self.init_state(&mut leader)?;
        let identity = UInt32Array::from(vec![0u32]);
        for partition in states.iter().skip(1) {
            let other = std::mem::take(&mut *lock(partition));
            if other.is_empty() {
                continue;
            }
            for (leader_state, other_state) in leader.iter_mut().zip(other.into_iter()) {
                leader_state.merge(other_state, &identity)?;
            }
        }

        let mut columns = Vec::with_capacity(leader.len());
        for kernel in leader.iter_mut() {
            columns.push(kernel.finalize()?);
        }
        leader.clear();

        let options = RecordBatchOptions::new().with_row_count(Some(1));
        let batch = RecordBatch::try_new_with_options(
            Arc::clone(&self.output_schema),
            columns,
            &options,
        )?;
        self.output.on_input(batch);
        if self.output_counter.increment() {
            self.lifecycle.finish(FINISHED);
        }
        Ok(())
    }

    fn error(&self, error: ExecError) {
        debug!(%error, "scalar aggregate node forwarding error");
        self.output.on_error(error);
        self.input_counter.cancel();
        if self.output_counter.cancel() {
            self.lifecycle.finish(FINISHED);
        }
    }
}

impl ExecNode for ScalarAggregateNode {
    fn start(&self) -> ExecResult<()> {
        self.lifecycle.begin_producing()?;
        let capacity = self.ctx.thread_capacity();
        let mut states = Vec::with_capacity(capacity);
        states.resize_with(capacity, || Mutex::new(Vec::new()));
        self.local_states
            .set(states)
            .map_err(|_| ExecError::invalid("node already started"))?;
        // A scalar aggregation produces exactly one output batch.
        self.output_counter.set_total(1);
        self.output.on_input_total(1);
        Ok(())
    }

    fn on_input(&self, batch: RecordBatch) {
        if self.lifecycle.latch.is_finished() {
            return;
        }
        if let Err(error) = self.consume(&batch) {
            self.error(error);
            return;
        }
        if self.input_counter.increment() {
            if let Err(error) = self.finish() {
                self.error(error);
            }
        }
    }

    fn on_input_total(&self, total: usize) {
        if self.lifecycle.latch.is_finished() {
            return;
        }
        if self.input_counter.set_total(total) {
            if let Err(error) = self.finish() {
                self.error(error);
            }
        }
    }

    fn on_error(&self, error: ExecError) {
        self.error(error);
    }

    fn stop(&self) {
        self.input_counter.cancel();
        if self.output_counter.cancel() {
            self.lifecycle.finish(STOPPED);
        }
    }

    fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.output_schema)
    }

    fn wait_finished(&self) {
        self.lifecycle.latch.wait();
    }

    fn is_finished(&self) -> bool {
        self.lifecycle.latch.is_finished()
    }
}
