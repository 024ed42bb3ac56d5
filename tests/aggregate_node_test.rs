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
mod common;

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, DictionaryArray, Float64Array, Int32Array, Int64Array, RecordBatch,
    StringArray,
};
use arrow::datatypes::{DataType, Field, Int32Type, Schema, SchemaRef};
use threadpool::ThreadPool;

use common::{run_group_by, sort_batch_by, CollectSink};
use granite::exec::node::{Aggregate, ExecNode, FieldRef};
use granite::{make_aggregate_node, ExecContext, ExecError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn two_column_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("argument", DataType::Float64, true),
        Field::new("key", DataType::Int64, true),
    ]))
}

fn batch_of(schema: &SchemaRef, values: Vec<Option<f64>>, keys: Vec<Option<i64>>) -> RecordBatch {
    RecordBatch::try_new(
        Arc::clone(schema),
        vec![
            Arc::new(Float64Array::from(values)) as ArrayRef,
            Arc::new(Int64Array::from(keys)) as ArrayRef,
        ],
    )
    .unwrap()
}

#[test]
fn empty_input_emits_no_batches_but_announces_zero() {
    let schema = two_column_schema();
    let sink = Arc::new(CollectSink::default());
    let node = make_aggregate_node(
        ExecContext::default(),
        Arc::clone(&schema),
        vec![FieldRef::name("key")],
        vec![Aggregate::new(
            "hash_count",
            FieldRef::name("argument"),
            "count",
        )],
        Arc::clone(&sink) as _,
    )
    .unwrap();

    node.start().unwrap();
    node.on_input_total(0);
    node.wait_finished();

    assert!(sink.first_error().is_none());
    assert_eq!(sink.announced_total(), Some(0));
    assert!(sink.batches.lock().unwrap().is_empty());

    let schema = node.output_schema();
    assert_eq!(schema.field(0).name(), "count");
    assert_eq!(schema.field(0).data_type(), &DataType::Int64);
    assert_eq!(schema.field(1).name(), "key");
}

#[test]
fn output_is_chunked_by_the_configured_batch_size() {
    let schema = two_column_schema();
    let values: Vec<Option<f64>> = (0..10).map(|i| Some(i as f64)).collect();
    let keys: Vec<Option<i64>> = (0..10).map(|i| Some(i)).collect();
    let batch = batch_of(&schema, values, keys);

    let sink = Arc::new(CollectSink::default());
    let ctx = ExecContext {
        exec_chunksize: 4,
        ..ExecContext::default()
    };
    let node = make_aggregate_node(
        ctx,
        schema,
        vec![FieldRef::name("key")],
        vec![Aggregate::new(
            "hash_sum",
            FieldRef::name("argument"),
            "total",
        )],
        Arc::clone(&sink) as _,
    )
    .unwrap();

    node.start().unwrap();
    node.on_input(batch);
    node.on_input_total(1);
    node.wait_finished();

    assert!(sink.first_error().is_none());
    assert_eq!(sink.announced_total(), Some(3));
    let batches = sink.batches.lock().unwrap();
    let sizes: Vec<usize> = batches.iter().map(|b| b.num_rows()).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
}

#[test]
fn aggregate_columns_come_before_key_columns() {
    let schema = two_column_schema();
    let batch = batch_of(
        &schema,
        vec![Some(1.0), Some(2.0)],
        vec![Some(10), Some(10)],
    );
    let out = run_group_by(
        ExecContext::default(),
        schema,
        vec![batch],
        vec![FieldRef::name("key")],
        vec![Aggregate::new(
            "hash_sum",
            FieldRef::name("argument"),
            "total",
        )],
    )
    .unwrap();

    assert_eq!(out.schema().field(0).name(), "total");
    assert_eq!(out.schema().field(1).name(), "key");
    let totals = out
        .column(0)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(totals.value(0), 3.0);
}

#[test]
fn keys_only_aggregation_returns_the_uniques() {
    let schema = two_column_schema();
    let batch = batch_of(
        &schema,
        vec![Some(1.0), Some(2.0), Some(3.0)],
        vec![Some(5), Some(7), Some(5)],
    );
    let out = run_group_by(
        ExecContext::default(),
        schema,
        vec![batch],
        vec![FieldRef::name("key")],
        vec![],
    )
    .unwrap();

    assert_eq!(out.num_columns(), 1);
    let keys = out.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
    let got: Vec<i64> = (0..keys.len()).map(|i| keys.value(i)).collect();
    assert_eq!(got, vec![5, 7]);
}

#[test]
fn splitting_the_stream_does_not_change_the_result() {
    let mut rng = StdRng::seed_from_u64(17);
    let schema = two_column_schema();

    let mut batches = Vec::new();
    for _ in 0..6 {
        let values: Vec<Option<f64>> = (0..100)
            .map(|_| rng.gen_bool(0.85).then(|| rng.gen_range(-10.0..10.0)))
            .collect();
        let keys: Vec<Option<i64>> = (0..100)
            .map(|_| rng.gen_bool(0.9).then(|| rng.gen_range(0..8)))
            .collect();
        batches.push(batch_of(&schema, values, keys));
    }

    let aggregates = || {
        vec![
            Aggregate::new("hash_count", FieldRef::name("argument"), "count"),
            Aggregate::new("hash_sum", FieldRef::name("argument"), "sum"),
            Aggregate::new("hash_variance", FieldRef::name("argument"), "variance"),
        ]
    };

    let serial = run_group_by(
        ExecContext::default(),
        Arc::clone(&schema),
        batches.clone(),
        vec![FieldRef::name("key")],
        aggregates(),
    )
    .unwrap();
    let serial = sort_batch_by(&serial, 3);

    // Parallel delivery through a worker pool; merge order is arbitrary.
    let pool = Arc::new(ThreadPool::new(4));
    let ctx = ExecContext::with_executor(Arc::clone(&pool));
    let sink = Arc::new(CollectSink::default());
    let node = make_aggregate_node(
        ctx,
        Arc::clone(&schema),
        vec![FieldRef::name("key")],
        aggregates(),
        Arc::clone(&sink) as _,
    )
    .unwrap();
    node.start().unwrap();
    let total = batches.len();
    for batch in batches {
        let node = Arc::clone(&node);
        pool.execute(move || node.on_input(batch));
    }
    pool.join();
    node.on_input_total(total);
    node.wait_finished();
    assert!(sink.first_error().is_none());
    let parallel = sink.concatenated(&node.output_schema());
    let parallel = sort_batch_by(&parallel, 3);

    assert_eq!(serial.num_rows(), parallel.num_rows());
    let serial_counts = serial
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let parallel_counts = parallel
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let serial_sums = serial
        .column(1)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    let parallel_sums = parallel
        .column(1)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    let serial_vars = serial
        .column(2)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    let parallel_vars = parallel
        .column(2)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    for row in 0..serial.num_rows() {
        assert_eq!(serial_counts.value(row), parallel_counts.value(row));
        assert!((serial_sums.value(row) - parallel_sums.value(row)).abs() < 1e-9);
        assert_eq!(serial_vars.is_null(row), parallel_vars.is_null(row));
        if !serial_vars.is_null(row) {
            assert!((serial_vars.value(row) - parallel_vars.value(row)).abs() < 1e-9);
        }
    }
}

#[test]
fn scalar_aggregation_produces_one_row() {
    let schema = two_column_schema();
    let first = batch_of(&schema, vec![Some(1.0), None], vec![Some(1), Some(2)]);
    let second = batch_of(&schema, vec![Some(2.5)], vec![Some(3)]);

    let sink = Arc::new(CollectSink::default());
    let node = make_aggregate_node(
        ExecContext::default(),
        schema,
        vec![],
        vec![
            Aggregate::new("hash_count", FieldRef::name("argument"), "count"),
            Aggregate::new("hash_sum", FieldRef::name("argument"), "sum"),
        ],
        Arc::clone(&sink) as _,
    )
    .unwrap();

    node.start().unwrap();
    // Scalar aggregation knows its output size up front.
    assert_eq!(sink.announced_total(), Some(1));
    node.on_input(first);
    node.on_input(second);
    node.on_input_total(2);
    node.wait_finished();

    assert!(sink.first_error().is_none());
    let batches = sink.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.num_rows(), 1);
    let counts = batch
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let sums = batch
        .column(1)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(counts.value(0), 2);
    assert_eq!(sums.value(0), 3.5);
}

#[test]
fn scalar_aggregation_with_no_batches_reports_identities() {
    let schema = two_column_schema();
    let sink = Arc::new(CollectSink::default());
    let node = make_aggregate_node(
        ExecContext::default(),
        schema,
        vec![],
        vec![
            Aggregate::new("hash_count", FieldRef::name("argument"), "count"),
            Aggregate::new("hash_sum", FieldRef::name("argument"), "sum"),
        ],
        Arc::clone(&sink) as _,
    )
    .unwrap();

    node.start().unwrap();
    node.on_input_total(0);
    node.wait_finished();

    let batches = sink.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let counts = batches[0]
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    assert_eq!(counts.value(0), 0);
    assert!(batches[0].column(1).is_null(0));
}

#[test]
fn dictionary_keys_work_end_to_end() {
    let dict_type = DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8));
    let schema = Arc::new(Schema::new(vec![
        Field::new("argument", DataType::Float64, true),
        Field::new("key", dict_type.clone(), true),
    ]));
    let keys: ArrayRef = Arc::new(
        DictionaryArray::<Int32Type>::try_new(
            Int32Array::from(vec![Some(0), Some(1), Some(0), None]),
            Arc::new(StringArray::from(vec!["north", "south"])) as ArrayRef,
        )
        .unwrap(),
    );
    let batch = RecordBatch::try_new(
        Arc::clone(&schema),
        vec![
            Arc::new(Float64Array::from(vec![1.0, 2.0, 3.0, 4.0])) as ArrayRef,
            keys,
        ],
    )
    .unwrap();

    let out = run_group_by(
        ExecContext::default(),
        schema,
        vec![batch],
        vec![FieldRef::name("key")],
        vec![Aggregate::new(
            "hash_sum",
            FieldRef::name("argument"),
            "total",
        )],
    )
    .unwrap();

    assert_eq!(out.schema().field(1).data_type(), &dict_type);
    let totals = out
        .column(0)
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    // Insertion order: north, south, null key.
    assert_eq!(totals.value(0), 4.0);
    assert_eq!(totals.value(1), 2.0);
    assert_eq!(totals.value(2), 4.0);
}

#[test]
fn runtime_errors_are_forwarded_downstream() {
    let dict_type = DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8));
    let schema = Arc::new(Schema::new(vec![
        Field::new("argument", DataType::Float64, true),
        Field::new("key", dict_type, true),
    ]));
    let make_batch = |words: Vec<&str>| {
        let keys: ArrayRef = Arc::new(
            DictionaryArray::<Int32Type>::try_new(
                Int32Array::from(vec![0, 1]),
                Arc::new(StringArray::from(words)) as ArrayRef,
            )
            .unwrap(),
        );
        RecordBatch::try_new(
            Arc::clone(&schema),
            vec![
                Arc::new(Float64Array::from(vec![1.0, 2.0])) as ArrayRef,
                keys,
            ],
        )
        .unwrap()
    };

    let sink = Arc::new(CollectSink::default());
    let node = make_aggregate_node(
        ExecContext::default(),
        Arc::clone(&schema),
        vec![FieldRef::name("key")],
        vec![Aggregate::new(
            "hash_count",
            FieldRef::name("argument"),
            "count",
        )],
        Arc::clone(&sink) as _,
    )
    .unwrap();

    node.start().unwrap();
    node.on_input(make_batch(vec!["a", "b"]));
    node.on_input(make_batch(vec!["c", "d"]));
    node.wait_finished();

    let error = sink.first_error().expect("error should be forwarded");
    assert!(matches!(error, ExecError::NotImplemented(_)), "{error}");
    assert!(error.to_string().contains("Unifying differing dictionaries"));
    assert!(node.is_finished());
}

#[test]
fn stop_cancels_without_output() {
    let schema = two_column_schema();
    let sink = Arc::new(CollectSink::default());
    let node = make_aggregate_node(
        ExecContext::default(),
        schema.clone(),
        vec![FieldRef::name("key")],
        vec![Aggregate::new(
            "hash_count",
            FieldRef::name("argument"),
            "count",
        )],
        Arc::clone(&sink) as _,
    )
    .unwrap();

    node.start().unwrap();
    node.on_input(batch_of(&schema, vec![Some(1.0)], vec![Some(1)]));
    node.stop();
    node.wait_finished();

    assert!(sink.batches.lock().unwrap().is_empty());
    assert!(sink.announced_total().is_none());
    assert!(node.is_finished());

    // Input after stop is ignored.
    node.on_input(batch_of(&schema, vec![Some(2.0)], vec![Some(2)]));
    assert!(sink.batches.lock().unwrap().is_empty());
}

#[test]
fn a_thread_beyond_capacity_is_an_index_error() {
    let schema = two_column_schema();
    let sink = Arc::new(CollectSink::default());
    // No executor: exactly one partition slot.
    let node = make_aggregate_node(
        ExecContext::default(),
        schema.clone(),
        vec![FieldRef::name("key")],
        vec![Aggregate::new(
            "hash_count",
            FieldRef::name("argument"),
            "count",
        )],
        Arc::clone(&sink) as _,
    )
    .unwrap();

    node.start().unwrap();
    node.on_input(batch_of(&schema, vec![Some(1.0)], vec![Some(1)]));

    let worker_node = Arc::clone(&node);
    let worker_schema = Arc::clone(&schema);
    std::thread::spawn(move || {
        worker_node.on_input(batch_of(&worker_schema, vec![Some(2.0)], vec![Some(2)]));
    })
    .join()
    .unwrap();

    let error = sink.first_error().expect("index error should be forwarded");
    assert!(matches!(error, ExecError::IndexError(_)), "{error}");
    assert!(node.is_finished());
}

#[test]
fn starting_twice_is_rejected() {
    let schema = two_column_schema();
    let sink = Arc::new(CollectSink::default());
    let node = make_aggregate_node(
        ExecContext::default(),
        schema,
        vec![FieldRef::name("key")],
        vec![Aggregate::new(
            "hash_count",
            FieldRef::name("argument"),
            "count",
        )],
        Arc::clone(&sink) as _,
    )
    .unwrap();
    node.start().unwrap();
    assert!(matches!(node.start(), Err(ExecError::Invalid(_))));
}

#[test]
fn unresolved_target_fields_fail_construction() {
    let schema = two_column_schema();
    let sink = Arc::new(CollectSink::default());
    let err = make_aggregate_node(
        ExecContext::default(),
        schema,
        vec![FieldRef::name("key")],
        vec![Aggregate::new(
            "hash_count",
            FieldRef::name("no_such_column"),
            "count",
        )],
        sink as _,
    )
    .unwrap_err();
    assert!(matches!(err, ExecError::Invalid(_)), "{err}");
}
