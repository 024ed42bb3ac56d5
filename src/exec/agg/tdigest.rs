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
//! Approximate quantiles per group via Dunning's merging t-digest.
//!
//! `hash_tdigest` reports one `FixedSizeList<Float64>` cell per group with
//! an entry per requested quantile; `hash_approximate_median` shares the
//! digest with `q = 0.5` and reports a plain Float64.

use std::any::Any;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, UInt32Array};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{DataType, Field};

use crate::common::error::{ExecError, ExecResult};

use super::views::F64CastView;
use super::{
    downcast_merge, normalize_value_column, GroupedAggregator, ScalarAggregateOptions,
    TDigestOptions, ValueCounts,
};

#[derive(Clone, Copy, Debug)]
struct Centroid {
    mean: f64,
    weight: f64,
}

/// Merging t-digest: incoming values collect in a buffer and are folded into
/// the centroid list once the buffer fills. Centroid widths are bounded by
/// `4 * W * q * (1 - q) / delta`, keeping the tails fine-grained.
#[derive(Clone, Debug)]
pub(crate) struct TDigest {
    delta: f64,
    buffer_size: usize,
    centroids: Vec<Centroid>,
    buffer: Vec<Centroid>,
    min: f64,
    max: f64,
}

impl TDigest {
    pub(crate) fn new(delta: u32, buffer_size: u32) -> Self {
        Self {
            delta: delta as f64,
            buffer_size: buffer_size.max(1) as usize,
            centroids: Vec::new(),
            buffer: Vec::new(),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub(crate) fn push(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.buffer.push(Centroid {
            mean: value,
            weight: 1.0,
        });
        if self.buffer.len() >= self.buffer_size {
            self.compress();
        }
    }

    pub(crate) fn merge_digest(&mut self, other: &TDigest) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.buffer.extend_from_slice(&other.centroids);
        self.buffer.extend_from_slice(&other.buffer);
        self.compress();
    }

    fn total_weight(&self) -> f64 {
        self.centroids.iter().map(|c| c.weight).sum::<f64>()
            + self.buffer.iter().map(|c| c.weight).sum::<f64>()
    }

    fn compress(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let mut all = std::mem::take(&mut self.centroids);
        all.append(&mut self.buffer);
        all.sort_by(|a, b| a.mean.total_cmp(&b.mean));

        let total: f64 = all.iter().map(|c| c.weight).sum();
        let mut merged: Vec<Centroid> = Vec::new();
        let mut current = all[0];
        let mut weight_so_far = 0.0;
        for next in all.into_iter().skip(1) {
            let q = (weight_so_far + (current.weight + next.weight) / 2.0) / total;
            let limit = 4.0 * total * q * (1.0 - q) / self.delta;
            if current.weight + next.weight <= limit {
                let weight = current.weight + next.weight;
                current.mean += (next.mean - current.mean) * next.weight / weight;
                current.weight = weight;
            } else {
                weight_so_far += current.weight;
                merged.push(current);
                current = next;
            }
        }
        merged.push(current);
        self.centroids = merged;
    }

    pub(crate) fn quantile(&mut self, q: f64) -> Option<f64> {
        self.compress();
        if self.centroids.is_empty() {
            return None;
        }
        if self.centroids.len() == 1 {
            return Some(self.centroids[0].mean);
        }
        let total: f64 = self.centroids.iter().map(|c| c.weight).sum();
        let target = q.clamp(0.0, 1.0) * total;

        // Each centroid is assumed to sit at the midpoint of its weight span.
        let mut cumulative = 0.0;
        let mut prev_pos = 0.0;
        let mut prev_mean = self.min;
        for centroid in &self.centroids {
            let pos = cumulative + centroid.weight / 2.0;
            if target < pos {
                let span = pos - prev_pos;
                let fraction = if span > 0.0 {
                    (target - prev_pos) / span
                } else {
                    0.0
                };
                let value = prev_mean + (centroid.mean - prev_mean) * fraction;
                return Some(value.clamp(self.min, self.max));
            }
            cumulative += centroid.weight;
            prev_pos = pos;
            prev_mean = centroid.mean;
        }
        Some(self.max)
    }
}

pub(super) struct GroupedTDigest {
    options: TDigestOptions,
    digests: Vec<TDigest>,
    counts: ValueCounts,
}

impl GroupedTDigest {
    fn new(options: TDigestOptions, input_type: &DataType, name: &str) -> ExecResult<Self> {
        if !F64CastView::is_numeric(input_type) {
            return Err(ExecError::type_error(format!(
                "{name} unsupported input type: {input_type:?}"
            )));
        }
        Ok(Self {
            options,
            digests: Vec::new(),
            counts: ValueCounts::default(),
        })
    }

    fn resize_impl(&mut self, new_num_groups: u32) {
        let template = TDigest::new(self.options.delta, self.options.buffer_size);
        self.digests
            .resize_with(new_num_groups as usize, || template.clone());
        self.counts.resize(new_num_groups as usize);
    }

    fn consume_impl(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        let values = normalize_value_column(values, group_ids.len())?;
        let view = F64CastView::new(&values)?;
        for row in 0..group_ids.len() {
            let group = group_ids.value(row) as usize;
            match view.value_at(row) {
                Some(v) if !v.is_nan() => {
                    self.digests[group].push(v);
                    self.counts.add_valid(group);
                }
                Some(_) => self.counts.add_valid(group),
                None => self.counts.add_null(group),
            }
        }
        Ok(())
    }

    fn merge_impl(&mut self, other: &GroupedTDigest, transposition: &UInt32Array) {
        for (j, digest) in other.digests.iter().enumerate() {
            self.digests[transposition.value(j) as usize].merge_digest(digest);
        }
        self.counts.merge_from(&other.counts, transposition);
    }

    /// Per-group quantile rows; `None` for groups that are null under the
    /// policy or saw no usable values.
    fn quantile_rows(&mut self) -> Vec<Option<Vec<f64>>> {
        let q = self.options.q.clone();
        (0..self.counts.len())
            .map(|group| {
                if self.counts.output_is_null(
                    group,
                    self.options.skip_nulls,
                    self.options.min_count,
                ) {
                    return None;
                }
                let digest = &mut self.digests[group];
                let row: Option<Vec<f64>> =
                    q.iter().map(|q| digest.quantile(*q)).collect();
                row
            })
            .collect()
    }
}

impl GroupedAggregator for GroupedTDigest {
    fn output_type(&self) -> DataType {
        DataType::FixedSizeList(
            Arc::new(Field::new_list_field(DataType::Float64, true)),
            self.options.q.len() as i32,
        )
    }

    fn resize(&mut self, new_num_groups: u32) -> ExecResult<()> {
        self.resize_impl(new_num_groups);
        Ok(())
    }

    fn consume(&mut self, values: &ArrayRef, group_ids: &UInt32Array) -> ExecResult<()> {
        self.consume_impl(values, group_ids)
    }

    fn merge(
        &mut self,
        other: Box<dyn GroupedAggregator>,
        transposition: &UInt32Array,
    ) -> ExecResult<()> {
        let other = downcast_merge::<Self>(other)?;
        self.merge_impl(&other, transposition);
        Ok(())
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        let width = self.options.q.len();
        let rows = self.quantile_rows();
        let mut child = Vec::with_capacity(rows.len() * width);
        let mut validity = Vec::with_capacity(rows.len());
        for row in &rows {
            match row {
                Some(values) => {
                    child.extend_from_slice(values);
                    validity.push(true);
                }
                None => {
                    child.extend(std::iter::repeat(0.0).take(width));
                    validity.push(false);
                }
            }
        }
        let array = arrow::array::FixedSizeListArray::new(
            Arc::new(Field::new_list_field(DataType::Float64, true)),
            width as i32,
            Arc::new(Float64Array::from(child)),
            Some(NullBuffer::from(validity)),
        );
        Ok(Arc::new(array))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Median through the same digest, reported as a plain Float64 column.
pub(super) struct GroupedApproxMedian {
    inner: GroupedTDigest,
}

impl GroupedAggregator for GroupedApproxMedian {
    fn output_type(&self) -> DataType {
        DataType::Float64
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
        let other = downcast_merge::<Self>(other)?;
        self.inner.merge_impl(&other.inner, transposition);
        Ok(())
    }

    fn finalize(&mut self) -> ExecResult<ArrayRef> {
        let rows = self.inner.quantile_rows();
        let out: Float64Array = rows
            .into_iter()
            .map(|row| row.and_then(|values| values.first().copied()))
            .collect();
        Ok(Arc::new(out))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub(super) fn grouped_tdigest(
    options: TDigestOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    Ok(Box::new(GroupedTDigest::new(options, input_type, "tdigest")?))
}

pub(super) fn grouped_approximate_median(
    options: ScalarAggregateOptions,
    input_type: &DataType,
) -> ExecResult<Box<dyn GroupedAggregator>> {
    let options = TDigestOptions {
        q: vec![0.5],
        skip_nulls: options.skip_nulls,
        min_count: options.min_count,
        ..TDigestOptions::default()
    };
    Ok(Box::new(GroupedApproxMedian {
        inner: GroupedTDigest::new(options, input_type, "approximate_median")?,
    }))
}
