use std::mem;
use std::sync::Arc;

use opentelemetry::time::now;
use opentelemetry::{Context, KeyValue};

use crate::attributes::AttributeSet;
use crate::data::{Aggregation, Temporality};
use crate::exemplar::ReservoirFactory;
use crate::limit::AttributeLimiter;

use super::value_map::{collect_sum, Trackers};
use super::{Number, ValueMap};

/// Summarizes a set of measurements made as their arithmetic sum.
pub(crate) struct Sum<T: Number> {
    value_map: ValueMap<T>,
    monotonic: bool,
}

impl<T: Number> Sum<T> {
    /// Returns an aggregator that summarizes a set of measurements as their
    /// arithmetic sum.
    ///
    /// Each sum is scoped by attributes and the aggregation cycle the
    /// measurements were made in.
    pub(crate) fn new(
        monotonic: bool,
        limiter: Arc<dyn AttributeLimiter>,
        new_res: ReservoirFactory<T>,
    ) -> Self {
        Sum {
            value_map: ValueMap::new(limiter, new_res),
            monotonic,
        }
    }

    pub(crate) fn measure(&self, cx: &Context, value: T, attrs: AttributeSet, dropped: &[KeyValue]) {
        self.value_map.measure(cx, value, attrs, dropped)
    }

    pub(crate) fn remove(&self, cx: &Context, attrs: &AttributeSet) {
        self.value_map.remove(cx, attrs)
    }

    /// Reports every active series as the sum of this cycle, then forgets all
    /// series and starts a new cycle.
    pub(crate) fn delta(
        &self,
        dest: Option<&mut dyn Aggregation>,
    ) -> (usize, Option<Box<dyn Aggregation>>) {
        let t = now();

        let mut trackers = self.value_map.lock();
        let Trackers {
            values,
            stale,
            start,
            ..
        } = &mut *trackers;
        // The delta collection cycle resets.
        let prev_start = mem::replace(start, t);

        let collected = collect_sum(dest, Temporality::Delta, self.monotonic, |points| {
            points.reserve(values.len());
            for (_, mut series) in values.drain() {
                let n = series.n;
                points.push(series.data_point(prev_start, t, n));
            }
        });
        // Stale series are not reported under delta temporality.
        stale.clear();

        collected
    }

    /// Reports every active series as its total since the aggregator started
    /// and every removed series once as having no recorded value.
    pub(crate) fn cumulative(
        &self,
        dest: Option<&mut dyn Aggregation>,
    ) -> (usize, Option<Box<dyn Aggregation>>) {
        let t = now();

        let mut trackers = self.value_map.lock();
        let Trackers {
            values,
            stale,
            start,
            ..
        } = &mut *trackers;
        let start = *start;

        collect_sum(dest, Temporality::Cumulative, self.monotonic, |points| {
            points.reserve(values.len() + stale.len());
            // TODO: Active series are never forgotten, so memory grows with
            // every attribute set ever measured. Idle series need an eviction
            // policy.
            for series in values.values_mut() {
                let n = series.n;
                points.push(series.data_point(start, t, n));
            }
            // A removed series is reported as absent exactly once.
            for (_, series) in stale.drain() {
                points.push(series.no_record_point(start, t));
            }
        })
    }
}
