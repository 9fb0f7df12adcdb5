use std::collections::HashMap;
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

/// Summarizes a set of pre-computed sums as their arithmetic sum.
///
/// Callers observe an absolute total for each series every cycle; the
/// aggregator derives deltas from the totals it last reported.
pub(crate) struct PrecomputedSum<T: Number> {
    value_map: ValueMap<T, HashMap<AttributeSet, T>>,
    monotonic: bool,
}

impl<T: Number> PrecomputedSum<T> {
    pub(crate) fn new(
        monotonic: bool,
        limiter: Arc<dyn AttributeLimiter>,
        new_res: ReservoirFactory<T>,
    ) -> Self {
        PrecomputedSum {
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

    /// Reports each observed total minus the total reported for the series
    /// last cycle.
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
            reported,
        } = &mut *trackers;
        // The delta collection cycle resets.
        let prev_start = mem::replace(start, t);
        let mut new_reported = HashMap::with_capacity(values.len());

        let collected = collect_sum(dest, Temporality::Delta, self.monotonic, |points| {
            points.reserve(values.len());
            for (attrs, mut series) in values.drain() {
                let curr = series.n;
                let prev = reported.get(&attrs).copied().unwrap_or_default();
                points.push(series.data_point(prev_start, t, curr.wrapping_sub(prev)));
                new_reported.insert(attrs, curr);
            }
        });
        // Series that were not observed this cycle do not report.
        stale.clear();
        *reported = new_reported;

        collected
    }

    /// Reports each observed total as is and every removed series once as
    /// having no recorded value.
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
            // Totals are observed again every cycle, so nothing is retained.
            for (_, mut series) in values.drain() {
                let n = series.n;
                points.push(series.data_point(start, t, n));
            }
            for (_, series) in stale.drain() {
                points.push(series.no_record_point(start, t));
            }
        })
    }
}
