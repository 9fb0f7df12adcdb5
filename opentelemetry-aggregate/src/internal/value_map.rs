use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use opentelemetry::time::now;
use opentelemetry::{otel_debug, Context, KeyValue};

use crate::attributes::AttributeSet;
use crate::data::{self, Aggregation, SumDataPoint, Temporality};
use crate::exemplar::{ExemplarReservoir, ReservoirFactory};
use crate::limit::AttributeLimiter;

use super::Number;

/// Accumulated state of one series.
pub(crate) struct SumValue<T> {
    pub(crate) n: T,
    pub(crate) attrs: AttributeSet,
    pub(crate) res: Box<dyn ExemplarReservoir<T>>,
}

impl<T: Number> SumValue<T> {
    /// Builds the point reporting `value` for this series and drains its
    /// exemplar sample into it.
    pub(crate) fn data_point(
        &mut self,
        start_time: SystemTime,
        time: SystemTime,
        value: T,
    ) -> SumDataPoint<T> {
        let mut exemplars = Vec::new();
        self.res.collect(&mut exemplars);
        SumDataPoint {
            attributes: self.attrs.to_vec(),
            start_time,
            time,
            value,
            no_recorded_value: false,
            exemplars,
        }
    }

    /// Builds the point marking this series as no longer reported.
    pub(crate) fn no_record_point(
        &self,
        start_time: SystemTime,
        time: SystemTime,
    ) -> SumDataPoint<T> {
        SumDataPoint {
            attributes: self.attrs.to_vec(),
            start_time,
            time,
            value: T::default(),
            no_recorded_value: true,
            exemplars: Vec::new(),
        }
    }
}

/// Everything guarded by the [ValueMap] lock.
pub(crate) struct Trackers<T, R> {
    /// Series measured since they were last retired.
    pub(crate) values: HashMap<AttributeSet, SumValue<T>>,
    /// Series removed but not yet reported as absent. Never shares a key with
    /// `values`.
    pub(crate) stale: HashMap<AttributeSet, SumValue<T>>,
    /// Start of the current collection window.
    pub(crate) start: SystemTime,
    /// Per-aggregator collection state.
    pub(crate) reported: R,
}

/// The storage for sums.
///
/// A single lock covers the active and stale series together with the window
/// start, so every collection sees one consistent snapshot.
pub(crate) struct ValueMap<T, R = ()> {
    trackers: Mutex<Trackers<T, R>>,
    limiter: Arc<dyn AttributeLimiter>,
    new_res: ReservoirFactory<T>,
}

impl<T: Number, R: Default> ValueMap<T, R> {
    pub(crate) fn new(limiter: Arc<dyn AttributeLimiter>, new_res: ReservoirFactory<T>) -> Self {
        ValueMap {
            trackers: Mutex::new(Trackers {
                values: HashMap::new(),
                stale: HashMap::new(),
                start: now(),
                reported: R::default(),
            }),
            limiter,
            new_res,
        }
    }

    /// Adds `value` to the series `attrs` resolves to.
    pub(crate) fn measure(&self, cx: &Context, value: T, attrs: AttributeSet, dropped: &[KeyValue]) {
        let t = now();

        let mut trackers = self.lock();
        let Trackers { values, stale, .. } = &mut *trackers;

        let attrs = self.limiter.resolve(attrs, &*values);
        // A removed series measured again before collection starts over.
        stale.remove(&attrs);

        let series = values.entry(attrs).or_insert_with_key(|attrs| SumValue {
            n: T::default(),
            attrs: attrs.clone(),
            res: (self.new_res)(),
        });
        series.n = series.n.wrapping_add(value);
        series.res.offer(cx, t, value, dropped);
    }

    /// Moves the active series keyed by `attrs` to the stale set.
    pub(crate) fn remove(&self, _cx: &Context, attrs: &AttributeSet) {
        let mut trackers = self.lock();
        let Trackers { values, stale, .. } = &mut *trackers;

        if let Some((key, series)) = values.remove_entry(attrs) {
            stale.insert(key, series);
        }
    }

    /// Locks the series state.
    ///
    /// A panic while the lock was held leaves the maps structurally valid, so
    /// a poisoned lock is taken over instead of disabling the aggregator.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Trackers<T, R>> {
        self.trackers.lock().unwrap_or_else(|err| {
            otel_debug!(
                name: "ValueMap.LockPoisoned",
                message = "A thread panicked while holding the series lock. Continuing with the current state."
            );
            err.into_inner()
        })
    }
}

/// Writes one collection cycle into `dest`.
///
/// A `dest` holding a [data::Sum] of the same number kind is reset and
/// refilled in place; otherwise a new aggregation is returned. `fill` pushes
/// the cycle's points.
pub(crate) fn collect_sum<T: Number>(
    dest: Option<&mut dyn Aggregation>,
    temporality: Temporality,
    is_monotonic: bool,
    fill: impl FnOnce(&mut Vec<SumDataPoint<T>>),
) -> (usize, Option<Box<dyn Aggregation>>) {
    let refill = |s_data: &mut data::Sum<T>| {
        s_data.temporality = temporality;
        s_data.is_monotonic = is_monotonic;
        s_data.data_points.clear();
        fill(&mut s_data.data_points);
        s_data.data_points.len()
    };

    match dest.and_then(|d| d.as_any_mut().downcast_mut::<data::Sum<T>>()) {
        Some(s_data) => (refill(s_data), None),
        None => {
            let mut s_data = data::Sum {
                data_points: Vec::new(),
                temporality,
                is_monotonic,
            };
            let n = refill(&mut s_data);
            (n, Some(Box::new(s_data) as Box<dyn Aggregation>))
        }
    }
}
