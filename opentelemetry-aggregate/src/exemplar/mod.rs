//! Exemplar sampling for aggregated series.
//!
//! Every series owns one [ExemplarReservoir], created through a
//! [ReservoirFactory] the first time the series is measured. The aggregator
//! offers each raw measurement to it and drains its sample on collection.
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use opentelemetry::trace::TraceContextExt;
use opentelemetry::{Context, KeyValue};

use crate::data::Exemplar;

mod filter;
mod fixed_size;

pub use filter::{ExemplarFilter, FilteredReservoir, OTEL_METRICS_EXEMPLAR_FILTER};
pub use fixed_size::FixedSizeReservoir;

/// Holds a bounded sample of the measurements made for one series.
pub trait ExemplarReservoir<T>: fmt::Debug + Send + 'static {
    /// Accepts a measurement for possible sampling.
    ///
    /// `dropped` holds the attributes that were filtered out of the series
    /// identity; they are kept on the exemplar.
    fn offer(&mut self, cx: &Context, time: SystemTime, value: T, dropped: &[KeyValue]);

    /// Moves the current sample into `dest`, replacing its content, and
    /// starts a new sampling period.
    fn collect(&mut self, dest: &mut Vec<Exemplar<T>>);
}

/// Creates the reservoir of a newly tracked series.
pub type ReservoirFactory<T> = Arc<dyn Fn() -> Box<dyn ExemplarReservoir<T>> + Send + Sync>;

/// A reservoir that never samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropReservoir;

impl<T> ExemplarReservoir<T> for DropReservoir {
    fn offer(&mut self, _cx: &Context, _time: SystemTime, _value: T, _dropped: &[KeyValue]) {}

    fn collect(&mut self, dest: &mut Vec<Exemplar<T>>) {
        dest.clear();
    }
}

/// Factory for [DropReservoir]s.
pub fn drop_reservoir<T: 'static>() -> ReservoirFactory<T> {
    Arc::new(|| Box::new(DropReservoir) as Box<dyn ExemplarReservoir<T>>)
}

/// Factory for [FixedSizeReservoir]s holding at most `k` exemplars each.
pub fn fixed_size_reservoir<T>(k: usize) -> ReservoirFactory<T>
where
    T: fmt::Debug + Copy + Send + 'static,
{
    Arc::new(move || Box::new(FixedSizeReservoir::new(k)) as Box<dyn ExemplarReservoir<T>>)
}

/// Wraps the reservoirs built by `factory` so they only see measurements
/// passing `filter`.
pub fn filtered<T>(filter: ExemplarFilter, factory: ReservoirFactory<T>) -> ReservoirFactory<T>
where
    T: fmt::Debug + Send + 'static,
{
    if filter == ExemplarFilter::AlwaysOff {
        return drop_reservoir();
    }
    Arc::new(move || {
        Box::new(FilteredReservoir::new(filter, factory())) as Box<dyn ExemplarReservoir<T>>
    })
}

fn new_exemplar<T>(cx: &Context, time: SystemTime, value: T, dropped: &[KeyValue]) -> Exemplar<T> {
    let span = cx.span();
    let span_context = span.span_context();
    let (trace_id, span_id) = if span_context.is_valid() {
        (
            span_context.trace_id().to_bytes(),
            span_context.span_id().to_bytes(),
        )
    } else {
        ([0; 16], [0; 8])
    };

    Exemplar {
        filtered_attributes: dropped.to_vec(),
        time,
        value,
        span_id,
        trace_id,
    }
}
