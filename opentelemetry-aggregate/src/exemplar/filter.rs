use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use opentelemetry::trace::TraceContextExt;
use opentelemetry::{otel_debug, Context, KeyValue};

use crate::data::Exemplar;
use crate::error::{MetricError, MetricResult};

use super::ExemplarReservoir;

/// Environment variable selecting the default [ExemplarFilter].
pub const OTEL_METRICS_EXEMPLAR_FILTER: &str = "OTEL_METRICS_EXEMPLAR_FILTER";

/// Decides which measurements are offered to exemplar reservoirs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExemplarFilter {
    /// Every measurement is offered.
    AlwaysOn,
    /// No measurement is offered.
    AlwaysOff,
    /// Only measurements recorded inside a sampled span are offered.
    #[default]
    TraceBased,
}

impl ExemplarFilter {
    /// Reads the filter from `OTEL_METRICS_EXEMPLAR_FILTER`.
    ///
    /// Unset or unrecognized values give [ExemplarFilter::TraceBased].
    pub fn from_env() -> Self {
        match env::var(OTEL_METRICS_EXEMPLAR_FILTER) {
            Ok(value) => value.parse().unwrap_or_else(|err: MetricError| {
                otel_debug!(
                    name: "ExemplarFilter.InvalidEnvValue",
                    value = value.as_str(),
                    error = format!("{err}")
                );
                ExemplarFilter::default()
            }),
            Err(_) => ExemplarFilter::default(),
        }
    }

    /// Returns `true` if a measurement made in `cx` should be offered.
    pub fn should_sample(&self, cx: &Context) -> bool {
        match self {
            ExemplarFilter::AlwaysOn => true,
            ExemplarFilter::AlwaysOff => false,
            ExemplarFilter::TraceBased => cx.span().span_context().is_sampled(),
        }
    }
}

impl FromStr for ExemplarFilter {
    type Err = MetricError;

    fn from_str(s: &str) -> MetricResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always_on" => Ok(ExemplarFilter::AlwaysOn),
            "always_off" => Ok(ExemplarFilter::AlwaysOff),
            "trace_based" => Ok(ExemplarFilter::TraceBased),
            other => Err(MetricError::Config(format!(
                "unknown exemplar filter: {other}"
            ))),
        }
    }
}

/// A reservoir that only sees the measurements its filter lets through.
#[derive(Debug)]
pub struct FilteredReservoir<T> {
    filter: ExemplarFilter,
    inner: Box<dyn ExemplarReservoir<T>>,
}

impl<T> FilteredReservoir<T> {
    /// Wraps `inner` behind `filter`.
    pub fn new(filter: ExemplarFilter, inner: Box<dyn ExemplarReservoir<T>>) -> Self {
        FilteredReservoir { filter, inner }
    }
}

impl<T: fmt::Debug + 'static> ExemplarReservoir<T> for FilteredReservoir<T> {
    fn offer(&mut self, cx: &Context, time: SystemTime, value: T, dropped: &[KeyValue]) {
        if self.filter.should_sample(cx) {
            self.inner.offer(cx, time, value, dropped);
        }
    }

    fn collect(&mut self, dest: &mut Vec<Exemplar<T>>) {
        self.inner.collect(dest);
    }
}
