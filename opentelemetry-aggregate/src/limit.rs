//! Cardinality limiting of tracked time series.
//!
//! The aggregators never decide how many series to keep. Before a measurement
//! is stored they ask an [AttributeLimiter] which attribute set to record it
//! under, passing a read-only view of the series that are currently active.
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use opentelemetry::{otel_warn, KeyValue};

use crate::attributes::AttributeSet;

/// Attribute set that series beyond the cardinality limit are folded into.
pub(crate) static STREAM_OVERFLOW_ATTRIBUTES: Lazy<AttributeSet> =
    Lazy::new(|| AttributeSet::from([KeyValue::new("otel.metric.overflow", true)]));

/// Read access to the currently active series of an aggregator.
pub trait SeriesLookup {
    /// Number of active series.
    fn len(&self) -> usize;

    /// Returns `true` if no series is active.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if a series with exactly these attributes is active.
    fn contains(&self, attrs: &AttributeSet) -> bool;
}

impl<V, S: BuildHasher> SeriesLookup for HashMap<AttributeSet, V, S> {
    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn contains(&self, attrs: &AttributeSet) -> bool {
        self.contains_key(attrs)
    }
}

/// Resolves the attribute set a measurement is stored and reported under.
///
/// Implementations must be deterministic for a given active population.
pub trait AttributeLimiter: fmt::Debug + Send + Sync + 'static {
    /// Returns either `attrs` or a substitute for it.
    fn resolve(&self, attrs: AttributeSet, active: &dyn SeriesLookup) -> AttributeSet;
}

/// Keeps every attribute set as given.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl AttributeLimiter for Unlimited {
    fn resolve(&self, attrs: AttributeSet, _active: &dyn SeriesLookup) -> AttributeSet {
        attrs
    }
}

/// Bounds the number of distinct series to `limit`.
///
/// Once `limit - 1` series are active, measurements for any new attribute set
/// are recorded under the `otel.metric.overflow=true` set, which occupies the
/// last slot. Series that are already active keep being recorded as is.
/// A limit of `0` disables limiting.
///
/// The first overflow is logged as a warning; later overflows are not logged
/// for the whole life of the limiter.
#[derive(Debug)]
pub struct CardinalityLimiter {
    limit: usize,
    overflowed: AtomicBool,
}

impl CardinalityLimiter {
    /// Creates a limiter allowing at most `limit` series, overflow included.
    pub fn new(limit: usize) -> Self {
        CardinalityLimiter {
            limit,
            overflowed: AtomicBool::new(false),
        }
    }

    /// The configured limit; `0` means unlimited.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl AttributeLimiter for CardinalityLimiter {
    fn resolve(&self, attrs: AttributeSet, active: &dyn SeriesLookup) -> AttributeSet {
        if self.limit == 0 || active.contains(&attrs) || active.len() < self.limit - 1 {
            return attrs;
        }

        if !self.overflowed.swap(true, Ordering::Relaxed) {
            otel_warn!(
                name: "CardinalityLimiter.Overflow",
                limit = self.limit,
                message = "Maximum data points for metric stream exceeded. Entry added to overflow. Subsequent overflows will not be logged."
            );
        }
        STREAM_OVERFLOW_ATTRIBUTES.clone()
    }
}
