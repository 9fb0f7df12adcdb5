//! Construction of sum aggregate functions.
//!
//! An [AggregateBuilder] wires the attribute filter, the cardinality limiter
//! and the exemplar reservoir around one aggregator instance and hands out
//! its [Measure] and [ComputeAggregation] halves as [AggregateFns].
use std::fmt;
use std::sync::Arc;

use opentelemetry::{Context, KeyValue};

use crate::attributes::AttributeSet;
use crate::data::{Aggregation, Temporality};
use crate::exemplar::{drop_reservoir, filtered, ExemplarFilter, ReservoirFactory};
use crate::internal::{PrecomputedSum, Sum};
use crate::limit::{AttributeLimiter, CardinalityLimiter, Unlimited};

pub use crate::internal::Number;

/// Receives measurements to be aggregated.
pub trait Measure<T>: Send + Sync + 'static {
    /// Records `measurement` for the series identified by `attrs`.
    ///
    /// The context is only used for exemplar sampling.
    fn call(&self, cx: &Context, measurement: T, attrs: &[KeyValue]);

    /// Declares that the series identified by `attrs` is no longer observed.
    fn remove(&self, cx: &Context, attrs: &[KeyValue]);
}

/// Stores the aggregate of measurements into the aggregation and returns the number
/// of aggregate data-points output.
pub trait ComputeAggregation: Send + Sync + 'static {
    /// Compute the new aggregation and store in `dest`.
    ///
    /// If no initial aggregation exists, `dest` will be `None`, in which case the
    /// returned option is expected to contain a new aggregation with the data from
    /// the current collection cycle.
    fn call(&self, dest: Option<&mut dyn Aggregation>) -> (usize, Option<Box<dyn Aggregation>>);
}

/// Separate `measure` and `collect` functions for an aggregate.
pub struct AggregateFns<T> {
    /// Input side, shared by every producer.
    pub measure: Arc<dyn Measure<T>>,
    /// Output side, called once per collection cycle.
    pub collect: Arc<dyn ComputeAggregation>,
}

/// Creates aggregate functions out of aggregate instance
impl<A, T> From<A> for AggregateFns<T>
where
    A: Measure<T> + ComputeAggregation,
{
    fn from(value: A) -> Self {
        let inst = Arc::new(value);
        Self {
            measure: inst.clone(),
            collect: inst,
        }
    }
}

impl<T> fmt::Debug for AggregateFns<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateFns").finish_non_exhaustive()
    }
}

/// Predicate deciding which attributes identify a series.
pub type Filter = Arc<dyn Fn(&KeyValue) -> bool + Send + Sync>;

/// Splits measured attributes into the series identity and the attributes
/// dropped from it.
#[derive(Clone)]
pub(crate) struct AttributeSetFilter {
    filter: Option<Filter>,
}

impl AttributeSetFilter {
    pub(crate) fn new(filter: Option<Filter>) -> Self {
        Self { filter }
    }

    pub(crate) fn apply(&self, attrs: &[KeyValue], run: impl FnOnce(AttributeSet, &[KeyValue])) {
        let attrs = AttributeSet::from(attrs);
        if let Some(filter) = &self.filter {
            let (kept, dropped): (Vec<KeyValue>, Vec<KeyValue>) =
                attrs.to_vec().into_iter().partition(|kv| filter(kv));
            run(AttributeSet::from(kept), &dropped);
        } else {
            run(attrs, &[]);
        }
    }
}

/// The aggregation algorithm behind a pair of aggregate functions.
pub(crate) trait Aggregator: Send + Sync + 'static {
    type Value: Number;

    fn measure(&self, cx: &Context, value: Self::Value, attrs: AttributeSet, dropped: &[KeyValue]);

    fn remove(&self, cx: &Context, attrs: &AttributeSet);

    fn delta(&self, dest: Option<&mut dyn Aggregation>) -> (usize, Option<Box<dyn Aggregation>>);

    fn cumulative(
        &self,
        dest: Option<&mut dyn Aggregation>,
    ) -> (usize, Option<Box<dyn Aggregation>>);
}

impl<T: Number> Aggregator for Sum<T> {
    type Value = T;

    fn measure(&self, cx: &Context, value: T, attrs: AttributeSet, dropped: &[KeyValue]) {
        Sum::measure(self, cx, value, attrs, dropped)
    }

    fn remove(&self, cx: &Context, attrs: &AttributeSet) {
        Sum::remove(self, cx, attrs)
    }

    fn delta(&self, dest: Option<&mut dyn Aggregation>) -> (usize, Option<Box<dyn Aggregation>>) {
        Sum::delta(self, dest)
    }

    fn cumulative(
        &self,
        dest: Option<&mut dyn Aggregation>,
    ) -> (usize, Option<Box<dyn Aggregation>>) {
        Sum::cumulative(self, dest)
    }
}

impl<T: Number> Aggregator for PrecomputedSum<T> {
    type Value = T;

    fn measure(&self, cx: &Context, value: T, attrs: AttributeSet, dropped: &[KeyValue]) {
        PrecomputedSum::measure(self, cx, value, attrs, dropped)
    }

    fn remove(&self, cx: &Context, attrs: &AttributeSet) {
        PrecomputedSum::remove(self, cx, attrs)
    }

    fn delta(&self, dest: Option<&mut dyn Aggregation>) -> (usize, Option<Box<dyn Aggregation>>) {
        PrecomputedSum::delta(self, dest)
    }

    fn cumulative(
        &self,
        dest: Option<&mut dyn Aggregation>,
    ) -> (usize, Option<Box<dyn Aggregation>>) {
        PrecomputedSum::cumulative(self, dest)
    }
}

/// Binds an aggregator to an attribute filter and a temporality.
struct AggregateImpl<A> {
    aggregator: A,
    filter: AttributeSetFilter,
    temporality: Temporality,
}

impl<A: Aggregator> Measure<A::Value> for AggregateImpl<A> {
    fn call(&self, cx: &Context, measurement: A::Value, attrs: &[KeyValue]) {
        self.filter.apply(attrs, |kept, dropped| {
            self.aggregator.measure(cx, measurement, kept, dropped)
        })
    }

    fn remove(&self, cx: &Context, attrs: &[KeyValue]) {
        self.filter
            .apply(attrs, |kept, _| self.aggregator.remove(cx, &kept))
    }
}

impl<A: Aggregator> ComputeAggregation for AggregateImpl<A> {
    fn call(&self, dest: Option<&mut dyn Aggregation>) -> (usize, Option<Box<dyn Aggregation>>) {
        match self.temporality {
            Temporality::Delta => self.aggregator.delta(dest),
            Temporality::Cumulative => self.aggregator.cumulative(dest),
        }
    }
}

/// How an [AggregateBuilder] provides limiters to its aggregators.
#[derive(Debug)]
enum LimiterConfig {
    /// A fresh [CardinalityLimiter] per aggregator.
    Cardinality(usize),
    Shared(Arc<dyn AttributeLimiter>),
}

/// Builds aggregate functions
pub struct AggregateBuilder<T> {
    /// The temporality used for the returned aggregate functions.
    temporality: Temporality,

    /// The attribute filter the aggregate function will use on the input of
    /// measurements.
    filter: AttributeSetFilter,

    limiter: LimiterConfig,

    exemplar_filter: ExemplarFilter,

    reservoir: Option<ReservoirFactory<T>>,
}

impl<T: Number> AggregateBuilder<T> {
    /// Starts a builder for aggregates reported with `temporality`.
    ///
    /// Without further configuration every attribute is kept, the number of
    /// series is not limited, and no exemplars are sampled. The exemplar
    /// filter is read from `OTEL_METRICS_EXEMPLAR_FILTER`.
    pub fn new(temporality: Temporality) -> Self {
        AggregateBuilder {
            temporality,
            filter: AttributeSetFilter::new(None),
            limiter: LimiterConfig::Shared(Arc::new(Unlimited)),
            exemplar_filter: ExemplarFilter::from_env(),
            reservoir: None,
        }
    }

    /// Keeps only the attributes `filter` accepts in the series identity.
    ///
    /// Rejected attributes are handed to the exemplar reservoir instead.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = AttributeSetFilter::new(Some(filter));
        self
    }

    /// Bounds the number of series, see [CardinalityLimiter]. `0` removes the
    /// bound.
    ///
    /// Every aggregator built afterwards gets a limiter of its own.
    pub fn with_cardinality_limit(mut self, limit: usize) -> Self {
        self.limiter = LimiterConfig::Cardinality(limit);
        self
    }

    /// Uses `limiter` to resolve the attribute set of every measurement.
    ///
    /// The limiter is shared by every aggregator built afterwards.
    pub fn with_limiter(mut self, limiter: impl AttributeLimiter) -> Self {
        self.limiter = LimiterConfig::Shared(Arc::new(limiter));
        self
    }

    /// Overrides the filter deciding which measurements reach the reservoir.
    pub fn with_exemplar_filter(mut self, filter: ExemplarFilter) -> Self {
        self.exemplar_filter = filter;
        self
    }

    /// Samples exemplars of every series with reservoirs built by `factory`.
    pub fn with_exemplar_reservoir(mut self, factory: ReservoirFactory<T>) -> Self {
        self.reservoir = Some(factory);
        self
    }

    /// Builds a sum aggregate function input and output.
    pub fn sum(&self, monotonic: bool) -> AggregateFns<T> {
        self.build(Sum::new(monotonic, self.limiter(), self.reservoir()))
    }

    /// Builds a precomputed sum aggregate function input and output.
    pub fn precomputed_sum(&self, monotonic: bool) -> AggregateFns<T> {
        self.build(PrecomputedSum::new(
            monotonic,
            self.limiter(),
            self.reservoir(),
        ))
    }

    fn build<A: Aggregator<Value = T>>(&self, aggregator: A) -> AggregateFns<T> {
        AggregateImpl {
            aggregator,
            filter: self.filter.clone(),
            temporality: self.temporality,
        }
        .into()
    }

    fn limiter(&self) -> Arc<dyn AttributeLimiter> {
        match &self.limiter {
            LimiterConfig::Cardinality(limit) => Arc::new(CardinalityLimiter::new(*limit)),
            LimiterConfig::Shared(limiter) => limiter.clone(),
        }
    }

    fn reservoir(&self) -> ReservoirFactory<T> {
        match &self.reservoir {
            Some(factory) => filtered(self.exemplar_filter, factory.clone()),
            None => drop_reservoir(),
        }
    }
}

impl<T> fmt::Debug for AggregateBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateBuilder")
            .field("temporality", &self.temporality)
            .field("filter", &self.filter.filter.is_some())
            .field("limiter", &self.limiter)
            .field("exemplar_filter", &self.exemplar_filter)
            .field("reservoir", &self.reservoir.is_some())
            .finish()
    }
}
