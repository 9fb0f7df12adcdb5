//! # OpenTelemetry Sum Aggregation
//!
//! Turns a stream of numeric measurements, each tagged with a set of
//! attributes, into periodic sum time series ready for export.
//!
//! Two aggregators share one series store:
//!
//! * a sum of directly measured increments, for counters and up-down
//!   counters;
//! * a precomputed sum of absolute totals observed by the caller every cycle,
//!   for asynchronous instruments.
//!
//! Either can report with [delta](data::Temporality::Delta) or
//! [cumulative](data::Temporality::Cumulative) temporality.
//!
//! ## Getting Started
//!
//! ```
//! use opentelemetry::{Context, KeyValue};
//! use opentelemetry_aggregate::aggregate::{
//!     AggregateBuilder, AggregateFns, ComputeAggregation, Measure,
//! };
//! use opentelemetry_aggregate::data::{Aggregation, Sum, Temporality};
//!
//! let AggregateFns { measure, collect } =
//!     AggregateBuilder::<i64>::new(Temporality::Delta).sum(true);
//!
//! let cx = Context::new();
//! measure.call(&cx, 5, &[KeyValue::new("region", "us")]);
//! measure.call(&cx, 3, &[KeyValue::new("region", "us")]);
//!
//! let (count, aggregation) = collect.call(None);
//! let sum = aggregation
//!     .as_ref()
//!     .and_then(|agg| agg.as_any().downcast_ref::<Sum<i64>>());
//! assert_eq!(count, 1);
//! assert_eq!(sum.map(|s| s.data_points[0].value), Some(8));
//! ```
//!
//! Cardinality limiting and exemplar sampling are pluggable, see
//! [limit::AttributeLimiter] and [exemplar::ExemplarReservoir].
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

pub mod aggregate;
pub mod attributes;
pub mod data;
mod error;
pub mod exemplar;
mod internal;
pub mod limit;

pub use error::{MetricError, MetricResult};
