use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use opentelemetry::{Context, KeyValue};
use opentelemetry_aggregate::aggregate::{
    AggregateBuilder, AggregateFns, ComputeAggregation, Measure, Number,
};
use opentelemetry_aggregate::attributes::AttributeSet;
use opentelemetry_aggregate::data::{Aggregation, Sum, SumDataPoint, Temporality};
use opentelemetry_aggregate::exemplar::{fixed_size_reservoir, ExemplarFilter};
use rstest::rstest;

fn collect<T: Number>(collect: &Arc<dyn ComputeAggregation>) -> (usize, Sum<T>) {
    let (count, new_agg) = collect.call(None);
    let sum = new_agg
        .as_ref()
        .and_then(|agg| agg.as_any().downcast_ref::<Sum<T>>())
        .cloned()
        .expect("collection returns a sum aggregation");
    (count, sum)
}

fn find_sum_datapoint_with_key_value<'a, T>(
    sum: &'a Sum<T>,
    key: &str,
    value: &str,
) -> Option<&'a SumDataPoint<T>> {
    sum.data_points.iter().find(|dp| {
        dp.attributes
            .iter()
            .any(|kv| kv.key.as_str() == key && kv.value.as_str() == value)
    })
}

#[test]
fn delta_sum_reports_only_series_of_current_cycle() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<i64>::new(Temporality::Delta).sum(true);
    let cx = Context::new();

    measure.call(&cx, 5, &[KeyValue::new("region", "us")]);
    measure.call(&cx, 3, &[KeyValue::new("region", "eu")]);

    let (count, sum) = collect::<i64>(&c);
    assert_eq!(count, 2);
    assert_eq!(sum.temporality, Temporality::Delta);
    assert!(sum.is_monotonic);
    let us = find_sum_datapoint_with_key_value(&sum, "region", "us").expect("us point");
    let eu = find_sum_datapoint_with_key_value(&sum, "region", "eu").expect("eu point");
    assert_eq!(us.value, 5);
    assert_eq!(eu.value, 3);
    assert_eq!(us.start_time, eu.start_time);
    assert_eq!(us.time, eu.time);

    measure.call(&cx, 2, &[KeyValue::new("region", "us")]);

    let (count, sum) = collect::<i64>(&c);
    assert_eq!(count, 1);
    assert_eq!(sum.data_points.len(), 1);
    assert_eq!(sum.data_points[0].value, 2);
    assert!(find_sum_datapoint_with_key_value(&sum, "region", "eu").is_none());
}

#[test]
fn cumulative_sum_reports_removed_series_once() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<i64>::new(Temporality::Cumulative).sum(true);
    let cx = Context::new();

    measure.call(&cx, 10, &[KeyValue::new("a", "1")]);
    let (_, before) = collect::<i64>(&c);
    let start = before.data_points[0].start_time;

    measure.remove(&cx, &[KeyValue::new("a", "1")]);
    let (count, sum) = collect::<i64>(&c);
    assert_eq!(count, 1);
    assert!(sum.data_points[0].no_recorded_value);
    assert_eq!(sum.data_points[0].start_time, start);
    assert_eq!(sum.data_points[0].attributes, vec![KeyValue::new("a", "1")]);

    let (count, sum) = collect::<i64>(&c);
    assert_eq!(count, 0);
    assert!(sum.data_points.is_empty());
}

#[test]
fn removed_series_can_be_measured_again() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<i64>::new(Temporality::Cumulative).sum(false);
    let cx = Context::new();
    let attrs = [KeyValue::new("a", "1")];

    measure.call(&cx, 4, &attrs);
    measure.remove(&cx, &attrs);
    let (count, sum) = collect::<i64>(&c);
    assert_eq!(count, 1);
    assert!(sum.data_points[0].no_recorded_value);

    measure.call(&cx, -1, &attrs);
    let (count, sum) = collect::<i64>(&c);
    assert_eq!(count, 1);
    assert!(!sum.data_points[0].no_recorded_value);
    assert_eq!(sum.data_points[0].value, -1);
}

#[test]
fn sum_past_integer_bound_wraps() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<i64>::new(Temporality::Cumulative).sum(true);
    let cx = Context::new();
    let attrs = [KeyValue::new("a", "1")];

    measure.call(&cx, i64::MAX, &attrs);
    measure.call(&cx, 1, &attrs);

    let (count, sum) = collect::<i64>(&c);
    assert_eq!(count, 1);
    assert_eq!(sum.data_points[0].value, i64::MIN);

    measure.call(&cx, 1, &attrs);
    let (_, sum) = collect::<i64>(&c);
    assert_eq!(sum.data_points[0].value, i64::MIN + 1);
}

#[test]
fn precomputed_remeasure_after_remove_reports_new_total() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<i64>::new(Temporality::Cumulative).precomputed_sum(true);
    let cx = Context::new();
    let attrs = [KeyValue::new("pid", "1")];

    measure.call(&cx, 10, &attrs);
    measure.remove(&cx, &attrs);
    measure.call(&cx, 12, &attrs);

    let (count, sum) = collect::<i64>(&c);
    assert_eq!(count, 1);
    assert!(!sum.data_points[0].no_recorded_value);
    assert_eq!(sum.data_points[0].value, 12);
}

#[test]
fn precomputed_delta_reports_change_between_observations() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<f64>::new(Temporality::Delta).precomputed_sum(true);
    let cx = Context::new();
    let attrs = [KeyValue::new("cpu", "0")];

    measure.call(&cx, 10.0, &attrs);
    let (_, first) = collect::<f64>(&c);
    assert_eq!(first.data_points[0].value, 10.0);

    measure.call(&cx, 17.5, &attrs);
    let (_, second) = collect::<f64>(&c);
    assert_eq!(second.data_points[0].value, 7.5);
    assert_eq!(second.data_points[0].start_time, first.data_points[0].time);
}

#[test]
fn precomputed_cumulative_reports_observed_totals() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<i64>::new(Temporality::Cumulative).precomputed_sum(true);
    let cx = Context::new();

    measure.call(&cx, 100, &[KeyValue::new("cpu", "0")]);
    measure.call(&cx, 50, &[KeyValue::new("cpu", "1")]);
    let (count, sum) = collect::<i64>(&c);
    assert_eq!(count, 2);

    measure.call(&cx, 120, &[KeyValue::new("cpu", "0")]);
    let (count, sum_next) = collect::<i64>(&c);
    assert_eq!(count, 1);
    assert_eq!(sum_next.data_points[0].value, 120);
    assert_eq!(
        sum_next.data_points[0].start_time,
        sum.data_points[0].start_time
    );
}

#[rstest]
#[case(Temporality::Delta, true)]
#[case(Temporality::Delta, false)]
#[case(Temporality::Cumulative, true)]
#[case(Temporality::Cumulative, false)]
fn aggregation_carries_configuration(#[case] temporality: Temporality, #[case] monotonic: bool) {
    let builder = AggregateBuilder::<i64>::new(temporality);
    let cx = Context::new();

    for AggregateFns { measure, collect: c } in
        [builder.sum(monotonic), builder.precomputed_sum(monotonic)]
    {
        measure.call(&cx, 1, &[]);
        let (count, sum) = collect::<i64>(&c);
        assert_eq!(count, 1);
        assert_eq!(sum.temporality, temporality);
        assert_eq!(sum.is_monotonic, monotonic);
        assert!(sum.data_points[0].attributes.is_empty());
    }
}

#[test]
fn attribute_order_does_not_split_series() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<i64>::new(Temporality::Delta).sum(true);
    let cx = Context::new();

    measure.call(&cx, 1, &[KeyValue::new("a", "x"), KeyValue::new("b", "y")]);
    measure.call(&cx, 1, &[KeyValue::new("b", "y"), KeyValue::new("a", "x")]);

    let (count, sum) = collect::<i64>(&c);
    assert_eq!(count, 1);
    assert_eq!(sum.data_points[0].value, 2);
}

#[test]
fn concurrent_measurements_are_all_counted() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<i64>::new(Temporality::Cumulative).sum(true);
    let threads = 8;
    let per_thread = 1000;

    thread::scope(|s| {
        for t in 0..threads {
            let measure = measure.clone();
            s.spawn(move || {
                let cx = Context::new();
                for i in 0..per_thread {
                    measure.call(&cx, 1, &[KeyValue::new("key", i % 4)]);
                    measure.call(&cx, 1, &[KeyValue::new("thread", t)]);
                }
            });
        }
        // Collection interleaves with measurement.
        let _ = c.call(None);
    });

    let (count, sum) = collect::<i64>(&c);
    assert_eq!(count, 4 + threads as usize);
    let total: i64 = sum.data_points.iter().map(|dp| dp.value).sum();
    assert_eq!(total, 2 * threads * per_thread);

    let keys: HashSet<AttributeSet> = sum
        .data_points
        .iter()
        .map(|dp| AttributeSet::from(dp.attributes.as_slice()))
        .collect();
    assert_eq!(keys.len(), sum.data_points.len());
}

#[test]
fn concurrent_delta_collection_loses_nothing() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<i64>::new(Temporality::Delta).sum(true);
    let per_thread = 5000;

    let collected: i64 = thread::scope(|s| {
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let measure = measure.clone();
                s.spawn(move || {
                    let cx = Context::new();
                    for _ in 0..per_thread {
                        measure.call(&cx, 1, &[KeyValue::new("key", "value")]);
                    }
                })
            })
            .collect();

        let mut collected = 0;
        while !producers.iter().all(|p| p.is_finished()) {
            let (_, sum) = collect::<i64>(&c);
            collected += sum.data_points.iter().map(|dp| dp.value).sum::<i64>();
        }
        collected
    });

    let (_, rest) = collect::<i64>(&c);
    let remaining: i64 = rest.data_points.iter().map(|dp| dp.value).sum();
    assert_eq!(collected + remaining, 4 * per_thread);
}

#[test]
fn cardinality_limit_bounds_series() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<i64>::new(Temporality::Cumulative)
            .with_cardinality_limit(5)
            .sum(true);
    let cx = Context::new();

    for i in 0..100_i64 {
        measure.call(&cx, 1, &[KeyValue::new("user", i)]);
    }

    let (count, sum) = collect::<i64>(&c);
    assert_eq!(count, 5);
    let overflow = sum
        .data_points
        .iter()
        .find(|dp| dp.attributes == vec![KeyValue::new("otel.metric.overflow", true)])
        .expect("overflow series");
    assert_eq!(overflow.value, 96);
}

#[test]
fn exemplars_are_sampled_from_sampled_spans() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<i64>::new(Temporality::Delta)
            .with_exemplar_filter(ExemplarFilter::TraceBased)
            .with_exemplar_reservoir(fixed_size_reservoir(4))
            .sum(true);
    let sampled = Context::new().with_remote_span_context(SpanContext::new(
        TraceId::from_bytes([7; 16]),
        SpanId::from_bytes([9; 8]),
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    ));

    measure.call(&Context::new(), 1, &[KeyValue::new("a", "1")]);
    measure.call(&sampled, 2, &[KeyValue::new("a", "1")]);

    let (_, sum) = collect::<i64>(&c);
    let dp = &sum.data_points[0];
    assert_eq!(dp.value, 3);
    assert_eq!(dp.exemplars.len(), 1);
    assert_eq!(dp.exemplars[0].value, 2);
    assert_eq!(dp.exemplars[0].trace_id, [7; 16]);
    assert_eq!(dp.exemplars[0].span_id, [9; 8]);

    let (_, sum) = collect::<i64>(&c);
    assert!(sum.data_points.is_empty());
}

#[test]
fn mismatched_destination_is_replaced() {
    let AggregateFns { measure, collect: c } =
        AggregateBuilder::<i64>::new(Temporality::Delta).sum(true);
    measure.call(&Context::new(), 1, &[]);

    let mut dest = Sum::<f64> {
        data_points: vec![],
        temporality: Temporality::Delta,
        is_monotonic: true,
    };
    let (count, new_agg) = c.call(Some(&mut dest as &mut dyn Aggregation));

    assert_eq!(count, 1);
    assert!(dest.data_points.is_empty());
    assert!(new_agg
        .as_ref()
        .and_then(|agg| agg.as_any().downcast_ref::<Sum<i64>>())
        .is_some());
}
