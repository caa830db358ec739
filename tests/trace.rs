//! End-to-end span recording behavior through the public surface.

use std::sync::Arc;
use std::time::Duration;

use census_core::registry::CensusCore;
use census_core::testing::TestClock;
use census_core::time::Timestamp;
use census_core::trace::{
    AttributeValue, MessageEvent, MessageEventType, Sampler, TraceParams,
};

fn core_with_params(params: TraceParams) -> (Arc<TestClock>, CensusCore) {
    let clock = Arc::new(TestClock::new(Timestamp::new(50, 0)));
    let core = CensusCore::builder()
        .with_clock(clock.clone())
        .with_trace_params(params)
        .build();
    (clock, core)
}

#[test]
fn attribute_map_keeps_most_recently_touched_keys() {
    let params = TraceParams::builder()
        .with_sampler(Sampler::AlwaysSample)
        .build()
        .unwrap();
    let (_clock, core) = core_with_params(params);

    let span = core.tracer().span_builder("op").start().unwrap();
    for i in 0..40i64 {
        span.add_attributes([(format!("k{i}"), AttributeValue::I64(i))]);
    }

    let data = span.to_span_data().unwrap();
    assert_eq!(data.attributes.map.len(), 32);
    assert_eq!(data.attributes.dropped_count, 8);
    // The 32 most recently written keys survive.
    assert!(!data.attributes.map.contains_key("k7"));
    assert!(data.attributes.map.contains_key("k8"));
    assert!(data.attributes.map.contains_key("k39"));

    // Touching k39 (already newest) and writing one more evicts the oldest
    // untouched key, k8.
    assert_eq!(span.attribute("k39"), Some(AttributeValue::I64(39)));
    span.add_attributes([("k40".to_string(), AttributeValue::I64(40))]);

    let data = span.to_span_data().unwrap();
    assert_eq!(data.attributes.map.len(), 32);
    assert!(!data.attributes.map.contains_key("k8"));
    assert!(data.attributes.map.contains_key("k39"));
    assert!(data.attributes.map.contains_key("k40"));

    // Reading an old key protects it from the next eviction.
    assert_eq!(span.attribute("k9"), Some(AttributeValue::I64(9)));
    span.add_attributes([("k41".to_string(), AttributeValue::I64(41))]);
    let data = span.to_span_data().unwrap();
    assert!(data.attributes.map.contains_key("k9"));
    assert!(!data.attributes.map.contains_key("k10"));

    span.end();
    core.shutdown();
}

#[test]
fn full_span_pipeline_snapshot() {
    let params = TraceParams::builder()
        .with_sampler(Sampler::AlwaysSample)
        .build()
        .unwrap();
    let (clock, core) = core_with_params(params);

    let parent = core.tracer().span_builder("parent").start().unwrap();
    let child = core.tracer().start_span("child", Some(&parent)).unwrap();

    clock.advance(Duration::from_millis(1));
    child.add_annotation("sent request");
    child.add_message_event(
        MessageEvent::new(MessageEventType::Sent, 1).with_uncompressed_size(512),
    );
    clock.advance(Duration::from_millis(2));
    child.add_message_event(MessageEvent::new(MessageEventType::Received, 1));
    child.end();
    parent.end();

    let data = child.to_span_data().unwrap();
    assert_eq!(data.name, "child");
    assert_eq!(data.parent_span_id, Some(parent.context().span_id()));
    assert_eq!(data.context.trace_id(), parent.context().trace_id());
    assert_eq!(data.start_time, Timestamp::new(50, 0));
    assert_eq!(data.end_time, Some(Timestamp::new(50, 3_000_000)));

    assert_eq!(data.annotations.events.len(), 1);
    assert_eq!(
        data.annotations.events[0].timestamp,
        Timestamp::new(50, 1_000_000)
    );
    assert_eq!(data.message_events.events.len(), 2);
    assert_eq!(
        data.message_events.events[0].event.event_type,
        MessageEventType::Sent
    );
    assert_eq!(data.message_events.events[0].event.uncompressed_size, 512);
    assert_eq!(
        data.message_events.events[1].timestamp,
        Timestamp::new(50, 3_000_000)
    );

    // Parent and child share one timeline even though each carries its own
    // wall-clock anchor candidate.
    let parent_data = parent.to_span_data().unwrap();
    assert!(parent_data.end_time.unwrap() >= data.end_time.unwrap());

    core.shutdown();
}

#[test]
fn unsampled_spans_record_nothing_end_to_end() {
    let (_clock, core) = core_with_params(TraceParams::default());
    core.sampled_span_store().register_span_names(["op"]);

    let span = core.tracer().span_builder("op").start().unwrap();
    span.add_annotation("dropped");
    span.end();

    assert!(span.to_span_data().is_err());
    let summary = core.sampled_span_store().summary();
    let stored: usize = summary.per_span_name["op"]
        .num_latency_sampled_spans
        .values()
        .sum();
    assert_eq!(stored, 0);

    core.shutdown();
}
