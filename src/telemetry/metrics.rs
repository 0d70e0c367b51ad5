//! Metric instrument factories and recording helpers.
//!
//! Instruments come from the `"supervisor-rs"` meter on the globally
//! registered `MeterProvider`. Without an OTLP endpoint the global provider
//! is a no-op, so recording is always safe.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

use crate::llm::TokenUsage;

fn meter() -> Meter {
    opentelemetry::global::meter("supervisor-rs")
}

/// Counter: memory backend operations.
/// Labels: `operation` ("search" | "write" | "update" | "delete"), `backend`, `result`.
pub fn memory_operations() -> Counter<u64> {
    meter()
        .u64_counter("supervisor.memory.operations")
        .with_description("Number of memory backend operations")
        .build()
}

/// Counter: write-worthiness judgments.
/// Labels: `decision` ("write" | "skip").
pub fn memory_write_decisions() -> Counter<u64> {
    meter()
        .u64_counter("supervisor.memory.write_decisions")
        .with_description("Outcomes of the memory write-worthiness judgment")
        .build()
}

/// Counter: graph node executions.
/// Labels: `node`.
pub fn graph_node_visits() -> Counter<u64> {
    meter()
        .u64_counter("supervisor.graph.node_visits")
        .with_description("Number of graph node executions")
        .build()
}

/// Counter: supervisor handoffs to workers.
/// Labels: `worker`.
pub fn handoffs() -> Counter<u64> {
    meter()
        .u64_counter("supervisor.handoffs")
        .with_description("Number of supervisor-to-worker handoffs")
        .build()
}

/// Counter: LLM token usage.
/// Labels: `model`, `provider`, `direction` ("input" | "output").
pub fn llm_tokens() -> Counter<u64> {
    meter()
        .u64_counter("supervisor.llm.tokens")
        .with_description("LLM token usage")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("supervisor.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}

pub fn record_memory_operation(operation: &str, backend: &str, result: &str) {
    memory_operations().add(
        1,
        &[
            KeyValue::new("operation", operation.to_string()),
            KeyValue::new("backend", backend.to_string()),
            KeyValue::new("result", result.to_string()),
        ],
    );
}

pub fn record_write_decision(should_write: bool) {
    let decision = if should_write { "write" } else { "skip" };
    memory_write_decisions().add(1, &[KeyValue::new("decision", decision)]);
}

pub fn record_node_visit(node: &str) {
    graph_node_visits().add(1, &[KeyValue::new("node", node.to_string())]);
}

pub fn record_handoff(worker: &str) {
    handoffs().add(1, &[KeyValue::new("worker", worker.to_string())]);
}

pub fn record_llm_tokens(model: &str, provider: &str, usage: TokenUsage) {
    let counter = llm_tokens();
    for (direction, count) in [("input", usage.input_tokens), ("output", usage.output_tokens)] {
        counter.add(
            count,
            &[
                KeyValue::new("model", model.to_string()),
                KeyValue::new("provider", provider.to_string()),
                KeyValue::new("direction", direction),
            ],
        );
    }
}

pub fn record_duration(operation: &str, started: std::time::Instant) {
    operation_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[KeyValue::new("operation", operation.to_string())],
    );
}
