//! GenAI semantic convention spans for model calls.
//!
//! Field names follow the OpenTelemetry GenAI conventions
//! (`gen_ai.operation.name`, `gen_ai.request.model`, `gen_ai.provider.name`,
//! `gen_ai.usage.*`). Chat spans additionally carry the number of tool calls
//! the model asked for.

use tracing::Span;

/// Span for a chat completion. Usage and tool-call fields start empty.
pub fn start_chat_span(model: &str, provider: &str) -> Span {
    tracing::info_span!(
        "gen_ai.chat",
        "gen_ai.operation.name" = "chat",
        "gen_ai.request.model" = model,
        "gen_ai.provider.name" = provider,
        "gen_ai.usage.input_tokens" = tracing::field::Empty,
        "gen_ai.usage.output_tokens" = tracing::field::Empty,
        "gen_ai.response.tool_calls" = tracing::field::Empty,
    )
}

pub fn start_embedding_span(model: &str, provider: &str) -> Span {
    tracing::info_span!(
        "gen_ai.embeddings",
        "gen_ai.operation.name" = "embeddings",
        "gen_ai.request.model" = model,
        "gen_ai.provider.name" = provider,
        "gen_ai.embeddings.dimension.count" = tracing::field::Empty,
    )
}

/// Record token usage on a span made by [`start_chat_span`].
pub fn record_token_usage(span: &Span, input: u64, output: u64) {
    span.record("gen_ai.usage.input_tokens", input);
    span.record("gen_ai.usage.output_tokens", output);
}

pub fn record_tool_calls(span: &Span, count: usize) {
    span.record("gen_ai.response.tool_calls", count as u64);
}

/// Record the produced vector's dimension on a span made by [`start_embedding_span`].
pub fn record_embedding_dimensions(span: &Span, dimensions: usize) {
    span.record("gen_ai.embeddings.dimension.count", dimensions as u64);
}
