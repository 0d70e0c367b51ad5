//! Spans for one conversation turn through the supervisor graph.

use tracing::Span;
use uuid::Uuid;

/// Start the root span of a turn.
///
/// `graph.node` is declared empty and updated by [`record_node_transition`]
/// as the executor moves between nodes.
pub fn start_turn_span(user_id: &str, turn_id: &Uuid) -> Span {
    tracing::info_span!(
        "supervisor.turn",
        "turn.id" = %turn_id,
        "turn.user" = user_id,
        "graph.node" = tracing::field::Empty,
        "graph.steps" = tracing::field::Empty,
    )
}

/// Emit a transition event inside the turn span and track the current node.
pub fn record_node_transition(span: &Span, from: &str, to: &str) {
    span.record("graph.node", to);
    span.in_scope(|| {
        tracing::debug!(from, to, "node_transition");
    });
}

pub fn record_steps(span: &Span, steps: usize) {
    span.record("graph.steps", steps as u64);
}
