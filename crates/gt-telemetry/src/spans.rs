use uuid::Uuid;

/// Generate an OpenTelemetry-compatible trace ID (32 hex characters).
pub fn generate_trace_id() -> String {
    Uuid::new_v4().as_simple().to_string()
}

/// Create a span for a control transition (`start`, `stop`, `alarm_fired`,
/// ...) carrying a fresh `trace_id` field.
///
/// Every event logged inside the span, and inside tasks instrumented with
/// it, is correlated by that id.
pub fn operation_span(operation: &str) -> tracing::Span {
    tracing::info_span!(
        "operation",
        trace_id = %generate_trace_id(),
        operation = %operation,
    )
}
