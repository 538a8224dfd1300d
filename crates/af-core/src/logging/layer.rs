//! Custom tracing layer for JSONL output.
//!
//! One JSON object per event on stderr. Correlation fields from enclosing
//! spans (`run_id`, `agent`, `step`) are lifted to the top level.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Correlation data carried by a span.
#[derive(Debug, Clone, Default)]
struct SpanContext {
    run_id: Option<String>,
    agent: Option<String>,
    step: Option<String>,
}

impl SpanContext {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "run_id" => self.run_id = Some(value),
            "agent" => self.agent = Some(value),
            "step" => self.step = Some(value),
            _ => {}
        }
    }

    fn fill_from(&mut self, other: &SpanContext) {
        if self.run_id.is_none() {
            self.run_id.clone_from(&other.run_id);
        }
        if self.agent.is_none() {
            self.agent.clone_from(&other.agent);
        }
        if self.step.is_none() {
            self.step.clone_from(&other.step);
        }
    }
}

struct SpanContextVisitor(SpanContext);

impl Visit for SpanContextVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.set(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.set(field.name(), format!("{:?}", value));
    }
}

/// Collects event fields into a JSON map.
struct JsonFieldVisitor {
    fields: serde_json::Map<String, serde_json::Value>,
    message: Option<String>,
}

impl JsonFieldVisitor {
    fn new() -> Self {
        JsonFieldVisitor {
            fields: serde_json::Map::new(),
            message: None,
        }
    }

    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for JsonFieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, serde_json::Value::String(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let s = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(s);
        } else {
            self.insert(field, serde_json::Value::String(s));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, serde_json::Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.insert(field, serde_json::Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, serde_json::Value::Bool(value));
    }
}

/// JSONL tracing layer.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    pub fn stderr() -> Self {
        JsonlLayer {
            writer: Mutex::new(io::stderr()),
        }
    }
}

impl<W: Write> JsonlLayer<W> {
    /// Layer writing to a custom sink.
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = SpanContextVisitor(SpanContext::default());
        attrs.record(&mut visitor);

        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(visitor.0);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let ts = Utc::now();

        // Innermost span wins.
        let mut correlation = SpanContext::default();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(span_ctx) = span.extensions().get::<SpanContext>() {
                    correlation.fill_from(span_ctx);
                }
            }
        }

        let mut visitor = JsonFieldVisitor::new();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let mut obj = serde_json::Map::new();
        obj.insert("ts".to_string(), serde_json::json!(ts.to_rfc3339()));
        obj.insert(
            "level".to_string(),
            serde_json::json!(metadata.level().as_str().to_ascii_lowercase()),
        );
        obj.insert("target".to_string(), serde_json::json!(metadata.target()));

        if let Some(id) = correlation.run_id {
            obj.insert("run_id".to_string(), serde_json::json!(id));
        }
        if let Some(agent) = correlation.agent {
            obj.insert("agent".to_string(), serde_json::json!(agent));
        }
        if let Some(step) = correlation.step {
            obj.insert("step".to_string(), serde_json::json!(step));
        }
        if let Some(msg) = visitor.message {
            obj.insert("message".to_string(), serde_json::json!(msg));
        }
        if !visitor.fields.is_empty() {
            obj.insert("fields".to_string(), serde_json::Value::Object(visitor.fields));
        }

        let json = serde_json::to_string(&serde_json::Value::Object(obj)).unwrap_or_default();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::capture_jsonl;

    fn capture<F: FnOnce()>(f: F) -> Vec<serde_json::Value> {
        capture_jsonl("trace", f)
    }

    #[test]
    fn test_event_shape() {
        let lines = capture(|| {
            tracing::info!(target: "af_core::detect", count = 3, ok = true, "pass done");
        });
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["level"], "info");
        assert_eq!(line["target"], "af_core::detect");
        assert_eq!(line["message"], "pass done");
        assert_eq!(line["fields"]["count"], 3);
        assert_eq!(line["fields"]["ok"], true);
        assert!(line["ts"].is_string());
    }

    #[test]
    fn test_span_correlation_lifted() {
        let lines = capture(|| {
            let run = tracing::info_span!("detect", run_id = "run-abc");
            let _run = run.enter();
            let agent = tracing::info_span!("probe_agent", agent = "kube-system/cilium-a");
            let _agent = agent.enter();
            tracing::warn!(feature = "host-firewall", "differs");
        });
        let line = &lines[0];
        assert_eq!(line["level"], "warn");
        assert_eq!(line["run_id"], "run-abc");
        assert_eq!(line["agent"], "kube-system/cilium-a");
        assert_eq!(line["fields"]["feature"], "host-firewall");
    }

    #[test]
    fn test_no_span_no_correlation() {
        let lines = capture(|| tracing::error!("bare"));
        assert!(lines[0].get("run_id").is_none());
        assert!(lines[0].get("fields").is_none());
    }
}
