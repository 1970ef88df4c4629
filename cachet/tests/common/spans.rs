//! Captures `cache.*` spans so tests can assert on them.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::Dispatch;
use tracing::span::{Attributes, Id};
use tracing::{Subscriber, field::Field, field::Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub name: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedSpan {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

struct FieldVisitor(Vec<(String, String)>);

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

struct SpanCaptureLayer {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
}

impl<S> Layer<S> for SpanCaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        let name = attrs.metadata().name();
        if !name.starts_with("cache.") {
            return;
        }
        let mut visitor = FieldVisitor(Vec::new());
        attrs.record(&mut visitor);
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CapturedSpan {
                name: name.to_string(),
                fields: visitor.0,
            });
    }
}

#[derive(Clone)]
pub struct SpanCollector {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
    dispatch: Dispatch,
}

pub fn collector() -> SpanCollector {
    let spans = Arc::new(Mutex::new(Vec::new()));
    let layer = SpanCaptureLayer {
        spans: Arc::clone(&spans),
    };
    let dispatch = Dispatch::new(Registry::default().with(layer));
    SpanCollector { spans, dispatch }
}

impl SpanCollector {
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
