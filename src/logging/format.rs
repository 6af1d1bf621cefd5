use std::fmt;

use chrono::Local;
use serde_json::{Map, Value};
use tracing::{
    field::{Field, Visit},
    span, Event, Subscriber,
};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::Context,
    registry::LookupSpan,
    Layer,
};

use super::{Enrichers, Severity};

/// Field holding a JSON object whose entries are flattened into the
/// event's properties. Used by the request-completion event.
pub const DIAGNOSTIC_CONTEXT_FIELD: &str = "diagnostic_context";

/// Marker field set by [`crate::fatal!`].
pub const FATAL_FIELD: &str = "fatal";

/// Field rendered in the exception slot instead of the properties.
pub const EXCEPTION_FIELD: &str = "error";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %:z";

#[derive(Default)]
struct PropertyVisitor {
    message: Option<String>,
    exception: Option<String>,
    fatal: bool,
    properties: Map<String, Value>,
    diagnostics: Map<String, Value>,
}

impl PropertyVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => self.message = Some(as_text(value)),
            EXCEPTION_FIELD => self.exception = Some(as_text(value)),
            FATAL_FIELD => self.fatal = value.as_bool().unwrap_or(false),
            DIAGNOSTIC_CONTEXT_FIELD => match value {
                Value::Object(entries) => self.diagnostics.extend(entries),
                other => {
                    self.properties
                        .insert(DIAGNOSTIC_CONTEXT_FIELD.to_string(), other);
                }
            },
            name => {
                self.properties.insert(name.to_string(), value);
            }
        }
    }

    /// Diagnostic entries never replace a field recorded on the event or span.
    fn merge_diagnostics(diagnostics: Map<String, Value>, properties: &mut Map<String, Value>) {
        for (name, value) in diagnostics {
            properties.entry(name).or_insert(value);
        }
    }

    fn into_properties(mut self) -> Map<String, Value> {
        Self::merge_diagnostics(self.diagnostics, &mut self.properties);
        self.properties
    }
}

impl Visit for PropertyVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let mut rendered = value.to_string();
        let mut source = value.source();
        while let Some(cause) = source {
            rendered.push_str(&format!(" ---> {}", cause));
            source = cause.source();
        }
        self.insert(field, Value::String(rendered));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() != "message" {
            if let Some(structured) = destructure(&rendered) {
                self.insert(field, structured);
                return;
            }
        }
        self.insert(field, Value::String(rendered));
    }
}

/// JSON objects and arrays captured through `%value` are kept structured.
fn destructure(rendered: &str) -> Option<Value> {
    if !rendered.starts_with('{') && !rendered.starts_with('[') {
        return None;
    }
    match serde_json::from_str(rendered) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

fn as_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Span fields, stored on the span so events inside it can pick them up.
struct LogContext(Map<String, Value>);

/// Records span fields as properties for [`TemplateFormatter`].
pub struct LogContextLayer;

impl<S> Layer<S> for LogContextLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = PropertyVisitor::default();
        attrs.record(&mut visitor);

        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(LogContext(visitor.into_properties()));
        }
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let mut visitor = PropertyVisitor::default();
        values.record(&mut visitor);

        if let Some(span) = ctx.span(id) {
            let mut extensions = span.extensions_mut();
            let properties = visitor.into_properties();
            match extensions.get_mut::<LogContext>() {
                Some(context) => context.0.extend(properties),
                None => extensions.insert(LogContext(properties)),
            }
        }
    }
}

/// Renders events as
/// `{timestamp} [{LVL}] {message} Properties: {json} {exception}`.
///
/// Property precedence: event fields, then enclosing span fields (innermost
/// first), then `SourceContext`, then enrichers.
#[derive(Debug, Clone, Default)]
pub struct TemplateFormatter {
    enrichers: Enrichers,
}

impl TemplateFormatter {
    pub fn new(enrichers: Enrichers) -> Self {
        Self { enrichers }
    }
}

impl<S, N> FormatEvent<S, N> for TemplateFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = PropertyVisitor::default();
        event.record(&mut visitor);

        let severity = if visitor.fatal {
            Severity::Fatal
        } else {
            Severity::from_level(event.metadata().level())
        };

        let mut properties = Map::new();
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                if let Some(context) = span.extensions().get::<LogContext>() {
                    for (name, value) in &context.0 {
                        properties.insert(name.clone(), value.clone());
                    }
                }
            }
        }
        properties.extend(visitor.properties);
        PropertyVisitor::merge_diagnostics(visitor.diagnostics, &mut properties);
        properties
            .entry("SourceContext".to_string())
            .or_insert_with(|| Value::from(event.metadata().target()));
        self.enrichers.apply(&mut properties);

        writeln!(
            writer,
            "{} [{}] {} Properties: {} {}",
            Local::now().format(TIMESTAMP_FORMAT),
            severity.abbreviation(),
            visitor.message.unwrap_or_default(),
            Value::Object(properties),
            visitor.exception.unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::test_support::CapturedLogs;
    use serde_json::json;
    use tracing::{error, info, info_span, warn};

    fn properties_of(line: &str) -> Value {
        let start = line.find("Properties: ").unwrap() + "Properties: ".len();
        let mut stream = serde_json::Deserializer::from_str(&line[start..]).into_iter::<Value>();
        stream.next().unwrap().unwrap()
    }

    #[test]
    fn test_template_layout() {
        let logs = CapturedLogs::default();
        tracing::subscriber::with_default(logs.subscriber(Enrichers::new()), || {
            info!(OrderId = 42, "Processed order {}", 42);
        });

        let lines = logs.lines();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];

        // 2026-10-18 09:15:02.123 +02:00 [INF] ...
        let (timestamp, rest) = line.split_at(30);
        assert_eq!(timestamp.as_bytes()[4], b'-');
        assert_eq!(timestamp.as_bytes()[19], b'.');
        assert!(rest.starts_with(" [INF] Processed order 42 Properties: {"));
        assert!(line.ends_with(' '));

        let properties = properties_of(line);
        assert_eq!(properties["OrderId"], 42);
        assert_eq!(properties["SourceContext"], module_path!());
    }

    #[test]
    fn test_fatal_marker_and_exception_slot() {
        let logs = CapturedLogs::default();
        let failure = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        tracing::subscriber::with_default(logs.subscriber(Enrichers::new()), || {
            crate::fatal!(error = %failure, "Host terminated unexpectedly");
            error!(error = %failure, "plain error");
        });

        let lines = logs.lines();
        assert!(lines[0].contains("[FTL] Host terminated unexpectedly Properties: "));
        assert!(lines[0].ends_with(" port taken"));
        assert!(lines[1].contains("[ERR] plain error"));

        let properties = properties_of(&lines[0]);
        assert!(properties.get(FATAL_FIELD).is_none());
        assert!(properties.get(EXCEPTION_FIELD).is_none());
    }

    #[test]
    fn test_span_fields_become_properties() {
        let logs = CapturedLogs::default();
        tracing::subscriber::with_default(logs.subscriber(Enrichers::new()), || {
            let outer = info_span!("outer", RequestId = "abc", Stage = "outer");
            let _outer = outer.enter();
            let inner = info_span!("inner", Stage = "inner");
            let _inner = inner.enter();
            warn!("inside");
        });

        let properties = properties_of(&logs.lines()[0]);
        assert_eq!(properties["RequestId"], "abc");
        assert_eq!(properties["Stage"], "inner");
    }

    #[test]
    fn test_enrichers_yield_to_event_properties() {
        let logs = CapturedLogs::default();
        let enrichers = Enrichers::new()
            .with_property("EnvironmentName", "Development")
            .with_property("AppEnvironment", "local");
        tracing::subscriber::with_default(logs.subscriber(enrichers), || {
            info!(AppEnvironment = "override", "enriched");
        });

        let properties = properties_of(&logs.lines()[0]);
        assert_eq!(properties["EnvironmentName"], "Development");
        assert_eq!(properties["AppEnvironment"], "override");
    }

    #[test]
    fn test_diagnostic_context_is_flattened() {
        let logs = CapturedLogs::default();
        let diagnostics = json!({ "RequestHost": "localhost:5000", "RequestScheme": "http" });
        tracing::subscriber::with_default(logs.subscriber(Enrichers::new()), || {
            info!(diagnostic_context = %diagnostics, "completed");
        });

        let properties = properties_of(&logs.lines()[0]);
        assert_eq!(properties["RequestHost"], "localhost:5000");
        assert_eq!(properties["RequestScheme"], "http");
        assert!(properties.get(DIAGNOSTIC_CONTEXT_FIELD).is_none());
    }

    #[test]
    fn test_event_fields_win_over_diagnostic_context() {
        let logs = CapturedLogs::default();
        let diagnostics = json!({
            "StatusCode": 500,
            "RequestPath": "/spoofed",
            "RequestId": "spoofed",
            "Tag": "kept"
        });
        tracing::subscriber::with_default(logs.subscriber(Enrichers::new()), || {
            let span = info_span!("request", RequestId = "real-id");
            let _entered = span.enter();
            info!(
                StatusCode = 200,
                RequestPath = "/weatherforecast",
                diagnostic_context = %diagnostics,
                "completed"
            );
        });

        let properties = properties_of(&logs.lines()[0]);
        assert_eq!(properties["StatusCode"], 200);
        assert_eq!(properties["RequestPath"], "/weatherforecast");
        assert_eq!(properties["RequestId"], "real-id");
        assert_eq!(properties["Tag"], "kept");
    }

    #[test]
    fn test_json_values_are_destructured() {
        let logs = CapturedLogs::default();
        let payload = json!([{ "temperatureC": 3 }]);
        tracing::subscriber::with_default(logs.subscriber(Enrichers::new()), || {
            info!(Payload = %payload, Note = %"[not json", "structured");
        });

        let properties = properties_of(&logs.lines()[0]);
        assert_eq!(properties["Payload"][0]["temperatureC"], 3);
        assert_eq!(properties["Note"], "[not json");
    }
}
