//! Structured logging pipeline.
//!
//! A bootstrap logger is installed before configuration exists and is later
//! replaced in place by the runtime logger. Both are driven through the
//! [`LoggingHandle`] returned by [`bootstrap`]; dropping the handle flushes
//! every background file writer.

use std::{io, path::Path, path::PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    filter::ParseError, fmt, layer::Layered, layer::SubscriberExt, registry::LookupSpan, reload,
    util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

mod enrich;
mod format;
mod level;
mod rolling;

pub use enrich::Enrichers;
pub use format::{
    LogContextLayer, TemplateFormatter, DIAGNOSTIC_CONTEXT_FIELD, EXCEPTION_FIELD, FATAL_FIELD,
};
pub use level::Severity;
pub use rolling::{Clock, LocalClock, RollingFileSink, RollingPolicy};

use crate::config::{ConsoleFormat, HostEnvironment, LoggingConfig};

pub const DEFAULT_LOG_DIRECTORY: &str = "logs";

const BOOTSTRAP_DIRECTIVES: &str = "debug,hyper=info,axum=warn,tower_http=warn";
const BOOTSTRAP_FILE_PREFIX: &str = "weather-api-bootstrap-Log-";
const BOOTSTRAP_RETAINED_FILE_COUNT: usize = 6;

type FilterLayer = reload::Layer<EnvFilter, Registry>;
type FilteredRegistry = Layered<FilterLayer, Registry>;
type SinkLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// Emits an error-level event marked as fatal; rendered as `FTL`.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {
        ::tracing::error!(fatal = true, $($arg)+)
    };
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter directives: {0}")]
    Filter(#[from] ParseError),

    #[error("failed to swap the active logger: {0}")]
    Reload(#[from] reload::Error),

    #[error("log directory {} is not usable: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Owns the reloadable parts of the global subscriber and the guards of
/// the background file writers currently in use.
pub struct LoggingHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    sinks: reload::Handle<SinkLayer, FilteredRegistry>,
    guards: Vec<WorkerGuard>,
}

/// Installs the bootstrap logger writing to the console and to
/// `logs/weather-api-bootstrap-Log-<date>.txt`.
pub fn bootstrap() -> LoggingHandle {
    bootstrap_in(Path::new(DEFAULT_LOG_DIRECTORY))
}

/// Like [`bootstrap`] with the bootstrap file placed in `directory`.
///
/// Never fails: the file is opened lazily and an already installed global
/// subscriber is only reported on stderr.
pub fn bootstrap_in(directory: &Path) -> LoggingHandle {
    let enrichers = Enrichers::new()
        .with_machine_name()
        .with_environment_user_name();

    let policy = RollingPolicy::new(directory, BOOTSTRAP_FILE_PREFIX)
        .retained_file_count(Some(BOOTSTRAP_RETAINED_FILE_COUNT));
    let (writer, guard) = tracing_appender::non_blocking(RollingFileSink::new(policy));

    let sinks: SinkLayer = LogContextLayer
        .and_then(console_layer(ConsoleFormat::Template, &enrichers))
        .and_then(file_layer(writer, &enrichers))
        .boxed();

    let (filter, filter_handle) = reload::Layer::new(EnvFilter::new(BOOTSTRAP_DIRECTIVES));
    let (sinks, sinks_handle) = reload::Layer::new(sinks);

    if let Err(err) = tracing_subscriber::registry().with(filter).with(sinks).try_init() {
        eprintln!("bootstrap logger not installed: {}", err);
    }

    LoggingHandle {
        filter: filter_handle,
        sinks: sinks_handle,
        guards: vec![guard],
    }
}

impl LoggingHandle {
    /// Replaces the active logger with one built from configuration.
    ///
    /// The previous sinks are flushed and closed once the new ones are live.
    pub fn configure(
        &mut self,
        settings: &LoggingConfig,
        environment: &HostEnvironment,
        app_environment: &str,
    ) -> Result<(), LoggingError> {
        let filter = EnvFilter::builder().parse(settings.directives())?;

        let enrichers = Enrichers::new()
            .with_property("EnvironmentName", environment.name.as_str())
            .with_property("AppEnvironment", app_environment)
            .with_assembly()
            .with_machine_name()
            .with_environment_user_name();

        let mut guards = Vec::new();

        let console = settings
            .console
            .enabled
            .then(|| console_layer(settings.console.format, &enrichers));

        let file = if settings.file.enabled {
            let policy = settings.file.policy(&environment.name);
            std::fs::create_dir_all(&policy.directory).map_err(|source| {
                LoggingError::Directory {
                    path: policy.directory.clone(),
                    source,
                }
            })?;
            let (writer, guard) = tracing_appender::non_blocking(RollingFileSink::new(policy));
            guards.push(guard);
            Some(file_layer(writer, &enrichers))
        } else {
            None
        };

        let sinks: SinkLayer = LogContextLayer.and_then(console).and_then(file).boxed();

        self.filter.reload(filter)?;
        self.sinks.reload(sinks)?;

        // Dropping the old guards flushes the bootstrap file.
        self.guards = guards;
        Ok(())
    }

    /// Flushes and closes every file sink.
    pub fn close_and_flush(self) {
        drop(self);
    }
}

fn console_layer<S>(format: ConsoleFormat, enrichers: &Enrichers) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        ConsoleFormat::Template => fmt::layer()
            .with_ansi(false)
            .event_format(TemplateFormatter::new(enrichers.clone()))
            .with_writer(io::stdout)
            .boxed(),
        ConsoleFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(io::stdout)
            .boxed(),
    }
}

fn file_layer<S>(writer: NonBlocking, enrichers: &Enrichers) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_ansi(false)
        .event_format(TemplateFormatter::new(enrichers.clone()))
        .with_writer(writer)
        .boxed()
}
