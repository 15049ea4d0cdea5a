//! # Tracing setup
//!
//! Installs the process-wide `tracing` subscriber used by every core crate:
//! an [`EnvFilter`] in front of one formatting layer (pretty, JSON or
//! compact) and, when the host supplied one, a [`LoggerSinkLayer`] that
//! mirrors each event into the host's `LoggerSink`.
//!
//! ```ignore
//! use bridge_traits::{ConsoleLogger, LogLevel};
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug)
//!         .with_logger_sink(Arc::new(ConsoleLogger::default())),
//! )?;
//! ```
//!
//! Bearer tokens never go into a field as-is. Call sites pass them through
//! [`redact_if_sensitive`]; forwarded fields get the same treatment unless
//! redaction is switched off.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bridge_traits::{LogEntry, LogLevel, LoggerSink};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::CoreConfig;
use crate::error::{Error, Result};

/// Library targets that follow the configured level.
const CORE_TARGETS: [&str; 7] = [
    "storefront_workspace",
    "bridge_desktop",
    "core_runtime",
    "core_query",
    "core_session",
    "core_catalog",
    "core_service",
];

/// Dependencies that are only interesting when they complain.
const QUIET_TARGETS: [&str; 5] = ["h2", "hyper", "hyper_util", "reqwest", "rustls"];

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl Default for LogFormat {
    /// Pretty in debug builds, JSON in release.
    fn default() -> Self {
        if cfg!(debug_assertions) {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(Error::Config(format!(
                "Unknown log format '{}', expected pretty, json or compact",
                other
            ))),
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level for [`CORE_TARGETS`] when no explicit filter is set.
    pub level: LogLevel,
    /// Raw `EnvFilter` directives; replaces the level-derived filter.
    pub filter: Option<String>,
    pub redact_pii: bool,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    pub enable_spans: bool,
    pub display_target: bool,
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            redact_pii: true,
            logger_sink: None,
            enable_spans: true,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("filter", &self.filter)
            .field("redact_pii", &self.redact_pii)
            .field("logger_sink", &self.logger_sink.is_some())
            .finish_non_exhaustive()
    }
}

impl LoggingConfig {
    /// Logging settings carried by a [`CoreConfig`] (`STOREFRONT_LOG`,
    /// `STOREFRONT_LOG_FORMAT`).
    pub fn from_core_config(config: &CoreConfig) -> Self {
        let mut logging = Self::default();
        if let Some(format) = config.log_format {
            logging.format = format;
        }
        logging.filter = config.log_filter.clone();
        logging
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, directives: impl Into<String>) -> Self {
        self.filter = Some(directives.into());
        self
    }

    pub fn with_pii_redaction(mut self, enabled: bool) -> Self {
        self.redact_pii = enabled;
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, enabled: bool) -> Self {
        self.enable_spans = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.display_target = enabled;
        self
    }

    pub fn with_thread_info(mut self, enabled: bool) -> Self {
        self.display_thread_info = enabled;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let directives = match &self.filter {
            Some(custom) => custom.clone(),
            None => level_directives(self.level),
        };
        EnvFilter::try_new(&directives)
            .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let base = tracing_subscriber::fmt::layer()
            .with_target(self.display_target)
            .with_thread_ids(self.display_thread_info)
            .with_thread_names(self.display_thread_info);

        match self.format {
            LogFormat::Pretty => base
                .pretty()
                .with_span_events(if self.enable_spans {
                    FmtSpan::ACTIVE
                } else {
                    FmtSpan::NONE
                })
                .boxed(),
            LogFormat::Json => base
                .json()
                .flatten_event(true)
                .with_current_span(self.enable_spans)
                .with_span_list(self.enable_spans)
                .boxed(),
            LogFormat::Compact => base.compact().boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// [`Error::Config`] when the filter does not parse or a subscriber is
/// already installed in this process.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = config.env_filter()?;

    let mut layers = vec![config.fmt_layer()];
    if let Some(sink) = config.logger_sink.clone() {
        layers.push(LoggerSinkLayer::new(sink, config.redact_pii).boxed());
    }

    tracing_subscriber::registry()
        .with(layers.with_filter(filter))
        .try_init()
        .map_err(|e| Error::Config(format!("Logging already initialised: {}", e)))
}

fn level_directives(level: LogLevel) -> String {
    let level = level.as_filter();
    CORE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .chain(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Mirrors events into a host [`LoggerSink`].
///
/// Delivery is fire-and-forget on the current Tokio runtime; outside a
/// runtime the entry is delivered inline.
pub struct LoggerSinkLayer {
    sink: Arc<dyn LoggerSink>,
    redact: bool,
}

impl LoggerSinkLayer {
    pub fn new(sink: Arc<dyn LoggerSink>, redact: bool) -> Self {
        Self { sink, redact }
    }

    fn deliver(&self, entry: LogEntry) {
        let sink = Arc::clone(&self.sink);
        let send = async move {
            if let Err(e) = sink.log(entry).await {
                // Logging through tracing here would recurse into this layer.
                eprintln!("host logger rejected entry: {}", e);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(send);
            }
            Err(_) => futures::executor::block_on(send),
        }
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = log_level(meta.level());
        if level < self.sink.min_level() {
            return;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let mut entry = LogEntry::new(
            level,
            meta.target(),
            fields.message.take().unwrap_or_else(|| meta.name().to_string()),
        );
        entry.fields = if self.redact {
            fields
                .values
                .into_iter()
                .map(|(key, value)| {
                    let value = redact_if_sensitive(&key, &value).into_owned();
                    (key, value)
                })
                .collect()
        } else {
            fields.values
        };
        entry.span = ctx.event_span(event).map(|span| span.name().to_string());

        self.deliver(entry);
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: BTreeMap<String, String>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }
}

fn log_level(level: &Level) -> LogLevel {
    match *level {
        Level::ERROR => LogLevel::Error,
        Level::WARN => LogLevel::Warn,
        Level::INFO => LogLevel::Info,
        Level::DEBUG => LogLevel::Debug,
        Level::TRACE => LogLevel::Trace,
    }
}

/// Mask a field value whose name or content looks like a credential.
///
/// Credential-named fields are replaced entirely. Email addresses keep their
/// first character so log lines can still be told apart.
///
/// ```ignore
/// debug!(token = %redact_if_sensitive("token", &token), "Signed in");
/// ```
pub fn redact_if_sensitive<'a>(field: &str, value: &'a str) -> Cow<'a, str> {
    const CREDENTIAL_NAMES: [&str; 7] = [
        "token",
        "authorization",
        "bearer",
        "password",
        "secret",
        "api_key",
        "store_key",
    ];

    let field = field.to_ascii_lowercase();
    if CREDENTIAL_NAMES.iter().any(|name| field.contains(name)) {
        return Cow::Borrowed(REDACTED);
    }

    match value.split_once('@') {
        Some((local, domain)) if domain.contains('.') && !local.is_empty() => {
            let first: String = local.chars().take(1).collect();
            Cow::Owned(format!("{}***@{}", first, REDACTED))
        }
        _ => Cow::Borrowed(value),
    }
}
