//! Structured logging.
//!
//! Components never reach for a global logger. The host builds a [`Logger`]
//! per component and hands it to the component's constructor; the component
//! emits its events with the logger's span entered. Per-component levels are
//! plain `EnvFilter` span directives, so `components: { telegram: "debug" }`
//! in the config becomes `[component{name=telegram}]=debug`.
//!
//! `EnvFilter` only applies span directives to spans that are entered, so
//! events must be emitted through [`Logger::in_scope`] or from a future
//! instrumented with the span, never with an explicit `parent:`.

use std::sync::Arc;

use thiserror::Error;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{LogFormat, LoggingConfig};

/// Logging setup errors.
#[derive(Error, Debug)]
pub enum LoggingError {
    /// A level or directive could not be parsed.
    #[error("Invalid log directive: {0}")]
    Directive(#[from] tracing_subscriber::filter::ParseError),

    /// A global subscriber is already installed.
    #[error("Logging already initialized: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Logger handle for one component.
///
/// Cheap to clone. Synchronous events go through
/// `logger.in_scope(|| tracing::info!(...))`; spawned tasks are wrapped with
/// `.instrument(logger.span().clone())` and log with the plain macros.
#[derive(Debug, Clone)]
pub struct Logger {
    component: Arc<str>,
    span: Span,
    enabled: bool,
}

impl Logger {
    /// Create a logger for a named component.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        let component: Arc<str> = Arc::from(component.into());
        let span = tracing::info_span!("component", name = %component);
        Self {
            component,
            span,
            enabled: true,
        }
    }

    /// A logger that emits nothing through [`in_scope`](Self::in_scope).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            component: Arc::from(""),
            span: Span::none(),
            enabled: false,
        }
    }

    /// Create a logger for a sub-component nested under this one.
    #[must_use]
    pub fn child(&self, component: &str) -> Self {
        let component: Arc<str> = if self.component.is_empty() {
            Arc::from(component)
        } else {
            Arc::from(format!("{}.{component}", self.component))
        };
        let span = tracing::info_span!(parent: &self.span, "component", name = %component);
        Self {
            component,
            span,
            enabled: true,
        }
    }

    /// Run `f` with the component span entered.
    ///
    /// Events emitted by `f` are filtered by this component's level. A
    /// disabled logger skips `f`. The span is left before this returns, so
    /// `f` must not be an async block's body spanning an `.await`.
    pub fn in_scope(&self, f: impl FnOnce()) {
        if self.enabled {
            self.span.in_scope(f);
        }
    }

    /// Whether this logger emits events.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Component name.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Span that scopes every event of this component.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Build the `EnvFilter` described by a logging config.
///
/// # Errors
///
/// Returns `LoggingError::Directive` if a level or component name does not
/// form a valid directive.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    let mut filter = EnvFilter::try_new(&config.level)?;
    for (component, level) in &config.components {
        let directive = format!("[component{{name={component}}}]={level}").parse()?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Install the global subscriber for a host process.
///
/// Libraries never call this; binaries call it once at startup.
///
/// # Errors
///
/// Returns error if the filter is invalid or a subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).try_init()?,
        LogFormat::Json => registry.with(fmt::layer().json()).try_init()?,
    }

    Ok(())
}
