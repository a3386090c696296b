//! Tracing configuration for host applications
//!
//! The library only emits events and spans. Hosts that do not bring their own
//! subscriber can install one here (enable the `tracing-init` feature).

#[cfg(feature = "tracing-init")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Human-readable console output with colors
    #[default]
    Console,
    /// Compact output without ANSI colors, for CI and log files
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Subscriber configuration builder
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Verbosity level (0 = info, 1 = debug, 2+ = trace)
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Filter directive; overrides `verbosity` when set
    pub env_filter: Option<String>,
    /// Label for the host session, logged once on init
    pub session_id: Option<String>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directive for the configured verbosity
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "ssm_capture=info",
            1 => "ssm_capture=debug",
            _ => "ssm_capture=trace",
        }
    }

    /// Filter directive that `init` will install
    #[must_use]
    pub fn filter_directive(&self) -> String {
        self.env_filter
            .clone()
            .unwrap_or_else(|| self.verbosity_to_filter().to_string())
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    #[cfg(feature = "tracing-init")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let filter = EnvFilter::try_new(self.filter_directive())?;
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let fmt_layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact();
                registry.with(fmt_layer).try_init()?;
            },
            TracingFormat::Compact => {
                let fmt_layer = fmt::layer().with_ansi(false).with_target(false).compact();
                registry.with(fmt_layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let fmt_layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true);
                registry.with(fmt_layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "Capture tracing initialized");
        }
        Ok(())
    }
}

/// Span helpers for pipeline stages
pub mod spans {
    use crate::types::{FeatureType, RequestId};
    use tracing::{Level, Span};

    /// Span around the extraction of one feature crop
    pub fn extraction(request_id: RequestId, feature: FeatureType, size: (u32, u32)) -> Span {
        tracing::span!(
            Level::DEBUG,
            "extraction",
            request_id = %request_id,
            feature = %feature,
            width = size.0,
            height = size.1
        )
    }

    /// Span around the fan-out of persistence calls for one capture
    pub fn persistence(request_id: RequestId, pending: usize) -> Span {
        tracing::span!(
            Level::DEBUG,
            "persistence",
            request_id = %request_id,
            pending = pending
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(TracingConfig::new().filter_directive(), "ssm_capture=info");
        assert_eq!(
            TracingConfig::new().with_verbosity(5).filter_directive(),
            "ssm_capture=trace"
        );
        assert_eq!(
            TracingConfig::new()
                .with_verbosity(2)
                .with_env_filter("warn")
                .filter_directive(),
            "warn"
        );
    }
}
