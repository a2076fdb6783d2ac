use std::time::Duration;

use crate::error::{TraceError, TraceResult};

/// Default collector base URL; the reporter appends `spans` to it.
pub const DEFAULT_REPORT_TARGET: &str = "http://127.0.0.1:9411/api/v1";

/// Default reporter registry key: reporting disabled.
pub const DEFAULT_REPORT_FORMAT: &str = "null";

/// Default propagation syntax registry key: a syntax that supports no
/// formats. Select `"b3"` or `"zipkin"` to interoperate with Zipkin peers.
pub const DEFAULT_PROPAGATION_SYNTAX: &str = "none";

/// Installation-time settings for the tracing layer.
///
/// ```
/// use traceport::Config;
///
/// let config = Config::default()
///     .with_service_name("father-time")
///     .with_report_format("zipkin")
///     .with_report_target("http://zipkin.internal:9411/api/v1")
///     .with_propagation_syntax("b3");
/// # drop(config);
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    service_name: Option<String>,
    report_format: String,
    report_target: String,
    propagation_syntax: String,
    client_options: ClientOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service_name: None,
            report_format: DEFAULT_REPORT_FORMAT.to_owned(),
            report_target: DEFAULT_REPORT_TARGET.to_owned(),
            propagation_syntax: DEFAULT_PROPAGATION_SYNTAX.to_owned(),
            client_options: ClientOptions::default(),
        }
    }
}

impl Config {
    /// The name this process reports spans under. Required for Zipkin
    /// reporting.
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// Assign the service name under which to group traces.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// The reporter registry key selecting the reporting backend.
    pub fn report_format(&self) -> &str {
        &self.report_format
    }

    /// Select the reporting backend by registry key.
    pub fn with_report_format(mut self, format: impl Into<String>) -> Self {
        self.report_format = format.into();
        self
    }

    /// The collector base URL spans are delivered to.
    pub fn report_target(&self) -> &str {
        &self.report_target
    }

    /// Assign the collector base URL.
    pub fn with_report_target(mut self, target: impl Into<String>) -> Self {
        self.report_target = target.into();
        self
    }

    /// The propagation syntax registry key used for inject/extract.
    pub fn propagation_syntax(&self) -> &str {
        &self.propagation_syntax
    }

    /// Select the propagation syntax by registry key.
    pub fn with_propagation_syntax(mut self, syntax: impl Into<String>) -> Self {
        self.propagation_syntax = syntax.into();
        self
    }

    /// Transport-level overrides for the bundled HTTP client.
    pub fn client_options(&self) -> &ClientOptions {
        &self.client_options
    }

    /// Assign transport-level overrides for the bundled HTTP client.
    pub fn with_client_options(mut self, options: ClientOptions) -> Self {
        self.client_options = options;
        self
    }
}

/// Transport-level overrides applied to the bundled `reqwest` client.
#[derive(Clone, Debug, Default)]
pub struct ClientOptions {
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl ClientOptions {
    /// Cap the total time spent on a single delivery request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Cap the time spent establishing a connection to the collector.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub(crate) fn build_client(&self) -> TraceResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        builder
            .build()
            .map_err(|err| TraceError::Other(Box::new(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = Config::default();
        assert_eq!(config.service_name(), None);
        assert_eq!(config.report_format(), "null");
        assert_eq!(config.report_target(), "http://127.0.0.1:9411/api/v1");
        assert_eq!(config.propagation_syntax(), "none");
    }

    #[test]
    fn builder_methods_replace_each_field() {
        let config = Config::default()
            .with_service_name("svc")
            .with_report_format("zipkin")
            .with_report_target("http://zipkin:9411/api/v1")
            .with_propagation_syntax("b3")
            .with_client_options(
                ClientOptions::default().with_request_timeout(Duration::from_secs(2)),
            );

        assert_eq!(config.service_name(), Some("svc"));
        assert_eq!(config.report_format(), "zipkin");
        assert_eq!(config.report_target(), "http://zipkin:9411/api/v1");
        assert_eq!(config.propagation_syntax(), "b3");
        assert_eq!(
            config.client_options().request_timeout,
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn client_options_produce_a_client() {
        assert!(ClientOptions::default()
            .with_request_timeout(Duration::from_secs(1))
            .with_connect_timeout(Duration::from_millis(500))
            .build_client()
            .is_ok());
    }
}
