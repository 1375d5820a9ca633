use serde::Deserialize;

/// Logging configuration.
/// Controls application-level structured logging (stdout/stderr).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    /// Can be overridden at runtime via the RUST_LOG environment variable.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_false")]
    pub show_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_false() -> bool {
    false
}

/// Telemetry configuration: the OpenTelemetry meter's internal log level.
/// There is no metrics HTTP endpoint here — the CLI scrapes the registry
/// `init_metrics` returns however the deployment wants it exposed.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelemetryConfig {
    #[serde(default = "default_otel_log_level")]
    pub otel_log_level: String,
}

fn default_otel_log_level() -> String {
    "warn".to_string()
}
