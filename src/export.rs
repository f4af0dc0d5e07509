use std::env;

use anyhow::{Result, anyhow};

pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportMode {
    /// Metrics aggregated in-process and logged as JSON events.
    JsonStdout,
    /// Metrics and spans pushed to an OTLP collector over gRPC.
    OtlpGrpc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub mode: ExportMode,
    pub endpoint: String,
    pub log_format: LogFormat,
}

impl TelemetryConfig {
    pub fn json_default() -> Self {
        Self {
            service_name: "order-queue".into(),
            mode: ExportMode::JsonStdout,
            endpoint: DEFAULT_OTLP_ENDPOINT.into(),
            log_format: LogFormat::Pretty,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::json_default();
        let get = |key: &str| lookup(key).filter(|s| !s.is_empty());

        let mode = match get("TELEMETRY_EXPORT")
            .unwrap_or_else(|| "json-stdout".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "json-stdout" => ExportMode::JsonStdout,
            "otlp-grpc" => ExportMode::OtlpGrpc,
            other => {
                return Err(anyhow!(
                    "unsupported TELEMETRY_EXPORT value: {other}. expected one of json-stdout, otlp-grpc"
                ));
            }
        };

        let log_format = match get("LOG_FORMAT")
            .unwrap_or_else(|| "pretty".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(anyhow!(
                    "unsupported LOG_FORMAT value: {other}. expected pretty or json"
                ));
            }
        };

        Ok(Self {
            service_name: get("SERVICE_NAME").unwrap_or(defaults.service_name),
            mode,
            endpoint: get("OTLP_ENDPOINT").unwrap_or(defaults.endpoint),
            log_format,
        })
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::json_default()
    }
}
