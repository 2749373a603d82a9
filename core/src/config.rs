use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Runtime configuration for the Callboard server
#[derive(Clone, Debug)]
pub struct CallboardConfig {
    pub host: String,
    pub port: u16,
    /// SQLite file holding the call log
    pub database_path: PathBuf,
    /// Liveness ping period on every open live channel
    pub ping_interval: Duration,
    /// Per-channel queue depth; events beyond it are dropped for that channel
    pub channel_capacity: usize,
    /// The office line; calls from this number count as outgoing
    pub office_number: String,
    /// Caller ID presented on dialed calls
    pub caller_id: String,
    /// Offset applied when grouping calls by day or hour
    pub utc_offset_minutes: i32,
    pub recent_limit: usize,
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_var(key).and_then(|v| v.parse().ok())
}

impl Default for CallboardConfig {
    fn default() -> Self {
        let office_number = env_var("CALLBOARD_OFFICE_NUMBER")
            .or_else(|| env_var("TWILIO_NUMBER"))
            .unwrap_or_default();
        Self {
            host: env_var("CALLBOARD_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: env_parse("CALLBOARD_PORT").unwrap_or(3030),
            database_path: env_var("CALLBOARD_DATABASE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/callboard.db")),
            ping_interval: Duration::from_secs(
                env_parse::<u64>("CALLBOARD_PING_INTERVAL_SECS")
                    .unwrap_or(20)
                    .max(1),
            ),
            channel_capacity: env_parse::<usize>("CALLBOARD_CHANNEL_CAPACITY")
                .unwrap_or(64)
                .max(1),
            caller_id: env_var("TWILIO_NUMBER").unwrap_or_else(|| office_number.clone()),
            office_number,
            utc_offset_minutes: env_parse("CALLBOARD_UTC_OFFSET_MINUTES").unwrap_or(0),
            recent_limit: env_parse("CALLBOARD_RECENT_LIMIT").unwrap_or(3),
            log_format: match env_var("CALLBOARD_LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Compact,
            },
        }
    }
}

impl CallboardConfig {
    /// Load configuration from a TOML file (path via CALLBOARD_CONFIG or ./callboard.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let path = env_var("CALLBOARD_CONFIG").unwrap_or_else(|| "callboard.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Self {
        let default = Self::default();
        if !path.exists() {
            tracing::info!(target: "config", path = %path.display(), "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<CallboardToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "config", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "config", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CallboardToml {
    server: ServerToml,
    database: DatabaseToml,
    dashboard: DashboardToml,
    telephony: TelephonyToml,
    log_format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerToml {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatabaseToml {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DashboardToml {
    ping_interval_secs: Option<u64>,
    channel_capacity: Option<usize>,
    utc_offset_minutes: Option<i32>,
    recent_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TelephonyToml {
    office_number: Option<String>,
    caller_id: Option<String>,
}

impl CallboardToml {
    fn overlay(self, mut base: CallboardConfig) -> CallboardConfig {
        if let Some(v) = self.server.host {
            base.host = v;
        }
        if let Some(v) = self.server.port {
            base.port = v;
        }
        if let Some(v) = self.database.path {
            base.database_path = v;
        }
        if let Some(v) = self.dashboard.ping_interval_secs {
            base.ping_interval = Duration::from_secs(v.max(1));
        }
        if let Some(v) = self.dashboard.channel_capacity {
            base.channel_capacity = v.max(1);
        }
        if let Some(v) = self.dashboard.utc_offset_minutes {
            base.utc_offset_minutes = v;
        }
        if let Some(v) = self.dashboard.recent_limit {
            base.recent_limit = v;
        }
        if let Some(v) = self.telephony.office_number {
            base.office_number = v;
        }
        if let Some(v) = self.telephony.caller_id {
            base.caller_id = v;
        }
        if let Some(v) = self.log_format {
            base.log_format = v;
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn toml_overlays_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
log_format = "json"

[server]
port = 8088

[dashboard]
ping_interval_secs = 5

[telephony]
office_number = "+493042430344"
"#
        )
        .unwrap();

        let config = CallboardConfig::load_from(file.path());
        assert_eq!(config.port, 8088);
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.office_number, "+493042430344");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = CallboardConfig::load_from(Path::new("/nonexistent/callboard.toml"));
        assert!(config.channel_capacity >= 1);
        assert!(!config.ping_interval.is_zero());
    }
}
