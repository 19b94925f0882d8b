//! Daemon settings.
//!
//! Settings are a flat table of `SCREAMING_SNAKE_CASE` keys. Every key has
//! a default; a settings file only overrides what it names. JSON files are
//! accepted as well as TOML (`.toml` extension).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML settings: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Diagnostic verbosity, spelled the way operators write it in settings
/// files (`WARNING`, `CRITICAL` are accepted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Error)]
#[error("unknown log level: {0}")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" | "CRITICAL" => Ok(LogLevel::Error),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The full settings table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default, deny_unknown_fields)]
pub struct Settings {
    pub log_level: LogLevel,
    pub server_url: String,
    pub app_status_api: String,
    pub set_replica_api: String,
    #[serde(deserialize_with = "de_interval")]
    pub status_check_interval: Duration,
    #[serde(deserialize_with = "de_interval")]
    pub decide_replica_interval: Duration,
    #[serde(deserialize_with = "de_interval")]
    pub scaling_interval: Duration,
    pub desired_cpu_utilization: f64,
    pub scale_down_toleration: f64,
    pub restclient_max_retries: u32,
    #[serde(deserialize_with = "de_interval")]
    pub restclient_retry_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Error,
            server_url: "http://localhost:8001".to_string(),
            app_status_api: "/app/status".to_string(),
            set_replica_api: "/app/replicas".to_string(),
            status_check_interval: Duration::from_secs(2),
            decide_replica_interval: Duration::from_secs(2),
            scaling_interval: Duration::from_secs(15),
            desired_cpu_utilization: 0.80,
            scale_down_toleration: 0.1,
            restclient_max_retries: 3,
            restclient_retry_interval: Duration::from_secs(2),
        }
    }
}

impl Settings {
    /// Load and validate settings from a file. The format follows the
    /// extension: `.toml` is TOML, anything else is JSON.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let uri: http::Uri = self.server_url.parse().map_err(|e| {
            invalid(
                "SERVER_URL",
                format!("{:?} is not a valid URL: {e}", self.server_url),
            )
        })?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid("SERVER_URL", "only http:// endpoints are supported"));
        }
        if uri.host().is_none_or(str::is_empty) {
            return Err(invalid("SERVER_URL", "missing host"));
        }

        for (key, path) in [
            ("APP_STATUS_API", &self.app_status_api),
            ("SET_REPLICA_API", &self.set_replica_api),
        ] {
            if !path.starts_with('/') {
                return Err(invalid(key, format!("{path:?} must start with '/'")));
            }
        }

        for (key, interval) in [
            ("STATUS_CHECK_INTERVAL", self.status_check_interval),
            ("DECIDE_REPLICA_INTERVAL", self.decide_replica_interval),
            ("SCALING_INTERVAL", self.scaling_interval),
        ] {
            if interval.is_zero() {
                return Err(invalid(key, "loop interval must be greater than zero"));
            }
        }

        if !(self.desired_cpu_utilization > 0.0 && self.desired_cpu_utilization <= 1.0) {
            return Err(invalid(
                "DESIRED_CPU_UTILIZATION",
                format!("{} is outside (0, 1]", self.desired_cpu_utilization),
            ));
        }
        if !(0.0..=1.0).contains(&self.scale_down_toleration) {
            return Err(invalid(
                "SCALE_DOWN_TOLERATION",
                format!("{} is outside [0, 1]", self.scale_down_toleration),
            ));
        }
        if self.restclient_max_retries == 0 {
            return Err(invalid("RESTCLIENT_MAX_RETRIES", "must be at least 1"));
        }

        Ok(())
    }

    /// Full URL of the status resource.
    pub fn status_url(&self) -> String {
        join_url(&self.server_url, &self.app_status_api)
    }

    /// Full URL of the replica resource.
    pub fn replica_url(&self) -> String {
        join_url(&self.server_url, &self.set_replica_api)
    }

    /// `EnvFilter` directive for the configured `LOG_LEVEL`.
    pub fn log_directive(&self) -> &'static str {
        self.log_level.as_directive()
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Intervals are either a number of seconds (`2`, `0.5`) or a duration
/// string (`"2s"`, `"500ms"`, `"1m"`).
fn de_interval<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom(format!("invalid interval: {secs}"))),
        Raw::Text(text) => parse_duration(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid interval: {text:?}"))),
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim()
            .parse::<f64>()
            .ok()
            .and_then(|v| Duration::try_from_secs_f64(v).ok())
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<f64>()
            .ok()
            .and_then(|v| Duration::try_from_secs_f64(v).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_table() {
        let s = Settings::default();
        assert_eq!(s.log_level, LogLevel::Error);
        assert_eq!(s.server_url, "http://localhost:8001");
        assert_eq!(s.status_url(), "http://localhost:8001/app/status");
        assert_eq!(s.replica_url(), "http://localhost:8001/app/replicas");
        assert_eq!(s.status_check_interval, Duration::from_secs(2));
        assert_eq!(s.decide_replica_interval, Duration::from_secs(2));
        assert_eq!(s.scaling_interval, Duration::from_secs(15));
        assert_eq!(s.desired_cpu_utilization, 0.80);
        assert_eq!(s.scale_down_toleration, 0.1);
        assert_eq!(s.restclient_max_retries, 3);
        assert_eq!(s.restclient_retry_interval, Duration::from_secs(2));
        s.validate().unwrap();
    }

    #[test]
    fn empty_json_object_yields_defaults() {
        let s = Settings::from_json_str("{}").unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn json_overrides_only_named_keys() {
        let s = Settings::from_json_str(
            r#"{
                "SERVER_URL": "http://scaler-target:9000",
                "SCALING_INTERVAL": 30,
                "RESTCLIENT_RETRY_INTERVAL": 0.5,
                "LOG_LEVEL": "info"
            }"#,
        )
        .unwrap();
        assert_eq!(s.replica_url(), "http://scaler-target:9000/app/replicas");
        assert_eq!(s.scaling_interval, Duration::from_secs(30));
        assert_eq!(s.restclient_retry_interval, Duration::from_millis(500));
        assert_eq!(s.log_level, LogLevel::Info);
        assert_eq!(s.status_check_interval, Duration::from_secs(2));
    }

    #[test]
    fn toml_settings_accept_duration_strings() {
        let s = Settings::from_toml_str(
            r#"
SERVER_URL = "http://127.0.0.1:8001/"
STATUS_CHECK_INTERVAL = "500ms"
DECIDE_REPLICA_INTERVAL = "1s"
SCALING_INTERVAL = "1m"
DESIRED_CPU_UTILIZATION = 0.7
LOG_LEVEL = "WARNING"
"#,
        )
        .unwrap();
        assert_eq!(s.status_check_interval, Duration::from_millis(500));
        assert_eq!(s.decide_replica_interval, Duration::from_secs(1));
        assert_eq!(s.scaling_interval, Duration::from_secs(60));
        assert_eq!(s.desired_cpu_utilization, 0.7);
        assert_eq!(s.log_level, LogLevel::Warn);
        assert_eq!(s.status_url(), "http://127.0.0.1:8001/app/status");
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = Settings::from_json_str(r#"{ "SCALNG_INTERVAL": 10 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            Settings::from_json_str("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn negative_interval_is_rejected() {
        assert!(Settings::from_json_str(r#"{ "STATUS_CHECK_INTERVAL": -1 }"#).is_err());
    }

    #[test]
    fn zero_loop_interval_is_rejected() {
        let err = Settings::from_json_str(r#"{ "SCALING_INTERVAL": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "SCALING_INTERVAL", .. }
        ));
    }

    #[test]
    fn zero_retry_interval_is_allowed() {
        let s = Settings::from_json_str(r#"{ "RESTCLIENT_RETRY_INTERVAL": 0 }"#).unwrap();
        assert_eq!(s.restclient_retry_interval, Duration::ZERO);
    }

    #[test]
    fn zero_retries_are_rejected() {
        let err = Settings::from_json_str(r#"{ "RESTCLIENT_MAX_RETRIES": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { key: "RESTCLIENT_MAX_RETRIES", .. }
        ));
    }

    #[test]
    fn https_server_is_rejected() {
        let err =
            Settings::from_json_str(r#"{ "SERVER_URL": "https://example.com" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SERVER_URL", .. }));
    }

    #[test]
    fn api_path_must_be_absolute() {
        let err = Settings::from_json_str(r#"{ "APP_STATUS_API": "app/status" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "APP_STATUS_API", .. }));
    }

    #[test]
    fn cpu_target_out_of_range_is_rejected() {
        for bad in ["0", "1.5", "-0.2"] {
            let json = format!(r#"{{ "DESIRED_CPU_UTILIZATION": {bad} }}"#);
            assert!(Settings::from_json_str(&json).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn toleration_out_of_range_is_rejected() {
        assert!(Settings::from_json_str(r#"{ "SCALE_DOWN_TOLERATION": 1.2 }"#).is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        assert!(Settings::from_json_str(r#"{ "LOG_LEVEL": "LOUD" }"#).is_err());
    }

    #[test]
    fn log_levels_map_to_directives() {
        assert_eq!("critical".parse::<LogLevel>().unwrap().as_directive(), "error");
        assert_eq!("Warning".parse::<LogLevel>().unwrap().as_directive(), "warn");
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap().as_directive(), "debug");
    }

    #[test]
    fn from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("settings.json");
        let mut f = std::fs::File::create(&json_path).unwrap();
        write!(f, r#"{{ "SCALING_INTERVAL": 5 }}"#).unwrap();
        let s = Settings::from_file(&json_path).unwrap();
        assert_eq!(s.scaling_interval, Duration::from_secs(5));

        let toml_path = dir.path().join("settings.toml");
        std::fs::write(&toml_path, "SCALING_INTERVAL = 7\n").unwrap();
        let s = Settings::from_file(&toml_path).unwrap();
        assert_eq!(s.scaling_interval, Duration::from_secs(7));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Settings::from_file(Path::new("/nonexistent/cpuscale.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/cpuscale.json"));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1.5"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("soon"), None);
    }
}
