use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZipfluxError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub url: String,
    pub database: String,
    pub measurement: String,
    pub username: String,
    pub password: String,
    pub retention_policy: String,
    /// When false, 128-bit trace ids are looked up by their low 64 bits.
    pub strict_trace_id: bool,
    pub request_timeout: Duration,
    pub api_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            database: "zipkin".to_string(),
            measurement: "zipkin".to_string(),
            username: "root".to_string(),
            password: String::new(),
            retention_policy: "zipkin".to_string(),
            strict_trace_id: true,
            request_timeout: Duration::from_secs(30),
            api_addr: "127.0.0.1:9411".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Defaults, then the TOML file at `path` if it exists, then `ZIPFLUX_*`
    /// environment variables.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(file_overrides) = load_file_overrides(path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    url: Option<String>,
    database: Option<String>,
    measurement: Option<String>,
    username: Option<String>,
    password: Option<String>,
    retention_policy: Option<String>,
    strict_trace_id: Option<bool>,
    request_timeout: Option<String>,
    api_addr: Option<String>,
}

pub fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("ZIPFLUX_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("zipflux/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| ZipfluxError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| ZipfluxError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    let strict_trace_id = match env::var("ZIPFLUX_STRICT_TRACE_ID") {
        Ok(v) => Some(parse_bool(&v).ok_or_else(|| {
            ZipfluxError::Config(format!(
                "bad ZIPFLUX_STRICT_TRACE_ID in environment: expected true or false, got {v}"
            ))
        })?),
        Err(_) => None,
    };

    Ok(ConfigOverrides {
        url: env::var("ZIPFLUX_URL").ok(),
        database: env::var("ZIPFLUX_DATABASE").ok(),
        measurement: env::var("ZIPFLUX_MEASUREMENT").ok(),
        username: env::var("ZIPFLUX_USERNAME").ok(),
        password: env::var("ZIPFLUX_PASSWORD").ok(),
        retention_policy: env::var("ZIPFLUX_RETENTION_POLICY").ok(),
        strict_trace_id,
        request_timeout: env::var("ZIPFLUX_REQUEST_TIMEOUT").ok(),
        api_addr: env::var("ZIPFLUX_API_ADDR").ok(),
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.url {
        if v.trim().is_empty() {
            return Err(ZipfluxError::Config(format!("empty url in {source}")));
        }
        cfg.url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = overrides.database {
        cfg.database = v;
    }
    if let Some(v) = overrides.measurement {
        if v.is_empty() {
            return Err(ZipfluxError::Config(format!("empty measurement in {source}")));
        }
        cfg.measurement = v;
    }
    if let Some(v) = overrides.username {
        cfg.username = v;
    }
    if let Some(v) = overrides.password {
        cfg.password = v;
    }
    if let Some(v) = overrides.retention_policy {
        cfg.retention_policy = v;
    }
    if let Some(v) = overrides.strict_trace_id {
        cfg.strict_trace_id = v;
    }
    if let Some(v) = overrides.request_timeout {
        cfg.request_timeout = humantime::parse_duration(&v).map_err(|e| {
            ZipfluxError::Config(format!("bad request_timeout in {source}: {e} (value={v})"))
        })?;
    }
    if let Some(v) = overrides.api_addr {
        cfg.api_addr = v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_matches_stock_influx_setup() {
        let cfg = Config::default();
        assert_eq!(cfg.url, "http://localhost:8086");
        assert_eq!(cfg.database, "zipkin");
        assert_eq!(cfg.measurement, "zipkin");
        assert_eq!(cfg.username, "root");
        assert_eq!(cfg.password, "");
        assert_eq!(cfg.retention_policy, "zipkin");
        assert!(cfg.strict_trace_id);
    }

    #[test]
    fn apply_overrides_updates_fields() {
        let mut cfg = Config::default();
        let file = ConfigOverrides {
            url: Some("http://influx:8086/".to_string()),
            measurement: Some("spans".to_string()),
            strict_trace_id: Some(false),
            request_timeout: Some("3s".to_string()),
            ..ConfigOverrides::default()
        };

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert_eq!(cfg.url, "http://influx:8086");
        assert_eq!(cfg.measurement, "spans");
        assert!(!cfg.strict_trace_id);
        assert_eq!(cfg.request_timeout, Duration::from_secs(3));
        assert_eq!(cfg.database, "zipkin");
    }

    #[test]
    fn apply_overrides_rejects_bad_values() {
        let mut cfg = Config::default();
        let bad_timeout = ConfigOverrides {
            request_timeout: Some("soon".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(&mut cfg, bad_timeout, "config file").is_err());

        let empty_measurement = ConfigOverrides {
            measurement: Some(String::new()),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(&mut cfg, empty_measurement, "config file").is_err());
    }

    #[test]
    fn reads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "url = \"http://tsdb:8086\"\ndatabase = \"traces\"\nrequest_timeout = \"250ms\""
        )
        .unwrap();

        let parsed = load_file_overrides(file.path()).unwrap().unwrap();
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, parsed, "config file").unwrap();

        assert_eq!(cfg.url, "http://tsdb:8086");
        assert_eq!(cfg.database, "traces");
        assert_eq!(cfg.request_timeout, Duration::from_millis(250));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            load_file_overrides(&dir.path().join("absent.toml"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
