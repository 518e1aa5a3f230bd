use std::future::Future;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use zipflux_core::config::Config;
use zipflux_core::error::{Result, ZipfluxError};

use crate::response::QueryResponse;

const INFLUXDB_VERSION_HEADER: &str = "X-Influxdb-Version";

/// Timestamp unit requested from the store. Without one, times come back as
/// RFC 3339 strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Microseconds,
}

impl Precision {
    pub fn as_param(self) -> &'static str {
        match self {
            Self::Microseconds => "u",
        }
    }
}

/// One request/response exchange with the time-series store.
pub trait Transport: Send + Sync {
    fn query(
        &self,
        statement: &str,
        precision: Option<Precision>,
    ) -> impl Future<Output = Result<QueryResponse>> + Send;

    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub retention_policy: String,
    pub timeout: Duration,
}

impl From<&Config> for HttpSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            url: cfg.url.trim_end_matches('/').to_string(),
            database: cfg.database.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            retention_policy: cfg.retention_policy.clone(),
            timeout: cfg.request_timeout,
        }
    }
}

/// InfluxDB 1.x `/query` endpoint over HTTP.
///
/// The client is built on first use. After `close` every query fails.
pub struct HttpTransport {
    settings: HttpSettings,
    client: OnceLock<Client>,
    closed: Mutex<bool>,
}

impl HttpTransport {
    pub fn new(settings: HttpSettings) -> Self {
        Self {
            settings,
            client: OnceLock::new(),
            closed: Mutex::new(false),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(HttpSettings::from(cfg))
    }

    fn is_closed(&self) -> Result<bool> {
        self.closed
            .lock()
            .map(|closed| *closed)
            .map_err(|_| ZipfluxError::Internal("transport state poisoned".to_string()))
    }

    fn client(&self) -> Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let built = Client::builder()
            .timeout(self.settings.timeout)
            .build()
            .map_err(|e| ZipfluxError::Transport(format!("failed to build http client: {e}")))?;
        // A racing caller may have set it first; keep theirs.
        let _ = self.client.set(built);
        self.client
            .get()
            .ok_or_else(|| ZipfluxError::Internal("http client missing after init".to_string()))
    }

    /// `GET /ping`. InfluxDB answers 204 with its version in a header.
    pub async fn ping(&self) -> Result<String> {
        if self.is_closed()? {
            return Err(ZipfluxError::Transport("transport closed".to_string()));
        }
        let resp = self
            .client()?
            .get(format!("{}/ping", self.settings.url))
            .send()
            .await
            .map_err(|e| ZipfluxError::Transport(format!("ping failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ZipfluxError::Transport(format!("ping returned {status}")));
        }
        let version = resp
            .headers()
            .get(INFLUXDB_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        Ok(version.to_string())
    }
}

impl Transport for HttpTransport {
    async fn query(&self, statement: &str, precision: Option<Precision>) -> Result<QueryResponse> {
        if self.is_closed()? {
            return Err(ZipfluxError::Transport("transport closed".to_string()));
        }
        let client = self.client()?;

        let mut params: Vec<(&str, &str)> =
            vec![("db", self.settings.database.as_str()), ("q", statement)];
        if let Some(p) = precision {
            params.push(("epoch", p.as_param()));
        }
        if !self.settings.retention_policy.is_empty() {
            params.push(("rp", self.settings.retention_policy.as_str()));
        }

        let mut request = client
            .get(format!("{}/query", self.settings.url))
            .query(&params);
        if !self.settings.username.is_empty() {
            request = request.basic_auth(&self.settings.username, Some(&self.settings.password));
        }

        debug!(url = %self.settings.url, db = %self.settings.database, "sending query");
        let resp = request
            .send()
            .await
            .map_err(|e| ZipfluxError::Transport(format!("query request failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ZipfluxError::Transport(format!("failed reading response body: {e}")))?;

        // Statement errors arrive as JSON with a 4xx status too.
        match QueryResponse::from_slice(&body) {
            Ok(parsed) => {
                parsed.check_error()?;
                Ok(parsed)
            }
            Err(_) if !status.is_success() => Err(ZipfluxError::Transport(format!(
                "store returned {status}: {}",
                String::from_utf8_lossy(&body).trim()
            ))),
            Err(err) => Err(err),
        }
    }

    async fn close(&self) -> Result<()> {
        let mut closed = self
            .closed
            .lock()
            .map_err(|_| ZipfluxError::Internal("transport state poisoned".to_string()))?;
        if !*closed {
            *closed = true;
            debug!(url = %self.settings.url, "transport closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> HttpSettings {
        HttpSettings::from(&Config {
            url: "http://127.0.0.1:1/".into(),
            ..Config::default()
        })
    }

    #[test]
    fn settings_follow_config() {
        let s = settings();
        assert_eq!(s.url, "http://127.0.0.1:1");
        assert_eq!(s.database, "zipkin");
        assert_eq!(s.retention_policy, "zipkin");
        assert_eq!(Precision::Microseconds.as_param(), "u");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let transport = HttpTransport::new(settings());
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.query("SHOW DATABASES", None).await.unwrap_err();
        assert!(matches!(err, ZipfluxError::Transport(msg) if msg == "transport closed"));
        let err = transport.ping().await.unwrap_err();
        assert!(matches!(err, ZipfluxError::Transport(msg) if msg == "transport closed"));
    }

    #[tokio::test]
    async fn unreachable_store_is_a_transport_error() {
        let transport = HttpTransport::new(settings());
        let err = transport.query("SHOW DATABASES", None).await.unwrap_err();
        assert!(matches!(err, ZipfluxError::Transport(_)));
        assert!(matches!(transport.ping().await, Err(ZipfluxError::Transport(_))));
    }
}
