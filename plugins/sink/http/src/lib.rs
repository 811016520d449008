use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;

use bridge_api::{BridgeError, Delivery, Record, RecordSink};

/// Параметры HTTP endpoint'а.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct HttpSinkConfig {
    pub url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl HttpSinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), timeout_secs: default_timeout() }
    }
}

fn default_timeout() -> u64 {
    10
}

/// Проверить URL endpoint'а: абсолютный, схема http или https, есть хост.
pub fn parse_endpoint_url(url: &str) -> Result<reqwest::Url, BridgeError> {
    let parsed = reqwest::Url::parse(url.trim())
        .map_err(|e| BridgeError::config(format!("endpoint url {url:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(BridgeError::config(format!("endpoint url must be http(s), got {url:?}")));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(BridgeError::config(format!("endpoint url has no host: {url:?}")));
    }
    Ok(parsed)
}

/// POST каждой записи как JSON-объекта на фиксированный URL.
///
/// Любой 2xx считается доставкой; тело ответа возвращается как есть.
/// Не-2xx → `ErrorKind::Status`, сетевой сбой или таймаут → `ErrorKind::Connection`.
pub struct HttpSink {
    http: reqwest::Client,
    url: reqwest::Url,
    timeout: Duration,
}

impl HttpSink {
    pub fn new(config: &HttpSinkConfig) -> Result<Self, BridgeError> {
        let url = parse_endpoint_url(&config.url)?;
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::config(format!("HTTP client: {e}")))?;
        tracing::debug!(%url, timeout_secs = timeout.as_secs(), "http sink created");
        Ok(Self { http, url, timeout })
    }

    async fn post(&self, record: &Record) -> Result<Delivery, BridgeError> {
        let body = record.body_bytes()?;
        let started = Instant::now();
        let resp = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.request_failed(&e))?;

        let status = resp.status();
        let reply = resp.text().await.map_err(|e| self.request_failed(&e))?;
        tracing::debug!(
            url = %self.url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "endpoint replied"
        );

        if status.is_success() {
            Ok(Delivery { status: status.as_u16(), reply })
        } else {
            Err(BridgeError::status(status.as_u16(), reply))
        }
    }

    fn request_failed(&self, e: &reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            tracing::debug!(url = %self.url, timeout_secs = self.timeout.as_secs(), "request timed out");
            return BridgeError::connection(format!(
                "POST {}: timed out after {}s",
                self.url,
                self.timeout.as_secs()
            ));
        }
        tracing::debug!(url = %self.url, error = %e, "request failed");
        BridgeError::connection(format!("POST {}: {e}", self.url))
    }
}

impl RecordSink for HttpSink {
    fn send<'a>(&'a self, record: &'a Record)
        -> Pin<Box<dyn Future<Output = Result<Delivery, BridgeError>> + Send + 'a>>
    {
        Box::pin(self.post(record))
    }

    fn target(&self) -> &str {
        self.url.as_str()
    }
}
