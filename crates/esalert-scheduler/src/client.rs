//! Elasticsearch search client.

use async_trait::async_trait;
use esalert_core::{AlertError, ClientConfig, ElasticsearchConfig, Result};
use serde_json::{Map, Value};
use std::time::Duration;

/// Anything that can run a search body against an index.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, index: &str, body: &Map<String, Value>) -> Result<Value>;
}

/// HTTP client bound to one cluster.
#[derive(Debug, Clone)]
pub struct EsClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl EsClient {
    /// Build a client from the `[elasticsearch]` section.
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        let base_url = config.server.url.trim_end_matches('/').to_string();
        let http = build_http(&config.client, &base_url)?;
        Ok(Self {
            http,
            base_url,
            username: config.client.username.clone(),
            password: config.client.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn build_http(client: &ClientConfig, base_url: &str) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(client.timeout_secs))
        .connect_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(30);

    if client.tls_enabled {
        let ca = read_pem(&client.ca_cert, "CA certificate")?;
        let ca = reqwest::Certificate::from_pem(&ca)
            .map_err(|e| AlertError::Config(format!("error parsing CA certificate: {e}")))?;
        let cert = read_pem(&client.client_cert, "client certificate")?;
        let key = read_pem(&client.client_key, "client key")?;
        let identity = reqwest::Identity::from_pkcs8_pem(&cert, &key)
            .map_err(|e| AlertError::Config(format!("error loading X509 key pair: {e}")))?;
        builder = builder.add_root_certificate(ca).identity(identity);
    } else if base_url.starts_with("https://") {
        tracing::warn!("🔓 TLS disabled for {}; server certificates will not be verified", base_url);
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| AlertError::Config(format!("error building HTTP client: {e}")))
}

fn read_pem(path: &str, what: &str) -> Result<Vec<u8>> {
    let path = esalert_core::config::expand_path(path);
    std::fs::read(&path).map_err(|e| AlertError::Config(format!("error reading {what} file {path}: {e}")))
}

#[async_trait]
impl SearchBackend for EsClient {
    async fn search(&self, index: &str, body: &Map<String, Value>) -> Result<Value> {
        let url = format!("{}/{}/_search", self.base_url, index);
        let mut req = self.http.post(&url).json(body);
        if !self.username.is_empty() {
            req = req.basic_auth(&self.username, Some(&self.password));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AlertError::Http(format!("error querying {url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AlertError::Query(format!("search on '{index}' returned {status}: {text}")));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| AlertError::Query(format!("error decoding response from '{index}': {e}")))
    }
}
