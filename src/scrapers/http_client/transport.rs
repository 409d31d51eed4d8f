//! Raw HTTP transport behind the resilient client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;

use super::user_agent::resolve_user_agent;
use crate::scrapers::egress::EgressIdentity;

/// Response as seen by the classifier. Header names are lower-cased.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }
}

/// One GET through a given egress. Errors are transport failures only;
/// every HTTP status comes back as a `RawResponse`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, egress: &EgressIdentity) -> Result<RawResponse, String>;
}

/// reqwest-backed transport. Keeps one client per egress generation so a
/// rotation drops pooled connections to the old exit.
pub struct ReqwestTransport {
    timeout: Duration,
    user_agent: String,
    cached: Mutex<Option<(u64, Client)>>,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent_config: Option<&str>) -> Self {
        Self {
            timeout,
            user_agent: resolve_user_agent(user_agent_config),
            cached: Mutex::new(None),
        }
    }

    async fn client_for(&self, egress: &EgressIdentity) -> Result<Client, String> {
        let mut cached = self.cached.lock().await;
        if let Some((generation, client)) = cached.as_ref() {
            if *generation == egress.generation {
                return Ok(client.clone());
            }
        }

        let mut builder = Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .gzip(true)
            .brotli(true);
        if let Some(proxy_url) = &egress.proxy_url {
            let proxy =
                reqwest::Proxy::all(proxy_url).map_err(|e| format!("invalid proxy: {}", e))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;
        *cached = Some((egress.generation, client.clone()));
        Ok(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, egress: &EgressIdentity) -> Result<RawResponse, String> {
        let client = self.client_for(egress).await?;
        let response = client
            .get(url)
            .header("Accept", "application/json, text/html;q=0.9")
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }
        let body = response.text().await.map_err(|e| e.to_string())?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
