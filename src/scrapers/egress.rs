//! Outbound network identity (egress) and rotation.
//!
//! Rotation is either an explicit control-plane call that asks the proxy
//! provider for a new exit IP, or implicit: a `{session}` placeholder in the
//! proxy URL is replaced with a fresh session id, which sticky-session
//! proxies map to a new exit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// The egress in effect for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgressIdentity {
    /// Bumped on every rotation; HTTP clients are cached per generation.
    pub generation: u64,
    pub proxy_url: Option<String>,
    pub label: String,
}

impl EgressIdentity {
    pub fn direct(generation: u64) -> Self {
        Self {
            generation,
            proxy_url: None,
            label: "direct".to_string(),
        }
    }
}

/// Source of outbound identities.
#[async_trait]
pub trait EgressProvider: Send + Sync {
    async fn current(&self) -> EgressIdentity;

    /// Switch to a fresh egress and return it.
    async fn rotate(&self) -> EgressIdentity;
}

/// No proxy. Rotation only advances the generation so clients are rebuilt.
#[derive(Debug, Default)]
pub struct DirectEgress {
    generation: RwLock<u64>,
}

impl DirectEgress {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EgressProvider for DirectEgress {
    async fn current(&self) -> EgressIdentity {
        EgressIdentity::direct(*self.generation.read().await)
    }

    async fn rotate(&self) -> EgressIdentity {
        let mut generation = self.generation.write().await;
        *generation += 1;
        debug!("Direct egress rotated to generation {}", *generation);
        EgressIdentity::direct(*generation)
    }
}

/// Placeholder replaced with a random session id on every rotation.
pub const SESSION_PLACEHOLDER: &str = "{session}";

#[derive(Debug, Deserialize)]
struct RotationResponse {
    status: u16,
    #[serde(default)]
    message: Option<String>,
}

/// Proxy-backed egress.
pub struct ProxyEgress {
    template: String,
    rotation_url: Option<String>,
    control: Client,
    state: RwLock<EgressIdentity>,
}

impl ProxyEgress {
    /// Create a proxy egress. `rotation_url`, when set, is called on rotate.
    pub fn new(proxy_url: &str, rotation_url: Option<String>) -> anyhow::Result<Self> {
        let control = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let initial = EgressIdentity {
            generation: 0,
            proxy_url: Some(Self::render(proxy_url)),
            label: "proxy#0".to_string(),
        };
        Ok(Self {
            template: proxy_url.to_string(),
            rotation_url,
            control,
            state: RwLock::new(initial),
        })
    }

    fn render(template: &str) -> String {
        if template.contains(SESSION_PLACEHOLDER) {
            let session = uuid::Uuid::new_v4().simple().to_string();
            template.replace(SESSION_PLACEHOLDER, &session[..12])
        } else {
            template.to_string()
        }
    }

    /// Ask the control plane for a new exit IP. Returns false on cool-down or error.
    async fn request_new_ip(&self, url: &str) -> bool {
        let response = match self.control.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Egress rotation request failed: {}", e);
                return false;
            }
        };
        match response.json::<RotationResponse>().await {
            Ok(body) if body.status == 200 => true,
            Ok(body) if body.status == 429 => {
                warn!(
                    "Egress rotation on cool-down: {}",
                    body.message.unwrap_or_default()
                );
                false
            }
            Ok(body) => {
                warn!("Egress rotation returned status {}", body.status);
                false
            }
            Err(e) => {
                warn!("Egress rotation response unreadable: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl EgressProvider for ProxyEgress {
    async fn current(&self) -> EgressIdentity {
        self.state.read().await.clone()
    }

    async fn rotate(&self) -> EgressIdentity {
        if let Some(url) = &self.rotation_url {
            if self.request_new_ip(url).await {
                info!("Egress IP rotated via control plane");
            }
        }

        let mut state = self.state.write().await;
        let generation = state.generation + 1;
        *state = EgressIdentity {
            generation,
            proxy_url: Some(Self::render(&self.template)),
            label: format!("proxy#{}", generation),
        };
        info!("Egress rotated to {}", state.label);
        state.clone()
    }
}

/// Build the egress provider from optional proxy settings.
pub fn egress_from_settings(
    proxy_url: Option<&str>,
    rotation_url: Option<String>,
) -> anyhow::Result<Arc<dyn EgressProvider>> {
    Ok(match proxy_url {
        Some(url) => Arc::new(ProxyEgress::new(url, rotation_url)?),
        None => Arc::new(DirectEgress::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_direct_rotation_bumps_generation() {
        let egress = DirectEgress::new();
        assert_eq!(egress.current().await.generation, 0);
        assert_eq!(egress.rotate().await.generation, 1);
        assert_eq!(egress.current().await.generation, 1);
        assert!(egress.current().await.proxy_url.is_none());
    }

    #[tokio::test]
    async fn test_session_placeholder_changes_on_rotate() {
        let egress = ProxyEgress::new("http://user-{session}:pw@proxy.local:8000", None).unwrap();
        let first = egress.current().await;
        let second = egress.rotate().await;
        assert_eq!(second.generation, 1);
        assert_ne!(first.proxy_url, second.proxy_url);
        assert!(!second.proxy_url.unwrap().contains(SESSION_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_control_plane_cooldown_still_advances_generation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": 429, "message": "wait"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let egress =
            ProxyEgress::new("http://proxy.local:8000", Some(server.uri())).unwrap();
        let rotated = egress.rotate().await;
        assert_eq!(rotated.generation, 1);
        assert_eq!(rotated.proxy_url.as_deref(), Some("http://proxy.local:8000"));
    }
}
