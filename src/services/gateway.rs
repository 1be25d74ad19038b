//! Server-side proxy for widget requests
//!
//! Every widget fetch goes through here. The gateway only talks to origins
//! that appear in the services file, attaches credentials on the server so
//! they never reach a browser, and turns every transport failure into an
//! [`ErrorKind`].

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::{DashboardError, ErrorKind, Result};
use crate::models::service::{Credentials, ServiceConfig};
use crate::models::widget::RequestDescriptor;
use crate::services::polling::Fetcher;
use crate::services::request_builder::base_url;
use crate::services::widgets::{AuthScheme, WidgetRegistry};

/// Scheme, host and port of a URL.
type Origin = (String, String, u16);

fn origin_of(url: &Url) -> Option<Origin> {
    Some((
        url.scheme().to_string(),
        url.host_str()?.to_ascii_lowercase(),
        url.port_or_known_default()?,
    ))
}

struct Secret {
    origin: Origin,
    auth: AuthScheme,
    credentials: Credentials,
}

impl Secret {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        let credentials = &self.credentials;
        match (self.auth, credentials.key.as_deref()) {
            (AuthScheme::Basic, _) => match credentials.username.as_deref() {
                Some(username) => request.basic_auth(username, credentials.password.as_deref()),
                None => request,
            },
            (AuthScheme::Header(name), Some(key)) => request.header(name, key),
            (AuthScheme::Query(name), Some(key)) => request.query(&[(name, key)]),
            _ => request,
        }
    }
}

/// What the gateway may reach and which credentials it holds.
#[derive(Default)]
pub struct GatewayPolicy {
    allowed: HashSet<Origin>,
    secrets: HashMap<String, Secret>,
}

impl GatewayPolicy {
    /// Derive the allow-list and credential store from configured services.
    pub fn from_services(services: &[ServiceConfig], registry: &WidgetRegistry) -> Self {
        let mut policy = Self::default();

        for service in services {
            if let Some(icon) = service.icon.as_deref().filter(|i| i.starts_with("http")) {
                match Url::parse(icon) {
                    Ok(url) => policy.allow(&url),
                    Err(e) => warn!("Ignoring unparsable icon url for {}: {}", service.name, e),
                }
            }

            let Some(config) = &service.widget else {
                continue;
            };
            let Ok(widget) = registry.resolve(&config.kind) else {
                continue;
            };
            let Ok(base) = base_url(config, widget.as_ref()) else {
                continue;
            };
            policy.allow(&base);

            if let (Some(credentials), Some(origin)) = (&config.credentials, origin_of(&base)) {
                policy.secrets.insert(
                    service.name.clone(),
                    Secret {
                        origin,
                        auth: widget.auth(),
                        credentials: credentials.clone(),
                    },
                );
            }
        }

        policy
    }

    pub fn allow(&mut self, url: &Url) {
        if let Some(origin) = origin_of(url) {
            self.allowed.insert(origin);
        }
    }

    pub fn is_allowed(&self, url: &Url) -> bool {
        origin_of(url).is_some_and(|origin| self.allowed.contains(&origin))
    }

    pub fn has_credentials(&self, service: &str) -> bool {
        self.secrets.contains_key(service)
    }
}

/// Upstream answer passed back to the caller verbatim.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Default)]
struct GatewayCounters {
    requests: AtomicU64,
    rejected: AtomicU64,
    failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub requests: u64,
    pub rejected: u64,
    pub failures: u64,
    pub timeout_ms: u64,
    pub max_outbound_requests: usize,
}

pub struct ProxyGateway {
    client: Client,
    timeout: Duration,
    max_outbound: usize,
    limiter: Semaphore,
    policy: RwLock<Arc<GatewayPolicy>>,
    counters: GatewayCounters,
}

impl ProxyGateway {
    pub fn new(http_timeout: Duration, max_outbound: usize) -> std::result::Result<Self, DashboardError> {
        let client = Client::builder()
            .timeout(http_timeout)
            .user_agent(format!("dashboard-widgets/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            timeout: http_timeout,
            max_outbound,
            limiter: Semaphore::new(max_outbound),
            policy: RwLock::new(Arc::new(GatewayPolicy::default())),
            counters: GatewayCounters::default(),
        })
    }

    /// Replace the allow-list and credentials, e.g. after a config reload.
    pub fn install(&self, policy: GatewayPolicy) {
        let mut current = self.policy.write().unwrap_or_else(|e| e.into_inner());
        *current = Arc::new(policy);
    }

    pub fn policy(&self) -> Arc<GatewayPolicy> {
        Arc::clone(&self.policy.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Execute a request descriptor.
    pub async fn handle(&self, descriptor: &RequestDescriptor) -> Result<UpstreamResponse> {
        let policy = self.policy();

        let target = Url::parse(&descriptor.target)
            .map_err(|e| ErrorKind::config(format!("invalid target url: {}", e)))?;

        if !policy.is_allowed(&target) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            let host = target.host_str().unwrap_or_default().to_string();
            warn!("Rejected request to {}: not a configured service", host);
            return Err(ErrorKind::TargetNotAllowed { host });
        }

        let method = Method::from_bytes(descriptor.method.as_bytes())
            .map_err(|_| ErrorKind::config(format!("invalid method: {}", descriptor.method)))?;

        let mut request = self.client.request(method, target.clone());
        for (name, value) in &descriptor.headers {
            request = request.header(name, value);
        }

        // Credentials only ever go to the origin they were configured for.
        if let Some(secret) = descriptor
            .service
            .as_ref()
            .and_then(|service| policy.secrets.get(service))
            .filter(|secret| origin_of(&target).as_ref() == Some(&secret.origin))
        {
            request = secret.apply(request);
        }

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| ErrorKind::UpstreamUnreachable {
                message: "gateway is shutting down".to_string(),
            })?;

        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Proxying {} {} for {}",
            descriptor.method,
            target.host_str().unwrap_or_default(),
            descriptor.service.as_deref().unwrap_or("direct request")
        );

        let outcome = match timeout(self.timeout, self.send(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ErrorKind::UpstreamTimeout),
        };

        if let Err(e) = &outcome {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Upstream call to {} failed: {}",
                target.host_str().unwrap_or_default(),
                e
            );
        }

        outcome
    }

    /// Unauthenticated GET, used for remote icons.
    pub async fn passthrough(&self, url: &str) -> Result<UpstreamResponse> {
        Url::parse(url).map_err(|e| ErrorKind::config(format!("invalid url: {}", e)))?;
        self.handle(&RequestDescriptor::passthrough(url)).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<UpstreamResponse> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(ErrorKind::UpstreamError {
                code: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status: status.as_u16(),
            content_type,
            body: body.to_vec(),
        })
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            timeout_ms: self.timeout.as_millis() as u64,
            max_outbound_requests: self.max_outbound,
        }
    }
}

#[async_trait]
impl Fetcher for ProxyGateway {
    async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<Value> {
        let response = self.handle(descriptor).await?;
        // Widgets treat an unreadable body as "no data" rather than an error.
        Ok(serde_json::from_slice(&response.body).unwrap_or_else(|e| {
            warn!("Upstream body for {} is not JSON: {}", descriptor.url, e);
            Value::Null
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::service::WidgetConfig;

    fn service(name: &str, icon: Option<&str>, widget: Option<WidgetConfig>) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            group: None,
            href: None,
            icon: icon.map(str::to_string),
            description: None,
            widget,
        }
    }

    fn policy() -> GatewayPolicy {
        let services = vec![
            service(
                "AdGuard",
                Some("https://icons.example/adguard.png"),
                Some(WidgetConfig::new("adguard", "http://adguard.lan:8080").with_login("u", "p")),
            ),
            service(
                "Weather",
                None,
                Some(
                    WidgetConfig {
                        url: None,
                        ..WidgetConfig::new("openweathermap", "")
                    }
                    .with_key("k"),
                ),
            ),
            service("Broken", None, Some(WidgetConfig::new("nonexistent", "http://broken.lan"))),
        ];
        GatewayPolicy::from_services(&services, &WidgetRegistry::with_builtin_kinds())
    }

    #[test]
    fn test_allow_list_from_services() {
        let policy = policy();
        let allowed = |u: &str| policy.is_allowed(&Url::parse(u).unwrap());

        assert!(allowed("http://adguard.lan:8080/control/stats"));
        assert!(allowed("http://ADGUARD.lan:8080/other"));
        assert!(allowed("https://icons.example/anything.png"));
        assert!(allowed("https://api.openweathermap.org/data/2.5/weather"));

        assert!(!allowed("http://adguard.lan/control/stats"));
        assert!(!allowed("https://adguard.lan:8080/"));
        assert!(!allowed("http://broken.lan/"));
        assert!(!allowed("http://169.254.169.254/latest/meta-data"));
    }

    #[test]
    fn test_credentials_held_per_service() {
        let policy = policy();
        assert!(policy.has_credentials("AdGuard"));
        assert!(policy.has_credentials("Weather"));
        assert!(!policy.has_credentials("Broken"));
    }

    #[tokio::test]
    async fn test_rejects_unknown_host_without_calling() {
        let gateway = ProxyGateway::new(Duration::from_secs(1), 4).unwrap();
        gateway.install(policy());

        let result = gateway.passthrough("http://127.0.0.1:9/secret").await;
        assert_eq!(
            result.unwrap_err(),
            ErrorKind::TargetNotAllowed {
                host: "127.0.0.1".to_string()
            }
        );

        let stats = gateway.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.requests, 0);
    }

    #[tokio::test]
    async fn test_invalid_url_is_config_error() {
        let gateway = ProxyGateway::new(Duration::from_secs(1), 4).unwrap();
        assert!(matches!(
            gateway.passthrough("not a url").await,
            Err(ErrorKind::Config { .. })
        ));
    }
}
