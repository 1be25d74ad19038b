use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::errors::DashboardError;
use crate::models::service::ServiceConfig;
use crate::services::dashboard::Dashboard;
use crate::services::gateway::{GatewayPolicy, ProxyGateway};
use crate::services::polling::PollingCache;
use crate::services::widgets::WidgetRegistry;

// App state
pub struct AppState {
    pub config: Config,
    pub registry: WidgetRegistry,
    pub gateway: Arc<ProxyGateway>,
    pub cache: PollingCache,
    dashboard: RwLock<Arc<Dashboard>>,
}

impl AppState {
    /// Build the gateway and cache, then mount every configured widget.
    pub async fn initialize(config: Config, services: Vec<ServiceConfig>) -> Result<Self, DashboardError> {
        let registry = WidgetRegistry::with_builtin_kinds();

        let gateway = Arc::new(ProxyGateway::new(
            config.gateway_timeout,
            config.max_outbound_requests,
        )?);
        gateway.install(GatewayPolicy::from_services(&services, &registry));

        let cache = PollingCache::new(gateway.clone(), config.cache_grace);
        let dashboard = Dashboard::mount(services, &registry, &cache, config.poll_interval).await;

        Ok(Self {
            config,
            registry,
            gateway,
            cache,
            dashboard: RwLock::new(Arc::new(dashboard)),
        })
    }

    pub async fn dashboard(&self) -> Arc<Dashboard> {
        Arc::clone(&*self.dashboard.read().await)
    }

    /// Swap in a new set of services. Widgets mounted before the reload keep
    /// polling their old entries until the previous dashboard is dropped.
    pub async fn reload(&self, services: Vec<ServiceConfig>) -> Arc<Dashboard> {
        let mut current = self.dashboard.write().await;

        self.gateway
            .install(GatewayPolicy::from_services(&services, &self.registry));
        self.cache.reset().await;

        let dashboard = Arc::new(
            Dashboard::mount(services, &self.registry, &self.cache, self.config.poll_interval).await,
        );
        *current = Arc::clone(&dashboard);

        info!(
            "Configuration reloaded: {} services, {} widgets",
            dashboard.service_count(),
            dashboard.widgets().len()
        );
        dashboard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::service::WidgetConfig;
    use std::time::Duration;

    fn service(name: &str, url: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            group: None,
            href: None,
            icon: None,
            description: None,
            widget: Some(WidgetConfig::new("mastodon", url)),
        }
    }

    fn config() -> Config {
        Config {
            gateway_timeout: Duration::from_millis(200),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_reload_swaps_dashboard_and_policy() {
        let state = AppState::initialize(config(), vec![service("Social", "http://old.lan")])
            .await
            .unwrap();
        assert!(state.dashboard().await.widget("Social").is_ok());

        let before = state.dashboard().await;
        state.reload(vec![service("Fediverse", "http://new.lan")]).await;
        let after = state.dashboard().await;

        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.widget("Social").is_err());
        assert!(after.widget("Fediverse").is_ok());

        let policy = state.gateway.policy();
        assert!(policy.is_allowed(&reqwest::Url::parse("http://new.lan/").unwrap()));
        assert!(!policy.is_allowed(&reqwest::Url::parse("http://old.lan/").unwrap()));

        let old_key = before.widget("Social").unwrap().descriptor().unwrap().cache_key();
        let new_key = after.widget("Fediverse").unwrap().descriptor().unwrap().cache_key();
        assert_ne!(old_key, new_key);
    }
}
