//! Mounted widgets for the configured services
//!
//! Mounting resolves each widget kind once, builds its request and subscribes
//! it to the polling cache. Everything the HTTP layer shows about a widget is a
//! projection of its cache entry.

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::errors::{ErrorKind, Result};
use crate::models::render::{RenderState, WidgetView};
use crate::models::service::{ServiceConfig, ServiceView, WidgetConfig};
use crate::models::widget::RequestDescriptor;
use crate::services::polling::{PollingCache, Subscription};
use crate::services::request_builder;
use crate::services::widgets::{Widget, WidgetRegistry};

enum Mount {
    Polling {
        widget: Arc<dyn Widget>,
        subscription: Subscription,
    },
    /// Static configuration problem; never fetched, always renders an error.
    Misconfigured(ErrorKind),
}

pub struct MountedWidget {
    service: String,
    config: WidgetConfig,
    mount: Mount,
}

impl MountedWidget {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn kind(&self) -> &str {
        &self.config.kind
    }

    pub fn descriptor(&self) -> Option<&RequestDescriptor> {
        match &self.mount {
            Mount::Polling { subscription, .. } => Some(subscription.descriptor()),
            Mount::Misconfigured(_) => None,
        }
    }

    pub fn misconfiguration(&self) -> Option<&ErrorKind> {
        match &self.mount {
            Mount::Misconfigured(e) => Some(e),
            Mount::Polling { .. } => None,
        }
    }

    pub fn view(&self) -> WidgetView {
        let state = match &self.mount {
            Mount::Polling {
                widget,
                subscription,
            } => RenderState::project(&subscription.current(), widget.as_ref(), &self.config.options),
            Mount::Misconfigured(_) => RenderState::error(),
        };
        WidgetView {
            service: self.service.clone(),
            kind: self.config.kind.clone(),
            state,
        }
    }
}

pub struct Dashboard {
    services: Vec<ServiceConfig>,
    widgets: Vec<MountedWidget>,
    interval: Duration,
}

impl Dashboard {
    /// Mount every configured widget against `cache`.
    pub async fn mount(
        services: Vec<ServiceConfig>,
        registry: &WidgetRegistry,
        cache: &PollingCache,
        interval: Duration,
    ) -> Self {
        let mut widgets = Vec::new();

        for service in &services {
            let Some(config) = &service.widget else {
                continue;
            };

            let resolved = registry.resolve(&config.kind).and_then(|widget| {
                let descriptor = request_builder::build_for(&service.name, config, widget.as_ref())?;
                Ok((widget, descriptor))
            });

            let mount = match resolved {
                Ok((widget, descriptor)) => Mount::Polling {
                    widget,
                    subscription: cache.subscribe(descriptor, interval).await,
                },
                Err(e) => {
                    error!("Widget for {} is misconfigured: {}", service.name, e);
                    Mount::Misconfigured(e)
                }
            };
            widgets.push(MountedWidget {
                service: service.name.clone(),
                config: config.clone(),
                mount,
            });
        }

        info!(
            "Mounted {} widgets for {} services",
            widgets.len(),
            services.len()
        );

        Self {
            services,
            widgets,
            interval,
        }
    }

    pub fn services(&self) -> Vec<ServiceView> {
        self.services.iter().map(ServiceView::from).collect()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn widgets(&self) -> &[MountedWidget] {
        &self.widgets
    }

    pub fn widget(&self, service: &str) -> Result<&MountedWidget> {
        self.widgets
            .iter()
            .find(|w| w.service == service)
            .ok_or_else(|| ErrorKind::UnknownService {
                name: service.to_string(),
            })
    }

    pub fn render(&self, service: &str) -> Result<WidgetView> {
        Ok(self.widget(service)?.view())
    }

    pub fn render_all(&self) -> Vec<WidgetView> {
        self.widgets.iter().map(MountedWidget::view).collect()
    }

    /// Rebuild the request for an arbitrary endpoint below a widget's base URL,
    /// for the authenticated proxy route.
    pub fn proxy_request(
        &self,
        service: &str,
        suffix: &str,
        query: &BTreeMap<String, String>,
    ) -> Result<RequestDescriptor> {
        let mounted = self.widget(service)?;
        match &mounted.mount {
            Mount::Polling { widget, .. } => {
                request_builder::build(service, &mounted.config, widget.as_ref(), Some(suffix), query)
            }
            Mount::Misconfigured(e) => Err(e.clone()),
        }
    }

    /// Render states of one widget as they change. The stream holds its own
    /// subscription, so it keeps the widget polled for as long as it lives.
    pub async fn watch(&self, service: &str, cache: &PollingCache) -> Result<BoxStream<'static, WidgetView>> {
        let mounted = self.widget(service)?;

        let Mount::Polling {
            widget,
            subscription,
        } = &mounted.mount
        else {
            return Ok(stream::once(future::ready(mounted.view())).boxed());
        };

        let subscription = cache
            .subscribe(subscription.descriptor().clone(), self.interval)
            .await;

        let widget = Arc::clone(widget);
        let options = mounted.config.options.clone();
        let service = mounted.service.clone();
        let kind = mounted.config.kind.clone();

        Ok(subscription
            .into_stream()
            .map(move |entry| WidgetView {
                service: service.clone(),
                kind: kind.clone(),
                state: RenderState::project(&entry, widget.as_ref(), &options),
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::polling::Fetcher;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio_test::assert_ok;

    struct AdGuardStats;

    #[async_trait]
    impl Fetcher for AdGuardStats {
        async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<Value> {
            assert!(descriptor.target.ends_with("/control/stats"));
            Ok(json!({
                "num_dns_queries": 100,
                "num_blocked_filtering": 10,
                "num_replaced_safebrowsing": 2,
                "num_replaced_safesearch": 1,
                "num_replaced_parental": 0,
                "avg_processing_time": 0.01
            }))
        }
    }

    fn service(name: &str, widget: Option<WidgetConfig>) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            group: Some("Home".to_string()),
            href: None,
            icon: None,
            description: None,
            widget,
        }
    }

    fn services() -> Vec<ServiceConfig> {
        vec![
            service(
                "AdGuard",
                Some(WidgetConfig::new("adguard", "http://adguard.lan").with_login("admin", "pw")),
            ),
            service(
                "Portainer",
                Some(WidgetConfig::new("portainer", "http://portainer.lan").with_key("k")),
            ),
            service("Sonarr", Some(WidgetConfig::new("sonarr", "http://sonarr.lan"))),
            service("Wiki", None),
        ]
    }

    async fn mounted() -> (Dashboard, PollingCache) {
        let cache = PollingCache::new(Arc::new(AdGuardStats), Duration::from_secs(30));
        let dashboard = Dashboard::mount(
            services(),
            &WidgetRegistry::with_builtin_kinds(),
            &cache,
            Duration::from_secs(10),
        )
        .await;
        (dashboard, cache)
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_skips_services_without_widgets() {
        let (dashboard, cache) = mounted().await;

        assert_eq!(dashboard.service_count(), 4);
        assert_eq!(dashboard.widgets().len(), 3);
        assert_eq!(cache.len().await, 1);
        assert!(matches!(
            dashboard.render("Wiki"),
            Err(ErrorKind::UnknownService { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_misconfigured_widgets_render_error() {
        let (dashboard, _cache) = mounted().await;

        for name in ["Portainer", "Sonarr"] {
            let mounted = dashboard.widget(name).unwrap();
            assert!(mounted.descriptor().is_none());
            assert!(matches!(
                mounted.misconfiguration(),
                Some(ErrorKind::Config { .. })
            ));
            assert!(dashboard.render(name).unwrap().state.is_error());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_then_ready() {
        let (dashboard, _cache) = mounted().await;

        let view = dashboard.render("AdGuard").unwrap();
        assert!(view.state.is_loading());

        tokio::time::sleep(Duration::from_millis(10)).await;
        let view = dashboard.render("AdGuard").unwrap();
        let RenderState::Ready { metrics } = view.state else {
            panic!("expected ready, got {:?}", view.state);
        };
        assert_eq!(metrics.get("queries"), Some("100"));
        assert_eq!(metrics.get("filtered"), Some("3"));
        assert_eq!(metrics.get("latency"), Some("10 ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_shares_the_mounted_entry() {
        let (dashboard, cache) = mounted().await;

        let views: Vec<_> = assert_ok!(dashboard.watch("AdGuard", &cache).await)
            .take(2)
            .collect()
            .await;
        assert!(!views[0].state.is_error());
        assert!(matches!(views[1].state, RenderState::Ready { .. }));
        assert_eq!(cache.len().await, 1);

        let views: Vec<_> = assert_ok!(dashboard.watch("Sonarr", &cache).await)
            .collect()
            .await;
        assert_eq!(views.len(), 1);
        assert!(views[0].state.is_error());

        assert!(matches!(
            dashboard.watch("Nope", &cache).await,
            Err(ErrorKind::UnknownService { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_request() {
        let (dashboard, _cache) = mounted().await;

        let descriptor = assert_ok!(dashboard.proxy_request("AdGuard", "control/status", &BTreeMap::new()));
        assert_eq!(descriptor.target, "http://adguard.lan/control/status");
        assert_eq!(descriptor.service.as_deref(), Some("AdGuard"));

        assert!(matches!(
            dashboard.proxy_request("Sonarr", "x", &BTreeMap::new()),
            Err(ErrorKind::Config { .. })
        ));
        assert!(matches!(
            dashboard.proxy_request("Nope", "x", &BTreeMap::new()),
            Err(ErrorKind::UnknownService { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_views_carry_no_credentials() {
        let (dashboard, _cache) = mounted().await;
        let serialized = serde_json::to_string(&dashboard.services()).unwrap();
        assert!(!serialized.contains("admin"));
        assert!(!serialized.contains("\"pw\""));
        assert!(serialized.contains("\"widget\":\"adguard\""));
    }
}
