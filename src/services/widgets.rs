//! Widget kinds and the registry that resolves them by name
//!
//! A widget kind knows two things about a third-party API: which endpoint to
//! call for a given configuration, and how to turn the response body into a
//! short list of metrics. Everything else (proxying, polling, caching) is
//! shared.

pub mod adguard;
pub mod jellyseerr;
pub mod mastodon;
pub mod openweathermap;
pub mod portainer;
pub mod rutorrent;

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::errors::{ErrorKind, Result};
use crate::models::service::WidgetConfig;
use crate::models::widget::Metrics;

/// How the gateway attaches a widget's credentials to the outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    None,
    /// HTTP basic auth from `username` / `password`
    Basic,
    /// API key sent in the named header
    Header(&'static str),
    /// API key sent as the named query parameter
    Query(&'static str),
}

/// Path (relative to the widget's base URL) and query for one API call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub suffix: String,
    pub query: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            query: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.insert(name.to_string(), value.into());
        self
    }
}

pub trait Widget: Send + Sync {
    /// Tag used in the services file (`type: adguard`)
    fn kind(&self) -> &'static str;

    /// Metric labels, in display order
    fn labels(&self) -> &'static [&'static str];

    fn auth(&self) -> AuthScheme {
        AuthScheme::None
    }

    /// Whether calls must go through the gateway even without credentials,
    /// e.g. because the API does not allow cross-origin requests.
    fn requires_proxy(&self) -> bool {
        true
    }

    /// Base URL used when the configuration does not provide one
    fn default_base_url(&self) -> Option<&'static str> {
        None
    }

    fn build_request(&self, config: &WidgetConfig) -> Result<Endpoint>;

    /// Turn a response body into metrics. Must never fail: missing fields
    /// produce absent values and unexpected shapes produce all-absent metrics.
    fn normalize(&self, body: &Value, options: &BTreeMap<String, String>) -> Metrics;

    /// Some APIs report failures inside a successful response.
    fn reported_error(&self, _body: &Value) -> Option<ErrorKind> {
        None
    }
}

#[derive(Clone, Default)]
pub struct WidgetRegistry {
    kinds: HashMap<&'static str, Arc<dyn Widget>>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every kind this crate ships.
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        registry.register(adguard::AdGuard);
        registry.register(jellyseerr::Jellyseerr);
        registry.register(mastodon::Mastodon);
        registry.register(openweathermap::OpenWeatherMap);
        registry.register(portainer::Portainer);
        registry.register(rutorrent::Rutorrent);
        registry
    }

    pub fn register<W: Widget + 'static>(&mut self, widget: W) {
        self.kinds.insert(widget.kind(), Arc::new(widget));
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Widget>> {
        self.kinds.get(kind).cloned()
    }

    /// Look up a kind named in configuration.
    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn Widget>> {
        self.get(kind)
            .ok_or_else(|| ErrorKind::config(format!("unknown widget type: {}", kind)))
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.kinds.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

/// Numeric field at a JSON pointer, accepting numbers encoded as strings.
pub(crate) fn number(body: &Value, pointer: &str) -> Option<f64> {
    let value = body.pointer(pointer)?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

pub(crate) fn text(body: &Value, pointer: &str) -> Option<String> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Whole numbers without a fraction, everything else to two decimals.
pub(crate) fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        format!("{}", rounded as i64)
    } else {
        format!("{}", rounded)
    }
}

pub(crate) fn count(value: usize) -> Option<String> {
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_resolution() {
        let registry = WidgetRegistry::with_builtin_kinds();
        assert_eq!(
            registry.kinds(),
            vec!["adguard", "jellyseerr", "mastodon", "openweathermap", "portainer", "rutorrent"]
        );
        assert_eq!(registry.resolve("adguard").unwrap().kind(), "adguard");
        assert!(matches!(
            registry.resolve("sonarr"),
            Err(ErrorKind::Config { .. })
        ));
    }

    #[test]
    fn test_number_helpers() {
        let body = json!({ "a": { "b": 3 }, "s": "42", "bad": "x" });
        assert_eq!(number(&body, "/a/b"), Some(3.0));
        assert_eq!(number(&body, "/s"), Some(42.0));
        assert_eq!(number(&body, "/bad"), None);
        assert_eq!(number(&body, "/missing"), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(100.0), "100");
        assert_eq!(format_number(0.01 * 1000.0), "10");
        assert_eq!(format_number(12.346), "12.35");
        assert_eq!(format_number(-3.5), "-3.5");
    }

    /// Every shipped kind must survive an empty body and a body of the wrong type.
    #[test]
    fn test_every_kind_is_total() {
        let registry = WidgetRegistry::with_builtin_kinds();
        let options = BTreeMap::new();
        for kind in registry.kinds() {
            let widget = registry.resolve(kind).unwrap();
            for body in [json!({}), json!(null), json!("garbage"), json!([1, 2, 3])] {
                let metrics = widget.normalize(&body, &options);
                assert_eq!(metrics.labels(), widget.labels().to_vec(), "kind {}", kind);
            }
            let metrics = widget.normalize(&json!({}), &options);
            assert!(metrics.all_absent(), "kind {} produced values from {{}}", kind);
        }
    }
}
