use serde::Serialize;
use std::collections::BTreeMap;

/// A fully resolved outbound request, as seen by the client side.
///
/// `service` and `target` stay on the server: `target` is the real upstream
/// URL (without credentials) and `service` names the credential set the
/// gateway injects when the request is proxied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    #[serde(skip)]
    pub service: Option<String>,
    #[serde(skip)]
    pub target: String,
}

impl RequestDescriptor {
    /// Plain GET against `url` with no credential injection.
    pub fn passthrough(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            method: "GET".to_string(),
            target: url.clone(),
            url,
            headers: BTreeMap::new(),
            service: None,
        }
    }

    pub fn is_proxied(&self) -> bool {
        self.service.is_some()
    }

    /// Stable serialization used as the polling cache key.
    pub fn cache_key(&self) -> String {
        let mut key = format!("{} {}", self.method, self.url);
        for (name, value) in &self.headers {
            key.push('\n');
            key.push_str(name);
            key.push_str(": ");
            key.push_str(value);
        }
        key
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Ordered label/value pairs. An absent value means "not yet known".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Metrics(Vec<Metric>);

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels with no values, used while loading.
    pub fn placeholders(labels: &[&str]) -> Self {
        Self(
            labels
                .iter()
                .map(|label| Metric {
                    label: label.to_string(),
                    value: None,
                })
                .collect(),
        )
    }

    pub fn push(&mut self, label: &str, value: Option<String>) {
        self.0.push(Metric {
            label: label.to_string(),
            value,
        });
    }

    pub fn with(mut self, label: &str, value: Option<String>) -> Self {
        self.push(label, value);
        self
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|m| m.label == label)
            .and_then(|m| m.value.as_deref())
    }

    pub fn labels(&self) -> Vec<&str> {
        self.0.iter().map(|m| m.label.as_str()).collect()
    }

    pub fn all_present(&self) -> bool {
        self.0.iter().all(|m| m.value.is_some())
    }

    pub fn all_absent(&self) -> bool {
        self.0.iter().all(|m| m.value.is_none())
    }
}
