use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::errors::DashboardError;
use crate::services::request_builder::local_url;

const ICON_CDN: &str = "https://cdn.jsdelivr.net/gh/walkxcode/dashboard-icons/png";

/// Secrets attached to a widget. Held by the gateway only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.username.is_none() && self.password.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("key", &redact(&self.key))
            .field("username", &redact(&self.username))
            .field("password", &redact(&self.password))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WidgetConfig {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip)]
    pub credentials: Option<Credentials>,
    pub options: BTreeMap<String, String>,
}

impl WidgetConfig {
    pub fn new(kind: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            url: Some(url.into()),
            credentials: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        let credentials = self.credentials.get_or_insert_with(Credentials::default);
        credentials.key = Some(key.into());
        self
    }

    pub fn with_login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        let credentials = self.credentials.get_or_insert_with(Credentials::default);
        credentials.username = Some(username.into());
        credentials.password = Some(password.into());
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub name: String,
    pub group: Option<String>,
    pub href: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub widget: Option<WidgetConfig>,
}

/// What the dashboard front-end sees of a service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget: Option<String>,
}

impl From<&ServiceConfig> for ServiceView {
    fn from(service: &ServiceConfig) -> Self {
        Self {
            name: service.name.clone(),
            group: service.group.clone(),
            href: service.href.clone().filter(|href| href != "#"),
            icon: service.icon.as_deref().map(resolve_icon),
            description: service.description.clone(),
            widget: service.widget.as_ref().map(|w| w.kind.clone()),
        }
    }
}

/// Map an icon reference to something a browser can load.
pub fn resolve_icon(icon: &str) -> String {
    if icon.starts_with("http") {
        return local_url(&["api", "proxy"], [("url", icon)]);
    }

    if icon.starts_with('/') {
        return icon.to_string();
    }

    if icon.ends_with(".png") {
        return format!("{}/{}", ICON_CDN, icon);
    }

    format!("{}/{}.png", ICON_CDN, icon)
}

// Services file layout: a list of groups, each group a single-key map of
// group name to a list of single-key maps of service name to fields.
type ServicesFile = Vec<BTreeMap<String, Vec<BTreeMap<String, ServiceFields>>>>;

#[derive(Debug, Deserialize)]
struct ServiceFields {
    href: Option<String>,
    icon: Option<String>,
    description: Option<String>,
    widget: Option<RawWidget>,
}

#[derive(Debug, Deserialize)]
struct RawWidget {
    #[serde(rename = "type")]
    kind: String,
    url: Option<String>,
    key: Option<String>,
    username: Option<String>,
    password: Option<String>,
    #[serde(flatten)]
    options: BTreeMap<String, serde_yaml::Value>,
}

impl RawWidget {
    fn into_config(self, service: &str) -> WidgetConfig {
        let credentials = Credentials {
            key: self.key,
            username: self.username,
            password: self.password,
        };

        let mut options = BTreeMap::new();
        for (name, value) in self.options {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                _ => {
                    warn!("Ignoring non-scalar widget option '{}' on service {}", name, service);
                    continue;
                }
            };
            options.insert(name, value);
        }

        WidgetConfig {
            kind: self.kind,
            url: self.url,
            credentials: (!credentials.is_empty()).then_some(credentials),
            options,
        }
    }
}

/// Parse a services file.
pub fn parse_services(source: &str) -> Result<Vec<ServiceConfig>, DashboardError> {
    let groups: ServicesFile = serde_yaml::from_str(source)?;

    let mut services = Vec::new();
    let mut seen = HashSet::new();

    for group in groups {
        for (group_name, entries) in group {
            for entry in entries {
                for (name, fields) in entry {
                    if !seen.insert(name.clone()) {
                        return Err(DashboardError::Config(format!(
                            "duplicate service name: {}",
                            name
                        )));
                    }

                    let widget = fields.widget.map(|w| w.into_config(&name));
                    services.push(ServiceConfig {
                        name,
                        group: Some(group_name.clone()),
                        href: fields.href,
                        icon: fields.icon,
                        description: fields.description,
                        widget,
                    });
                }
            }
        }
    }

    Ok(services)
}

/// Read and parse the services file at `path`.
pub fn load_services(path: impl AsRef<Path>) -> Result<Vec<ServiceConfig>, DashboardError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)?;
    let services = parse_services(&source)?;

    info!(
        "Loaded {} services ({} with widgets) from {}",
        services.len(),
        services.iter().filter(|s| s.widget.is_some()).count(),
        path.display()
    );

    Ok(services)
}
