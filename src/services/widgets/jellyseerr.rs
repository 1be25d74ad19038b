use serde_json::Value;
use std::collections::BTreeMap;

use super::{AuthScheme, Endpoint, Widget, format_number, number};
use crate::errors::Result;
use crate::models::service::WidgetConfig;
use crate::models::widget::Metrics;

/// Jellyseerr / Overseerr request counters.
pub struct Jellyseerr;

impl Widget for Jellyseerr {
    fn kind(&self) -> &'static str {
        "jellyseerr"
    }

    fn labels(&self) -> &'static [&'static str] {
        &["pending", "approved", "available"]
    }

    fn auth(&self) -> AuthScheme {
        AuthScheme::Header("X-Api-Key")
    }

    fn build_request(&self, _config: &WidgetConfig) -> Result<Endpoint> {
        Ok(Endpoint::new("api/v1/request/count"))
    }

    fn normalize(&self, body: &Value, _options: &BTreeMap<String, String>) -> Metrics {
        let mut metrics = Metrics::new();
        for label in self.labels() {
            let pointer = format!("/{}", label);
            metrics.push(label, number(body, &pointer).map(format_number));
        }
        metrics
    }
}
