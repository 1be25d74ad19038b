use serde_json::Value;
use std::collections::BTreeMap;

use super::{Endpoint, Widget, format_number, number};
use crate::errors::Result;
use crate::models::service::WidgetConfig;
use crate::models::widget::Metrics;

/// Public instance statistics. The endpoint is unauthenticated and serves
/// CORS headers, so it is fetched directly.
pub struct Mastodon;

impl Widget for Mastodon {
    fn kind(&self) -> &'static str {
        "mastodon"
    }

    fn labels(&self) -> &'static [&'static str] {
        &["user_count", "status_count", "domain_count"]
    }

    fn requires_proxy(&self) -> bool {
        false
    }

    fn build_request(&self, _config: &WidgetConfig) -> Result<Endpoint> {
        Ok(Endpoint::new("api/v1/instance"))
    }

    fn normalize(&self, body: &Value, _options: &BTreeMap<String, String>) -> Metrics {
        let mut metrics = Metrics::new();
        for label in self.labels() {
            let pointer = format!("/stats/{}", label);
            metrics.push(label, number(body, &pointer).map(format_number));
        }
        metrics
    }
}
