use serde_json::Value;
use std::collections::BTreeMap;

use super::{AuthScheme, Endpoint, Widget, format_number, number};
use crate::errors::Result;
use crate::models::service::WidgetConfig;
use crate::models::widget::Metrics;

/// AdGuard Home query statistics.
pub struct AdGuard;

impl Widget for AdGuard {
    fn kind(&self) -> &'static str {
        "adguard"
    }

    fn labels(&self) -> &'static [&'static str] {
        &["queries", "blocked", "filtered", "latency"]
    }

    fn auth(&self) -> AuthScheme {
        AuthScheme::Basic
    }

    fn build_request(&self, _config: &WidgetConfig) -> Result<Endpoint> {
        Ok(Endpoint::new("control/stats"))
    }

    fn normalize(&self, body: &Value, _options: &BTreeMap<String, String>) -> Metrics {
        // Filtered is only meaningful when all three counters are reported.
        let filtered = match (
            number(body, "/num_replaced_safebrowsing"),
            number(body, "/num_replaced_safesearch"),
            number(body, "/num_replaced_parental"),
        ) {
            (Some(a), Some(b), Some(c)) => Some(a + b + c),
            _ => None,
        };

        Metrics::new()
            .with("queries", number(body, "/num_dns_queries").map(format_number))
            .with("blocked", number(body, "/num_blocked_filtering").map(format_number))
            .with("filtered", filtered.map(format_number))
            .with(
                "latency",
                number(body, "/avg_processing_time")
                    .map(|seconds| format!("{} ms", format_number(seconds * 1000.0))),
            )
    }
}
