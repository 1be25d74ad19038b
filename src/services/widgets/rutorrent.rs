use serde_json::Value;
use std::collections::BTreeMap;

use super::{AuthScheme, Endpoint, Widget, count};
use crate::errors::Result;
use crate::models::service::WidgetConfig;
use crate::models::widget::Metrics;

const RATE_UNITS: [&str; 5] = ["B/s", "kB/s", "MB/s", "GB/s", "TB/s"];

/// ruTorrent through its httprpc plugin. The plugin answers without CORS
/// headers, so calls always go through the gateway.
pub struct Rutorrent;

impl Widget for Rutorrent {
    fn kind(&self) -> &'static str {
        "rutorrent"
    }

    fn labels(&self) -> &'static [&'static str] {
        &["active", "upload", "download"]
    }

    fn auth(&self) -> AuthScheme {
        AuthScheme::Basic
    }

    fn build_request(&self, _config: &WidgetConfig) -> Result<Endpoint> {
        Ok(Endpoint::new("plugins/httprpc/action.php").param("mode", "list"))
    }

    fn normalize(&self, body: &Value, _options: &BTreeMap<String, String>) -> Metrics {
        let Some(torrents) = body.as_array() else {
            return Metrics::placeholders(self.labels());
        };

        let active = torrents
            .iter()
            .filter(|t| integer(t, "d.get_state") == Some(1))
            .count();

        Metrics::new()
            .with("active", count(active))
            .with("upload", total_rate(torrents, "d.get_up_rate").map(format_rate))
            .with("download", total_rate(torrents, "d.get_down_rate").map(format_rate))
    }
}

/// Integer field that ruTorrent may encode either as a number or a string.
fn integer(torrent: &Value, field: &str) -> Option<i64> {
    let value = torrent.get(field)?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Sum of a rate field; unknown if any torrent lacks it or the total
/// does not fit.
fn total_rate(torrents: &[Value], field: &str) -> Option<i64> {
    torrents
        .iter()
        .try_fold(0i64, |total, t| total.checked_add(integer(t, field)?))
}

/// Bytes per second in decimal units.
fn format_rate(bytes_per_second: i64) -> String {
    let mut value = bytes_per_second as f64;
    let mut unit = 0;
    while value.abs() >= 1000.0 && unit < RATE_UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes_per_second, RATE_UNITS[0])
    } else {
        format!("{:.1} {}", value, RATE_UNITS[unit])
    }
}
