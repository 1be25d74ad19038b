use serde_json::Value;
use std::collections::BTreeMap;

use super::{AuthScheme, Endpoint, Widget, format_number, number, text};
use crate::errors::{ErrorKind, Result};
use crate::models::service::WidgetConfig;
use crate::models::widget::Metrics;

/// Current conditions from OpenWeatherMap.
///
/// Options: `latitude` and `longitude` (required), `units` (`metric` for
/// Celsius, anything else for Fahrenheit; default `metric`), `lang`, and an
/// optional `label` prefixed to the temperature.
pub struct OpenWeatherMap;

impl Widget for OpenWeatherMap {
    fn kind(&self) -> &'static str {
        "openweathermap"
    }

    fn labels(&self) -> &'static [&'static str] {
        &["temperature", "condition", "time_of_day"]
    }

    fn auth(&self) -> AuthScheme {
        AuthScheme::Query("appid")
    }

    fn default_base_url(&self) -> Option<&'static str> {
        Some("https://api.openweathermap.org")
    }

    fn build_request(&self, config: &WidgetConfig) -> Result<Endpoint> {
        let latitude = config
            .option("latitude")
            .ok_or_else(|| ErrorKind::config("openweathermap widget requires 'latitude'"))?;
        let longitude = config
            .option("longitude")
            .ok_or_else(|| ErrorKind::config("openweathermap widget requires 'longitude'"))?;

        Ok(Endpoint::new("data/2.5/weather")
            .param("lat", latitude)
            .param("lon", longitude)
            .param("units", config.option("units").unwrap_or("metric"))
            .param("lang", config.option("lang").unwrap_or("en")))
    }

    fn normalize(&self, body: &Value, options: &BTreeMap<String, String>) -> Metrics {
        let unit = match options.get("units").map(String::as_str) {
            Some("metric") | None => "°C",
            Some(_) => "°F",
        };

        let temperature = number(body, "/main/temp").map(|t| {
            let reading = format!("{} {}", format_number(t), unit);
            match options.get("label") {
                Some(label) => format!("{}, {}", label, reading),
                None => reading,
            }
        });

        let time_of_day = match (
            number(body, "/dt"),
            number(body, "/sys/sunrise"),
            number(body, "/sys/sunset"),
        ) {
            (Some(now), Some(sunrise), Some(sunset)) => {
                Some(if now > sunrise && now < sunset { "day" } else { "night" }.to_string())
            }
            _ => None,
        };

        Metrics::new()
            .with("temperature", temperature)
            .with("condition", text(body, "/weather/0/description"))
            .with("time_of_day", time_of_day)
    }

    fn reported_error(&self, body: &Value) -> Option<ErrorKind> {
        // `cod` is a number on success and usually a string on failure.
        if let Some(code) = number(body, "/cod").filter(|&code| code != 200.0) {
            let code = u16::try_from(code as i64).unwrap_or(502);
            return Some(ErrorKind::UpstreamError { code });
        }
        if body.get("error").is_some() {
            return Some(ErrorKind::UpstreamError { code: 502 });
        }
        None
    }
}
