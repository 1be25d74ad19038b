use serde_json::Value;
use std::collections::BTreeMap;

use super::{AuthScheme, Endpoint, Widget, count};
use crate::errors::{ErrorKind, Result};
use crate::models::service::WidgetConfig;
use crate::models::widget::Metrics;

/// Container counts for one Portainer environment.
pub struct Portainer;

impl Widget for Portainer {
    fn kind(&self) -> &'static str {
        "portainer"
    }

    fn labels(&self) -> &'static [&'static str] {
        &["running", "stopped", "total"]
    }

    fn auth(&self) -> AuthScheme {
        AuthScheme::Header("X-API-Key")
    }

    fn build_request(&self, config: &WidgetConfig) -> Result<Endpoint> {
        let env = config
            .option("env")
            .ok_or_else(|| ErrorKind::config("portainer widget requires an 'env' option"))?;

        Ok(Endpoint::new(format!(
            "api/endpoints/{}/docker/containers/json?all=1",
            env
        )))
    }

    fn normalize(&self, body: &Value, _options: &BTreeMap<String, String>) -> Metrics {
        let Some(containers) = body.as_array() else {
            return Metrics::placeholders(self.labels());
        };

        let in_state = |state: &str| {
            containers
                .iter()
                .filter(|c| c.get("State").and_then(Value::as_str) == Some(state))
                .count()
        };

        Metrics::new()
            .with("running", count(in_state("running")))
            .with("stopped", count(in_state("exited")))
            .with("total", count(containers.len()))
    }

    fn reported_error(&self, body: &Value) -> Option<ErrorKind> {
        let object = body.as_object()?;
        if object.contains_key("error") || object.contains_key("message") {
            let code = object
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(502);
            return Some(ErrorKind::UpstreamError { code });
        }
        None
    }
}
