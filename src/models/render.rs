use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::cache::{CacheEntry, CacheStatus};
use crate::models::widget::Metrics;
use crate::services::widgets::Widget;

/// Indicator shown for every failure, whatever its kind.
pub const API_ERROR: &str = "widget.api_error";

/// What a mounted widget displays. Derived from a cache entry on every
/// update; holds no state of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RenderState {
    Loading { metrics: Metrics },
    Error { message: &'static str },
    Ready { metrics: Metrics },
}

impl RenderState {
    pub fn error() -> Self {
        RenderState::Error { message: API_ERROR }
    }

    pub fn project(
        entry: &CacheEntry,
        widget: &dyn Widget,
        options: &BTreeMap<String, String>,
    ) -> Self {
        match (entry.status, entry.value.as_ref()) {
            (CacheStatus::Pending, _) => RenderState::Loading {
                metrics: Metrics::placeholders(widget.labels()),
            },
            (CacheStatus::Ready, Some(body)) => {
                if widget.reported_error(body).is_some() {
                    return RenderState::error();
                }
                RenderState::Ready {
                    metrics: widget.normalize(body, options),
                }
            }
            _ => RenderState::error(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, RenderState::Loading { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RenderState::Error { .. })
    }
}

/// Render state of one service's widget.
#[derive(Debug, Clone, Serialize)]
pub struct WidgetView {
    pub service: String,
    pub kind: String,
    #[serde(flatten)]
    pub state: RenderState,
}
