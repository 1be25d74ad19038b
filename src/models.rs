pub mod cache;
pub mod render;
pub mod service;
pub mod widget;

pub use cache::{CacheEntry, CacheStatus};
pub use render::{RenderState, WidgetView};
pub use service::{Credentials, ServiceConfig, ServiceView, WidgetConfig};
pub use widget::{Metric, Metrics, RequestDescriptor};
