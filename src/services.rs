pub mod dashboard;
pub mod gateway;
pub mod polling;
pub mod request_builder;
pub mod widgets;

pub use dashboard::Dashboard;
pub use gateway::{GatewayPolicy, ProxyGateway};
pub use polling::{Fetcher, PollingCache, Subscription};
pub use widgets::{Widget, WidgetRegistry};
