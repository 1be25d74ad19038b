//! Dashboard Widget Gateway Library
//!
//! Backend for a self-hosted service dashboard: mounts one widget per
//! configured service, polls each widget's third-party API through a
//! credential-injecting proxy, and serves the resulting render states over
//! HTTP.

pub mod config;
pub mod controllers;
pub mod errors;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use errors::{DashboardError, ErrorKind, Result};
pub use models::{RenderState, ServiceConfig, WidgetView};
pub use services::{Dashboard, PollingCache, ProxyGateway, WidgetRegistry};
pub use state::AppState;
