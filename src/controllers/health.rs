use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::services::gateway::GatewayStats;
use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    services: usize,
    widgets: usize,
    cache_entries: usize,
    gateway: GatewayStats,
}

// Health check endpoint
pub async fn health_check(data: web::Data<AppState>) -> impl Responder {
    let dashboard = data.dashboard().await;

    HttpResponse::Ok().json(HealthResponse {
        status: "OK",
        version: env!("CARGO_PKG_VERSION"),
        services: dashboard.service_count(),
        widgets: dashboard.widgets().len(),
        cache_entries: data.cache.len().await,
        gateway: data.gateway.stats(),
    })
}
