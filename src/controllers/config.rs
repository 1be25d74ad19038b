use actix_web::{web, HttpResponse, Responder};
use serde_json::json;
use tracing::{error, info};

use crate::models::service::load_services;
use crate::state::AppState;

// Re-read the services file and remount every widget
pub async fn reload_config(data: web::Data<AppState>) -> impl Responder {
    let path = &data.config.services_path;
    info!("Request to reload services from {}", path);

    let services = match load_services(path) {
        Ok(services) => services,
        Err(e) => {
            error!("Reload failed, keeping current configuration: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "error": { "kind": "config_error", "message": e.to_string() }
            }));
        }
    };

    let dashboard = data.reload(services).await;
    HttpResponse::Ok().json(json!({
        "services": dashboard.service_count(),
        "widgets": dashboard.widgets().len(),
    }))
}
