use actix_web::{web, HttpResponse, Responder};
use tracing::info;

use crate::state::AppState;

// List all configured services
pub async fn list_services(data: web::Data<AppState>) -> impl Responder {
    info!("Request to list all services");
    let services = data.dashboard().await.services();
    info!("Returning list of {} services", services.len());

    HttpResponse::Ok().json(services)
}
