pub mod config;
pub mod health;
pub mod proxy;
pub mod services;
pub mod widgets;

use actix_web::web;

/// Register every route on an actix `App`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api")
                .route("/services", web::get().to(services::list_services))
                .route("/widgets", web::get().to(widgets::list_widgets))
                .route("/widgets/{service}", web::get().to(widgets::get_widget))
                .route("/widgets/{service}/events", web::get().to(widgets::widget_events))
                .route("/widgets/{service}/proxy", web::get().to(proxy::widget_proxy))
                .route("/proxy", web::get().to(proxy::passthrough))
                .route("/config/reload", web::post().to(config::reload_config)),
        );
}
