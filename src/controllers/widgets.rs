use actix_web::web::Bytes;
use actix_web::{web, HttpResponse, Responder};
use futures::StreamExt;
use tracing::{debug, info};

use crate::errors::ErrorKind;
use crate::state::AppState;

// Render state of every mounted widget
pub async fn list_widgets(data: web::Data<AppState>) -> impl Responder {
    let views = data.dashboard().await.render_all();
    debug!("Returning render state of {} widgets", views.len());

    HttpResponse::Ok().json(views)
}

// Render state of one service's widget
pub async fn get_widget(
    data: web::Data<AppState>,
    service_name: web::Path<String>,
) -> Result<HttpResponse, ErrorKind> {
    let name = service_name.into_inner();
    let view = data.dashboard().await.render(&name)?;

    Ok(HttpResponse::Ok().json(view))
}

// Server-sent events: one `data:` frame per render state change. The
// connection keeps the widget subscribed until the client goes away.
pub async fn widget_events(
    data: web::Data<AppState>,
    service_name: web::Path<String>,
) -> Result<HttpResponse, ErrorKind> {
    let name = service_name.into_inner();
    let views = data.dashboard().await.watch(&name, &data.cache).await?;
    info!("Client subscribed to widget events for {}", name);

    let events = views.map(|view| {
        serde_json::to_string(&view).map(|json| Bytes::from(format!("data: {}\n\n", json)))
    });

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(events))
}
