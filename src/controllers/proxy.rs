use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::errors::ErrorKind;
use crate::services::gateway::UpstreamResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    url: String,
}

// Unauthenticated passthrough, used for remote service icons
pub async fn passthrough(
    data: web::Data<AppState>,
    query: web::Query<ProxyQuery>,
) -> Result<HttpResponse, ErrorKind> {
    let response = data.gateway.passthrough(&query.url).await?;
    Ok(upstream_response(response))
}

// Authenticated proxy for a service's widget: `endpoint` names the path below
// the widget's base URL, every other parameter is forwarded.
pub async fn widget_proxy(
    data: web::Data<AppState>,
    service_name: web::Path<String>,
    query: web::Query<BTreeMap<String, String>>,
) -> Result<HttpResponse, ErrorKind> {
    let name = service_name.into_inner();
    let mut query = query.into_inner();
    let endpoint = query
        .remove("endpoint")
        .ok_or_else(|| ErrorKind::config("missing 'endpoint' parameter"))?;

    info!("Proxy request for {} endpoint {}", name, endpoint);
    let descriptor = data.dashboard().await.proxy_request(&name, &endpoint, &query)?;
    let response = data.gateway.handle(&descriptor).await?;

    Ok(upstream_response(response))
}

fn upstream_response(response: UpstreamResponse) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    let mut builder = HttpResponse::build(status);
    if let Some(content_type) = response.content_type {
        builder.content_type(content_type);
    }
    builder.body(response.body)
}
