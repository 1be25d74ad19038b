use actix_web::{test, web, App};
use serde_json::{json, Value};
use std::io::Write;
use std::time::Duration;
use wiremock::matchers::{basic_auth, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dashboard_widgets::controllers;
use dashboard_widgets::models::service::{ServiceConfig, WidgetConfig};
use dashboard_widgets::{AppState, Config};

const STATS: &str = r#"{
    "num_dns_queries": 100,
    "num_blocked_filtering": 10,
    "num_replaced_safebrowsing": 2,
    "num_replaced_safesearch": 1,
    "num_replaced_parental": 0,
    "avg_processing_time": 0.01
}"#;

async fn adguard_upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(path("/control/stats"))
        .and(basic_auth("admin", "hunter2"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(STATS, "application/json"))
        .mount(&server)
        .await;
    server
}

fn services(upstream: &MockServer) -> Vec<ServiceConfig> {
    vec![
        ServiceConfig {
            name: "AdGuard".to_string(),
            group: Some("Network".to_string()),
            href: Some("http://adguard.lan".to_string()),
            icon: Some("adguard-home.png".to_string()),
            description: Some("DNS filtering".to_string()),
            widget: Some(
                WidgetConfig::new("adguard", upstream.uri()).with_login("admin", "hunter2"),
            ),
        },
        ServiceConfig {
            name: "Containers".to_string(),
            group: Some("Infra".to_string()),
            href: None,
            icon: None,
            description: None,
            widget: Some(WidgetConfig::new("portainer", upstream.uri()).with_key("ptr-key")),
        },
    ]
}

async fn state(upstream: &MockServer, config: Config) -> web::Data<AppState> {
    web::Data::new(
        AppState::initialize(config, services(upstream))
            .await
            .unwrap(),
    )
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .configure(controllers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_health() {
    let upstream = adguard_upstream().await;
    let state = state(&upstream, Config::default()).await;
    let app = app!(state);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "OK");
    assert_eq!(body["services"], 2);
    assert_eq!(body["widgets"], 2);
    assert_eq!(body["gateway"]["max_outbound_requests"], 16);
}

#[actix_web::test]
async fn test_services_listing_has_no_secrets() {
    let upstream = adguard_upstream().await;
    let state = state(&upstream, Config::default()).await;
    let app = app!(state);

    let req = test::TestRequest::get().uri("/api/services").to_request();
    let body = test::call_and_read_body(&app, req).await;
    let text = String::from_utf8(body.to_vec()).unwrap();

    for secret in ["hunter2", "admin", "ptr-key"] {
        assert!(!text.contains(secret), "listing leaked {}", secret);
    }

    let services: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(services[0]["name"], "AdGuard");
    assert_eq!(services[0]["widget"], "adguard");
    assert_eq!(
        services[0]["icon"],
        "https://cdn.jsdelivr.net/gh/walkxcode/dashboard-icons/png/adguard-home.png"
    );
}

#[actix_web::test]
async fn test_widget_becomes_ready() {
    let upstream = adguard_upstream().await;
    let state = state(&upstream, Config::default()).await;
    let app = app!(state);

    let mut body = Value::Null;
    for _ in 0..100 {
        let req = test::TestRequest::get().uri("/api/widgets/AdGuard").to_request();
        body = test::call_and_read_body_json(&app, req).await;
        if body["state"] == "ready" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(body["state"], "ready");
    assert_eq!(body["kind"], "adguard");
    assert_eq!(
        body["metrics"],
        json!([
            { "label": "queries", "value": "100" },
            { "label": "blocked", "value": "10" },
            { "label": "filtered", "value": "3" },
            { "label": "latency", "value": "10 ms" }
        ])
    );
}

#[actix_web::test]
async fn test_misconfigured_widget_renders_error() {
    let upstream = adguard_upstream().await;
    let state = state(&upstream, Config::default()).await;
    let app = app!(state);

    let req = test::TestRequest::get().uri("/api/widgets").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    let containers = body
        .as_array()
        .unwrap()
        .iter()
        .find(|w| w["service"] == "Containers")
        .unwrap();
    assert_eq!(containers["state"], "error");
    assert_eq!(containers["message"], "widget.api_error");
    assert!(containers.get("metrics").is_none());
}

#[actix_web::test]
async fn test_events_stream_for_misconfigured_widget() {
    let upstream = adguard_upstream().await;
    let state = state(&upstream, Config::default()).await;
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/widgets/Containers/events")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let body = test::read_body(resp).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("data: {"));
    assert!(text.ends_with("\n\n"));
    assert!(text.contains("\"state\":\"error\""));
}

#[actix_web::test]
async fn test_widget_proxy_injects_credentials() {
    let upstream = adguard_upstream().await;
    let state = state(&upstream, Config::default()).await;
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/widgets/AdGuard/proxy?endpoint=control%2Fstats")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["num_dns_queries"], 100);
}

#[actix_web::test]
async fn test_error_statuses() {
    let upstream = adguard_upstream().await;
    let state = state(&upstream, Config::default()).await;
    let app = app!(state);

    let cases = [
        ("/api/proxy?url=http%3A%2F%2F169.254.169.254%2F", 403, "target_not_allowed"),
        ("/api/widgets/Nope", 404, "unknown_service"),
        ("/api/widgets/Nope/proxy?endpoint=x", 404, "unknown_service"),
        ("/api/widgets/AdGuard/proxy", 400, "config_error"),
        ("/api/widgets/Containers/proxy?endpoint=x", 400, "config_error"),
        ("/api/widgets/AdGuard/proxy?endpoint=missing", 502, "upstream_error"),
    ];

    for (uri, status, kind) in cases {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), status, "{}", uri);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["kind"], kind, "{}", uri);
    }
}

#[actix_web::test]
async fn test_reload_from_services_file() {
    let upstream = adguard_upstream().await;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
- Media:
    - Social:
        href: https://social.example
        widget:
          type: mastodon
          url: {}
"#,
        upstream.uri()
    )
    .unwrap();

    let config = Config {
        services_path: file.path().display().to_string(),
        ..Config::default()
    };
    let state = state(&upstream, config).await;
    let app = app!(state);

    let req = test::TestRequest::post().uri("/api/config/reload").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({ "services": 1, "widgets": 1 }));

    let req = test::TestRequest::get().uri("/api/widgets/AdGuard").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::get().uri("/api/widgets/Social").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn test_failed_reload_keeps_configuration() {
    let upstream = adguard_upstream().await;
    let config = Config {
        services_path: "/nonexistent/services.yaml".to_string(),
        ..Config::default()
    };
    let state = state(&upstream, config).await;
    let app = app!(state);

    let req = test::TestRequest::post().uri("/api/config/reload").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);

    let req = test::TestRequest::get().uri("/api/widgets/AdGuard").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}
