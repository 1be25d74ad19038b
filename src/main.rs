//! Dashboard Widget Gateway Binary

use actix_web::{web, App, HttpServer};
use clap::Parser;
use dashboard_widgets::controllers;
use dashboard_widgets::models::service::load_services;
use dashboard_widgets::{AppState, Config};
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(version, about = "Service dashboard widget gateway")]
struct Cli {
    /// Services file (overrides SERVICES_CONFIG)
    #[arg(short, long)]
    config: Option<String>,

    /// Address to bind (overrides BIND_ADDRESS)
    #[arg(short, long)]
    bind: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    initialize_tracing();

    info!("Starting dashboard widget gateway v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(path) = cli.config {
        config.services_path = path;
    }
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    let services = match load_services(&config.services_path) {
        Ok(services) => services,
        Err(e) => {
            error!("Failed to load services from {}: {}", config.services_path, e);
            std::process::exit(1);
        }
    };

    let bind = (config.bind_address.clone(), config.port);
    let state = match AppState::initialize(config, services).await {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            error!("Failed to initialize gateway: {}", e);
            std::process::exit(1);
        }
    };

    info!("Server is live at http://{}:{}", bind.0, bind.1);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(controllers::configure)
    })
    .bind(bind)?
    .run()
    .await
}

/// Initialize structured logging
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
