mod batch;
mod config;
mod error;
mod inference;
mod routes;
mod upload;
mod views;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use config::AppConfig;
use inference::classifier;
use inference::service::InferenceService;
use routes::configure_routes;
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                e.to_string(),
            ));
        }
    };

    let classifier = match classifier::load(&config.model) {
        Ok(classifier) => classifier,
        Err(e) => {
            log::error!("Failed to preload model at startup: {}", e);
            return Err(std::io::Error::other(format!("Model loading failed: {}", e)));
        }
    };

    let service = web::Data::new(InferenceService::new(classifier));
    log::info!("Model ready: {}", service.model_name());
    let bind_address = config.bind_address();
    let workers = config.server.workers;
    let static_dir = config.server.static_dir.clone();
    let config = web::Data::new(config);

    log::info!("Starting server on {}", bind_address);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(service.clone())
            .app_data(config.clone())
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    });

    let server = match workers {
        Some(n) => server.workers(n),
        None => server,
    };

    server.bind(&bind_address)?.run().await
}
