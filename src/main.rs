use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info, warn};
use std::time::Duration;

use subtitle_studio::config::{AuthConfig, HandlerConfig, QueueConfig, ServerConfig};
use subtitle_studio::config_loader::load_config;
use subtitle_studio::config_validator::ConfigValidator;
use subtitle_studio::handlers::{
    api_status, queue_status, transcribe, transcription_options, Authentication,
};
use subtitle_studio::queue_manager::QueueManager;
use subtitle_studio::transcriber::{Transcriber, TranscriberConfig};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Config file values only fill variables the environment leaves unset
    if load_config() {
        info!("Configuration file loaded");
    }

    let validation = ConfigValidator::validate();
    validation.print_summary();
    if !validation.is_valid() {
        error!("Invalid configuration, refusing to start");
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "invalid configuration",
        ));
    }

    // Load configurations
    let server_config = ServerConfig::default();
    let handler_config = HandlerConfig::default();
    let queue_config = QueueConfig::default();
    let auth_config = AuthConfig::default();
    let transcriber_config = TranscriberConfig::default();

    // Create tmp directory if it doesn't exist
    if let Err(e) = handler_config.ensure_temp_dir() {
        warn!(
            "Failed to create temp directory {}: {}",
            handler_config.temp_dir, e
        );
    }

    info!(
        "Starting subtitle service on http://{}",
        server_config.bind_address()
    );
    info!("Using temp directory: {}", handler_config.temp_dir);
    info!(
        "Transcription command: {} {}",
        transcriber_config.command_path,
        transcriber_config.script_path.as_deref().unwrap_or_default()
    );
    info!(
        "Device: {}, threads: {}",
        transcriber_config.device, transcriber_config.threads
    );
    match queue_config.max_waiting() {
        Some(limit) => info!("Waiting list limited to {} jobs", limit),
        None => info!("Waiting list is unbounded"),
    }

    let queue_manager = web::Data::new(QueueManager::new(queue_config.max_waiting()));
    let transcriber = web::Data::new(Transcriber::new(transcriber_config));
    let handler_data = web::Data::new(handler_config);
    let auth_data = web::Data::new(auth_config.clone());
    let server_data = web::Data::new(server_config.clone());

    let timeout = Duration::from_secs(server_config.timeout);
    let keep_alive = Duration::from_secs(server_config.keepalive);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Authentication::new(auth_config.clone()))
            .app_data(queue_manager.clone())
            .app_data(transcriber.clone())
            .app_data(handler_data.clone())
            .app_data(auth_data.clone())
            .app_data(server_data.clone())
            .service(transcribe)
            .service(transcription_options)
            .service(queue_status)
            .service(api_status)
    })
    .workers(server_config.effective_workers())
    .bind(server_config.bind_address())?
    .client_disconnect_timeout(timeout)
    .keep_alive(keep_alive)
    .run()
    .await
}
