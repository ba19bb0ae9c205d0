use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use botdesk_backend::{controllers, AppState, BotDesk, Config, Database};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::new(&config.database_url, config.db_pool_size)
        .map_err(|e| std::io::Error::other(format!("Failed to initialize database: {}", e)))?;
    let desk = Arc::new(BotDesk::new(Arc::new(db)));

    // Background recompute; stopped at shutdown and resumed by the next start
    let recompute_cancel = CancellationToken::new();
    if config.recompute_on_start {
        let desk = Arc::clone(&desk);
        let cancel = recompute_cancel.clone();
        tokio::task::spawn_blocking(move || match desk.recompute_analytics(&cancel) {
            Ok(report) => log::info!("[RECOMPUTE] Startup recompute finished: {:?}", report),
            Err(e) => log::error!("[RECOMPUTE] Startup recompute failed: {}", e),
        });
    }

    if config.gateway_token.is_none() {
        log::warn!("No gateway token configured - /api/gateway/events accepts unauthenticated events");
    }

    log::info!("Starting BotDesk server on port {}", port);

    let server_desk = Arc::clone(&desk);
    let server_config = config.clone();
    let result = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                desk: Arc::clone(&server_desk),
                config: server_config.clone(),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::configure_all)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await;

    recompute_cancel.cancel();
    result
}
