//! HTTP server assembly.

pub mod routes;
pub mod state;

pub use state::AppState;

use crate::config::GatewayConfig;
use crate::utils::error::Result;
use actix_web::{App, HttpServer, web};
use tracing::info;
use tracing_actix_web::TracingLogger;

/// Build state from the configuration and serve until shutdown.
pub async fn run(config: GatewayConfig) -> Result<()> {
    let bind = (config.server.host.clone(), config.server.port);
    let workers = config.server.workers;

    let state = web::Data::new(AppState::build(config)?);
    info!(host = %bind.0, port = bind.1, "starting gateway server");

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(TracingLogger::default())
            .configure(routes::configure)
    })
    .bind(bind)?;

    if let Some(workers) = workers {
        server = server.workers(workers);
    }
    server.run().await?;
    Ok(())
}
