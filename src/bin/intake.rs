use actix_web::{web, App, HttpServer};

use order_choreography::app::Backends;
use order_choreography::config::{Backend, Config};
use order_choreography::http::intake;
use order_choreography::telemetry;

const DEFAULT_PORT: u16 = 8080;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config = Config::from_env(DEFAULT_PORT)?;
    let port = config.app_port;
    let backends = Backends::connect(config).await?;

    // Single-node mode: nothing else consumes the in-process bus
    let processor = match backends.config.backend {
        Backend::Memory => {
            tracing::info!("In-memory backend, running the order processor in process");
            Some(backends.subscribe_processor().await?)
        }
        Backend::External => None,
    };

    let service = web::Data::new(backends.intake()?);
    let metrics = web::Data::from(backends.metrics.clone());
    let info = web::Data::new(backends.service_info("orderintakesvc"));

    tracing::info!("🚀 Order intake listening on http://0.0.0.0:{}/orders/new", port);

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(metrics.clone())
            .app_data(info.clone())
            .configure(intake::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    if let Some(handle) = processor {
        handle.shutdown();
    }
    tracing::info!("Order intake stopped");
    Ok(())
}
