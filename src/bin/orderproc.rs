use std::sync::Arc;

use actix_web::{web, App, HttpServer};

use order_choreography::app::Backends;
use order_choreography::config::Config;
use order_choreography::http::processor::{self, PushEndpoint};
use order_choreography::telemetry;

const DEFAULT_PORT: u16 = 6060;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config = Config::from_env(DEFAULT_PORT)?;
    config.require_external_backend("orderproc")?;
    let port = config.app_port;
    let route = config.route.clone();
    let backends = Backends::connect(config).await?;

    let subscription = backends.subscribe_processor().await?;

    let endpoint = web::Data::new(PushEndpoint {
        bus: backends.config.pubsub.clone(),
        topic: backends.config.topic.clone(),
        handler: Arc::new(backends.processor()),
        dead_letters: Some(backends.dead_letters.clone()),
    });
    let metrics = web::Data::from(backends.metrics.clone());
    let info = web::Data::new(backends.service_info("orderprocsvc"));

    tracing::info!(
        topic = %backends.config.topic,
        group = %backends.config.consumer_group,
        "🚀 Order processor consuming, push deliveries on http://0.0.0.0:{}{}",
        port,
        route
    );

    HttpServer::new(move || {
        App::new()
            .app_data(endpoint.clone())
            .app_data(metrics.clone())
            .app_data(info.clone())
            .configure(processor::configure(route.clone()))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    subscription.shutdown();
    tracing::info!("Order processor stopped");
    Ok(())
}
