use std::sync::Arc;

use actix_web::{web, App, HttpServer};

use order_choreography::config::Config;
use order_choreography::http::genid;
use order_choreography::metrics::{Metrics, ServiceInfo};
use order_choreography::telemetry;

const DEFAULT_PORT: u16 = 5050;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config = Config::from_env(DEFAULT_PORT)?;
    let metrics = web::Data::from(Arc::new(Metrics::new()?));
    let info = web::Data::new(ServiceInfo { name: "genidsvc", bus: None });

    tracing::info!("🚀 ID generator listening on http://0.0.0.0:{}/genid", config.app_port);

    HttpServer::new(move || {
        App::new()
            .app_data(metrics.clone())
            .app_data(info.clone())
            .configure(genid::configure)
    })
    .bind(("0.0.0.0", config.app_port))?
    .run()
    .await?;

    Ok(())
}
