use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use prometheus::{Encoder, TextEncoder};

use super::Metrics;
use crate::messaging::EventBus;

/// Identity reported by `/health`
#[derive(Clone)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub bus: Option<Arc<dyn EventBus>>,
}

/// Mount `/metrics` and `/health`. Expects `web::Data<Metrics>` and
/// `web::Data<ServiceInfo>` in the app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(metrics_handler))
        .route("/health", web::get().to(health_handler));
}

pub async fn metrics_handler(metrics: web::Data<Metrics>) -> impl Responder {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metrics.registry().gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().body("unable to encode metrics");
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

pub async fn health_handler(info: web::Data<ServiceInfo>) -> impl Responder {
    let circuit = match &info.bus {
        Some(bus) => bus.circuit_state().await.map(|state| state.as_str()),
        None => None,
    };

    let status = match circuit {
        Some("open") => "degraded",
        _ => "healthy",
    };

    HttpResponse::Ok().json(serde_json::json!({
        "status": status,
        "service": info.name,
        "event_bus_circuit": circuit,
    }))
}
