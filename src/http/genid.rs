use actix_web::http::header::CONTENT_TYPE;
use actix_web::{web, HttpRequest, HttpResponse};

use crate::ids::fresh_uuid;
use crate::metrics::Metrics;

const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Mount `/genid` (POST and GET) plus `/metrics` and `/health`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/genid", web::post().to(generate))
        .route("/genid", web::get().to(generate))
        .configure(crate::metrics::configure);
}

/// Body is ignored. The response carries the request's content type back.
async fn generate(req: HttpRequest, metrics: web::Data<Metrics>) -> HttpResponse {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let id = fresh_uuid();
    metrics.record_id("uuid");
    tracing::debug!(id = %id, "Generated id");

    HttpResponse::Ok().content_type(content_type).body(id)
}
