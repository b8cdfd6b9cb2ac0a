use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use kameo::actor::ActorRef;
use serde::Serialize;

use crate::actors::{AddToDlq, DeadLetterActor};
use crate::messaging::{Delivery, Disposition, EventHandler};

/// Push delivery target. A push-style broker POSTs each payload here and
/// applies its own redelivery according to the answer.
#[derive(Clone)]
pub struct PushEndpoint {
    pub bus: String,
    pub topic: String,
    pub handler: Arc<dyn EventHandler>,
    pub dead_letters: Option<ActorRef<DeadLetterActor>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PushStatus {
    Success,
    Retry,
    Drop,
}

#[derive(Serialize)]
struct PushReply {
    status: PushStatus,
}

/// Mount `POST {route}` plus `/metrics` and `/health`.
/// Expects `web::Data<PushEndpoint>` in the app data.
pub fn configure(route: String) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.route(&route, web::post().to(push))
            .configure(crate::metrics::configure);
    }
}

async fn push(endpoint: web::Data<PushEndpoint>, body: web::Bytes) -> HttpResponse {
    let delivery = Delivery::new(endpoint.bus.clone(), endpoint.topic.clone(), body.to_vec());

    let status = match endpoint.handler.handle(delivery).await {
        Disposition::Ack => PushStatus::Success,
        Disposition::Retry(_) => PushStatus::Retry,
        Disposition::Reject(e) => {
            if let Some(dlq) = &endpoint.dead_letters {
                let letter = AddToDlq {
                    bus: endpoint.bus.clone(),
                    topic: endpoint.topic.clone(),
                    payload: body.to_vec(),
                    error_message: e.to_string(),
                    failure_count: 1,
                    first_failed_at: Utc::now(),
                };
                if dlq.tell(letter).await.is_err() {
                    tracing::error!(
                        topic = %endpoint.topic,
                        "Dead letter actor unavailable, payload dropped"
                    );
                }
            }
            PushStatus::Drop
        }
    };

    HttpResponse::Ok().json(PushReply { status })
}
