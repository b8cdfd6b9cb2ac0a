use actix_web::{web, HttpResponse};

use crate::services::IntakeService;

/// Mount the order routes plus `/metrics` and `/health`.
/// Expects `web::Data<IntakeService>` in the app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders/new", web::post().to(create_order))
        .route("/orders/order/{id}", web::get().to(get_order))
        .configure(crate::metrics::configure);
}

async fn create_order(intake: web::Data<IntakeService>, body: web::Bytes) -> HttpResponse {
    match intake.create_order(&body).await {
        Ok(receipt) => HttpResponse::Ok().json(receipt),
        Err(_) => HttpResponse::InternalServerError()
            .content_type("text/plain")
            .body("unable to post order"),
    }
}

/// Stored record verbatim. Not-found and lookup failures both answer 500.
async fn get_order(intake: web::Data<IntakeService>, path: web::Path<String>) -> HttpResponse {
    let order_id = path.into_inner();

    match intake.get_order_raw(&order_id).await {
        Ok(record) => HttpResponse::Ok().content_type("application/json").body(record),
        Err(e) => {
            tracing::warn!(
                order_id = %order_id,
                kind = e.kind().as_str(),
                error = %e,
                "Order lookup failed"
            );
            HttpResponse::InternalServerError()
                .content_type("text/plain")
                .body("unable to get order")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompletionMode, Config};
    use crate::ids::LocalIdGenerator;
    use crate::messaging::{Delivery, DeliveryPolicy, EventHandler, InMemoryEventBus};
    use crate::metrics::{Metrics, ServiceInfo};
    use crate::models::{Order, OrderReceipt};
    use crate::services::{IntakeSettings, OrderProcessor};
    use crate::state::InMemoryStateStore;
    use crate::utils::RetryConfig;
    use actix_web::{http::StatusCode, test, App};
    use std::sync::Arc;

    struct Fixture {
        store: Arc<InMemoryStateStore>,
        bus: Arc<InMemoryEventBus>,
        metrics: Arc<Metrics>,
        intake: Arc<IntakeService>,
    }

    fn fixture(completion: CompletionMode) -> Fixture {
        let metrics = Arc::new(Metrics::new().unwrap());
        let store = Arc::new(InMemoryStateStore::new());
        let bus = Arc::new(InMemoryEventBus::new(DeliveryPolicy::new(
            RetryConfig::redelivery(1),
            metrics.clone(),
        )));
        let config = Config { completion, ..Config::default() };
        let intake = Arc::new(IntakeService::new(
            store.clone(),
            bus.clone(),
            Arc::new(LocalIdGenerator),
            metrics.clone(),
            IntakeSettings::from(&config),
        ));
        Fixture { store, bus, metrics, intake }
    }

    macro_rules! app {
        ($f:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::from($f.intake.clone()))
                    .app_data(web::Data::from($f.metrics.clone()))
                    .app_data(web::Data::new(ServiceInfo { name: "orderintakesvc", bus: None }))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_book_and_pen_before_and_after_processing() {
        let f = fixture(CompletionMode::Event);
        let app = app!(f);

        let req = test::TestRequest::post()
            .uri("/orders/new")
            .set_payload(r#"{"Items":["book","pen"]}"#)
            .to_request();
        let receipt: OrderReceipt = test::call_and_read_body_json(&app, req).await;
        assert!(receipt.order.starts_with("order-"));
        assert_eq!(receipt.status, "received");

        let uri = format!("/orders/order/{}", receipt.order);
        let before: Order =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri(&uri).to_request())
                .await;
        assert_eq!(before.items, vec!["book", "pen"]);
        assert!(!before.completed);

        let published = f.bus.published().await;
        let processor =
            OrderProcessor::from_config(f.store.clone(), f.metrics.clone(), &Config::default());
        processor
            .handle(Delivery::new("orders-pubsub", "orders", published[0].payload.clone()))
            .await;

        let after: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri(&uri).to_request())
                .await;
        assert_eq!(after["Items"], serde_json::json!(["book", "pen"]));
        assert_eq!(after["Completed"], serde_json::json!(true));
        assert_eq!(after["ID"], serde_json::json!(receipt.order));
    }

    #[actix_web::test]
    async fn test_bad_body_is_a_plain_500() {
        let f = fixture(CompletionMode::Event);
        let app = app!(f);

        let req = test::TestRequest::post().uri("/orders/new").set_payload("nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(test::read_body(resp).await, "unable to post order");
        assert_eq!(f.store.put_count(), 0);
    }

    #[actix_web::test]
    async fn test_missing_order_is_a_plain_500() {
        let f = fixture(CompletionMode::Immediate);
        let app = app!(f);

        let req = test::TestRequest::get().uri("/orders/order/order-missing").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(test::read_body(resp).await, "unable to get order");
    }

    #[actix_web::test]
    async fn test_health_and_metrics_are_mounted() {
        let f = fixture(CompletionMode::Immediate);
        let app = app!(f);

        let req = test::TestRequest::post()
            .uri("/orders/new")
            .set_payload(r#"{"Items":[]}"#)
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::get().uri("/health").to_request();
        let health: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["service"], "orderintakesvc");

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("orders_received_total 1"));
    }
}
