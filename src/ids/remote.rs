use std::time::Duration;

use async_trait::async_trait;

use super::{IdGenerator, ORDER_ID_PREFIX};
use crate::errors::IdError;
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

/// Mints ids by invoking the ID generator service over HTTP.
///
/// Minting has no side effect, so transport failures are retried a couple of
/// times while the client waits.
pub struct RemoteIdGenerator {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryConfig,
}

impl RemoteIdGenerator {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            endpoint: format!("{}/genid", base_url.trim_end_matches('/')),
            retry: RetryConfig::conservative(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn invoke(&self) -> Result<String, IdError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .send()
            .await
            .map_err(|e| IdError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(IdError::Unavailable(format!("generator answered {status}")));
        }
        if !status.is_success() {
            return Err(IdError::InvalidResponse(format!("generator answered {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| IdError::Unavailable(e.to_string()))?;
        let id = body.trim();

        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(IdError::InvalidResponse(format!("{id:?}")));
        }
        Ok(id.to_string())
    }
}

#[async_trait]
impl IdGenerator for RemoteIdGenerator {
    fn strategy(&self) -> &'static str {
        "remote"
    }

    async fn next_id(&self) -> Result<String, IdError> {
        match retry_on_transient(self.retry.clone(), |_attempt| self.invoke()).await {
            RetryResult::Success(id) => Ok(format!("{ORDER_ID_PREFIX}{id}")),
            RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => {
                tracing::error!(
                    endpoint = %self.endpoint,
                    error = %e,
                    "Order id generation failed"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::genid;
    use crate::metrics::{Metrics, ServiceInfo};
    use actix_web::{web, App, HttpServer};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    #[actix_web::test]
    async fn test_mints_prefixed_uuid_from_running_service() {
        let metrics = web::Data::from(Arc::new(Metrics::new().unwrap()));
        let info = web::Data::new(ServiceInfo { name: "genidsvc", bus: None });
        let server = HttpServer::new(move || {
            App::new()
                .app_data(metrics.clone())
                .app_data(info.clone())
                .configure(genid::configure)
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        let running = server.run();
        let handle = running.handle();
        actix_web::rt::spawn(running);

        let generator = RemoteIdGenerator::new(&format!("http://{addr}/"), Duration::from_secs(2))
            .unwrap()
            .with_retry(fast());
        let id = generator.next_id().await.unwrap();

        let uuid = id.strip_prefix(ORDER_ID_PREFIX).unwrap();
        assert!(uuid::Uuid::parse_str(uuid).is_ok());

        handle.stop(true).await;
    }

    #[tokio::test]
    async fn test_unreachable_generator_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base_url = format!("http://{addr}");
        let generator = RemoteIdGenerator::new(&base_url, Duration::from_millis(500))
            .unwrap()
            .with_retry(fast());

        assert!(matches!(generator.next_id().await, Err(IdError::Unavailable(_))));
    }
}
