use std::sync::Arc;
use std::time::Duration;

use kameo::actor::ActorRef;
use kameo::Actor;

use crate::actors::DeadLetterActor;
use crate::config::{Backend, Config, IdStrategy};
use crate::ids::{IdGenerator, LocalIdGenerator, RemoteIdGenerator};
use crate::messaging::{
    DeliveryPolicy, EventBus, InMemoryEventBus, RedpandaEventBus, Subscription, SubscriptionHandle,
};
use crate::metrics::{Metrics, ServiceInfo};
use crate::services::{IntakeService, IntakeSettings, OrderProcessor};
use crate::state::{InMemoryStateStore, RedisStateStore, StateStore};
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

// ============================================================================
// Bootstrap
// ============================================================================
//
// Builds the shared clients once per process and hands them to services as
// `Arc<dyn ...>`. Nothing here is global; tests build their own.
//
// ============================================================================

pub struct Backends {
    pub config: Config,
    pub metrics: Arc<Metrics>,
    pub store: Arc<dyn StateStore>,
    pub bus: Arc<dyn EventBus>,
    pub dead_letters: ActorRef<DeadLetterActor>,
}

impl Backends {
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        tracing::info!(backend = ?config.backend, "Connecting backends");

        let metrics = Arc::new(Metrics::new()?);
        tracing::info!(
            "📊 Metrics registry created with {} metrics",
            metrics.registry().gather().len()
        );

        let store: Arc<dyn StateStore> = match config.backend {
            Backend::External => Arc::new(connect_redis(&config.redis_url).await?),
            Backend::Memory => Arc::new(InMemoryStateStore::new()),
        };

        let dead_letters = DeadLetterActor::spawn(DeadLetterActor::new(
            store.clone(),
            config.dlq_store.clone(),
        ));
        let redelivery = RetryConfig::redelivery(config.max_deliveries);
        let policy = DeliveryPolicy::new(redelivery, metrics.clone())
            .with_dead_letters(dead_letters.clone());

        let bus: Arc<dyn EventBus> = match config.backend {
            Backend::External => Arc::new(RedpandaEventBus::connect(
                &config.pubsub,
                &config.brokers,
                policy,
            )?),
            Backend::Memory => Arc::new(InMemoryEventBus::new(policy)),
        };

        Ok(Self {
            config,
            metrics,
            store,
            bus,
            dead_letters,
        })
    }

    pub fn service_info(&self, name: &'static str) -> ServiceInfo {
        ServiceInfo {
            name,
            bus: Some(self.bus.clone()),
        }
    }

    pub fn id_generator(&self) -> anyhow::Result<Arc<dyn IdGenerator>> {
        Ok(match self.config.id_strategy {
            IdStrategy::Local => Arc::new(LocalIdGenerator),
            IdStrategy::Remote => Arc::new(RemoteIdGenerator::new(
                &self.config.genid_url,
                self.config.request_timeout,
            )?),
        })
    }

    pub fn intake(&self) -> anyhow::Result<IntakeService> {
        Ok(IntakeService::new(
            self.store.clone(),
            self.bus.clone(),
            self.id_generator()?,
            self.metrics.clone(),
            IntakeSettings::from(&self.config),
        ))
    }

    pub fn processor(&self) -> OrderProcessor {
        OrderProcessor::from_config(self.store.clone(), self.metrics.clone(), &self.config)
    }

    pub fn subscription(&self) -> Subscription {
        Subscription {
            bus: self.config.pubsub.clone(),
            topic: self.config.topic.clone(),
            group: self.config.consumer_group.clone(),
        }
    }

    /// Attach an order processor to the orders topic
    pub async fn subscribe_processor(&self) -> anyhow::Result<SubscriptionHandle> {
        let handle = self
            .bus
            .subscribe(self.subscription(), Arc::new(self.processor()))
            .await?;
        Ok(handle)
    }
}

async fn connect_redis(redis_url: &str) -> anyhow::Result<RedisStateStore> {
    let startup = RetryConfig {
        max_attempts: 5,
        initial_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(5),
        multiplier: 2.0,
    };

    match retry_with_backoff(startup, |_attempt| RedisStateStore::connect(redis_url)).await {
        RetryResult::Success(store) => Ok(store),
        RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => Err(e),
    }
}
