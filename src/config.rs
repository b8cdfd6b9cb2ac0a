use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dotenvy::dotenv;

/// Where order ids come from; fixed per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    Local,
    Remote,
}

impl FromStr for IdStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(IdStrategy::Local),
            "remote" => Ok(IdStrategy::Remote),
            other => bail!("unknown id strategy {other:?}, expected local or remote"),
        }
    }
}

/// Whether intake completes orders itself or leaves it to the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Persist with `completed = false` and publish the id
    Event,
    /// Persist with `completed = true`, publish nothing
    Immediate,
}

impl FromStr for CompletionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "event" => Ok(CompletionMode::Event),
            "immediate" => Ok(CompletionMode::Immediate),
            other => bail!("unknown completion mode {other:?}, expected event or immediate"),
        }
    }
}

/// Which store and bus clients to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Redis state store and Kafka-protocol event bus
    External,
    /// Everything in process; intake also runs the processor
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "external" => Ok(Backend::External),
            "memory" => Ok(Backend::Memory),
            other => bail!("unknown backend {other:?}, expected external or memory"),
        }
    }
}

/// Service configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct Config {
    pub app_port: u16,
    pub state_store: String,
    pub pubsub: String,
    pub topic: String,
    pub route: String,
    pub consumer_group: String,
    pub dlq_store: String,
    pub backend: Backend,
    pub redis_url: String,
    pub brokers: String,
    pub id_strategy: IdStrategy,
    pub genid_url: String,
    pub completion: CompletionMode,
    pub request_timeout: Duration,
    pub delivery_timeout: Duration,
    pub max_deliveries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_port: 8080,
            state_store: "orders-store".to_string(),
            pubsub: "orders-pubsub".to_string(),
            topic: "orders".to_string(),
            route: "/orders".to_string(),
            consumer_group: "orderprocsvc".to_string(),
            dlq_store: "orders-dlq".to_string(),
            backend: Backend::External,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            brokers: "127.0.0.1:9092".to_string(),
            id_strategy: IdStrategy::Remote,
            genid_url: "http://127.0.0.1:5050".to_string(),
            completion: CompletionMode::Event,
            request_timeout: Duration::from_millis(5000),
            delivery_timeout: Duration::from_millis(5000),
            max_deliveries: 5,
        }
    }
}

impl Config {
    /// Load configuration, reading `.env` first when present.
    /// `default_port` is the service's own listen port.
    pub fn from_env(default_port: u16) -> Result<Self> {
        let _ = dotenv();
        Self::from_lookup(default_port, |key| env::var(key).ok())
    }

    /// Services that only talk to other processes through the store and the
    /// bus are inert on the in-memory backend.
    pub fn require_external_backend(&self, service: &str) -> Result<()> {
        if self.backend == Backend::Memory {
            bail!(
                "{service} needs ORDERS_BACKEND=external; the memory backend runs the \
                 processor inside the intake service"
            );
        }
        Ok(())
    }

    fn from_lookup(default_port: u16, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();
        let text = |key: &str, default: String| {
            lookup(key).filter(|v| !v.is_empty()).unwrap_or(default)
        };
        let parsed = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let route = text("ORDERS_PUBSUB_ROUTE", defaults.route);
        let route = if route.starts_with('/') { route } else { format!("/{route}") };

        Ok(Self {
            app_port: match parsed("APP_PORT") {
                Some(v) => v.parse().context("APP_PORT must be a valid port number")?,
                None => default_port,
            },
            state_store: text("ORDERS_STORE", defaults.state_store),
            pubsub: text("ORDERS_PUBSUB", defaults.pubsub),
            topic: text("ORDERS_PUBSUB_TOPIC", defaults.topic),
            route,
            consumer_group: text("ORDERS_CONSUMER_GROUP", defaults.consumer_group),
            dlq_store: text("ORDERS_DLQ_STORE", defaults.dlq_store),
            backend: match parsed("ORDERS_BACKEND") {
                Some(v) => v.parse()?,
                None => defaults.backend,
            },
            redis_url: text("REDIS_URL", defaults.redis_url),
            brokers: text("KAFKA_BROKERS", defaults.brokers),
            id_strategy: match parsed("ORDERS_ID_STRATEGY") {
                Some(v) => v.parse()?,
                None => defaults.id_strategy,
            },
            genid_url: text("GENID_URL", defaults.genid_url),
            completion: match parsed("ORDERS_COMPLETION") {
                Some(v) => v.parse()?,
                None => defaults.completion,
            },
            request_timeout: match parsed("REQUEST_TIMEOUT_MS") {
                Some(v) => Duration::from_millis(
                    v.parse().context("REQUEST_TIMEOUT_MS must be milliseconds")?,
                ),
                None => defaults.request_timeout,
            },
            delivery_timeout: match parsed("ORDERS_DELIVERY_TIMEOUT_MS") {
                Some(v) => Duration::from_millis(
                    v.parse().context("ORDERS_DELIVERY_TIMEOUT_MS must be milliseconds")?,
                ),
                None => defaults.delivery_timeout,
            },
            max_deliveries: match parsed("ORDERS_MAX_DELIVERIES") {
                Some(v) => v.parse().context("ORDERS_MAX_DELIVERIES must be a positive integer")?,
                None => defaults.max_deliveries,
            },
        })
    }
}
