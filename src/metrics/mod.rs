// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::errors::ErrorKind;
use crate::utils::CircuitState;

// Re-export for public API
pub use server::{configure, health_handler, metrics_handler, ServiceInfo};

// ============================================================================
// Metrics - Prometheus metrics for the order pipeline
// ============================================================================
//
// One registry per process, scraped via GET /metrics:
// - intake: orders received, failures by kind, consistency gaps
// - ids: identifiers minted per strategy
// - processor: deliveries by outcome and latency, redeliveries
// - dead letters and the broker circuit breaker
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_received: IntCounter,
    pub intake_failures: IntCounterVec,
    pub consistency_gaps: IntCounter,
    pub ids_generated: IntCounterVec,

    pub deliveries: IntCounterVec,
    pub delivery_duration: HistogramVec,
    pub redeliveries: IntCounterVec,
    pub orders_completed: IntCounter,

    pub dlq_messages_total: IntCounter,
    pub dlq_messages_by_topic: IntCounterVec,

    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_received =
            IntCounter::new("orders_received_total", "Orders accepted by intake")?;
        registry.register(Box::new(orders_received.clone()))?;

        let intake_failures = IntCounterVec::new(
            Opts::new("intake_failures_total", "Intake requests that failed, by error kind"),
            &["kind"],
        )?;
        registry.register(Box::new(intake_failures.clone()))?;

        let consistency_gaps = IntCounter::new(
            "consistency_gaps_total",
            "Orders persisted whose event could not be published",
        )?;
        registry.register(Box::new(consistency_gaps.clone()))?;

        let ids_generated = IntCounterVec::new(
            Opts::new("ids_generated_total", "Order identifiers minted"),
            &["strategy"],
        )?;
        registry.register(Box::new(ids_generated.clone()))?;

        let deliveries = IntCounterVec::new(
            Opts::new("event_deliveries_total", "Event deliveries handled, by disposition"),
            &["topic", "outcome"],
        )?;
        registry.register(Box::new(deliveries.clone()))?;

        let delivery_duration = HistogramVec::new(
            HistogramOpts::new(
                "event_delivery_duration_seconds",
                "Time spent handling one delivery",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(delivery_duration.clone()))?;

        let redeliveries = IntCounterVec::new(
            Opts::new("event_redeliveries_total", "Deliveries repeated after a retry disposition"),
            &["topic"],
        )?;
        registry.register(Box::new(redeliveries.clone()))?;

        let orders_completed =
            IntCounter::new("orders_completed_total", "Orders transitioned to completed")?;
        registry.register(Box::new(orders_completed.clone()))?;

        let dlq_messages_total =
            IntCounter::new("dlq_messages_total", "Payloads sent to the dead letter queue")?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let dlq_messages_by_topic = IntCounterVec::new(
            Opts::new("dlq_messages_by_topic", "Dead-lettered payloads by topic"),
            &["topic"],
        )?;
        registry.register(Box::new(dlq_messages_by_topic.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Event bus circuit breaker (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_received,
            intake_failures,
            consistency_gaps,
            ids_generated,
            deliveries,
            delivery_duration,
            redeliveries,
            orders_completed,
            dlq_messages_total,
            dlq_messages_by_topic,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_intake_failure(&self, kind: ErrorKind) {
        self.intake_failures.with_label_values(&[kind.as_str()]).inc();
        if kind == ErrorKind::ConsistencyGap {
            self.consistency_gaps.inc();
        }
    }

    pub fn record_id(&self, strategy: &str) {
        self.ids_generated.with_label_values(&[strategy]).inc();
    }

    pub fn record_delivery(&self, topic: &str, outcome: &str, duration_secs: f64) {
        self.deliveries.with_label_values(&[topic, outcome]).inc();
        self.delivery_duration.with_label_values(&[outcome]).observe(duration_secs);
    }

    pub fn record_redelivery(&self, topic: &str) {
        self.redeliveries.with_label_values(&[topic]).inc();
    }

    pub fn record_dead_letter(&self, topic: &str) {
        self.dlq_messages_total.inc();
        self.dlq_messages_by_topic.with_label_values(&[topic]).inc();
    }

    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        self.circuit_breaker_state.set(state.as_gauge());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(
        gathered: &'a [prometheus::proto::MetricFamily],
        name: &str,
    ) -> &'a prometheus::proto::MetricFamily {
        gathered.iter().find(|m| m.name() == name).unwrap()
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.orders_received.inc();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_consistency_gap_is_counted_separately() {
        let metrics = Metrics::new().unwrap();
        metrics.record_intake_failure(ErrorKind::Transient);
        metrics.record_intake_failure(ErrorKind::ConsistencyGap);

        let gathered = metrics.registry.gather();
        assert_eq!(find(&gathered, "intake_failures_total").metric.len(), 2);
        assert_eq!(find(&gathered, "consistency_gaps_total").metric[0].counter.value, Some(1.0));
    }

    #[test]
    fn test_record_delivery_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_delivery("orders", "ack", 0.01);
        metrics.record_delivery("orders", "retry", 0.02);
        metrics.record_delivery("orders", "ack", 0.01);

        let gathered = metrics.registry.gather();
        assert_eq!(find(&gathered, "event_deliveries_total").metric.len(), 2);
    }

    #[test]
    fn test_circuit_breaker_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.update_circuit_breaker_state(CircuitState::Open);

        let gathered = metrics.registry.gather();
        assert_eq!(find(&gathered, "circuit_breaker_state").metric[0].gauge.value, Some(1.0));
    }
}
