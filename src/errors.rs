use crate::utils::IsTransient;

// ============================================================================
// Error Taxonomy
// ============================================================================
//
// Every failure maps onto one of four kinds. Synchronous handlers turn all of
// them into a generic 500 but log the kind; the processor turns them into a
// delivery disposition.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request body, never retried
    InvalidInput,
    /// Store, bus or generator unavailable; safe to retry
    Transient,
    /// Corrupt data or malformed event; retrying cannot help
    Permanent,
    /// Order persisted but its event was never published
    ConsistencyGap,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::ConsistencyGap => "consistency_gap",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state store {store} unavailable: {reason}")]
    Unavailable { store: String, reason: String },

    #[error("state store {store} rejected key {key}: {reason}")]
    Rejected { store: String, key: String, reason: String },
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("publish to {bus}/{topic} failed: {reason}")]
    PublishFailed { bus: String, topic: String, reason: String },

    #[error("event bus {bus} circuit open, publish to {topic} refused")]
    CircuitOpen { bus: String, topic: String },

    #[error("publish to {bus}/{topic} not confirmed within {after:?}")]
    Timeout {
        bus: String,
        topic: String,
        after: std::time::Duration,
    },

    #[error("subscription to {bus}/{topic} failed: {reason}")]
    SubscriptionFailed { bus: String, topic: String, reason: String },

    #[error("unknown event bus: {0}")]
    UnknownBus(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("id generator unreachable: {0}")]
    Unavailable(String),

    #[error("id generator returned an unusable id: {0}")]
    InvalidResponse(String),
}

impl IsTransient for IdError {
    fn is_transient(&self) -> bool {
        matches!(self, IdError::Unavailable(_))
    }
}

/// Failures of the intake service
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("invalid order body: {0}")]
    InvalidInput(#[source] serde_json::Error),

    #[error("order id generation failed: {0}")]
    IdGeneration(#[from] IdError),

    #[error("order {order_id} could not be encoded: {source}")]
    Encode {
        order_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("order {order_id} not persisted: {source}")]
    Persist {
        order_id: String,
        #[source]
        source: StoreError,
    },

    #[error("order {order_id} persisted but its event was not published: {source}")]
    Publish {
        order_id: String,
        #[source]
        source: BusError,
    },

    #[error("order {0} not found")]
    NotFound(String),

    #[error("lookup of order {order_id} failed: {source}")]
    Lookup {
        order_id: String,
        #[source]
        source: StoreError,
    },

    #[error("stored order {order_id} is corrupt: {source}")]
    Corrupt {
        order_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{operation} exceeded its deadline")]
    DeadlineExceeded { operation: &'static str },
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::InvalidInput(_) => ErrorKind::InvalidInput,
            OrderError::Publish { .. } => ErrorKind::ConsistencyGap,
            OrderError::Encode { .. } | OrderError::Corrupt { .. } => ErrorKind::Permanent,
            OrderError::IdGeneration(IdError::InvalidResponse(_)) => ErrorKind::Permanent,
            OrderError::NotFound(_) => ErrorKind::Permanent,
            OrderError::Persist { source, .. } | OrderError::Lookup { source, .. }
                if !source.is_transient() =>
            {
                ErrorKind::Permanent
            }
            OrderError::IdGeneration(_)
            | OrderError::Persist { .. }
            | OrderError::Lookup { .. }
            | OrderError::DeadlineExceeded { .. } => ErrorKind::Transient,
        }
    }
}

/// Failures of a single event delivery inside the order processor
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("malformed event payload: {0}")]
    MalformedPayload(String),

    #[error("event references unknown order {0}")]
    UnknownOrder(String),

    #[error("loading order {order_id} failed: {source}")]
    Load {
        order_id: String,
        #[source]
        source: StoreError,
    },

    #[error("stored order {order_id} is corrupt: {source}")]
    CorruptRecord {
        order_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("order {order_id} could not be encoded: {source}")]
    Encode {
        order_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("saving completed order {order_id} failed: {source}")]
    Save {
        order_id: String,
        #[source]
        source: StoreError,
    },

    #[error("delivery exceeded its deadline of {0:?}")]
    DeadlineExceeded(std::time::Duration),
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::Load { .. }
            | ProcessError::Save { .. }
            | ProcessError::DeadlineExceeded(_) => ErrorKind::Transient,
            ProcessError::MalformedPayload(_)
            | ProcessError::UnknownOrder(_)
            | ProcessError::CorruptRecord { .. }
            | ProcessError::Encode { .. } => ErrorKind::Permanent,
        }
    }
}

impl IsTransient for ProcessError {
    fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
