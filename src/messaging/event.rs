use crate::errors::ProcessError;

// ============================================================================
// Order Events
// ============================================================================
//
// On the wire an event is nothing but the order id as raw bytes. Inside the
// process it is a tagged message so new kinds can be added without touching
// every consumer's parsing.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// An order was persisted by intake and awaits completion
    OrderReceived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEvent {
    pub kind: EventKind,
    pub order_id: String,
}

impl OrderEvent {
    pub fn received(order_id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::OrderReceived,
            order_id: order_id.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self.kind {
            EventKind::OrderReceived => self.order_id.as_bytes().to_vec(),
        }
    }

    /// Parse a delivered payload. Accepts the raw id or a JSON string literal
    /// holding it; anything else is malformed and will never become valid.
    pub fn decode(payload: &[u8]) -> Result<Self, ProcessError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| ProcessError::MalformedPayload(format!("not UTF-8: {e}")))?
            .trim();

        let id = if text.starts_with('"') {
            serde_json::from_str::<String>(text)
                .map_err(|e| ProcessError::MalformedPayload(format!("bad JSON string: {e}")))?
        } else {
            text.to_string()
        };

        if id.is_empty() {
            return Err(ProcessError::MalformedPayload("empty payload".to_string()));
        }
        let structured = id.starts_with(['{', '['])
            || id.parse::<f64>().is_ok()
            || matches!(id.as_str(), "true" | "false" | "null");
        if structured {
            return Err(ProcessError::MalformedPayload(format!(
                "expected an order id, got structured data: {}",
                truncate(&id)
            )));
        }
        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ProcessError::MalformedPayload(format!(
                "order id contains whitespace: {}",
                truncate(&id)
            )));
        }

        Ok(Self::received(id))
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_the_raw_id() {
        let event = OrderEvent::received("order-5f3a");
        assert_eq!(event.encode(), b"order-5f3a".to_vec());
        assert_eq!(OrderEvent::decode(&event.encode()).unwrap(), event);
    }

    #[test]
    fn test_json_string_payload_is_unwrapped() {
        let event = OrderEvent::decode(br#""order-9""#).unwrap();
        assert_eq!(event.order_id, "order-9");
        assert_eq!(event.kind, EventKind::OrderReceived);
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        for payload in [
            &b""[..],
            b"   ",
            b"\xff\xfe",
            br#"{"order":"order-1"}"#,
            b"[1,2]",
            b"42",
            b"null",
            b"order 1",
            br#""""#,
        ] {
            let err = OrderEvent::decode(payload).unwrap_err();
            assert!(
                matches!(err, ProcessError::MalformedPayload(_)),
                "payload {payload:?} should be malformed"
            );
        }
    }
}
