use serde::{Deserialize, Serialize};

// ============================================================================
// Order Record
// ============================================================================
//
// Stored as one JSON value under its id. Field names match what the HTTP
// surface has always returned (`ID`, `Items`, `Received`, `Completed`);
// lower-case spellings are accepted on input.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Order {
    #[serde(rename = "ID", alias = "id", alias = "Id", default)]
    pub id: String,

    #[serde(rename = "Items", alias = "items", default)]
    pub items: Vec<String>,

    #[serde(rename = "Received", alias = "received", default)]
    pub received: bool,

    #[serde(rename = "Completed", alias = "completed", default)]
    pub completed: bool,
}

impl Order {
    /// Decode an intake request body. Only a JSON object is an order; the
    /// positional array form serde would otherwise accept is refused.
    pub fn from_request(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(raw)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom(format!(
                "expected an order object, got {}",
                json_type(&value)
            )));
        }
        serde_json::from_value(value)
    }

    /// Stamp a freshly decoded request with its id and intake flags.
    /// Anything the client sent for these fields is discarded.
    pub fn accept(self, id: String, completed: bool) -> Self {
        Self {
            id,
            items: self.items,
            received: true,
            completed,
        }
    }

    /// Completion transition. Returns `false` when the order was already
    /// completed, in which case nothing changes.
    pub fn complete(&mut self) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        true
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Response body of a successful intake
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OrderReceipt {
    pub order: String,
    pub status: String,
}

impl OrderReceipt {
    pub fn received(order_id: impl Into<String>) -> Self {
        Self {
            order: order_id.into(),
            status: "received".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_request_with_go_style_fields() {
        let order: Order = serde_json::from_str(r#"{"Items":["book","pen"]}"#).unwrap();
        assert_eq!(order.items, vec!["book", "pen"]);
        assert!(order.id.is_empty());
        assert!(!order.received);
        assert!(!order.completed);
    }

    #[test]
    fn test_decodes_lowercase_and_ignores_unknown_fields() {
        let order: Order =
            serde_json::from_str(r#"{"items":["tea"],"customer":"ann","note":1}"#).unwrap();
        assert_eq!(order.items, vec!["tea"]);
    }

    #[test]
    fn test_request_must_be_an_object() {
        let order = Order::from_request(br#"{"Items":["book"]}"#).unwrap();
        assert_eq!(order.items, vec!["book"]);

        for body in [&b"[]"[..], br#"["x",["a"],false,true]"#, b"null", b"\"order\"", b"7"] {
            let err = Order::from_request(body).unwrap_err();
            assert!(err.to_string().contains("expected an order object"), "{err}");
        }
        assert!(Order::from_request(b"{").is_err());
    }

    #[test]
    fn test_accept_discards_client_supplied_flags() {
        let sent: Order =
            serde_json::from_str(r#"{"ID":"forged","Items":["a"],"Completed":true}"#).unwrap();
        let order = sent.accept("order-1".into(), false);

        assert_eq!(order.id, "order-1");
        assert!(order.received);
        assert!(!order.completed);
    }

    #[test]
    fn test_encoded_record_field_names() {
        let order = Order::default().accept("order-7".into(), false);
        let json: serde_json::Value = serde_json::to_value(&order).unwrap();
        assert_eq!(json["ID"], "order-7");
        assert_eq!(json["Received"], true);
        assert_eq!(json["Completed"], false);
        assert!(json["Items"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_complete_only_transitions_once() {
        let mut order = Order::default().accept("order-1".into(), false);
        assert!(order.complete());
        assert!(!order.complete());
        assert!(order.completed);
    }

    #[test]
    fn test_receipt_shape() {
        let json = serde_json::to_string(&OrderReceipt::received("order-ab")).unwrap();
        assert_eq!(json, r#"{"order":"order-ab","status":"received"}"#);
    }
}
