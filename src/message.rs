//! Relay protocol messages (NIP-01).
//!
//! - Client to Relay: EVENT, REQ, CLOSE
//! - Relay to Client: EVENT, OK, EOSE, CLOSED, NOTICE
//!
//! All messages are order-sensitive JSON arrays whose first element is a tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::event::Event;

/// Errors that can occur when encoding or parsing relay messages.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(String),
}

/// The set of filters attached to one subscription.
pub type Filters = Vec<Filter>;

/// Messages sent from client to relay.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// Publish an event: ["EVENT", <event JSON>]
    Event(Event),

    /// Subscribe to events: ["REQ", <subscription_id>, <filter1>, <filter2>, ...]
    Req {
        subscription_id: String,
        filters: Filters,
    },

    /// Close a subscription: ["CLOSE", <subscription_id>]
    Close { subscription_id: String },
}

impl ClientMessage {
    /// Build a subscribe request for a subscription id and its filters.
    pub fn req(subscription_id: impl Into<String>, filters: Filters) -> Self {
        ClientMessage::Req {
            subscription_id: subscription_id.into(),
            filters,
        }
    }

    /// Build a close-subscription message.
    pub fn close(subscription_id: impl Into<String>) -> Self {
        ClientMessage::Close {
            subscription_id: subscription_id.into(),
        }
    }

    /// Serialize to a JSON array for sending to a relay.
    pub fn to_json(&self) -> Result<String, MessageError> {
        let value = match self {
            ClientMessage::Event(event) => {
                serde_json::json!(["EVENT", event])
            }
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                let mut arr: Vec<Value> = vec![
                    Value::String("REQ".to_string()),
                    Value::String(subscription_id.clone()),
                ];
                for filter in filters {
                    arr.push(serde_json::to_value(filter)?);
                }
                Value::Array(arr)
            }
            ClientMessage::Close { subscription_id } => {
                serde_json::json!(["CLOSE", subscription_id])
            }
        };
        Ok(value.to_string())
    }
}

/// Messages sent from relay to client.
#[derive(Debug, Clone)]
pub enum RelayMessage {
    /// Event matching a subscription: ["EVENT", <subscription_id>, <event JSON>]
    Event {
        subscription_id: String,
        event: Event,
    },

    /// Command result: ["OK", <event_id>, <true|false>, <message>]
    Ok {
        event_id: String,
        success: bool,
        message: String,
    },

    /// End of stored events: ["EOSE", <subscription_id>]
    Eose { subscription_id: String },

    /// Subscription closed by relay: ["CLOSED", <subscription_id>, <message>]
    Closed {
        subscription_id: String,
        message: String,
    },

    /// Human-readable notice: ["NOTICE", <message>]
    Notice { message: String },
}

impl RelayMessage {
    /// Parse a JSON message received from a relay.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let arr: Vec<Value> =
            serde_json::from_str(json).map_err(|e| MessageError::InvalidFormat(e.to_string()))?;

        if arr.is_empty() {
            return Err(MessageError::InvalidFormat("empty array".to_string()));
        }

        let msg_type = arr[0]
            .as_str()
            .ok_or_else(|| MessageError::InvalidFormat("first element not a string".to_string()))?;

        match msg_type {
            "EVENT" => {
                if arr.len() < 3 {
                    return Err(MessageError::MissingField(
                        "event or subscription_id".to_string(),
                    ));
                }
                let subscription_id = arr[1]
                    .as_str()
                    .ok_or_else(|| {
                        MessageError::InvalidFormat("subscription_id not a string".to_string())
                    })?
                    .to_string();
                let event: Event = serde_json::from_value(arr[2].clone())?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    event,
                })
            }
            "OK" => {
                if arr.len() < 4 {
                    return Err(MessageError::MissingField("OK fields".to_string()));
                }
                let event_id = arr[1]
                    .as_str()
                    .ok_or_else(|| {
                        MessageError::InvalidFormat("event_id not a string".to_string())
                    })?
                    .to_string();
                let success = arr[2].as_bool().ok_or_else(|| {
                    MessageError::InvalidFormat("success not a boolean".to_string())
                })?;
                let message = arr[3].as_str().unwrap_or("").to_string();
                Ok(RelayMessage::Ok {
                    event_id,
                    success,
                    message,
                })
            }
            "EOSE" => {
                if arr.len() < 2 {
                    return Err(MessageError::MissingField("subscription_id".to_string()));
                }
                let subscription_id = arr[1]
                    .as_str()
                    .ok_or_else(|| {
                        MessageError::InvalidFormat("subscription_id not a string".to_string())
                    })?
                    .to_string();
                Ok(RelayMessage::Eose { subscription_id })
            }
            "CLOSED" => {
                if arr.len() < 3 {
                    return Err(MessageError::MissingField("CLOSED fields".to_string()));
                }
                let subscription_id = arr[1]
                    .as_str()
                    .ok_or_else(|| {
                        MessageError::InvalidFormat("subscription_id not a string".to_string())
                    })?
                    .to_string();
                let message = arr[2].as_str().unwrap_or("").to_string();
                Ok(RelayMessage::Closed {
                    subscription_id,
                    message,
                })
            }
            "NOTICE" => {
                if arr.len() < 2 {
                    return Err(MessageError::MissingField("message".to_string()));
                }
                let message = arr[1]
                    .as_str()
                    .ok_or_else(|| {
                        MessageError::InvalidFormat("message not a string".to_string())
                    })?
                    .to_string();
                Ok(RelayMessage::Notice { message })
            }
            _ => Err(MessageError::UnknownType(msg_type.to_string())),
        }
    }
}

/// Filter for subscription requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    /// Event IDs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Authors (pubkeys)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    /// Event kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// Events since timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    /// Events until timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    /// Maximum number of events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Generic tag queries (e.g., #e, #p).
    /// The key is the tag letter (with #), value is the list of values.
    #[serde(flatten, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub tags: std::collections::HashMap<String, Vec<String>>,
}

impl Filter {
    /// Create a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by event IDs.
    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Filter by authors.
    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    /// Filter by kinds.
    pub fn kinds(mut self, kinds: Vec<u16>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Filter by events since timestamp.
    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    /// Filter by events until timestamp.
    pub fn until(mut self, timestamp: u64) -> Self {
        self.until = Some(timestamp);
        self
    }

    /// Limit number of results.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Add a tag filter. The key should be the tag letter (e.g., "e", "p").
    pub fn tag(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.tags.insert(format!("#{}", key.into()), values);
        self
    }

    /// Filter by #e (event reference) tags.
    pub fn event_refs(self, event_ids: Vec<String>) -> Self {
        self.tag("e", event_ids)
    }

    /// Filter by #p (pubkey reference) tags.
    pub fn pubkey_refs(self, pubkeys: Vec<String>) -> Self {
        self.tag("p", pubkeys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_event() -> Event {
        Event {
            id: "abc123".to_string(),
            pubkey: "pubkey123".to_string(),
            created_at: 1234567890,
            kind: 1,
            tags: vec![],
            content: "Hello".to_string(),
            sig: Some("sig123".to_string()),
        }
    }

    #[test]
    fn test_client_message_event() {
        let msg = ClientMessage::Event(test_event());
        let json = msg.to_json().unwrap();

        assert!(json.starts_with(r#"["EVENT","#));
        assert!(json.contains("abc123"));
    }

    #[test]
    fn test_client_message_req() {
        let filter = Filter::new().kinds(vec![1]).limit(10);
        let msg = ClientMessage::req("sub1", vec![filter]);

        let json = msg.to_json().unwrap();
        assert!(json.starts_with(r#"["REQ","sub1""#));
        assert!(json.contains("kinds"));
    }

    #[test]
    fn test_client_message_req_no_filters() {
        let json = ClientMessage::req("sub1", vec![]).to_json().unwrap();
        assert_eq!(json, r#"["REQ","sub1"]"#);
    }

    #[test]
    fn test_client_message_close() {
        let json = ClientMessage::close("sub1").to_json().unwrap();
        assert_eq!(json, r#"["CLOSE","sub1"]"#);
    }

    #[test]
    fn test_relay_message_event() {
        let json = r#"["EVENT","sub1",{"id":"abc","pubkey":"pk","created_at":123,"kind":1,"tags":[],"content":"Hello","sig":"sig"}]"#;
        let msg = RelayMessage::from_json(json).unwrap();

        match msg {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                assert_eq!(subscription_id, "sub1");
                assert_eq!(event.id, "abc");
                assert_eq!(event.content, "Hello");
                assert_eq!(event.sig.as_deref(), Some("sig"));
            }
            _ => panic!("wrong message type"),
        }
    }

    #[test]
    fn test_relay_message_ok() {
        let json = r#"["OK","event123",false,"duplicate: already have this event"]"#;
        let msg = RelayMessage::from_json(json).unwrap();

        match msg {
            RelayMessage::Ok {
                event_id,
                success,
                message,
            } => {
                assert_eq!(event_id, "event123");
                assert!(!success);
                assert!(message.contains("duplicate"));
            }
            _ => panic!("wrong message type"),
        }
    }

    #[test]
    fn test_relay_message_eose() {
        let msg = RelayMessage::from_json(r#"["EOSE","sub1"]"#).unwrap();
        assert!(matches!(msg, RelayMessage::Eose { subscription_id } if subscription_id == "sub1"));
    }

    #[test]
    fn test_relay_message_closed() {
        let msg =
            RelayMessage::from_json(r#"["CLOSED","sub1","error: too many subscriptions"]"#)
                .unwrap();
        match msg {
            RelayMessage::Closed {
                subscription_id,
                message,
            } => {
                assert_eq!(subscription_id, "sub1");
                assert!(message.contains("too many subscriptions"));
            }
            _ => panic!("wrong message type"),
        }
    }

    #[test]
    fn test_relay_message_notice() {
        let msg = RelayMessage::from_json(r#"["NOTICE","rate limited"]"#).unwrap();
        assert!(matches!(msg, RelayMessage::Notice { message } if message == "rate limited"));
    }

    #[test]
    fn test_filter_builder() {
        let filter = Filter::new()
            .kinds(vec![1, 4])
            .authors(vec!["author1".to_string()])
            .since(1000)
            .until(2000)
            .limit(100)
            .event_refs(vec!["event1".to_string()]);

        assert_eq!(filter.kinds, Some(vec![1, 4]));
        assert_eq!(filter.authors, Some(vec!["author1".to_string()]));
        assert_eq!(filter.since, Some(1000));
        assert_eq!(filter.until, Some(2000));
        assert_eq!(filter.limit, Some(100));
        assert!(filter.tags.contains_key("#e"));
    }

    #[test]
    fn test_filter_serialization_omits_none() {
        let filter = Filter::new().kinds(vec![1]).limit(10);

        let json = serde_json::to_string(&filter).unwrap();
        assert!(json.contains("\"kinds\":[1]"));
        assert!(json.contains("\"limit\":10"));
        assert!(!json.contains("authors"));
    }

    #[test]
    fn test_invalid_message() {
        assert!(RelayMessage::from_json("not valid json").is_err());
        assert!(RelayMessage::from_json("[]").is_err());
        assert!(matches!(
            RelayMessage::from_json(r#"["UNKNOWN"]"#),
            Err(MessageError::UnknownType(_))
        ));
    }
}
