//! Subscription records stored on a relay.

use uuid::Uuid;

use crate::message::Filters;

/// Generate a unique subscription ID.
pub fn generate_subscription_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

/// A standing request for a relay to forward events matching the filters.
/// Created when a subscription is opened, removed on close, and replayed
/// when the relay reconnects.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Caller-supplied id, unique per relay
    pub id: String,
    /// Filters constraining which events the subscription receives
    pub filters: Filters,
}

impl Subscription {
    /// Create a new subscription record.
    pub fn new(id: impl Into<String>, filters: Filters) -> Self {
        Self {
            id: id.into(),
            filters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Filter;

    #[test]
    fn test_generate_subscription_id() {
        let id1 = generate_subscription_id();
        let id2 = generate_subscription_id();

        assert_eq!(id1.len(), 8);
        assert_eq!(id2.len(), 8);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_subscription_new() {
        let sub = Subscription::new("sub1", vec![Filter::new().kinds(vec![1])]);
        assert_eq!(sub.id, "sub1");
        assert_eq!(sub.filters.len(), 1);
    }
}
