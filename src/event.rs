//! NIP-01 event structure, id hashing, signing and verification.
//!
//! Events are the unit the manager broadcasts: the canonical serialization
//! `[0, pubkey, created_at, kind, tags, content]` is hashed with sha256 to
//! produce the id, and the id is Schnorr-signed (BIP-340) over secp256k1.

use secp256k1::{Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey, schnorr};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that can occur when building or signing events.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("signing error: {0}")]
    Signing(String),
}

/// A Nostr event. `sig` is optional so callers can construct events before
/// they are signed; an unsigned event is rejected at publish time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 32-bytes lowercase hex-encoded sha256 of the serialized event data
    pub id: String,
    /// 32-bytes lowercase hex-encoded public key of the event creator
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind (integer between 0 and 65535)
    pub kind: u16,
    /// Array of arrays of strings (tags)
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
    /// 64-bytes lowercase hex signature, absent until signed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

/// A template for creating events. The pubkey and id are derived during
/// signing, so templates carry neither.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventTemplate {
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind
    pub kind: u16,
    /// Array of arrays of strings (tags)
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
}

/// Serialize event fields in the canonical NIP-01 array form used for hashing:
/// `[0, pubkey, created_at, kind, tags, content]`.
fn serialize_for_hash(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> Result<String, EventError> {
    serde_json::to_string(&(0, pubkey, created_at, kind, tags, content))
        .map_err(|e| EventError::Serialization(e.to_string()))
}

/// Compute the event id (hex sha256 of the canonical serialization).
fn compute_event_id(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> Result<String, EventError> {
    let serialized = serialize_for_hash(pubkey, created_at, kind, tags, content)?;
    Ok(hex::encode(Sha256::digest(serialized.as_bytes())))
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len
        && s.chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

impl EventTemplate {
    /// Sign the template with a secret key, producing a complete event.
    pub fn sign(self, secret_key: &SecretKey) -> Result<Event, EventError> {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, secret_key);
        let (xonly, _parity) = keypair.x_only_public_key();
        let pubkey = hex::encode(xonly.serialize());

        let id = compute_event_id(&pubkey, self.created_at, self.kind, &self.tags, &self.content)?;
        let digest =
            hex::decode(&id).map_err(|e| EventError::Signing(format!("invalid id hex: {}", e)))?;
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| EventError::Signing(e.to_string()))?;
        let sig = secp.sign_schnorr_no_aux_rand(&message, &keypair);

        Ok(Event {
            id,
            pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig: Some(hex::encode(sig.serialize())),
        })
    }
}

impl Event {
    /// Whether the event carries a signature.
    pub fn is_signed(&self) -> bool {
        self.sig.is_some()
    }

    /// Verify the event: structural validation, id recomputation and Schnorr
    /// signature check. Returns `false` for unsigned events and on any
    /// malformed field rather than surfacing the underlying error.
    pub fn verify(&self) -> bool {
        let Some(sig_hex) = self.sig.as_deref() else {
            return false;
        };
        if !is_lower_hex(&self.id, 64)
            || !is_lower_hex(&self.pubkey, 64)
            || !is_lower_hex(sig_hex, 128)
        {
            return false;
        }

        let computed = match compute_event_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ) {
            Ok(id) => id,
            Err(_) => return false,
        };
        if computed != self.id {
            return false;
        }

        let Ok(id_bytes) = hex::decode(&self.id) else {
            return false;
        };
        let Ok(message) = Message::from_digest_slice(&id_bytes) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(sig_hex) else {
            return false;
        };
        let Ok(sig) = schnorr::Signature::from_slice(&sig_bytes) else {
            return false;
        };
        let Ok(pubkey_bytes) = hex::decode(&self.pubkey) else {
            return false;
        };
        let Ok(pubkey) = XOnlyPublicKey::from_slice(&pubkey_bytes) else {
            return false;
        };

        let secp = Secp256k1::verification_only();
        secp.verify_schnorr(&sig, &message, &pubkey).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_secret_key() -> SecretKey {
        SecretKey::from_slice(&[1u8; 32]).unwrap()
    }

    fn signed_event() -> Event {
        EventTemplate {
            created_at: 1617932115,
            kind: 1,
            tags: vec![],
            content: "Hello, world!".to_string(),
        }
        .sign(&test_secret_key())
        .unwrap()
    }

    #[test]
    fn test_serialize_for_hash() {
        let serialized =
            serialize_for_hash("ab".repeat(32).as_str(), 1617932115, 1, &[], "Hello").unwrap();
        let expected = format!("[0,\"{}\",1617932115,1,[],\"Hello\"]", "ab".repeat(32));
        assert_eq!(serialized, expected);
    }

    #[test]
    fn test_sign_produces_valid_event() {
        let event = signed_event();
        assert_eq!(event.id.len(), 64);
        assert_eq!(event.pubkey.len(), 64);
        assert!(event.is_signed());
        assert!(event.verify());
    }

    #[test]
    fn test_unsigned_event_does_not_verify() {
        let mut event = signed_event();
        event.sig = None;
        assert!(!event.is_signed());
        assert!(!event.verify());
    }

    #[test]
    fn test_tampered_content_does_not_verify() {
        let mut event = signed_event();
        event.content = "tampered".to_string();
        assert!(!event.verify());
    }

    #[test]
    fn test_wrong_signature_does_not_verify() {
        let mut event = signed_event();
        // Valid hex, wrong signature bytes
        event.sig = Some("00".repeat(64));
        assert!(!event.verify());
    }

    #[test]
    fn test_event_json_roundtrip() {
        let event = signed_event();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"sig\""));
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_unsigned_event_omits_sig_field() {
        let mut event = signed_event();
        event.sig = None;
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("\"sig\""));
    }
}
