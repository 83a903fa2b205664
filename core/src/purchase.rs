//! Purchase request and response payloads.
//!
//! Both travel as JSON inside an [`ATTEMPT_PURCHASE`](crate::codec::ATTEMPT_PURCHASE)
//! frame:
//!
//! ```text
//! request:  {"product_id": "iphone15", "user_id": "user_42"}
//! response: {"status": "SUCCESS", "remaining_stock": 99}
//!           {"status": "SOLD_OUT"}
//!           {"status": "ERROR", "error": "missing product_id or user_id"}
//! ```

use serde::{Deserialize, Deserializer, Serialize};

/// Error text for a request with an empty or missing id.
pub const MISSING_FIELDS: &str = "missing product_id or user_id";

/// Error text for a payload that is not a JSON request object.
pub const INVALID_JSON: &str = "invalid json";

/// Error text for a frame whose type byte is not understood.
pub const UNKNOWN_MESSAGE_TYPE: &str = "unknown message type";

/// A single purchase attempt.
///
/// Missing and `null` fields deserialize as empty strings so that they are
/// rejected by [`PurchaseRequest::validate`] with the same message as empty
/// ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    /// Product being purchased.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub product_id: String,
    /// Buyer identity recorded in the ledger on success.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub user_id: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl PurchaseRequest {
    /// Create a new request.
    #[must_use]
    pub fn new(product_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Check that both ids are present.
    ///
    /// # Errors
    ///
    /// Returns [`MISSING_FIELDS`] if either id is empty.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.product_id.is_empty() || self.user_id.is_empty() {
            return Err(MISSING_FIELDS);
        }
        Ok(())
    }

    /// Parse a request from a frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`INVALID_JSON`] if the payload is not a JSON object of the
    /// expected shape.
    pub fn from_payload(payload: &[u8]) -> Result<Self, &'static str> {
        serde_json::from_slice(payload).map_err(|_| INVALID_JSON)
    }
}

/// Outcome of a purchase attempt as seen by the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseResponse {
    /// One unit was reserved for the buyer.
    Success {
        /// Stock left after this purchase.
        remaining_stock: i64,
    },
    /// No stock left (or the product does not exist).
    SoldOut,
    /// The attempt could not be evaluated.
    Error {
        /// Human-readable reason.
        error: String,
    },
}

impl PurchaseResponse {
    /// Build an `ERROR` response.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Stable label used for metrics and logs.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::SoldOut => "sold_out",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize to the JSON payload sent on the wire.
    #[must_use]
    pub fn to_payload(&self) -> Vec<u8> {
        // A tagged enum of strings and integers cannot fail to serialize
        serde_json::to_vec(self).unwrap_or_else(|_| {
            br#"{"status":"ERROR","error":"response encoding failed"}"#.to_vec()
        })
    }

    /// Parse a response payload (client side).
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error if the payload is malformed.
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
