//! Error hierarchy shared across the Agora crates.
//!
//! Fan-out failures are recovered locally and converted into state
//! transitions (membership removal, presence events), so most of these
//! variants appear only at the seams: connection establishment, parsing,
//! and reconnect exhaustion.

use thiserror::Error;

/// Top-level error type for the Agora real-time layer.
#[derive(Debug, Error)]
pub enum AgoraError {
    /// Inbound message missing required fields for its kind, or not
    /// parseable at all. Always recovered by dropping the message.
    #[error("malformed {kind} message: {reason}")]
    Malformed {
        /// Kind tag the message claimed, or `"unknown"` when unparseable.
        kind: String,
        /// What was missing or wrong.
        reason: String,
    },

    /// Transport-level failure (bind, accept, handshake, write).
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgoraError {
    /// Malformed-message error for a known kind.
    #[must_use]
    pub fn malformed(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_display_includes_kind_and_reason() {
        let err = AgoraError::malformed("vote", "missing entityId");
        assert_eq!(err.to_string(), "malformed vote message: missing entityId");
    }

    #[test]
    fn serialization_error_converts() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: AgoraError = parse_err.into();
        assert!(err.to_string().starts_with("serialization error"));
    }
}
