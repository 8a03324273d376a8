//! Shared chain-facing types
//!
//! Canonical types exchanged with the external chain collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest unit of the native currency
pub type Wei = u128;

/// Opaque identifier returned by a transaction submission
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TransactionHandle(String);

impl TransactionHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Build a `0x`-prefixed handle from a raw transaction hash
    pub fn from_hash(hash: &[u8]) -> Self {
        Self(format!("0x{}", hex::encode(hash)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters of a funded randomness request transaction
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestParams {
    /// Upper bound on the oracle callback's execution cost
    pub callback_gas_limit: u64,
}

impl RequestParams {
    pub fn new(callback_gas_limit: u64) -> Self {
        Self { callback_gas_limit }
    }
}

/// Terminal status of a mined transaction
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Receipt reported once a transaction reaches a terminal status
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub handle: TransactionHandle,
    pub status: ReceiptStatus,
    pub block_number: u64,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_from_hash() {
        let handle = TransactionHandle::from_hash(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(handle.as_str(), "0xdeadbeef");
        assert_eq!(handle.to_string(), "0xdeadbeef");
    }

    #[test]
    fn test_receipt_serializes_lowercase_status() {
        let receipt = TransactionReceipt {
            handle: TransactionHandle::new("0x01"),
            status: ReceiptStatus::Reverted,
            block_number: 3,
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["status"], "reverted");
        assert_eq!(json["handle"], "0x01");
        assert!(!receipt.is_success());
    }
}
