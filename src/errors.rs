//! Error types for the shootout engine
//!
//! One enum per concern. Collaborator failures (`ChainError`) are wrapped by
//! the request lifecycle (`RequestError`), which in turn is surfaced by the
//! game session (`GameError`). `ShootoutError` is the root used by binaries.

use crate::common::types::TransactionHandle;

/// Failures reported by the external chain collaborators
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Rejected by node: {0}")]
    Rejected(String),

    #[error("Insufficient funds: required {required} wei, available {available} wei")]
    InsufficientFunds { required: u128, available: u128 },

    #[error("User declined the transaction")]
    UserDeclined,

    #[error("Transaction {handle} not confirmed within {timeout_ms}ms")]
    Timeout { handle: TransactionHandle, timeout_ms: u64 },

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Failures of the outcome derivation precondition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeriveError {
    #[error("Randomness value is empty")]
    EmptyRandomness,
}

/// Failures of a single randomness request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("A randomness request is already in flight")]
    AlreadyInFlight,

    #[error("Pricing unavailable: {0}")]
    PricingUnavailable(ChainError),

    #[error("Submission rejected: {0}")]
    SubmissionRejected(ChainError),

    #[error("Transaction {handle} reverted in block {block_number}")]
    TransactionReverted {
        handle: TransactionHandle,
        block_number: u64,
    },

    /// The waiter gave up before a receipt was seen (transport timeout).
    #[error("Confirmation unavailable: {0}")]
    ConfirmationUnavailable(ChainError),

    #[error("Randomness read failed: {0}")]
    RandomnessUnavailable(ChainError),

    #[error("Empty randomness delivered for transaction {handle}")]
    EmptyRandomness { handle: TransactionHandle },
}

/// Session-level failures surfaced to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("No position committed")]
    NoCommitment,

    #[error("A shot is already in flight")]
    RequestAlreadyInFlight,

    #[error("Round already resolved; reset to play again")]
    AlreadyResolved,

    #[error("Session was reset while the request was in flight")]
    Abandoned,

    #[error(transparent)]
    Request(#[from] RequestError),
}

impl GameError {
    /// Message suitable for showing to the player
    pub fn user_message(&self) -> &'static str {
        match self {
            GameError::NoCommitment => "Please select a position for the goalkeeper first!",
            GameError::RequestAlreadyInFlight => "A shot is already on its way. Please wait.",
            GameError::AlreadyResolved => "This round is over. Reset the game to play again.",
            GameError::Abandoned => "The game was reset before the shot landed.",
            GameError::Request(RequestError::EmptyRandomness { .. }) => {
                "Failed to generate random number. Please try again."
            }
            GameError::Request(_) => "Failed to take penalty shot. Please try again.",
        }
    }

    /// True for caller misuse that leaves the session untouched
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            GameError::NoCommitment | GameError::RequestAlreadyInFlight | GameError::AlreadyResolved
        )
    }
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Root error type for binaries and top-level wiring
#[derive(Debug, thiserror::Error)]
pub enum ShootoutError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Game error: {0}")]
    Game(#[from] GameError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ShootoutResult<T> = Result<T, ShootoutError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = RequestError::TransactionReverted {
            handle: TransactionHandle::new("0xabc"),
            block_number: 7,
        };
        assert!(err.to_string().contains("0xabc"));
        assert!(err.to_string().contains("block 7"));
    }

    #[test]
    fn test_user_messages() {
        let empty = GameError::from(RequestError::EmptyRandomness {
            handle: TransactionHandle::new("0x1"),
        });
        assert_eq!(
            empty.user_message(),
            "Failed to generate random number. Please try again."
        );

        let rejected = GameError::from(RequestError::SubmissionRejected(ChainError::UserDeclined));
        assert_eq!(
            rejected.user_message(),
            "Failed to take penalty shot. Please try again."
        );
        assert!(!rejected.is_misuse());
        assert!(GameError::NoCommitment.is_misuse());
    }

    #[test]
    fn test_error_source() {
        let err = ShootoutError::from(ConfigurationError::LoadFailed("test".to_string()));
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.source().is_some());
    }
}
