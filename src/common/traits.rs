//! External collaborator interfaces
//!
//! The engine only consumes these capabilities. Real deployments back them
//! with an RPC client and a wallet; tests and the CLI use the in-process
//! devnet or scripted mocks.

use crate::common::types::{RequestParams, TransactionHandle, TransactionReceipt, Wei};
use crate::errors::ChainError;
use async_trait::async_trait;
use std::sync::Arc;

/// Quotes the cost of funding a randomness request
#[async_trait]
pub trait PricingOracle: Send + Sync {
    /// Price in wei of a request whose callback may use `gas_budget` gas
    async fn price(&self, gas_budget: u64) -> Result<Wei, ChainError>;
}

/// Submits the funded request transaction
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Submit `params` with `payment` attached; returns the transaction handle
    async fn submit(&self, params: &RequestParams, payment: Wei) -> Result<TransactionHandle, ChainError>;
}

/// Waits for a submitted transaction to reach a terminal status
#[async_trait]
pub trait ConfirmationWaiter: Send + Sync {
    /// Resolves once per handle with either a success or a revert receipt.
    /// Timeouts, if any, are reported as `ChainError::Timeout`.
    async fn await_confirmation(&self, handle: &TransactionHandle) -> Result<TransactionReceipt, ChainError>;
}

/// Reads the most recently delivered random value
#[async_trait]
pub trait RandomnessReader: Send + Sync {
    async fn current_value(&self) -> Result<Vec<u8>, ChainError>;
}

/// The full set of collaborators a request needs
#[derive(Clone)]
pub struct Collaborators {
    pub pricing: Arc<dyn PricingOracle>,
    pub submitter: Arc<dyn TransactionSubmitter>,
    pub confirmations: Arc<dyn ConfirmationWaiter>,
    pub randomness: Arc<dyn RandomnessReader>,
}

impl Collaborators {
    pub fn new(
        pricing: Arc<dyn PricingOracle>,
        submitter: Arc<dyn TransactionSubmitter>,
        confirmations: Arc<dyn ConfirmationWaiter>,
        randomness: Arc<dyn RandomnessReader>,
    ) -> Self {
        Self {
            pricing,
            submitter,
            confirmations,
            randomness,
        }
    }

    /// Use one value that implements every collaborator trait
    pub fn from_shared<C>(chain: Arc<C>) -> Self
    where
        C: PricingOracle + TransactionSubmitter + ConfirmationWaiter + RandomnessReader + 'static,
    {
        Self {
            pricing: chain.clone(),
            submitter: chain.clone(),
            confirmations: chain.clone(),
            randomness: chain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::ReceiptStatus;

    // Mock implementation for testing
    struct FixedChain;

    #[async_trait]
    impl PricingOracle for FixedChain {
        async fn price(&self, gas_budget: u64) -> Result<Wei, ChainError> {
            Ok(gas_budget as Wei * 2)
        }
    }

    #[async_trait]
    impl TransactionSubmitter for FixedChain {
        async fn submit(&self, _params: &RequestParams, _payment: Wei) -> Result<TransactionHandle, ChainError> {
            Ok(TransactionHandle::new("0x01"))
        }
    }

    #[async_trait]
    impl ConfirmationWaiter for FixedChain {
        async fn await_confirmation(&self, handle: &TransactionHandle) -> Result<TransactionReceipt, ChainError> {
            Ok(TransactionReceipt {
                handle: handle.clone(),
                status: ReceiptStatus::Success,
                block_number: 1,
            })
        }
    }

    #[async_trait]
    impl RandomnessReader for FixedChain {
        async fn current_value(&self) -> Result<Vec<u8>, ChainError> {
            Ok(vec![42])
        }
    }

    #[tokio::test]
    async fn test_collaborators_from_shared() {
        let collaborators = Collaborators::from_shared(Arc::new(FixedChain));
        assert_eq!(collaborators.pricing.price(10).await.unwrap(), 20);

        let handle = collaborators
            .submitter
            .submit(&RequestParams::new(10), 20)
            .await
            .unwrap();
        let receipt = collaborators.confirmations.await_confirmation(&handle).await.unwrap();
        assert!(receipt.is_success());
        assert_eq!(collaborators.randomness.current_value().await.unwrap(), vec![42]);
    }
}
