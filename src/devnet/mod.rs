//! In-process devnet
//!
//! A simulated chain that backs every collaborator trait so the engine can
//! run end-to-end without a network. Submissions are debited from a single
//! player account and mined by a background task after a configurable delay.
//! Paid requests receive signature-derived randomness; underpaid requests
//! revert and are refunded.

pub mod oracle;
pub mod receipts;

pub use oracle::{Fulfilment, RandomnessOracle};
pub use receipts::{ReceiptError, ReceiptEvent, ReceiptStats, ReceiptWaiter};

use crate::common::traits::{
    Collaborators, ConfirmationWaiter, PricingOracle, RandomnessReader, TransactionSubmitter,
};
use crate::common::types::{ReceiptStatus, RequestParams, TransactionHandle, TransactionReceipt, Wei};
use crate::config::DevnetConfig;
use crate::errors::ChainError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

const RECEIPT_CHANNEL_CAPACITY: usize = 256;

/// Randomness delivered to the consumer for one mined request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub handle: TransactionHandle,
    pub block_number: u64,
    pub fulfilment: Fulfilment,
}

/// Simulated chain with a pricing oracle, one funded account and a
/// randomness oracle
#[derive(Clone)]
pub struct DevnetChain {
    inner: Arc<DevnetState>,
}

struct DevnetState {
    config: DevnetConfig,
    balance: Mutex<Wei>,
    gas_price: AtomicU64,
    block_height: AtomicU64,
    nonce: AtomicU64,
    pricing_offline: AtomicBool,
    deliver_empty: AtomicBool,
    oracle: RandomnessOracle,
    latest: RwLock<Option<Delivery>>,
    receipts: ReceiptWaiter,
}

impl DevnetState {
    fn required_payment(&self, gas_budget: u64) -> Wei {
        let gas_price = Wei::from(self.gas_price.load(Ordering::SeqCst));
        Wei::from(self.config.base_fee_wei).saturating_add(Wei::from(gas_budget).saturating_mul(gas_price))
    }
}

impl DevnetChain {
    /// Create a devnet with a fresh oracle key. Must be called inside a Tokio runtime.
    pub fn new(config: DevnetConfig) -> Self {
        Self::with_oracle(config, RandomnessOracle::new_random())
    }

    pub fn with_oracle(config: DevnetConfig, oracle: RandomnessOracle) -> Self {
        let (events, _) = broadcast::channel(RECEIPT_CHANNEL_CAPACITY);
        tracing::info!(
            "Devnet started: oracle key {}, balance {} wei",
            oracle.public_key_hex(),
            config.starting_balance_wei
        );

        Self {
            inner: Arc::new(DevnetState {
                balance: Mutex::new(Wei::from(config.starting_balance_wei)),
                gas_price: AtomicU64::new(config.gas_price_wei),
                block_height: AtomicU64::new(0),
                nonce: AtomicU64::new(0),
                pricing_offline: AtomicBool::new(false),
                deliver_empty: AtomicBool::new(false),
                oracle,
                latest: RwLock::new(None),
                receipts: ReceiptWaiter::new(events),
                config,
            }),
        }
    }

    /// All four collaborators backed by this devnet
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::from_shared(Arc::new(self.clone()))
    }

    pub async fn balance(&self) -> Wei {
        *self.inner.balance.lock().await
    }

    pub fn block_height(&self) -> u64 {
        self.inner.block_height.load(Ordering::SeqCst)
    }

    /// Change the gas price. Requests already priced but not yet mined are
    /// charged against the new price.
    pub fn set_gas_price(&self, gas_price_wei: u64) {
        self.inner.gas_price.store(gas_price_wei, Ordering::SeqCst);
    }

    /// Make the pricing oracle unreachable
    pub fn set_pricing_offline(&self, offline: bool) {
        self.inner.pricing_offline.store(offline, Ordering::SeqCst);
    }

    /// Make the consumer report an empty value after delivery
    pub fn set_deliver_empty(&self, empty: bool) {
        self.inner.deliver_empty.store(empty, Ordering::SeqCst);
    }

    pub async fn latest_delivery(&self) -> Option<Delivery> {
        self.inner.latest.read().await.clone()
    }

    /// Check a delivery against its proof and the oracle key
    pub fn verify_delivery(&self, delivery: &Delivery) -> bool {
        delivery.fulfilment.public_key == self.inner.oracle.public_key()
            && RandomnessOracle::verify(&delivery.fulfilment)
    }

    pub fn receipt_stats(&self) -> ReceiptStats {
        self.inner.receipts.get_stats()
    }

    /// Subscribe to mined transaction receipts
    pub fn subscribe_receipts(&self) -> broadcast::Receiver<ReceiptEvent> {
        self.inner.receipts.subscribe()
    }
}

async fn mine(state: Arc<DevnetState>, handle: TransactionHandle, params: RequestParams, payment: Wei) {
    tokio::time::sleep(state.config.confirmation_delay()).await;

    let block_number = state.block_height.fetch_add(1, Ordering::SeqCst) + 1;
    let required = state.required_payment(params.callback_gas_limit);

    let status = if payment < required {
        tracing::warn!(
            "Transaction {} reverted in block {}: paid {} wei, {} required",
            handle,
            block_number,
            payment,
            required
        );
        let mut balance = state.balance.lock().await;
        *balance = balance.saturating_add(payment);
        ReceiptStatus::Reverted
    } else {
        let input_message = format!("{}:{}:{}", handle, block_number, params.callback_gas_limit);
        let fulfilment = state.oracle.fulfil(input_message);
        tracing::debug!(
            "Delivered randomness 0x{} for transaction {}",
            hex::encode(&fulfilment.output),
            handle
        );
        *state.latest.write().await = Some(Delivery {
            handle: handle.clone(),
            block_number,
            fulfilment,
        });
        ReceiptStatus::Success
    };

    let timestamp = chrono::Utc::now().timestamp_millis().max(0) as u64;
    state.receipts.publish(
        TransactionReceipt {
            handle,
            status,
            block_number,
        },
        timestamp,
    );
}

#[async_trait]
impl PricingOracle for DevnetChain {
    async fn price(&self, gas_budget: u64) -> Result<Wei, ChainError> {
        if self.inner.pricing_offline.load(Ordering::SeqCst) {
            return Err(ChainError::Unreachable("pricing oracle offline".to_string()));
        }
        Ok(self.inner.required_payment(gas_budget))
    }
}

#[async_trait]
impl TransactionSubmitter for DevnetChain {
    async fn submit(&self, params: &RequestParams, payment: Wei) -> Result<TransactionHandle, ChainError> {
        if params.callback_gas_limit == 0 {
            return Err(ChainError::Rejected("callback gas limit must be positive".to_string()));
        }

        {
            let mut balance = self.inner.balance.lock().await;
            if payment > *balance {
                return Err(ChainError::InsufficientFunds {
                    required: payment,
                    available: *balance,
                });
            }
            *balance -= payment;
        }

        let nonce = self.inner.nonce.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(nonce.to_be_bytes());
        hasher.update(params.callback_gas_limit.to_be_bytes());
        hasher.update(payment.to_be_bytes());
        hasher.update(self.inner.oracle.public_key());
        let handle = TransactionHandle::from_hash(&hasher.finalize());

        tracing::debug!("Accepted transaction {} paying {} wei", handle, payment);
        tokio::spawn(mine(self.inner.clone(), handle.clone(), params.clone(), payment));
        Ok(handle)
    }
}

#[async_trait]
impl ConfirmationWaiter for DevnetChain {
    async fn await_confirmation(&self, handle: &TransactionHandle) -> Result<TransactionReceipt, ChainError> {
        let receipt = self
            .inner
            .receipts
            .wait_for_receipt(handle, self.inner.config.confirmation_timeout())
            .await?;
        Ok(receipt)
    }
}

#[async_trait]
impl RandomnessReader for DevnetChain {
    async fn current_value(&self) -> Result<Vec<u8>, ChainError> {
        if self.inner.deliver_empty.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        let latest = self.inner.latest.read().await;
        Ok(latest
            .as_ref()
            .map(|delivery| delivery.fulfilment.output.clone())
            .unwrap_or_default())
    }
}
