//! Receipt notification for mined devnet transactions
//!
//! The miner publishes a `ReceiptEvent` per mined transaction. Waiters
//! register a oneshot per transaction handle; a background task fans events
//! out to them. Recently mined receipts are also kept in a bounded LRU so a
//! waiter that registers after its transaction was mined still resolves.

use crate::common::types::{TransactionHandle, TransactionReceipt};
use crate::errors::ChainError;
use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

const MINED_RECEIPT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1_024) {
    Some(capacity) => capacity,
    None => panic!("mined receipt capacity must be positive"),
};

type Waiter = (u64, oneshot::Sender<TransactionReceipt>);

/// Event emitted when a transaction is mined
#[derive(Clone, Debug)]
pub struct ReceiptEvent {
    pub receipt: TransactionReceipt,
    /// Unix timestamp (milliseconds)
    pub timestamp: u64,
}

/// Errors that can occur while waiting for a receipt
#[derive(Debug, thiserror::Error)]
pub enum ReceiptError {
    #[error("Transaction {handle} not mined within {timeout_ms}ms")]
    Timeout { handle: TransactionHandle, timeout_ms: u64 },

    #[error("Receipt wait cancelled")]
    Cancelled,
}

impl From<ReceiptError> for ChainError {
    fn from(e: ReceiptError) -> Self {
        match e {
            ReceiptError::Timeout { handle, timeout_ms } => ChainError::Timeout { handle, timeout_ms },
            ReceiptError::Cancelled => ChainError::Transport("receipt wait cancelled".to_string()),
        }
    }
}

/// Statistics about pending receipt waiters
#[derive(Debug, Clone)]
pub struct ReceiptStats {
    pub pending_waiters: usize,
    pub mined_receipts: usize,
}

/// Service for waiting on mined transactions
#[derive(Clone)]
pub struct ReceiptWaiter {
    events: broadcast::Sender<ReceiptEvent>,
    pending: Arc<DashMap<TransactionHandle, Vec<Waiter>>>,
    mined: Arc<Mutex<LruCache<TransactionHandle, TransactionReceipt>>>,
    next_waiter_id: Arc<AtomicU64>,
}

impl ReceiptWaiter {
    /// Create a waiter fed by `events`. Must be called inside a Tokio runtime.
    pub fn new(events: broadcast::Sender<ReceiptEvent>) -> Self {
        let waiter = Self {
            events,
            pending: Arc::new(DashMap::new()),
            mined: Arc::new(Mutex::new(LruCache::new(MINED_RECEIPT_CAPACITY))),
            next_waiter_id: Arc::new(AtomicU64::new(0)),
        };
        waiter.spawn_event_processor();
        waiter
    }

    /// Subscribe to the raw stream of receipt events
    pub fn subscribe(&self) -> broadcast::Receiver<ReceiptEvent> {
        self.events.subscribe()
    }

    /// Record a mined receipt and notify its waiters
    pub fn publish(&self, receipt: TransactionReceipt, timestamp: u64) {
        self.lock_mined().put(receipt.handle.clone(), receipt.clone());
        if self.events.send(ReceiptEvent { receipt, timestamp }).is_err() {
            tracing::trace!("No receipt subscribers");
        }
    }

    fn spawn_event_processor(&self) {
        let mut event_rx = self.events.subscribe();
        let pending = self.pending.clone();

        tokio::spawn(async move {
            tracing::debug!("Receipt event processor started");
            loop {
                let event = match event_rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // waiters registering afterwards still find skipped receipts in `mined`
                        tracing::warn!("Receipt processor lagged; skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let handle = &event.receipt.handle;
                if let Some((_, senders)) = pending.remove(handle) {
                    tracing::debug!("Notifying {} waiters for transaction {}", senders.len(), handle);
                    for (_, sender) in senders {
                        if sender.send(event.receipt.clone()).is_err() {
                            tracing::trace!("Waiter for transaction {} already dropped", handle);
                        }
                    }
                }
            }
        });
    }

    /// Wait for `handle` to be mined, up to `timeout`
    pub async fn wait_for_receipt(
        &self,
        handle: &TransactionHandle,
        timeout: Duration,
    ) -> Result<TransactionReceipt, ReceiptError> {
        let (tx, rx) = oneshot::channel();
        let waiter_id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);

        // register before checking `mined` so a concurrent publish is not missed
        self.pending.entry(handle.clone()).or_default().push((waiter_id, tx));
        if let Some(receipt) = self.mined_receipt(handle) {
            self.deregister(handle, waiter_id);
            return Ok(receipt);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(receipt)) => Ok(receipt),
            // sender dropped without a send; the receipt may still have landed
            Ok(Err(_)) => self.mined_receipt(handle).ok_or(ReceiptError::Cancelled),
            Err(_) => {
                self.deregister(handle, waiter_id);
                Err(ReceiptError::Timeout {
                    handle: handle.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Remove one waiter, leaving other waiters on the same handle in place
    fn deregister(&self, handle: &TransactionHandle, waiter_id: u64) {
        if let Some(mut waiters) = self.pending.get_mut(handle) {
            waiters.retain(|(id, _)| *id != waiter_id);
        }
        self.pending.remove_if(handle, |_, waiters| waiters.is_empty());
    }

    fn mined_receipt(&self, handle: &TransactionHandle) -> Option<TransactionReceipt> {
        self.lock_mined().get(handle).cloned()
    }

    fn lock_mined(&self) -> MutexGuard<'_, LruCache<TransactionHandle, TransactionReceipt>> {
        // plain data, so a poisoned lock is still consistent
        self.mined.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_stats(&self) -> ReceiptStats {
        ReceiptStats {
            pending_waiters: self.pending.len(),
            mined_receipts: self.lock_mined().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::ReceiptStatus;

    fn receipt(handle: &str, block_number: u64) -> TransactionReceipt {
        TransactionReceipt {
            handle: TransactionHandle::new(handle),
            status: ReceiptStatus::Success,
            block_number,
        }
    }

    #[tokio::test]
    async fn test_waiter_creation() {
        let (tx, _rx) = broadcast::channel(16);
        let waiter = ReceiptWaiter::new(tx);

        let stats = waiter.get_stats();
        assert_eq!(stats.pending_waiters, 0);
        assert_eq!(stats.mined_receipts, 0);
    }

    #[tokio::test]
    async fn test_wait_for_receipt() {
        let (tx, _rx) = broadcast::channel(16);
        let waiter = ReceiptWaiter::new(tx);

        let publisher = waiter.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            publisher.publish(receipt("0xaa", 4), 1_000);
        });

        let mined = waiter
            .wait_for_receipt(&TransactionHandle::new("0xaa"), Duration::from_secs(1))
            .await
            .expect("receipt");
        assert_eq!(mined.block_number, 4);
    }

    #[tokio::test]
    async fn test_receipt_mined_before_waiting() {
        let (tx, _rx) = broadcast::channel(16);
        let waiter = ReceiptWaiter::new(tx);
        waiter.publish(receipt("0xbb", 9), 1_000);

        let mined = waiter
            .wait_for_receipt(&TransactionHandle::new("0xbb"), Duration::from_millis(100))
            .await
            .expect("receipt");
        assert_eq!(mined.block_number, 9);
        assert_eq!(waiter.get_stats().pending_waiters, 0);
    }

    #[tokio::test]
    async fn test_wait_timeout() {
        let (tx, _rx) = broadcast::channel(16);
        let waiter = ReceiptWaiter::new(tx);

        let result = waiter
            .wait_for_receipt(&TransactionHandle::new("0xcc"), Duration::from_millis(50))
            .await;
        match result {
            Err(ReceiptError::Timeout { handle, timeout_ms }) => {
                assert_eq!(handle.as_str(), "0xcc");
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("Expected timeout error, got {:?}", other),
        }
        assert_eq!(waiter.get_stats().pending_waiters, 0);
    }

    #[tokio::test]
    async fn test_timed_out_waiter_leaves_others_registered() {
        let (tx, _rx) = broadcast::channel(16);
        let waiter = ReceiptWaiter::new(tx);
        let handle = TransactionHandle::new("0xdd");

        let patient = {
            let waiter = waiter.clone();
            let handle = handle.clone();
            tokio::spawn(async move { waiter.wait_for_receipt(&handle, Duration::from_secs(2)).await })
        };
        tokio::task::yield_now().await;

        let impatient = waiter.wait_for_receipt(&handle, Duration::from_millis(10)).await;
        assert!(matches!(impatient, Err(ReceiptError::Timeout { .. })));
        assert_eq!(waiter.get_stats().pending_waiters, 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        waiter.publish(receipt("0xdd", 12), 1_000);

        let mined = patient.await.unwrap().expect("receipt for the remaining waiter");
        assert_eq!(mined.block_number, 12);
        assert_eq!(waiter.get_stats().pending_waiters, 0);
    }

    #[tokio::test]
    async fn test_mined_receipts_are_bounded() {
        let (tx, _rx) = broadcast::channel(16);
        let waiter = ReceiptWaiter::new(tx);

        let total = MINED_RECEIPT_CAPACITY.get() + 10;
        for block in 0..total {
            waiter.publish(receipt(&format!("0x{:04x}", block), block as u64), 1_000);
        }
        assert_eq!(waiter.get_stats().mined_receipts, MINED_RECEIPT_CAPACITY.get());

        // the most recent receipts are still served to late waiters
        let latest = format!("0x{:04x}", total - 1);
        let mined = waiter
            .wait_for_receipt(&TransactionHandle::new(latest), Duration::from_millis(10))
            .await
            .expect("recent receipt");
        assert_eq!(mined.block_number, (total - 1) as u64);
    }
}
