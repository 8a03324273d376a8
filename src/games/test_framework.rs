//! Scriptable chain collaborators for exercising the engine
//!
//! `ScriptedChain` implements every collaborator trait with canned answers
//! and records the calls it receives, so tests can drive each failure path
//! of a request deterministically.

use crate::common::traits::{
    Collaborators, ConfirmationWaiter, PricingOracle, RandomnessReader, TransactionSubmitter,
};
use crate::common::types::{ReceiptStatus, RequestParams, TransactionHandle, TransactionReceipt, Wei};
use crate::errors::ChainError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// A call observed by the scripted chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainCall {
    Price { gas_budget: u64 },
    Submit { gas_budget: u64, payment: Wei },
    AwaitConfirmation { handle: TransactionHandle },
    ReadRandomness,
}

#[derive(Debug, Clone)]
struct Script {
    price: Result<Wei, ChainError>,
    submission: Result<TransactionHandle, ChainError>,
    confirmation: Result<ReceiptStatus, ChainError>,
    randomness: Result<Vec<u8>, ChainError>,
    block_number: u64,
}

/// Chain double with scripted answers
pub struct ScriptedChain {
    script: Mutex<Script>,
    calls: Mutex<Vec<ChainCall>>,
    confirmation_gate: Option<Arc<Notify>>,
}

impl ScriptedChain {
    /// Everything succeeds: price 1000, handle `0x01`, randomness `[1]`
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                price: Ok(1_000),
                submission: Ok(TransactionHandle::new("0x01")),
                confirmation: Ok(ReceiptStatus::Success),
                randomness: Ok(vec![1]),
                block_number: 1,
            }),
            calls: Mutex::new(Vec::new()),
            confirmation_gate: None,
        }
    }

    pub fn with_price(self, price: Wei) -> Self {
        self.edit(|s| s.price = Ok(price))
    }

    pub fn with_price_error(self, error: ChainError) -> Self {
        self.edit(|s| s.price = Err(error))
    }

    pub fn with_submission_error(self, error: ChainError) -> Self {
        self.edit(|s| s.submission = Err(error))
    }

    pub fn with_revert(self) -> Self {
        self.edit(|s| s.confirmation = Ok(ReceiptStatus::Reverted))
    }

    pub fn with_confirmation_error(self, error: ChainError) -> Self {
        self.edit(|s| s.confirmation = Err(error))
    }

    pub fn with_randomness(self, bytes: Vec<u8>) -> Self {
        self.edit(|s| s.randomness = Ok(bytes))
    }

    pub fn with_randomness_error(self, error: ChainError) -> Self {
        self.edit(|s| s.randomness = Err(error))
    }

    /// Hold every confirmation until the returned gate is notified
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.confirmation_gate = Some(gate.clone());
        (self, gate)
    }

    /// Wrap into collaborators while keeping a handle for assertions
    pub fn into_collaborators(self) -> (Arc<Self>, Collaborators) {
        let chain = Arc::new(self);
        let collaborators = Collaborators::from_shared(chain.clone());
        (chain, collaborators)
    }

    pub fn set_submission(&self, submission: Result<TransactionHandle, ChainError>) {
        self.lock_script().submission = submission;
    }

    pub fn set_randomness(&self, randomness: Result<Vec<u8>, ChainError>) {
        self.lock_script().randomness = randomness;
    }

    pub fn calls(&self) -> Vec<ChainCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn edit(self, change: impl FnOnce(&mut Script)) -> Self {
        change(&mut self.lock_script());
        self
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, Script> {
        // a poisoned script is still usable: the data is plain values
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: ChainCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl Default for ScriptedChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PricingOracle for ScriptedChain {
    async fn price(&self, gas_budget: u64) -> Result<Wei, ChainError> {
        self.record(ChainCall::Price { gas_budget });
        self.lock_script().price.clone()
    }
}

#[async_trait]
impl TransactionSubmitter for ScriptedChain {
    async fn submit(&self, params: &RequestParams, payment: Wei) -> Result<TransactionHandle, ChainError> {
        self.record(ChainCall::Submit {
            gas_budget: params.callback_gas_limit,
            payment,
        });
        self.lock_script().submission.clone()
    }
}

#[async_trait]
impl ConfirmationWaiter for ScriptedChain {
    async fn await_confirmation(&self, handle: &TransactionHandle) -> Result<TransactionReceipt, ChainError> {
        self.record(ChainCall::AwaitConfirmation {
            handle: handle.clone(),
        });
        if let Some(gate) = &self.confirmation_gate {
            gate.notified().await;
        }

        let (confirmation, block_number) = {
            let script = self.lock_script();
            (script.confirmation.clone(), script.block_number)
        };
        confirmation.map(|status| TransactionReceipt {
            handle: handle.clone(),
            status,
            block_number,
        })
    }
}

#[async_trait]
impl RandomnessReader for ScriptedChain {
    async fn current_value(&self) -> Result<Vec<u8>, ChainError> {
        self.record(ChainCall::ReadRandomness);
        self.lock_script().randomness.clone()
    }
}
