//! Randomness request lifecycle
//!
//! Drives one request through
//! `idle -> pricing -> submitting -> awaiting_confirmation -> awaiting_value -> resolved`
//! and exits into `failed` from any non-terminal stage. There is no retry
//! anywhere in here; every failure is handed back to the caller.

use crate::common::traits::Collaborators;
use crate::common::types::RequestParams;
use crate::errors::{DeriveError, RequestError};
use crate::games::deriver::OutcomeDeriver;
use crate::games::types::{Position, RandomValue, RandomnessRequest, RequestStage, RequestStatus};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Result of a request that reached `resolved`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub request: RandomnessRequest,
    pub value: RandomValue,
    pub position: Position,
}

/// Owns the lifecycle of one randomness request at a time
pub struct RequestCoordinator {
    collaborators: Collaborators,
    stage: Arc<watch::Sender<RequestStage>>,
    request: Option<RandomnessRequest>,
}

impl RequestCoordinator {
    pub fn new(collaborators: Collaborators) -> Self {
        let (stage, _) = watch::channel(RequestStage::Idle);
        Self::with_stage_channel(collaborators, Arc::new(stage))
    }

    /// Publish stage transitions on a channel owned by the caller.
    ///
    /// Resets the channel to `idle`, so the caller must not share it with a
    /// coordinator that is still running.
    pub(crate) fn with_stage_channel(collaborators: Collaborators, stage: Arc<watch::Sender<RequestStage>>) -> Self {
        stage.send_replace(RequestStage::Idle);
        Self {
            collaborators,
            stage,
            request: None,
        }
    }

    pub fn stage(&self) -> RequestStage {
        *self.stage.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestStage> {
        self.stage.subscribe()
    }

    /// The request submitted by the latest run, if submission succeeded
    pub fn request(&self) -> Option<&RandomnessRequest> {
        self.request.as_ref()
    }

    /// Run the full lifecycle and derive the shot position
    pub async fn run(&mut self, gas_budget: u64) -> Result<Resolution, RequestError> {
        self.execute(gas_budget, |request, value| {
            let position = match OutcomeDeriver::derive_position(value.as_bytes()) {
                Ok(position) => position,
                Err(DeriveError::EmptyRandomness) => {
                    return Err(RequestError::EmptyRandomness {
                        handle: request.transaction_handle.clone(),
                    })
                }
            };
            tracing::info!(
                "Request {} resolved: shot {} (first byte {})",
                request.request_id,
                position,
                value.as_bytes()[0]
            );
            Ok(Resolution {
                request: request.clone(),
                value,
                position,
            })
        })
        .await
    }

    /// Run the lifecycle without deriving an outcome, returning the raw value
    pub async fn request_randomness(
        &mut self,
        gas_budget: u64,
    ) -> Result<(RandomnessRequest, RandomValue), RequestError> {
        self.execute(gas_budget, |request, value| Ok((request.clone(), value)))
            .await
    }

    /// Drive one request to a terminal stage, handing the read value to `finish`
    async fn execute<T>(
        &mut self,
        gas_budget: u64,
        finish: impl FnOnce(&RandomnessRequest, RandomValue) -> Result<T, RequestError>,
    ) -> Result<T, RequestError> {
        if self.stage().is_in_flight() {
            return Err(RequestError::AlreadyInFlight);
        }
        self.request = None;

        let mut attempt = Attempt {
            stage: &self.stage,
            request: &mut self.request,
            settled: false,
        };
        let fetched = fetch(&self.collaborators, &mut attempt, gas_budget).await;
        match fetched.and_then(|(request, value)| finish(&request, value)) {
            Ok(resolved) => {
                attempt.settle(RequestStage::Resolved);
                Ok(resolved)
            }
            Err(e) => Err(attempt.fail(e)),
        }
    }
}

/// Everything up to and including the value read
async fn fetch(
    collaborators: &Collaborators,
    attempt: &mut Attempt<'_>,
    gas_budget: u64,
) -> Result<(RandomnessRequest, RandomValue), RequestError> {
    attempt.set_stage(RequestStage::Pricing);
    let price = collaborators
        .pricing
        .price(gas_budget)
        .await
        .map_err(RequestError::PricingUnavailable)?;
    tracing::debug!("Request price for gas budget {}: {} wei", gas_budget, price);

    attempt.set_stage(RequestStage::Submitting);
    let params = RequestParams::new(gas_budget);
    let handle = collaborators
        .submitter
        .submit(&params, price)
        .await
        .map_err(RequestError::SubmissionRejected)?;
    let mut request = RandomnessRequest::submitted(gas_budget, price, handle.clone());
    tracing::debug!("Request {} submitted as transaction {}", request.request_id, handle);
    *attempt.request = Some(request.clone());

    attempt.set_stage(RequestStage::AwaitingConfirmation);
    tracing::info!("Waiting for confirmation of transaction {}", handle);
    let wait_start = Instant::now();
    let receipt = collaborators
        .confirmations
        .await_confirmation(&handle)
        .await
        .map_err(RequestError::ConfirmationUnavailable)?;
    tracing::debug!("Confirmation wait completed in {:?}", wait_start.elapsed());

    if !receipt.is_success() {
        return Err(RequestError::TransactionReverted {
            handle,
            block_number: receipt.block_number,
        });
    }
    request.status = RequestStatus::Confirmed;
    request.block_number = Some(receipt.block_number);
    *attempt.request = Some(request.clone());
    tracing::info!("Transaction {} confirmed in block {}", handle, receipt.block_number);

    attempt.set_stage(RequestStage::AwaitingValue);
    let bytes = collaborators
        .randomness
        .current_value()
        .await
        .map_err(RequestError::RandomnessUnavailable)?;
    let value = match RandomValue::new(bytes) {
        Ok(value) => value,
        Err(DeriveError::EmptyRandomness) => return Err(RequestError::EmptyRandomness { handle }),
    };

    Ok((request, value))
}

/// One request in progress. Dropped unsettled, it moves to `failed`.
struct Attempt<'a> {
    stage: &'a watch::Sender<RequestStage>,
    request: &'a mut Option<RandomnessRequest>,
    settled: bool,
}

impl Attempt<'_> {
    fn set_stage(&self, stage: RequestStage) {
        tracing::trace!("Request stage -> {}", stage);
        self.stage.send_replace(stage);
    }

    fn settle(&mut self, stage: RequestStage) {
        self.settled = true;
        self.set_stage(stage);
    }

    fn mark_failed(&mut self) {
        if let Some(request) = self.request.as_mut() {
            request.status = RequestStatus::Failed;
        }
        self.settle(RequestStage::Failed);
    }

    fn fail(&mut self, error: RequestError) -> RequestError {
        self.mark_failed();
        tracing::warn!("Randomness request failed: {}", error);
        error
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.mark_failed();
            tracing::warn!("Randomness request dropped before it settled");
        }
    }
}
