//! VRF Shootout - Verifiable-Randomness Outcome Engine
//!
//! Turns an on-chain verifiable random value into the outcome of a penalty
//! shot. A player commits to a keeper position, a funded randomness request
//! is priced, submitted and confirmed, and the delivered value is reduced to
//! one of three shot positions and reconciled against the commitment.
//!
//! Chain access goes through the collaborator traits in [`common::traits`];
//! [`devnet`] provides an in-process implementation of all of them.

pub mod common;
pub mod config;
pub mod devnet;
pub mod errors;
pub mod games;

pub use common::traits::{
    Collaborators, ConfirmationWaiter, PricingOracle, RandomnessReader, TransactionSubmitter,
};
pub use common::types::{ReceiptStatus, RequestParams, TransactionHandle, TransactionReceipt, Wei};
pub use config::{ConfigLoader, ShootoutConfig};
pub use devnet::DevnetChain;
pub use errors::{ChainError, DeriveError, GameError, RequestError, ShootoutError, ShootoutResult};
pub use games::{
    GameSession, OutcomeDeriver, Outcome, Phase, Position, RandomValue, RandomnessRequest,
    RequestCoordinator, RequestStage, Resolution, RoundRecord, SessionSnapshot, ShotVerdict,
};
