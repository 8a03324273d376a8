//! Game session state machine
//!
//! Phases: `setup -> requesting -> resolved`, and back to `setup` on reset.
//! All state lives in a `watch` channel so a presentation layer can
//! subscribe to phase and outcome changes without the engine knowing about
//! rendering. Transitions happen only on `commit`, `shoot`, `reset` and on
//! resolution of the shot started by `shoot`.

use crate::common::traits::Collaborators;
use crate::config::RequestConfig;
use crate::errors::{GameError, RequestError};
use crate::games::coordinator::{RequestCoordinator, Resolution};
use crate::games::types::{
    Outcome, Phase, Position, RandomValue, RandomnessRequest, RequestStage, RoundRecord,
};
use std::sync::Arc;
use tokio::sync::watch;

/// Observable state of a game session
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub committed_choice: Option<Position>,
    /// Present only once the request confirmed and resolved
    pub request: Option<RandomnessRequest>,
    pub randomness: Option<RandomValue>,
    pub outcome: Option<Outcome>,
    /// Last request failure, cleared by the next commit, shot or reset
    pub last_error: Option<GameError>,
    epoch: u64,
    request_active: bool,
}

impl SessionSnapshot {
    fn is_pristine(&self) -> bool {
        self.phase == Phase::Setup
            && self.committed_choice.is_none()
            && self.request.is_none()
            && self.randomness.is_none()
            && self.outcome.is_none()
            && self.last_error.is_none()
    }

    /// Admit a shot, moving to `requesting`. Leaves state untouched on error.
    fn admit_shot(&mut self) -> Result<(Position, u64), GameError> {
        if self.phase == Phase::Requesting || self.request_active {
            return Err(GameError::RequestAlreadyInFlight);
        }
        if self.phase == Phase::Resolved {
            return Err(GameError::AlreadyResolved);
        }
        let committed = self.committed_choice.ok_or(GameError::NoCommitment)?;

        self.phase = Phase::Requesting;
        self.request_active = true;
        self.request = None;
        self.randomness = None;
        self.outcome = None;
        self.last_error = None;
        Ok((committed, self.epoch))
    }
}

/// One player's penalty round: commitment, shot and result
pub struct GameSession {
    collaborators: Collaborators,
    gas_budget: u64,
    state: watch::Sender<SessionSnapshot>,
    stage: Arc<watch::Sender<RequestStage>>,
}

impl GameSession {
    pub fn new(collaborators: Collaborators, config: &RequestConfig) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        let (stage, _) = watch::channel(RequestStage::Idle);
        Self {
            collaborators,
            gas_budget: config.callback_gas_limit,
            state,
            stage: Arc::new(stage),
        }
    }

    /// Select the keeper's position. The latest selection before the shot wins.
    pub fn commit(&self, choice: Position) -> Result<(), GameError> {
        let mut result = Ok(());
        self.state.send_if_modified(|s| match s.phase {
            Phase::Setup => {
                let changed = s.committed_choice != Some(choice) || s.last_error.is_some();
                s.committed_choice = Some(choice);
                s.last_error = None;
                changed
            }
            Phase::Requesting => {
                result = Err(GameError::RequestAlreadyInFlight);
                false
            }
            Phase::Resolved => {
                result = Err(GameError::AlreadyResolved);
                false
            }
        });
        if result.is_ok() {
            tracing::debug!("Keeper committed to {}", choice);
        }
        result
    }

    /// Take the shot and wait for its outcome.
    ///
    /// Suspends while the request is confirmed and while the value is read.
    /// Any request failure returns the session to `setup` with the commitment
    /// kept and no request attached.
    pub async fn shoot(&self) -> Result<Outcome, GameError> {
        let mut admission = Err(GameError::NoCommitment);
        self.state.send_if_modified(|s| {
            admission = s.admit_shot();
            admission.is_ok()
        });
        let (committed, epoch) = admission.map_err(|e| {
            tracing::debug!("Shot rejected: {}", e);
            e
        })?;
        tracing::info!("Shot taken with keeper on {}", committed);

        let mut guard = InFlightGuard {
            session: self,
            epoch,
            settled: false,
        };
        let mut coordinator = RequestCoordinator::with_stage_channel(self.collaborators.clone(), self.stage.clone());
        let result = coordinator.run(self.gas_budget).await;
        guard.settled = true;

        self.settle(epoch, committed, result)
    }

    /// Start a new game: discard request, value, outcome and commitment.
    ///
    /// A reset while a shot is in flight detaches the session from that
    /// shot; its late resolution is discarded.
    pub fn reset(&self) {
        self.state.send_if_modified(|s| {
            if s.is_pristine() {
                return false;
            }
            if s.phase == Phase::Requesting {
                tracing::warn!("Session reset while a shot is in flight; its result will be discarded");
            }
            s.phase = Phase::Setup;
            s.committed_choice = None;
            s.request = None;
            s.randomness = None;
            s.outcome = None;
            s.last_error = None;
            s.epoch += 1;
            true
        });
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    pub fn committed_choice(&self) -> Option<Position> {
        self.state.borrow().committed_choice
    }

    pub fn derived_outcome(&self) -> Option<Outcome> {
        self.state.borrow().outcome
    }

    pub fn request(&self) -> Option<RandomnessRequest> {
        self.state.borrow().request.clone()
    }

    pub fn last_error(&self) -> Option<GameError> {
        self.state.borrow().last_error.clone()
    }

    pub fn request_stage(&self) -> RequestStage {
        *self.stage.borrow()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Receive every phase, commitment and outcome change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Receive request stage changes of the current shot
    pub fn subscribe_stage(&self) -> watch::Receiver<RequestStage> {
        self.stage.subscribe()
    }

    /// Full record of the resolved round, if any
    pub fn round_record(&self) -> Option<RoundRecord> {
        let state = self.state.borrow();
        let keeper = state.committed_choice?;
        let outcome = state.outcome?;
        let request = state.request.clone()?;
        let randomness = state.randomness.as_ref()?.to_hex();
        Some(RoundRecord {
            keeper,
            shot: outcome.position,
            verdict: outcome.verdict(),
            randomness,
            request,
        })
    }

    fn settle(
        &self,
        epoch: u64,
        committed: Position,
        result: Result<Resolution, RequestError>,
    ) -> Result<Outcome, GameError> {
        let mut settled = Err(GameError::Abandoned);
        self.state.send_modify(|s| {
            s.request_active = false;
            if s.epoch != epoch {
                return;
            }
            settled = match result {
                Ok(resolution) => {
                    let outcome = Outcome::reconcile(resolution.position, committed);
                    s.phase = Phase::Resolved;
                    s.request = Some(resolution.request);
                    s.randomness = Some(resolution.value);
                    s.outcome = Some(outcome);
                    Ok(outcome)
                }
                Err(e) => {
                    let error = GameError::from(e);
                    s.phase = Phase::Setup;
                    s.request = None;
                    s.randomness = None;
                    s.last_error = Some(error.clone());
                    Err(error)
                }
            };
        });

        match &settled {
            Ok(outcome) => tracing::info!(
                "Shot went {} with keeper on {}: {}",
                outcome.position,
                committed,
                outcome.verdict()
            ),
            Err(GameError::Abandoned) => {
                tracing::warn!("Discarding result of a shot abandoned by reset")
            }
            Err(e) => tracing::warn!("Shot failed: {}", e),
        }
        settled
    }

    /// The shot future was dropped before settling
    fn abandon(&self, epoch: u64) {
        self.state.send_modify(|s| {
            s.request_active = false;
            if s.epoch == epoch && s.phase == Phase::Requesting {
                s.phase = Phase::Setup;
                s.request = None;
                s.last_error = Some(GameError::Abandoned);
                tracing::warn!("Shot dropped before it resolved; session returned to setup");
            }
        });
    }
}

/// Releases the in-flight slot if `shoot` is cancelled mid-await
struct InFlightGuard<'a> {
    session: &'a GameSession,
    epoch: u64,
    settled: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.session.abandon(self.epoch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ChainError;
    use crate::games::test_framework::ScriptedChain;

    fn session_with(chain: ScriptedChain) -> (Arc<ScriptedChain>, GameSession) {
        let (chain, collaborators) = chain.into_collaborators();
        (chain, GameSession::new(collaborators, &RequestConfig::default()))
    }

    #[test]
    fn test_commit_overwrites() {
        let (_, session) = session_with(ScriptedChain::new());
        session.commit(Position::Left).unwrap();
        session.commit(Position::Right).unwrap();
        assert_eq!(session.committed_choice(), Some(Position::Right));
        assert_eq!(session.phase(), Phase::Setup);
    }

    #[tokio::test]
    async fn test_failure_keeps_commitment_and_records_error() {
        let chain = ScriptedChain::new().with_price_error(ChainError::Unreachable("down".to_string()));
        let (_, session) = session_with(chain);
        session.commit(Position::Center).unwrap();

        let err = session.shoot().await.unwrap_err();
        assert!(matches!(
            err,
            GameError::Request(RequestError::PricingUnavailable(_))
        ));
        assert_eq!(session.phase(), Phase::Setup);
        assert_eq!(session.committed_choice(), Some(Position::Center));
        assert_eq!(session.last_error(), Some(err));
        assert!(session.request().is_none());

        // a new commit clears the surfaced error
        session.commit(Position::Center).unwrap();
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_shoot_after_resolution_requires_reset() {
        let (_, session) = session_with(ScriptedChain::new());
        session.commit(Position::Left).unwrap();
        session.shoot().await.unwrap();

        assert_eq!(session.shoot().await, Err(GameError::AlreadyResolved));
        assert_eq!(session.commit(Position::Right), Err(GameError::AlreadyResolved));
        assert_eq!(session.phase(), Phase::Resolved);
        assert_eq!(session.committed_choice(), Some(Position::Left));
    }

    #[tokio::test]
    async fn test_round_record() {
        let (_, session) = session_with(ScriptedChain::new().with_randomness(vec![0x05, 0xaa]));
        session.commit(Position::Right).unwrap();
        session.shoot().await.unwrap();

        let record = session.round_record().expect("resolved round");
        assert_eq!(record.keeper, Position::Right);
        assert_eq!(record.shot, Position::Right);
        assert_eq!(record.randomness, "0x05aa");
        assert_eq!(record.verdict, crate::games::types::ShotVerdict::Save);
    }

    #[tokio::test]
    async fn test_dropped_shot_returns_to_setup() {
        let (chain, gate) = ScriptedChain::new().gated();
        let (_, session) = session_with(chain);
        session.commit(Position::Left).unwrap();

        {
            let shot = session.shoot();
            // the gate is not released in time, so the timeout drops the future
            let timed_out = tokio::time::timeout(std::time::Duration::from_millis(20), shot).await;
            assert!(timed_out.is_err());
        }

        assert_eq!(session.phase(), Phase::Setup);
        assert_eq!(session.last_error(), Some(GameError::Abandoned));
        assert!(!session.snapshot().request_active);
        assert_eq!(session.request_stage(), RequestStage::Failed);

        // the next shot is admitted and runs to completion
        gate.notify_one();
        assert!(session.shoot().await.is_ok());
        assert_eq!(session.phase(), Phase::Resolved);
    }
}
