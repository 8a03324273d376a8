use crate::common::types::{TransactionHandle, Wei};
use crate::errors::DeriveError;
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Goal position the keeper dives to and the shot lands in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Center,
    Right,
}

impl Position {
    /// Fixed ordering used to map derived indices to positions
    pub const ALL: [Position; 3] = [Position::Left, Position::Center, Position::Right];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            Position::Left => 0,
            Position::Center => 1,
            Position::Right => 2,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Left => write!(f, "left"),
            Position::Center => write!(f, "center"),
            Position::Right => write!(f, "right"),
        }
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Position::Left),
            "center" | "centre" | "c" => Ok(Position::Center),
            "right" | "r" => Ok(Position::Right),
            other => Err(format!("Unknown position '{}' (expected left, center or right)", other)),
        }
    }
}

/// What the crowd sees: a save when the keeper guessed right
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShotVerdict {
    Goal,
    Save,
}

impl fmt::Display for ShotVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShotVerdict::Goal => write!(f, "GOAL"),
            ShotVerdict::Save => write!(f, "SAVE"),
        }
    }
}

/// Derived position reconciled against the commitment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outcome {
    pub position: Position,
    pub is_match: bool,
}

impl Outcome {
    pub fn reconcile(derived: Position, committed: Position) -> Self {
        Self {
            position: derived,
            is_match: derived == committed,
        }
    }

    pub fn verdict(&self) -> ShotVerdict {
        if self.is_match {
            ShotVerdict::Save
        } else {
            ShotVerdict::Goal
        }
    }
}

/// Raw bytes delivered by the randomness oracle. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct RandomValue(Vec<u8>);

impl RandomValue {
    pub fn new(bytes: Vec<u8>) -> Result<Self, DeriveError> {
        if bytes.is_empty() {
            return Err(DeriveError::EmptyRandomness);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }

    /// Render the bytes as an unsigned big-endian integer in base 10
    pub fn to_decimal_string(&self) -> String {
        BigUint::from_bytes_be(&self.0).to_string()
    }
}

impl TryFrom<Vec<u8>> for RandomValue {
    type Error = DeriveError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(bytes)
    }
}

impl From<RandomValue> for Vec<u8> {
    fn from(value: RandomValue) -> Self {
        value.0
    }
}

/// Status of a submitted randomness request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Submitted,
    Confirmed,
    Failed,
}

/// One funded randomness request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RandomnessRequest {
    pub request_id: Uuid,
    pub gas_budget: u64,
    /// Paid atomically with the submission
    pub price: Wei,
    pub transaction_handle: TransactionHandle,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub submitted_at: DateTime<Utc>,
}

impl RandomnessRequest {
    pub fn submitted(gas_budget: u64, price: Wei, transaction_handle: TransactionHandle) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            gas_budget,
            price,
            transaction_handle,
            status: RequestStatus::Submitted,
            block_number: None,
            submitted_at: Utc::now(),
        }
    }
}

/// Lifecycle stage of a request inside the coordinator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    Idle,
    Pricing,
    Submitting,
    AwaitingConfirmation,
    AwaitingValue,
    Resolved,
    Failed,
}

impl RequestStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStage::Resolved | RequestStage::Failed)
    }

    pub fn is_in_flight(self) -> bool {
        !self.is_terminal() && self != RequestStage::Idle
    }
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStage::Idle => "idle",
            RequestStage::Pricing => "pricing",
            RequestStage::Submitting => "submitting",
            RequestStage::AwaitingConfirmation => "awaiting_confirmation",
            RequestStage::AwaitingValue => "awaiting_value",
            RequestStage::Resolved => "resolved",
            RequestStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Session phase exposed to the presentation layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Setup,
    Requesting,
    Resolved,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Setup => write!(f, "setup"),
            Phase::Requesting => write!(f, "requesting"),
            Phase::Resolved => write!(f, "resolved"),
        }
    }
}

/// Complete record of a resolved round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub keeper: Position,
    pub shot: Position,
    pub verdict: ShotVerdict,
    /// Hex-encoded randomness the shot was derived from
    pub randomness: String,
    pub request: RandomnessRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_ordering() {
        assert_eq!(Position::from_index(0), Some(Position::Left));
        assert_eq!(Position::from_index(1), Some(Position::Center));
        assert_eq!(Position::from_index(2), Some(Position::Right));
        assert_eq!(Position::from_index(3), None);
        for position in Position::ALL {
            assert_eq!(Position::from_index(position.index()), Some(position));
        }
    }

    #[test]
    fn test_position_parse() {
        assert_eq!("Left".parse::<Position>(), Ok(Position::Left));
        assert_eq!("centre".parse::<Position>(), Ok(Position::Center));
        assert!("top".parse::<Position>().is_err());
    }

    #[test]
    fn test_outcome_verdict() {
        let save = Outcome::reconcile(Position::Center, Position::Center);
        assert!(save.is_match);
        assert_eq!(save.verdict(), ShotVerdict::Save);

        let goal = Outcome::reconcile(Position::Center, Position::Left);
        assert!(!goal.is_match);
        assert_eq!(goal.verdict(), ShotVerdict::Goal);
    }

    #[test]
    fn test_random_value_rejects_empty() {
        assert_eq!(RandomValue::new(vec![]), Err(DeriveError::EmptyRandomness));
        assert!(serde_json::from_str::<RandomValue>("[]").is_err());
        assert!(serde_json::from_str::<RandomValue>("[7]").is_ok());
    }

    #[test]
    fn test_random_value_decimal_rendering() {
        let value = RandomValue::new(vec![1, 0]).unwrap();
        assert_eq!(value.to_decimal_string(), "256");
        assert_eq!(value.to_hex(), "0x0100");

        let value = RandomValue::new(vec![0]).unwrap();
        assert_eq!(value.to_decimal_string(), "0");

        let value = RandomValue::new(vec![0xff; 16]).unwrap();
        assert_eq!(value.to_decimal_string(), u128::MAX.to_string());

        let value = RandomValue::new(vec![0x00, 0x00, 0x3b, 0x9a, 0xca, 0x00]).unwrap();
        assert_eq!(value.to_decimal_string(), "1000000000");

        // wider than any native integer
        let mut bytes = vec![1];
        bytes.extend([0u8; 16]);
        let value = RandomValue::new(bytes).unwrap();
        assert_eq!(value.to_decimal_string(), "340282366920938463463374607431768211456");
    }

    #[test]
    fn test_request_stage_flags() {
        assert!(!RequestStage::Idle.is_in_flight());
        assert!(RequestStage::AwaitingConfirmation.is_in_flight());
        assert!(RequestStage::Failed.is_terminal());
        assert!(!RequestStage::Resolved.is_in_flight());
    }
}
