use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::common::SuccessResponse;

/// Transfer facts confirmed against the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedTransfer {
    pub amount: Decimal,
    pub sender: String,
    pub recipient: String,
    pub confirmations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "code")]
pub enum RejectionReason {
    NetworkUnavailable { detail: String },
    Timeout,
    TransactionNotFound,
    TransactionFailed,
    MalformedTransaction { detail: String },
    WrongRecipient { actual: Option<String> },
    WrongSender { actual: String },
    AmountMismatch { expected: Decimal, actual: Decimal },
    NotYetConfirmed { confirmations: u64, required: u64 },
}

impl RejectionReason {
    /// Transient rejections may succeed if the caller retries later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RejectionReason::NetworkUnavailable { .. }
                | RejectionReason::Timeout
                | RejectionReason::NotYetConfirmed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified(VerifiedTransfer),
    Rejected(RejectionReason),
}

/// Result of a user-submitted blockchain payment claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ClaimOutcome {
    Credited {
        turns: i32,
        balance_after: i32,
        transfer: VerifiedTransfer,
    },
    /// This transaction reference has already been credited
    AlreadyProcessed,
    VerificationFailed {
        reason: RejectionReason,
        transient: bool,
    },
}

impl ClaimOutcome {
    pub fn rejected(reason: RejectionReason) -> Self {
        let transient = reason.is_transient();
        ClaimOutcome::VerificationFailed { reason, transient }
    }

    /// Message suitable for the end user
    pub fn user_message(&self) -> &'static str {
        match self {
            ClaimOutcome::Credited { .. } => "payment verified",
            ClaimOutcome::AlreadyProcessed => "payment already processed",
            ClaimOutcome::VerificationFailed { transient: true, .. } => {
                "not yet confirmed, please retry shortly"
            }
            ClaimOutcome::VerificationFailed { transient: false, .. } => {
                "payment could not be verified"
            }
        }
    }
}

/// Body of the blockchain payment submission endpoint
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainClaimRequest {
    #[validate(length(equal = 66))]
    pub tx_hash: String,
    pub amount: Decimal,
    #[validate(length(equal = 42))]
    pub sender: String,
    #[validate(length(min = 1, max = 100))]
    pub variant: String,
}

/// Body returned for a blockchain payment claim
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimData {
    pub outcome: ClaimOutcome,
    pub message: &'static str,
}

impl From<ClaimOutcome> for ClaimData {
    fn from(outcome: ClaimOutcome) -> Self {
        Self {
            message: outcome.user_message(),
            outcome,
        }
    }
}

pub type ClaimResponse = SuccessResponse<ClaimData>;

/// `0x` + 64 hex digits, lower-cased. Case variants of one hash must map to a
/// single idempotency key.
pub fn normalize_tx_ref(tx_ref: &str) -> Option<String> {
    let tx_ref = tx_ref.trim().to_lowercase();
    let digits = tx_ref.strip_prefix("0x")?;
    if digits.len() == 64 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(tx_ref)
    } else {
        None
    }
}
