use serde::{Deserialize, Serialize};

/// Success envelope shared by all JSON endpoints
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Whether a ledger entry increased or decreased the balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Credit,
    Debit,
}

impl LedgerKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "credit" => Some(Self::Credit),
            "debit" => Some(Self::Debit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }
}

/// Origin of a ledger entry; part of the idempotency key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerSource {
    Processor,
    Blockchain,
    System,
}

impl LedgerSource {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "processor" => Some(Self::Processor),
            "blockchain" => Some(Self::Blockchain),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processor => "processor",
            Self::Blockchain => "blockchain",
            Self::System => "system",
        }
    }
}

/// Which counter a consumed turn came out of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumedKind {
    Free,
    Paid,
    Unlimited,
}

impl ConsumedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
            Self::Unlimited => "unlimited",
        }
    }
}

/// Subscription lifecycle state of an entitlement account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    None,
    Active,
    Cancelled,
}

/// Result of asking the subscription state machine for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    Applied {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    NoChange(SubscriptionStatus),
    Invalid {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
}

impl SubscriptionStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "active" => Some(Self::Active),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Active => "active",
            Self::Cancelled => "cancelled",
        }
    }

    /// none -> active -> cancelled -> active; everything else is rejected
    pub fn transition(self, to: SubscriptionStatus) -> StatusTransition {
        use SubscriptionStatus::*;

        if self == to {
            return StatusTransition::NoChange(self);
        }

        match (self, to) {
            (None, Active) | (Active, Cancelled) | (Cancelled, Active) => {
                StatusTransition::Applied { from: self, to }
            }
            _ => StatusTransition::Invalid { from: self, to },
        }
    }
}
