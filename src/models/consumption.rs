use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{
    common::{ConsumedKind, SuccessResponse},
    entitlement::EntitlementState,
};

/// What the caller is spending a turn on; recorded in the debit entry
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UsageContext {
    #[validate(length(min = 1, max = 100))]
    pub feature: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub request_id: Option<String>,
}

impl UsageContext {
    pub fn feature(feature: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            request_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnConsumptionResult {
    pub success: bool,
    pub remaining_free: i32,
    pub remaining_paid: i32,
    pub remaining_total: i32,
    pub kind_consumed: Option<ConsumedKind>,
    pub unlimited: bool,
}

impl TurnConsumptionResult {
    pub fn from_state(
        state: &EntitlementState,
        success: bool,
        kind_consumed: Option<ConsumedKind>,
    ) -> Self {
        Self {
            success,
            remaining_free: state.free_turns,
            remaining_paid: state.paid_turns,
            remaining_total: state.total(),
            kind_consumed,
            unlimited: state.unlimited,
        }
    }
}

/// Body of `POST /turns/consume`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeData {
    #[serde(flatten)]
    pub result: TurnConsumptionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl From<TurnConsumptionResult> for ConsumeData {
    fn from(result: TurnConsumptionResult) -> Self {
        Self {
            message: (!result.success).then_some("no turns remaining"),
            result,
        }
    }
}

pub type ConsumeResponse = SuccessResponse<ConsumeData>;
