use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::common::{LedgerKind, LedgerSource};

/// Outcome of an idempotent credit append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    Applied { entry_id: Uuid, balance_after: i32 },
    /// The `(source, external_id)` pair was already in the ledger; nothing changed
    AlreadyApplied,
}

impl CreditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CreditOutcome::Applied { .. })
    }
}

/// Query parameters for ledger history
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilter {
    #[serde(default)]
    pub kind: Option<LedgerKind>,
    #[serde(default)]
    pub source: Option<LedgerSource>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl HistoryFilter {
    pub const DEFAULT_LIMIT: u64 = 50;
    pub const MAX_LIMIT: u64 = 500;

    pub fn effective_limit(&self) -> u64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

/// API view of a ledger entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryView {
    pub id: Uuid,
    pub sequence: i64,
    pub kind: String,
    pub source: String,
    pub external_id: Option<String>,
    pub amount: i32,
    pub balance_before: i32,
    pub balance_after: i32,
    pub context: Option<serde_json::Value>,
    pub occurred_at: time::OffsetDateTime,
}

impl From<entity::ledger_entries::Model> for LedgerEntryView {
    fn from(entry: entity::ledger_entries::Model) -> Self {
        Self {
            id: entry.id,
            sequence: entry.sequence,
            kind: entry.kind,
            source: entry.source,
            external_id: entry.external_id,
            amount: entry.amount,
            balance_before: entry.balance_before,
            balance_after: entry.balance_after,
            context: entry.context,
            occurred_at: entry.occurred_at,
        }
    }
}
