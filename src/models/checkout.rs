use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutStatus {
    Pending,
    Completed,
    Expired,
}

impl CheckoutStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }
}

/// Request from the purchase-initiation flow
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    #[validate(length(min = 1, max = 100))]
    pub variant: String,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub checkout_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    pub id: Uuid,
    pub checkout_id: Option<String>,
    pub product_variant: String,
    pub status: String,
    pub created_at: time::OffsetDateTime,
    pub expires_at: time::OffsetDateTime,
}

impl From<entity::pending_checkouts::Model> for CheckoutView {
    fn from(checkout: entity::pending_checkouts::Model) -> Self {
        Self {
            id: checkout.id,
            checkout_id: checkout.checkout_id,
            product_variant: checkout.product_variant,
            status: checkout.status,
            created_at: checkout.created_at,
            expires_at: checkout.expires_at,
        }
    }
}

/// Extension methods for the pending_checkouts entity
pub trait PendingCheckoutExt {
    /// Pending and not past its TTL
    fn is_open(&self, now: time::OffsetDateTime) -> bool;
}

impl PendingCheckoutExt for entity::pending_checkouts::Model {
    fn is_open(&self, now: time::OffsetDateTime) -> bool {
        self.status == CheckoutStatus::Pending.as_str() && self.expires_at > now
    }
}
