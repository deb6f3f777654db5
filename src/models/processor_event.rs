//! Payment-processor webhook payloads.
//!
//! Raw bodies are parsed once into [`ProcessorEvent`]; anything that does
//! not fit a known event shape is rejected here and never reaches identity
//! resolution.

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MalformedEvent {
    #[error("payload is not valid JSON: {0}")]
    Json(String),

    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field: {0}")]
    InvalidField(&'static str),
}

/// Everything the processor tells us about who paid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayerRef {
    /// Internal account id passed through checkout custom data
    pub embedded_account_id: Option<Uuid>,
    pub customer_id: Option<String>,
    /// Lower-cased, trimmed
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEvent {
    pub subscription_id: String,
    pub payer: PayerRef,
    pub variant: Option<String>,
    pub status: Option<String>,
    pub test_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEvent {
    pub order_id: String,
    pub payer: PayerRef,
    pub variant: String,
    pub status: Option<String>,
    pub test_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEvent {
    SubscriptionCreated(SubscriptionEvent),
    SubscriptionUpdated(SubscriptionEvent),
    SubscriptionCancelled(SubscriptionEvent),
    SubscriptionResumed(SubscriptionEvent),
    OrderCreated(OrderEvent),
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    meta: RawMeta,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawMeta {
    event_name: String,
    #[serde(default)]
    test_mode: bool,
    #[serde(default)]
    custom_data: Option<RawCustomData>,
}

#[derive(Debug, Deserialize)]
struct RawCustomData {
    #[serde(default)]
    account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawData {
    id: Value,
    attributes: RawAttributes,
}

#[derive(Debug, Deserialize)]
struct RawAttributes {
    #[serde(default)]
    customer_id: Option<Value>,
    #[serde(default)]
    user_email: Option<String>,
    #[serde(default)]
    variant_id: Option<Value>,
    #[serde(default)]
    first_order_item: Option<RawOrderItem>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    test_mode: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawOrderItem {
    #[serde(default)]
    variant_id: Option<Value>,
}

impl ProcessorEvent {
    /// Validate and classify a raw webhook body
    pub fn parse(raw: &[u8]) -> Result<Self, MalformedEvent> {
        let envelope: RawEnvelope =
            serde_json::from_slice(raw).map_err(|e| MalformedEvent::Json(e.to_string()))?;

        let id = scalar_to_string(&envelope.data.id).ok_or(MalformedEvent::MissingField("data.id"))?;
        let attributes = envelope.data.attributes;
        let test_mode = envelope.meta.test_mode || attributes.test_mode.unwrap_or(false);

        let embedded_account_id = match envelope
            .meta
            .custom_data
            .and_then(|custom| custom.account_id)
            .filter(|s| !s.trim().is_empty())
        {
            Some(raw_id) => Some(
                Uuid::parse_str(raw_id.trim())
                    .map_err(|_| MalformedEvent::InvalidField("meta.custom_data.account_id"))?,
            ),
            None => None,
        };

        let payer = PayerRef {
            embedded_account_id,
            customer_id: attributes.customer_id.as_ref().and_then(scalar_to_string),
            email: attributes.user_email.as_deref().and_then(normalize_email),
        };

        let variant = attributes
            .variant_id
            .as_ref()
            .or_else(|| {
                attributes
                    .first_order_item
                    .as_ref()
                    .and_then(|item| item.variant_id.as_ref())
            })
            .and_then(scalar_to_string);

        let status = attributes.status.map(|s| s.to_lowercase());

        let subscription = |variant: Option<String>, status: Option<String>| SubscriptionEvent {
            subscription_id: id.clone(),
            payer: payer.clone(),
            variant,
            status,
            test_mode,
        };

        match envelope.meta.event_name.as_str() {
            "subscription_created" => {
                let variant = variant.ok_or(MalformedEvent::MissingField("attributes.variant_id"))?;
                Ok(Self::SubscriptionCreated(subscription(Some(variant), status)))
            }
            "subscription_updated" => Ok(Self::SubscriptionUpdated(subscription(variant, status))),
            "subscription_cancelled" => {
                Ok(Self::SubscriptionCancelled(subscription(variant, status)))
            }
            "subscription_resumed" => Ok(Self::SubscriptionResumed(subscription(variant, status))),
            "order_created" => {
                let variant = variant.ok_or(MalformedEvent::MissingField("attributes.variant_id"))?;
                Ok(Self::OrderCreated(OrderEvent {
                    order_id: id.clone(),
                    payer: payer.clone(),
                    variant,
                    status,
                    test_mode,
                }))
            }
            other => Err(MalformedEvent::UnknownEvent(other.to_string())),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SubscriptionCreated(_) => "subscription_created",
            Self::SubscriptionUpdated(_) => "subscription_updated",
            Self::SubscriptionCancelled(_) => "subscription_cancelled",
            Self::SubscriptionResumed(_) => "subscription_resumed",
            Self::OrderCreated(_) => "order_created",
        }
    }

    /// Processor-side object id (subscription or order id)
    pub fn object_id(&self) -> &str {
        match self {
            Self::SubscriptionCreated(e)
            | Self::SubscriptionUpdated(e)
            | Self::SubscriptionCancelled(e)
            | Self::SubscriptionResumed(e) => &e.subscription_id,
            Self::OrderCreated(e) => &e.order_id,
        }
    }

    pub fn payer(&self) -> &PayerRef {
        match self {
            Self::SubscriptionCreated(e)
            | Self::SubscriptionUpdated(e)
            | Self::SubscriptionCancelled(e)
            | Self::SubscriptionResumed(e) => &e.payer,
            Self::OrderCreated(e) => &e.payer,
        }
    }

    pub fn is_test(&self) -> bool {
        match self {
            Self::SubscriptionCreated(e)
            | Self::SubscriptionUpdated(e)
            | Self::SubscriptionCancelled(e)
            | Self::SubscriptionResumed(e) => e.test_mode,
            Self::OrderCreated(e) => e.test_mode,
        }
    }

    /// Ledger idempotency key for credit-bearing events.
    ///
    /// Orders and subscriptions live in separate id spaces at the processor,
    /// so the key is namespaced by object type.
    pub fn credit_external_id(&self) -> Option<String> {
        match self {
            Self::SubscriptionCreated(e) => Some(format!("subscription:{}", e.subscription_id)),
            Self::OrderCreated(e) => Some(format!("order:{}", e.order_id)),
            _ => None,
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        None
    } else {
        Some(email)
    }
}
