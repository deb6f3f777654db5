use crate::{
    error::{ApiError, Result},
    models::checkout::CheckoutStatus,
    services::{account_directory::AccountDirectory, catalog::ProductCatalog},
};
use sea_orm::{entity::*, query::*, sea_query::Expr, DatabaseConnection};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument};
use uuid::Uuid;

/// Purchase-initiation side of the pending checkout registry
pub struct CheckoutService {
    db: DatabaseConnection,
    directory: Arc<dyn AccountDirectory>,
    catalog: Arc<ProductCatalog>,
    ttl: Duration,
}

impl CheckoutService {
    pub fn new(
        db: DatabaseConnection,
        directory: Arc<dyn AccountDirectory>,
        catalog: Arc<ProductCatalog>,
        ttl: Duration,
    ) -> Self {
        Self {
            db,
            directory,
            catalog,
            ttl,
        }
    }

    /// Record that `account_id` is about to pay for `variant`
    #[instrument(skip(self))]
    pub async fn create_checkout(
        &self,
        account_id: Uuid,
        variant: &str,
        checkout_id: Option<&str>,
    ) -> Result<entity::pending_checkouts::Model> {
        if self.catalog.find(variant).is_none() {
            return Err(ApiError::BadRequest(format!("Unknown product variant: {}", variant)));
        }

        let account = self
            .directory
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Account {} not found", account_id)))?;

        let email = account.email.ok_or_else(|| {
            ApiError::BadRequest("Account has no email address on file".to_string())
        })?;

        let now = OffsetDateTime::now_utc();
        let checkout = entity::pending_checkouts::ActiveModel {
            id: Set(Uuid::now_v7()),
            account_id: Set(account_id),
            checkout_id: Set(checkout_id.map(|s| s.to_string())),
            product_variant: Set(variant.to_string()),
            account_email_snapshot: Set(email),
            status: Set(CheckoutStatus::Pending.as_str().to_string()),
            processor_customer_id: Set(account.processor_customer_id),
            resolved_event_id: Set(None),
            created_at: Set(now),
            expires_at: Set(now + self.ttl),
            completed_at: Set(None),
        };

        let checkout = checkout.insert(&self.db).await?;

        info!(
            checkout = %checkout.id,
            account_id = %account_id,
            variant,
            expires_at = %checkout.expires_at,
            "Pending checkout created"
        );
        Ok(checkout)
    }

    /// Mark every pending checkout past its TTL as expired
    pub async fn expire_stale(&self, now: OffsetDateTime) -> Result<u64> {
        let result = entity::pending_checkouts::Entity::update_many()
            .col_expr(
                entity::pending_checkouts::Column::Status,
                Expr::value(CheckoutStatus::Expired.as_str()),
            )
            .filter(entity::pending_checkouts::Column::Status.eq(CheckoutStatus::Pending.as_str()))
            .filter(entity::pending_checkouts::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            info!(expired = result.rows_affected, "Expired stale checkouts");
        }
        Ok(result.rows_affected)
    }

    pub async fn list_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<entity::pending_checkouts::Model>> {
        let checkouts = entity::pending_checkouts::Entity::find()
            .filter(entity::pending_checkouts::Column::AccountId.eq(account_id))
            .order_by_desc(entity::pending_checkouts::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(checkouts)
    }
}
