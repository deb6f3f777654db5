use crate::{error::Result, models::processor_event::normalize_email};
use async_trait::async_trait;
use sea_orm::{entity::*, query::*, sea_query::Expr, DatabaseConnection};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

/// Identity facts the reconciliation flow needs about an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub id: Uuid,
    pub email: Option<String>,
    pub processor_customer_id: Option<String>,
    pub created_at: OffsetDateTime,
}

impl From<entity::accounts::Model> for AccountRecord {
    fn from(account: entity::accounts::Model) -> Self {
        Self {
            id: account.id,
            email: account.email,
            processor_customer_id: account.processor_customer_id,
            created_at: account.created_at,
        }
    }
}

/// Lookup into the account system that owns emails and processor links
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<AccountRecord>>;

    async fn find_by_processor_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<AccountRecord>>;

    /// `email` must already be normalized
    async fn find_by_email(&self, email: &str) -> Result<Option<AccountRecord>>;

    /// Remember the processor's customer id so renewals resolve directly
    async fn link_processor_customer(&self, account_id: Uuid, customer_id: &str) -> Result<()>;
}

pub struct SeaOrmAccountDirectory {
    db: DatabaseConnection,
}

impl SeaOrmAccountDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create an account row. Emails are stored normalized.
    pub async fn register(&self, email: Option<&str>) -> Result<AccountRecord> {
        let now = OffsetDateTime::now_utc();
        let account = entity::accounts::ActiveModel {
            id: Set(Uuid::now_v7()),
            email: Set(email.and_then(normalize_email)),
            processor_customer_id: Set(None),
            created_at: Set(now),
        };

        let account = account.insert(&self.db).await?;
        Ok(account.into())
    }
}

#[async_trait]
impl AccountDirectory for SeaOrmAccountDirectory {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<AccountRecord>> {
        let account = entity::accounts::Entity::find_by_id(account_id)
            .one(&self.db)
            .await?;

        Ok(account.map(Into::into))
    }

    async fn find_by_processor_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<AccountRecord>> {
        let mut accounts = entity::accounts::Entity::find()
            .filter(entity::accounts::Column::ProcessorCustomerId.eq(customer_id))
            .all(&self.db)
            .await?;

        if accounts.len() > 1 {
            warn!(
                customer_id,
                matches = accounts.len(),
                "Processor customer id linked to several accounts, using the newest"
            );
        }

        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(accounts.into_iter().next().map(Into::into))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AccountRecord>> {
        let account = entity::accounts::Entity::find()
            .filter(entity::accounts::Column::Email.eq(email))
            .one(&self.db)
            .await?;

        Ok(account.map(Into::into))
    }

    async fn link_processor_customer(&self, account_id: Uuid, customer_id: &str) -> Result<()> {
        let result = entity::accounts::Entity::update_many()
            .col_expr(
                entity::accounts::Column::ProcessorCustomerId,
                Expr::value(customer_id.to_string()),
            )
            .filter(entity::accounts::Column::Id.eq(account_id))
            .filter(entity::accounts::Column::ProcessorCustomerId.is_null())
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            info!(account_id = %account_id, customer_id, "Linked processor customer id");
        }
        Ok(())
    }
}
