use crate::{
    config::Config,
    services::{
        AccountDirectory, AccountLocks, BlockchainVerifier, ChainClient, CheckoutService,
        ConsumptionService, EntitlementService, JWTService, JsonRpcChainClient, LedgerService,
        ProductCatalog, ReconciliationService, SeaOrmAccountDirectory,
    },
};
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub jwt_service: Arc<JWTService>,
    pub entitlement_service: Arc<EntitlementService>,
    pub ledger_service: Arc<LedgerService>,
    pub consumption_service: Arc<ConsumptionService>,
    pub checkout_service: Arc<CheckoutService>,
    pub reconciliation_service: Arc<ReconciliationService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        // Connect to database
        let db = sea_orm::Database::connect(&config.database.url).await?;

        let chain_client = Arc::new(JsonRpcChainClient::new(&config.blockchain)?);

        Ok(Self::with_chain_client(db, config, chain_client))
    }

    /// Wire every service around an existing connection and chain client
    pub fn with_chain_client(
        db: DatabaseConnection,
        config: Config,
        chain_client: Arc<dyn ChainClient>,
    ) -> Self {
        let locks = Arc::new(AccountLocks::new(Duration::from_millis(
            config.consumption.lock_timeout_ms,
        )));
        let catalog = Arc::new(ProductCatalog::new(&config.catalog));
        let directory: Arc<dyn AccountDirectory> =
            Arc::new(SeaOrmAccountDirectory::new(db.clone()));

        let entitlement_service = Arc::new(EntitlementService::new(db.clone()));
        let ledger_service = Arc::new(LedgerService::new(
            db.clone(),
            locks.clone(),
            entitlement_service.clone(),
        ));
        let consumption_service = Arc::new(ConsumptionService::new(
            db.clone(),
            locks.clone(),
            entitlement_service.clone(),
            ledger_service.clone(),
        ));
        let checkout_service = Arc::new(CheckoutService::new(
            db.clone(),
            directory.clone(),
            catalog.clone(),
            time::Duration::hours(config.checkout.ttl_hours),
        ));
        let verifier = Arc::new(BlockchainVerifier::new(chain_client, &config.blockchain));
        let reconciliation_service = Arc::new(ReconciliationService::new(
            db.clone(),
            locks,
            entitlement_service.clone(),
            ledger_service.clone(),
            directory,
            verifier,
            catalog,
            &config.processor,
            &config.blockchain,
        ));

        Self {
            db,
            jwt_service: Arc::new(JWTService::new(&config.auth)),
            entitlement_service,
            ledger_service,
            consumption_service,
            checkout_service,
            reconciliation_service,
            config: Arc::new(config),
        }
    }
}
