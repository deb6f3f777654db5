// Service modules
pub mod account_directory;
pub mod account_locks;
pub mod blockchain_verifier;
pub mod catalog;
pub mod chain_client;
pub mod checkout_service;
pub mod consumption_service;
pub mod entitlement_service;
pub mod identity_resolver;
pub mod jwt_service;
pub mod ledger_service;
pub mod reconciliation_service;
pub mod webhook_signature;

pub use account_directory::{AccountDirectory, SeaOrmAccountDirectory};
pub use account_locks::AccountLocks;
pub use blockchain_verifier::BlockchainVerifier;
pub use catalog::ProductCatalog;
pub use chain_client::{ChainClient, JsonRpcChainClient};
pub use checkout_service::CheckoutService;
pub use consumption_service::ConsumptionService;
pub use entitlement_service::EntitlementService;
pub use identity_resolver::IdentityResolver;
pub use jwt_service::JWTService;
pub use ledger_service::LedgerService;
pub use reconciliation_service::{IngestOutcome, ReconciliationService};
