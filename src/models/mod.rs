// Domain and request/response models
pub mod blockchain;
pub mod checkout;
pub mod common;
pub mod consumption;
pub mod entitlement;
pub mod ledger;
pub mod processor_event;
