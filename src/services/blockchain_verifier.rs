use crate::{
    config::BlockchainConfig,
    models::blockchain::{RejectionReason, VerificationOutcome, VerifiedTransfer},
    services::chain_client::{ChainClient, ChainError},
};
use rust_decimal::Decimal;
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument, warn};

/// Independently confirms a user-reported transfer against a chain node
pub struct BlockchainVerifier {
    client: Arc<dyn ChainClient>,
    receiving_address: String,
    decimals: u32,
    min_confirmations: u64,
    timeout: Duration,
}

impl BlockchainVerifier {
    pub fn new(client: Arc<dyn ChainClient>, config: &BlockchainConfig) -> Self {
        Self {
            client,
            receiving_address: config.receiving_address.trim().to_lowercase(),
            decimals: config.decimals,
            min_confirmations: config.min_confirmations,
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Run every check in order; the first failure wins.
    ///
    /// Node trouble and shallow confirmations are transient rejections.
    #[instrument(skip(self))]
    pub async fn verify(
        &self,
        tx_ref: &str,
        expected_amount: Decimal,
        expected_sender: &str,
    ) -> VerificationOutcome {
        let outcome = match tokio::time::timeout(
            self.timeout,
            self.run_checks(tx_ref, expected_amount, expected_sender),
        )
        .await
        {
            Ok(Ok(transfer)) => VerificationOutcome::Verified(transfer),
            Ok(Err(reason)) => VerificationOutcome::Rejected(reason),
            Err(_) => VerificationOutcome::Rejected(RejectionReason::Timeout),
        };

        match &outcome {
            VerificationOutcome::Verified(transfer) => info!(
                amount = %transfer.amount,
                confirmations = transfer.confirmations,
                "Transfer verified"
            ),
            VerificationOutcome::Rejected(reason) => warn!(
                reason = ?reason,
                transient = reason.is_transient(),
                "Transfer rejected"
            ),
        }

        outcome
    }

    async fn run_checks(
        &self,
        tx_ref: &str,
        expected_amount: Decimal,
        expected_sender: &str,
    ) -> Result<VerifiedTransfer, RejectionReason> {
        let latest_block = self.client.block_number().await.map_err(rejection)?;

        let tx = self
            .client
            .transaction(tx_ref)
            .await
            .map_err(rejection)?
            .ok_or(RejectionReason::TransactionNotFound)?;

        // Known to the node but not mined yet
        let Some(receipt) = self.client.receipt(tx_ref).await.map_err(rejection)? else {
            return Err(RejectionReason::NotYetConfirmed {
                confirmations: 0,
                required: self.min_confirmations,
            });
        };

        if !receipt.succeeded {
            return Err(RejectionReason::TransactionFailed);
        }

        if tx.to.as_deref() != Some(self.receiving_address.as_str()) {
            return Err(RejectionReason::WrongRecipient { actual: tx.to });
        }

        if tx.from != expected_sender.trim().to_lowercase() {
            return Err(RejectionReason::WrongSender { actual: tx.from });
        }

        let amount = wei_to_amount(tx.value_wei, self.decimals).ok_or_else(|| {
            RejectionReason::MalformedTransaction {
                detail: format!("value {} out of range", tx.value_wei),
            }
        })?;
        if amount != expected_amount {
            return Err(RejectionReason::AmountMismatch {
                expected: expected_amount,
                actual: amount,
            });
        }

        let tx_block = tx.block_number.unwrap_or(receipt.block_number);
        let confirmations = latest_block.saturating_sub(tx_block);
        if confirmations < self.min_confirmations {
            return Err(RejectionReason::NotYetConfirmed {
                confirmations,
                required: self.min_confirmations,
            });
        }

        Ok(VerifiedTransfer {
            amount,
            sender: tx.from,
            recipient: self.receiving_address.clone(),
            confirmations,
        })
    }
}

fn rejection(error: ChainError) -> RejectionReason {
    match error {
        ChainError::Timeout => RejectionReason::Timeout,
        ChainError::Transport(detail) => RejectionReason::NetworkUnavailable { detail },
        ChainError::Rpc { code, message } => RejectionReason::NetworkUnavailable {
            detail: format!("rpc error {}: {}", code, message),
        },
        ChainError::Malformed(detail) => RejectionReason::MalformedTransaction { detail },
    }
}

/// Exact conversion from the chain's base unit
pub fn wei_to_amount(wei: u128, decimals: u32) -> Option<Decimal> {
    let wei = i128::try_from(wei).ok()?;
    Decimal::try_from_i128_with_scale(wei, decimals).ok()
}
