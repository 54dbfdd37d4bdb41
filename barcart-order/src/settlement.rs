//! Post-payment settlement for multi-store orders. The intent was charged to
//! the platform balance, so each store's share is moved to its connected
//! account once the orders exist.

use barcart_core::payment::{PaymentIntent, PaymentProvider, TransferRequest};
use barcart_core::pricing::FeeCalculator;
use std::collections::BTreeMap;
use tracing::{error, info};

use crate::metadata::BreakdownEntry;
use crate::models::{SideEffectOutcome, TransferOutcome};

/// Issue one transfer per store in the intent's breakdown. Single-store
/// intents were routed at charge time and produce no transfers.
pub async fn settle_transfers(
    provider: &dyn PaymentProvider,
    fees: &dyn FeeCalculator,
    intent: &PaymentIntent,
    breakdown: &[BreakdownEntry],
    buyer_state: Option<&str>,
) -> Vec<TransferOutcome> {
    if breakdown.len() <= 1 {
        return Vec::new();
    }

    let mut outcomes = Vec::with_capacity(breakdown.len());
    for entry in breakdown {
        outcomes.push(settle_one(provider, fees, intent, entry, buyer_state).await);
    }
    outcomes
}

async fn settle_one(
    provider: &dyn PaymentProvider,
    fees: &dyn FeeCalculator,
    intent: &PaymentIntent,
    entry: &BreakdownEntry,
    buyer_state: Option<&str>,
) -> TransferOutcome {
    let skipped = |amount_cents, reason: &str| TransferOutcome {
        store_id: entry.store_id,
        amount_cents,
        transfer_id: None,
        outcome: SideEffectOutcome::skipped(reason),
    };

    let (Some(store_id), Some(account)) = (entry.store_id, entry.stripe_account_id.as_ref()) else {
        return skipped(0, "store has no payout account");
    };

    let fee = match fees.platform_fee(entry.total_cents, buyer_state).await {
        Ok(quote) => quote.commission_cents,
        Err(e) => {
            error!(store = %store_id, error = %e, "fee calculation failed; transfer not issued");
            return TransferOutcome {
                store_id: entry.store_id,
                amount_cents: 0,
                transfer_id: None,
                outcome: SideEffectOutcome::failed(format!("fee calculation failed: {}", e)),
            };
        }
    };

    let amount_cents = entry.total_cents - fee;
    if amount_cents <= 0 {
        return skipped(amount_cents, "nothing left to transfer after platform fee");
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("payment_intent_id".to_string(), intent.id.clone());
    metadata.insert("store_id".to_string(), store_id.to_string());
    metadata.insert("platform_fee_cents".to_string(), fee.to_string());

    let request = TransferRequest {
        amount_cents,
        currency: intent.currency.clone(),
        destination_account: account.clone(),
        transfer_group: intent.transfer_group.clone(),
        metadata,
        idempotency_key: Some(format!("transfer_{}_{}", intent.id, store_id)),
    };

    match provider.create_transfer(&request).await {
        Ok(transfer) => {
            info!(store = %store_id, transfer = %transfer.id, amount_cents, "store transfer issued");
            TransferOutcome {
                store_id: entry.store_id,
                amount_cents,
                transfer_id: Some(transfer.id),
                outcome: SideEffectOutcome::Ok,
            }
        }
        Err(e) => {
            error!(store = %store_id, error = %e, "store transfer failed");
            TransferOutcome {
                store_id: entry.store_id,
                amount_cents,
                transfer_id: None,
                outcome: SideEffectOutcome::failed(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::{FeeRule, FeeSchedule};
    use crate::mock::MockPaymentProvider;
    use barcart_core::payment::PaymentStatus;
    use uuid::Uuid;

    fn entry(total_cents: i64, account: Option<&str>) -> BreakdownEntry {
        BreakdownEntry {
            store_id: Some(Uuid::new_v4()),
            total_cents,
            stripe_account_id: account.map(str::to_string),
        }
    }

    async fn intent(provider: &MockPaymentProvider) -> PaymentIntent {
        let id = provider.add_intent(10_000, PaymentStatus::Succeeded, BTreeMap::new());
        provider.get_intent(&id).await.unwrap()
    }

    fn ten_percent() -> FeeSchedule {
        FeeSchedule::new(FeeRule { percent: 10.0, fixed_cents: 0 })
    }

    #[tokio::test]
    async fn test_single_store_needs_no_transfer() {
        let provider = MockPaymentProvider::new();
        let intent = intent(&provider).await;
        let outcomes =
            settle_transfers(&provider, &ten_percent(), &intent, &[entry(5000, Some("acct_a"))], None)
                .await;
        assert!(outcomes.is_empty());
        assert!(provider.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_each_store_receives_total_minus_fee() {
        let provider = MockPaymentProvider::new();
        let intent = intent(&provider).await;
        let breakdown = [entry(5000, Some("acct_a")), entry(2500, Some("acct_b"))];

        let outcomes = settle_transfers(&provider, &ten_percent(), &intent, &breakdown, None).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.outcome.is_ok()));
        let transfers = provider.transfers();
        assert_eq!(transfers[0].amount_cents, 4500);
        assert_eq!(transfers[1].amount_cents, 2250);
        assert_eq!(transfers[0].transfer_group, intent.transfer_group);
        assert_eq!(
            transfers[1].idempotency_key,
            Some(format!("transfer_{}_{}", intent.id, breakdown[1].store_id.unwrap()))
        );
    }

    #[tokio::test]
    async fn test_failure_for_one_store_does_not_stop_the_rest() {
        let provider = MockPaymentProvider::new();
        provider.fail_transfers_to("acct_a");
        let intent = intent(&provider).await;
        let breakdown = [
            entry(5000, Some("acct_a")),
            entry(3000, None),
            entry(2000, Some("acct_c")),
        ];

        let outcomes = settle_transfers(&provider, &ten_percent(), &intent, &breakdown, None).await;

        assert!(outcomes[0].outcome.is_failed());
        assert!(matches!(outcomes[1].outcome, SideEffectOutcome::Skipped { .. }));
        assert!(outcomes[2].outcome.is_ok());
        assert_eq!(provider.transfers().len(), 1);
        assert_eq!(provider.transfers()[0].destination_account, "acct_c");
    }
}
