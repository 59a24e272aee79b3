//! Wager engine — validates and records one bet per account per round.
//!
//! Placement is a single conditional update against the persisted record:
//! every check and the debit happen inside the store's write lock, so two
//! concurrent requests can never both read the old balance.

use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::store::Store;
use crate::types::{Account, RoundPhase, TattaError, Team, Wager};

pub struct WagerEngine;

impl WagerEngine {
    /// Place `amount` on `team` for the given account.
    ///
    /// Rejects non-positive amounts, wagers while the round is settling,
    /// a second wager while one is active, and amounts above the balance.
    /// On success the amount is debited and the wager recorded atomically.
    pub async fn place(
        store: &Store,
        account_id: Uuid,
        team: Team,
        amount: Decimal,
    ) -> Result<Account, TattaError> {
        if amount <= Decimal::ZERO {
            return Err(TattaError::Validation(format!(
                "wager amount must be positive, got {amount}"
            )));
        }

        let account = store
            .mutate(|data| {
                if data.phase != RoundPhase::Open {
                    return Err(TattaError::StateConflict(
                        "wagering is closed while the round is being settled".into(),
                    ));
                }

                let account = data
                    .accounts
                    .get_mut(&account_id)
                    .ok_or_else(|| TattaError::NotFound(format!("unknown account {account_id}")))?;

                if account.has_wager() {
                    return Err(TattaError::StateConflict(
                        "a wager is already active for this round".into(),
                    ));
                }
                if amount > account.balance {
                    return Err(TattaError::Validation(format!(
                        "wager {amount} exceeds balance {}",
                        account.balance
                    )));
                }

                account.balance -= amount;
                account.wager = Some(Wager { team, amount });
                Ok(account.clone())
            })
            .await?;

        info!(
            account = %account.number,
            name = %account.name,
            %team,
            %amount,
            balance = %account.balance,
            "Wager placed"
        );
        Ok(account)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
