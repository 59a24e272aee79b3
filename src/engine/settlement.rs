//! Settlement engine — ends a round, redistributes the pool, records history.
//!
//! The whole settlement is one critical section: the phase flips to
//! `Settling`, every payout is computed from the same snapshot of accounts,
//! the batch of per-account updates is applied, one history entry is
//! appended, and the phase returns to `Open`. No account update depends on
//! another having completed first.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use tracing::info;

use crate::store::Store;
use crate::types::{HistoryEntry, PoolTotals, RoundPhase, StudentId, TattaError, Team};

// ---------------------------------------------------------------------------
// Settlement report
// ---------------------------------------------------------------------------

/// Summary of a settled round, for logging and the admin response.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SettlementReport {
    pub winner: Team,
    pub total_pool: Decimal,
    pub winning_pool: Decimal,
    /// Payout multiplier applied to each winning stake.
    pub rate: Decimal,
    pub winners_paid: usize,
    pub wagers_cleared: usize,
    pub total_paid: Decimal,
    pub time: DateTime<Utc>,
}

impl fmt::Display for SettlementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} wins: pool={} winning_pool={} rate={} paid {} to {} winner(s), {} wager(s) cleared",
            self.winner,
            self.total_pool,
            self.winning_pool,
            self.rate,
            self.total_paid,
            self.winners_paid,
            self.wagers_cleared,
        )
    }
}

// ---------------------------------------------------------------------------
// Settlement engine
// ---------------------------------------------------------------------------

pub struct SettlementEngine;

impl SettlementEngine {
    /// Settle the current round with `winner`.
    ///
    /// Each account that backed the winner is credited
    /// `round_dp(stake * rate, 2)` where `rate = total_pool / winning_pool`
    /// (zero when the winner had no backers — defined, not an error). Losing
    /// stakes stay forfeited; every wager is cleared either way.
    pub async fn settle(
        store: &Store,
        winner: Team,
        committer: &str,
    ) -> Result<SettlementReport, TattaError> {
        let report = store
            .mutate(|data| {
                if data.phase != RoundPhase::Open {
                    return Err(TattaError::StateConflict(
                        "a settlement is already in progress".into(),
                    ));
                }
                data.phase = RoundPhase::Settling;

                // Snapshot the pools before any balance changes.
                let totals = PoolTotals::collect(data.accounts.values());
                let rate = totals.rate(winner);

                let mut winners_paid = 0;
                let mut wagers_cleared = 0;
                let mut total_paid = Decimal::ZERO;

                // Independent per-account updates, all computed from the
                // snapshot above.
                for account in data.accounts.values_mut() {
                    if let Some(wager) = account.wager.take() {
                        wagers_cleared += 1;
                        if wager.team == winner {
                            let payout = (wager.amount * rate).round_dp(2);
                            account.balance += payout;
                            total_paid += payout;
                            winners_paid += 1;
                        }
                    }
                }

                let time = Utc::now();
                data.history.push(HistoryEntry {
                    winner,
                    time,
                    committer: committer.to_string(),
                });
                data.phase = RoundPhase::Open;

                Ok(SettlementReport {
                    winner,
                    total_pool: totals.total,
                    winning_pool: totals.by_team[winner.idx()],
                    rate,
                    winners_paid,
                    wagers_cleared,
                    total_paid,
                    time,
                })
            })
            .await?;

        info!(committer, %report, "Round settled");
        Ok(report)
    }

    /// Credit a bonus to one account, found by `(name, number)`.
    pub async fn grant_bonus(
        store: &Store,
        name: &str,
        number: StudentId,
        amount: Decimal,
    ) -> Result<(), TattaError> {
        if amount <= Decimal::ZERO {
            return Err(TattaError::Validation(format!(
                "bonus amount must be positive, got {amount}"
            )));
        }

        store
            .mutate(|data| {
                let account = data
                    .accounts
                    .values_mut()
                    .find(|a| a.name == name && a.number == number)
                    .ok_or_else(|| {
                        TattaError::NotFound(format!("no account for {number} {name}"))
                    })?;
                account.balance += amount;
                Ok(())
            })
            .await?;

        info!(%number, name, %amount, "Bonus granted");
        Ok(())
    }

    /// Put every account back to the starting balance with no wager. History
    /// is preserved; no entry is appended.
    pub async fn reset_all(store: &Store, starting_balance: Decimal) -> Result<usize, TattaError> {
        let count = store
            .mutate(|data| {
                for account in data.accounts.values_mut() {
                    account.balance = starting_balance;
                    account.wager = None;
                }
                data.phase = RoundPhase::Open;
                Ok(data.accounts.len())
            })
            .await?;

        info!(accounts = count, balance = %starting_balance, "All accounts reset");
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::wager::WagerEngine;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    async fn signup(store: &Store, name: &str, number: &str) -> Uuid {
        store
            .create_account(name, number.parse().unwrap(), "pw", false, dec!(5000))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_settle_pays_winners_proportionally() {
        // A stakes 100 on team 1, B stakes 300 on team 2; team 1 wins.
        let store = Store::in_memory();
        let a = signup(&store, "홍길동", "1101").await;
        let b = signup(&store, "김수", "1102").await;
        WagerEngine::place(&store, a, Team::One, dec!(100)).await.unwrap();
        WagerEngine::place(&store, b, Team::Two, dec!(300)).await.unwrap();

        let report = SettlementEngine::settle(&store, Team::One, "관리자").await.unwrap();
        assert_eq!(report.total_pool, dec!(400));
        assert_eq!(report.winning_pool, dec!(100));
        assert_eq!(report.rate, dec!(4));
        assert_eq!(report.winners_paid, 1);
        assert_eq!(report.wagers_cleared, 2);
        assert_eq!(report.total_paid, dec!(400));

        // A: 5000 - 100 + 100 * 4 = 5300. B forfeits: 4700.
        let a = store.find_account(a).await.unwrap();
        let b = store.find_account(b).await.unwrap();
        assert_eq!(a.balance, dec!(5300));
        assert_eq!(b.balance, dec!(4700));
        assert!(!a.has_wager());
        assert!(!b.has_wager());

        let history = store.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].winner, Team::One);
        assert_eq!(history[0].committer, "관리자");
    }

    #[tokio::test]
    async fn test_settle_splits_winning_pool_between_backers() {
        let store = Store::in_memory();
        let a = signup(&store, "홍길동", "1101").await;
        let b = signup(&store, "김수", "1102").await;
        let c = signup(&store, "이영희", "1103").await;
        WagerEngine::place(&store, a, Team::Three, dec!(100)).await.unwrap();
        WagerEngine::place(&store, b, Team::Three, dec!(300)).await.unwrap();
        WagerEngine::place(&store, c, Team::Four, dec!(400)).await.unwrap();

        let report = SettlementEngine::settle(&store, Team::Three, "관리자").await.unwrap();
        // rate = 800 / 400 = 2
        assert_eq!(report.rate, dec!(2));
        assert_eq!(report.winners_paid, 2);
        // Winner payouts sum to the whole pool when the division is exact.
        assert_eq!(report.total_paid, report.total_pool);

        assert_eq!(store.find_account(a).await.unwrap().balance, dec!(5100));
        assert_eq!(store.find_account(b).await.unwrap().balance, dec!(5300));
        assert_eq!(store.find_account(c).await.unwrap().balance, dec!(4600));
    }

    #[tokio::test]
    async fn test_settle_winner_without_backers() {
        let store = Store::in_memory();
        let a = signup(&store, "홍길동", "1101").await;
        WagerEngine::place(&store, a, Team::One, dec!(500)).await.unwrap();

        let report = SettlementEngine::settle(&store, Team::Two, "관리자").await.unwrap();
        assert_eq!(report.rate, Decimal::ZERO);
        assert_eq!(report.winners_paid, 0);
        assert_eq!(report.wagers_cleared, 1);
        assert_eq!(report.total_paid, Decimal::ZERO);

        // Stake forfeited, wager cleared, history written anyway.
        let a = store.find_account(a).await.unwrap();
        assert_eq!(a.balance, dec!(4500));
        assert!(!a.has_wager());
        assert_eq!(store.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_settle_empty_round_completes() {
        let store = Store::in_memory();
        signup(&store, "홍길동", "1101").await;

        let report = SettlementEngine::settle(&store, Team::Four, "관리자").await.unwrap();
        assert_eq!(report.total_pool, Decimal::ZERO);
        assert_eq!(report.rate, Decimal::ZERO);
        assert_eq!(store.phase().await, RoundPhase::Open);
    }

    #[tokio::test]
    async fn test_settle_rounds_payouts_to_two_places() {
        let store = Store::in_memory();
        let a = signup(&store, "홍길동", "1101").await;
        let b = signup(&store, "김수", "1102").await;
        WagerEngine::place(&store, a, Team::One, dec!(70)).await.unwrap();
        WagerEngine::place(&store, b, Team::Two, dec!(30)).await.unwrap();

        let report = SettlementEngine::settle(&store, Team::One, "관리자").await.unwrap();
        // rate = round(100 / 70, 2) = 1.43; payout = round(70 * 1.43, 2) = 100.10
        assert_eq!(report.rate, dec!(1.43));
        assert_eq!(store.find_account(a).await.unwrap().balance, dec!(4930) + dec!(100.10));
    }

    #[tokio::test]
    async fn test_settle_reopens_round_for_new_wagers() {
        let store = Store::in_memory();
        let a = signup(&store, "홍길동", "1101").await;
        WagerEngine::place(&store, a, Team::One, dec!(100)).await.unwrap();
        SettlementEngine::settle(&store, Team::One, "관리자").await.unwrap();

        // Next round: the same account can wager again.
        assert!(WagerEngine::place(&store, a, Team::Two, dec!(100)).await.is_ok());
    }

    #[tokio::test]
    async fn test_grant_bonus() {
        let store = Store::in_memory();
        let a = signup(&store, "홍길동", "1101").await;

        SettlementEngine::grant_bonus(&store, "홍길동", "1101".parse().unwrap(), dec!(777))
            .await
            .unwrap();
        assert_eq!(store.find_account(a).await.unwrap().balance, dec!(5777));
    }

    #[tokio::test]
    async fn test_grant_bonus_rejects_bad_amount_and_unknown_account() {
        let store = Store::in_memory();
        signup(&store, "홍길동", "1101").await;

        let err = SettlementEngine::grant_bonus(&store, "홍길동", "1101".parse().unwrap(), dec!(0))
            .await
            .unwrap_err();
        assert!(matches!(err, TattaError::Validation(_)));

        let err = SettlementEngine::grant_bonus(&store, "김수", "1102".parse().unwrap(), dec!(10))
            .await
            .unwrap_err();
        assert!(matches!(err, TattaError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reset_all_restores_starting_state() {
        let store = Store::in_memory();
        let a = signup(&store, "홍길동", "1101").await;
        let b = signup(&store, "김수", "1102").await;
        WagerEngine::place(&store, a, Team::One, dec!(4999)).await.unwrap();
        SettlementEngine::grant_bonus(&store, "김수", "1102".parse().unwrap(), dec!(100))
            .await
            .unwrap();

        let count = SettlementEngine::reset_all(&store, dec!(5000)).await.unwrap();
        assert_eq!(count, 2);

        for id in [a, b] {
            let account = store.find_account(id).await.unwrap();
            assert_eq!(account.balance, dec!(5000));
            assert!(!account.has_wager());
        }
    }

    #[tokio::test]
    async fn test_reset_all_keeps_history() {
        let store = Store::in_memory();
        let a = signup(&store, "홍길동", "1101").await;
        WagerEngine::place(&store, a, Team::One, dec!(100)).await.unwrap();
        SettlementEngine::settle(&store, Team::One, "관리자").await.unwrap();

        SettlementEngine::reset_all(&store, dec!(5000)).await.unwrap();
        assert_eq!(store.history().await.len(), 1);
    }
}
