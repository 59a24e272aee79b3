//! Ranking/reporting view — read-only aggregation of balances, pools, and
//! round history. Mirrors the settlement rate formula without mutating state.

use crate::store::Store;
use crate::types::{Account, HistoryEntry, PoolTotals};

pub struct RankingView;

impl RankingView {
    /// All accounts ordered by balance descending; ties break by student
    /// number so the ordering is stable across requests.
    pub async fn by_balance(store: &Store) -> Vec<Account> {
        let mut accounts = store.list_accounts().await;
        accounts.sort_by(|a, b| {
            b.balance
                .cmp(&a.balance)
                .then_with(|| u16::from(a.number).cmp(&u16::from(b.number)))
        });
        accounts
    }

    /// Current staked pool per team plus implied odds for display.
    pub async fn pool_totals(store: &Store) -> PoolTotals {
        store.view(|data| PoolTotals::collect(data.accounts.values())).await
    }

    /// Result of the most recently settled round, if any.
    pub async fn latest_history(store: &Store) -> Option<HistoryEntry> {
        store.latest_history().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
