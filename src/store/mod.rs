//! Account store — keyed records behind a single lock, persisted as JSON.
//!
//! Every mutation runs inside the write lock, so a read-modify-write against
//! one account is a single conditional update and settlement can work from
//! one consistent snapshot with wagering frozen. The file write after each
//! mutation is best-effort; a failed save is logged, not surfaced.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::types::{Account, HistoryEntry, RoundPhase, StudentId, TattaError};

/// Default data file path.
const DEFAULT_DATA_FILE: &str = "tatta_data.json";

// ---------------------------------------------------------------------------
// Store data
// ---------------------------------------------------------------------------

/// Everything the game persists: accounts, round history, and the phase of
/// the current round.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreData {
    pub accounts: HashMap<Uuid, Account>,
    pub history: Vec<HistoryEntry>,
    pub phase: RoundPhase,
}

impl StoreData {
    /// Look up an account by its `(name, number)` identity.
    pub fn find_by_identity(&self, name: &str, number: StudentId) -> Option<&Account> {
        self.accounts
            .values()
            .find(|a| a.name == name && a.number == number)
    }

    /// Whether the `(name, number)` pair is already registered.
    pub fn identity_taken(&self, name: &str, number: StudentId) -> bool {
        self.find_by_identity(name, number).is_some()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Shared keyed record store. Wrap in an `Arc` and hand to every handler.
pub struct Store {
    data: RwLock<StoreData>,
    path: Option<PathBuf>,
}

impl Store {
    /// Volatile store with no backing file (tests, dry runs).
    pub fn in_memory() -> Self {
        Self { data: RwLock::new(StoreData::default()), path: None }
    }

    /// Open the store at `path` (or the default file), resuming saved data
    /// when the file exists and starting fresh otherwise.
    pub fn open(path: Option<&str>) -> Result<Self, TattaError> {
        let path = PathBuf::from(path.unwrap_or(DEFAULT_DATA_FILE));

        let data = if path.exists() {
            let json = std::fs::read_to_string(&path)
                .map_err(|e| TattaError::Storage(format!("read {}: {e}", path.display())))?;
            let data: StoreData = serde_json::from_str(&json)
                .map_err(|e| TattaError::Storage(format!("parse {}: {e}", path.display())))?;
            info!(
                path = %path.display(),
                accounts = data.accounts.len(),
                rounds = data.history.len(),
                "Store loaded from disk"
            );
            data
        } else {
            info!(path = %path.display(), "No saved data found, starting fresh");
            StoreData::default()
        };

        Ok(Self { data: RwLock::new(data), path: Some(path) })
    }

    /// Read-only access to a consistent snapshot of the data.
    pub async fn view<T>(&self, f: impl FnOnce(&StoreData) -> T) -> T {
        let data = self.data.read().await;
        f(&data)
    }

    /// Run `f` as one critical section over the whole store. On success the
    /// new state is written back to the data file.
    pub async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreData) -> Result<T, TattaError>,
    ) -> Result<T, TattaError> {
        let mut data = self.data.write().await;
        let result = f(&mut data)?;
        self.persist(&data);
        Ok(result)
    }

    fn persist(&self, data: &StoreData) {
        let Some(path) = &self.path else { return };
        match serde_json::to_string_pretty(data) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, &json) {
                    error!(path = %path.display(), error = %e, "Failed to save store");
                } else {
                    debug!(path = %path.display(), accounts = data.accounts.len(), "Store saved");
                }
            }
            Err(e) => error!(error = %e, "Failed to serialise store"),
        }
    }

    // -- Account operations ------------------------------------------------

    /// Create an account, enforcing `(name, number)` uniqueness.
    pub async fn create_account(
        &self,
        name: &str,
        number: StudentId,
        password: &str,
        admin: bool,
        starting_balance: Decimal,
    ) -> Result<Account, TattaError> {
        self.mutate(|data| {
            if data.identity_taken(name, number) {
                return Err(TattaError::StateConflict(format!(
                    "account {number} {name} already exists"
                )));
            }
            let account = Account::new(name, number, password, admin, starting_balance);
            data.accounts.insert(account.id, account.clone());
            Ok(account)
        })
        .await
    }

    /// Point read by primary key.
    pub async fn find_account(&self, id: Uuid) -> Option<Account> {
        self.view(|data| data.accounts.get(&id).cloned()).await
    }

    /// Point read by `(name, number)` identity.
    pub async fn find_by_identity(&self, name: &str, number: StudentId) -> Option<Account> {
        self.view(|data| data.find_by_identity(name, number).cloned()).await
    }

    /// Snapshot of all accounts.
    pub async fn list_accounts(&self) -> Vec<Account> {
        self.view(|data| data.accounts.values().cloned().collect()).await
    }

    /// Conditional single-record update: `f` validates and mutates the
    /// account under the write lock, so no concurrent request can interleave
    /// between its read and its write.
    pub async fn update_account(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Account) -> Result<(), TattaError>,
    ) -> Result<Account, TattaError> {
        self.mutate(|data| {
            let account = data
                .accounts
                .get_mut(&id)
                .ok_or_else(|| TattaError::NotFound(format!("unknown account {id}")))?;
            f(account)?;
            Ok(account.clone())
        })
        .await
    }

    // -- Round state -------------------------------------------------------

    pub async fn phase(&self) -> RoundPhase {
        self.view(|data| data.phase).await
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.view(|data| data.history.clone()).await
    }

    /// Most recently appended round result.
    pub async fn latest_history(&self) -> Option<HistoryEntry> {
        self.view(|data| data.history.last().cloned()).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Team, Wager};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sid(s: &str) -> StudentId {
        s.parse().unwrap()
    }

    fn temp_path() -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("tatta_test_store_{}.json", Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = Store::in_memory();
        let account = store
            .create_account("홍길동", sid("1101"), "pw", false, dec!(5000))
            .await
            .unwrap();

        let by_id = store.find_account(account.id).await.unwrap();
        assert_eq!(by_id.name, "홍길동");
        assert_eq!(by_id.balance, dec!(5000));

        let by_identity = store.find_by_identity("홍길동", sid("1101")).await.unwrap();
        assert_eq!(by_identity.id, account.id);
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let store = Store::in_memory();
        store
            .create_account("홍길동", sid("1101"), "pw", false, dec!(5000))
            .await
            .unwrap();

        let err = store
            .create_account("홍길동", sid("1101"), "other", false, dec!(5000))
            .await
            .unwrap_err();
        assert!(matches!(err, TattaError::StateConflict(_)));

        // Same name, different number is a different student.
        assert!(store
            .create_account("홍길동", sid("1102"), "pw", false, dec!(5000))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_update_account_applies_under_lock() {
        let store = Store::in_memory();
        let account = store
            .create_account("김수", sid("2203"), "pw", false, dec!(5000))
            .await
            .unwrap();

        let updated = store
            .update_account(account.id, |a| {
                a.balance -= dec!(100);
                a.wager = Some(Wager { team: Team::One, amount: dec!(100) });
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(updated.balance, dec!(4900));
        assert!(updated.has_wager());
    }

    #[tokio::test]
    async fn test_update_account_failure_leaves_record_unchanged() {
        let store = Store::in_memory();
        let account = store
            .create_account("김수", sid("2203"), "pw", false, dec!(5000))
            .await
            .unwrap();

        let err = store
            .update_account(account.id, |a| {
                // Validation fails before any mutation.
                if a.balance < dec!(99999) {
                    return Err(TattaError::Validation("too poor".into()));
                }
                a.balance = Decimal::ZERO;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TattaError::Validation(_)));

        let unchanged = store.find_account(account.id).await.unwrap();
        assert_eq!(unchanged.balance, dec!(5000));
    }

    #[tokio::test]
    async fn test_update_unknown_account() {
        let store = Store::in_memory();
        let err = store.update_account(Uuid::new_v4(), |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, TattaError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_history_latest_is_last_appended() {
        let store = Store::in_memory();
        assert!(store.latest_history().await.is_none());

        store
            .mutate(|data| {
                data.history.push(HistoryEntry {
                    winner: Team::One,
                    time: Utc::now(),
                    committer: "관리자".into(),
                });
                data.history.push(HistoryEntry {
                    winner: Team::Three,
                    time: Utc::now(),
                    committer: "관리자".into(),
                });
                Ok(())
            })
            .await
            .unwrap();

        let latest = store.latest_history().await.unwrap();
        assert_eq!(latest.winner, Team::Three);
        assert_eq!(store.history().await.len(), 2);
    }

    #[tokio::test]
    async fn test_open_missing_file_starts_fresh() {
        let path = temp_path();
        let store = Store::open(Some(path.as_str())).unwrap();
        assert!(store.list_accounts().await.is_empty());
        assert_eq!(store.phase().await, RoundPhase::Open);
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let path = temp_path();
        {
            let store = Store::open(Some(path.as_str())).unwrap();
            let account = store
                .create_account("홍길동", sid("1101"), "pw", true, dec!(5000))
                .await
                .unwrap();
            store
                .update_account(account.id, |a| {
                    a.balance -= dec!(250);
                    a.wager = Some(Wager { team: Team::Two, amount: dec!(250) });
                    Ok(())
                })
                .await
                .unwrap();
        }

        let reopened = Store::open(Some(path.as_str())).unwrap();
        let accounts = reopened.list_accounts().await;
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].balance, dec!(4750));
        assert_eq!(
            accounts[0].wager,
            Some(Wager { team: Team::Two, amount: dec!(250) })
        );
        assert!(accounts[0].admin);

        std::fs::remove_file(&path).unwrap();
    }
}
