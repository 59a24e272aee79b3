//! Shared types for the TATTA game server.
//!
//! These types form the data model used across all modules: the four-team
//! enumeration, the school identifier scheme, accounts and wagers, round
//! history, and the domain error taxonomy.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Team
// ---------------------------------------------------------------------------

/// One of the four teams a wager can back.
///
/// Serialized as the integer 1–4; anything else is rejected when the value
/// crosses a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Team {
    One,
    Two,
    Three,
    Four,
}

impl Team {
    /// All teams in display order (useful for iteration).
    pub const ALL: [Team; 4] = [Team::One, Team::Two, Team::Three, Team::Four];

    /// Zero-based index, for pool arrays.
    pub fn idx(self) -> usize {
        u8::from(self) as usize - 1
    }
}

impl From<Team> for u8 {
    fn from(team: Team) -> u8 {
        match team {
            Team::One => 1,
            Team::Two => 2,
            Team::Three => 3,
            Team::Four => 4,
        }
    }
}

impl TryFrom<u8> for Team {
    type Error = TattaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Team::One),
            2 => Ok(Team::Two),
            3 => Ok(Team::Three),
            4 => Ok(Team::Four),
            other => Err(TattaError::Validation(format!(
                "team must be between 1 and 4, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team {}", u8::from(*self))
    }
}

// ---------------------------------------------------------------------------
// Student identifier
// ---------------------------------------------------------------------------

/// 4-digit school identifier `GCII`: grade 1–3, classroom 1–8, index 1–35.
///
/// Serialized as its numeric form (e.g. `1203` = grade 1, classroom 2,
/// student 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct StudentId {
    grade: u8,
    classroom: u8,
    index: u8,
}

impl StudentId {
    pub fn new(grade: u8, classroom: u8, index: u8) -> Result<Self, TattaError> {
        if !(1..=3).contains(&grade) {
            return Err(TattaError::Validation(format!(
                "grade must be 1-3, got {grade}"
            )));
        }
        if !(1..=8).contains(&classroom) {
            return Err(TattaError::Validation(format!(
                "classroom must be 1-8, got {classroom}"
            )));
        }
        if !(1..=35).contains(&index) {
            return Err(TattaError::Validation(format!(
                "student index must be 1-35, got {index}"
            )));
        }
        Ok(Self { grade, classroom, index })
    }

    pub fn grade(&self) -> u8 {
        self.grade
    }

    pub fn classroom(&self) -> u8 {
        self.classroom
    }

    pub fn index(&self) -> u8 {
        self.index
    }
}

impl From<StudentId> for u16 {
    fn from(id: StudentId) -> u16 {
        id.grade as u16 * 1000 + id.classroom as u16 * 100 + id.index as u16
    }
}

impl TryFrom<u16> for StudentId {
    type Error = TattaError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if !(1000..=9999).contains(&value) {
            return Err(TattaError::Validation(format!(
                "student number must be 4 digits, got {value}"
            )));
        }
        StudentId::new((value / 1000) as u8, (value / 100 % 10) as u8, (value % 100) as u8)
    }
}

impl std::str::FromStr for StudentId {
    type Err = TattaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TattaError::Validation(format!(
                "student number must be 4 digits, got {s:?}"
            )));
        }
        let value: u16 = s.parse().map_err(|_| {
            TattaError::Validation(format!("student number must be 4 digits, got {s:?}"))
        })?;
        StudentId::try_from(value)
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:02}", self.grade, self.classroom, self.index)
    }
}

/// Whether a name is 2–4 Hangul syllables, the only script the school roster
/// uses.
pub fn is_valid_name(name: &str) -> bool {
    let count = name.chars().count();
    (2..=4).contains(&count) && name.chars().all(|c| ('가'..='힣').contains(&c))
}

// ---------------------------------------------------------------------------
// Account & wager
// ---------------------------------------------------------------------------

/// An active bet: which team, and the amount already debited from balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wager {
    pub team: Team,
    pub amount: Decimal,
}

impl fmt::Display for Wager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.amount, self.team)
    }
}

/// A player account. `(name, number)` is unique; `id` is the storage key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub number: StudentId,
    /// Stored verbatim; credential hardening is out of scope for this game.
    pub password: String,
    pub admin: bool,
    pub balance: Decimal,
    pub wager: Option<Wager>,
}

impl Account {
    pub fn new(
        name: impl Into<String>,
        number: StudentId,
        password: impl Into<String>,
        admin: bool,
        balance: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            number,
            password: password.into(),
            admin,
            balance,
            wager: None,
        }
    }

    /// Whether this account holds an active wager this round.
    pub fn has_wager(&self) -> bool {
        self.wager.is_some()
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (balance {})", self.number, self.name, self.balance)?;
        if let Some(w) = &self.wager {
            write!(f, " [wager {w}]")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Round state & history
// ---------------------------------------------------------------------------

/// Phase of the current betting round. Wagers are only accepted while `Open`;
/// settlement flips to `Settling` before it snapshots accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RoundPhase {
    #[default]
    Open,
    Settling,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundPhase::Open => write!(f, "OPEN"),
            RoundPhase::Settling => write!(f, "SETTLING"),
        }
    }
}

/// Immutable record of a settled round. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub winner: Team,
    pub time: DateTime<Utc>,
    /// Name of the administrator who triggered settlement.
    pub committer: String,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} won at {} (by {})", self.winner, self.time.to_rfc3339(), self.committer)
    }
}

// ---------------------------------------------------------------------------
// Pool totals
// ---------------------------------------------------------------------------

/// Per-team staked totals for the current round. The implied odds formula
/// here is the same one settlement applies when a round ends.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PoolTotals {
    pub total: Decimal,
    pub by_team: [Decimal; 4],
}

impl PoolTotals {
    /// Sum active wagers across a set of accounts.
    pub fn collect<'a>(accounts: impl IntoIterator<Item = &'a Account>) -> Self {
        let mut totals = PoolTotals::default();
        for account in accounts {
            if let Some(wager) = &account.wager {
                totals.by_team[wager.team.idx()] += wager.amount;
                totals.total += wager.amount;
            }
        }
        totals
    }

    /// Payout ratio for `team`: `total / by_team[team]` rounded to 2 decimal
    /// places, or zero when the team has no backers.
    pub fn rate(&self, team: Team) -> Decimal {
        let pool = self.by_team[team.idx()];
        if pool.is_zero() {
            Decimal::ZERO
        } else {
            (self.total / pool).round_dp(2)
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for TATTA. All of these are recovered at the
/// request boundary and surfaced as a user-visible message; none are fatal.
#[derive(Debug, thiserror::Error)]
pub enum TattaError {
    /// Malformed identifier, out-of-range team, bad amount, code mismatch.
    #[error("{0}")]
    Validation(String),

    /// Double wager, wager during settlement, duplicate signup.
    #[error("{0}")]
    StateConflict(String),

    /// Unknown account.
    #[error("{0}")]
    NotFound(String),

    /// Missing/invalid session or bad credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Non-admin invoking an admin operation.
    #[error("{0}")]
    Forbidden(String),

    /// Persistence failure.
    #[error("storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
