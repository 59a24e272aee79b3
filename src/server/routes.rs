//! API route handlers.
//!
//! All endpoints take and return JSON. Domain errors are recovered here and
//! mapped to status codes; nothing propagates past the request boundary.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AuthEngine, Sessions};
use crate::config::GameConfig;
use crate::engine::ranking::RankingView;
use crate::engine::settlement::{SettlementEngine, SettlementReport};
use crate::engine::wager::WagerEngine;
use crate::store::Store;
use crate::types::{Account, HistoryEntry, TattaError, Team, Wager};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared by all route handlers.
pub struct AppState {
    pub store: Store,
    pub sessions: Sessions,
    pub game: GameConfig,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: Store, game: GameConfig) -> Self {
        Self { store, sessions: Sessions::new(), game }
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

impl IntoResponse for TattaError {
    fn into_response(self) -> Response {
        let status = match &self {
            TattaError::Validation(_) => StatusCode::BAD_REQUEST,
            TattaError::StateConflict(_) => StatusCode::CONFLICT,
            TattaError::NotFound(_) => StatusCode::NOT_FOUND,
            TattaError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            TattaError::Forbidden(_) => StatusCode::FORBIDDEN,
            TattaError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub number: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub number: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct BetRequest {
    /// Team number 1–4; validated here rather than by the deserializer so a
    /// bad value gets the domain error message.
    pub team: u8,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub winner_team: u8,
}

#[derive(Debug, Deserialize)]
pub struct BonusRequest {
    pub name: String,
    pub number: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub code: String,
    pub typed_code: String,
}

/// Public view of an account. Never includes the password.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub name: String,
    pub number: u16,
    pub balance: Decimal,
    pub admin: bool,
    pub wager: Option<Wager>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            name: account.name.clone(),
            number: account.number.into(),
            balance: account.balance,
            admin: account.admin,
            wager: account.wager,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: Uuid,
    pub account: AccountView,
}

#[derive(Debug, Serialize)]
pub struct PoolResponse {
    pub total: Decimal,
    pub by_team: [Decimal; 4],
    /// Implied odds per team: `total / by_team[t]`, 0 for unbacked teams.
    pub rates: [Decimal; 4],
    pub latest: Option<HistoryView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    pub winner: u8,
    pub time: DateTime<Utc>,
    pub committer: String,
}

impl From<HistoryEntry> for HistoryView {
    fn from(entry: HistoryEntry) -> Self {
        Self { winner: entry.winner.into(), time: entry.time, committer: entry.committer }
    }
}

#[derive(Debug, Serialize)]
pub struct ResetCodeResponse {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub accounts_reset: usize,
}

// ---------------------------------------------------------------------------
// Session resolution
// ---------------------------------------------------------------------------

fn bearer_token(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim()
        .parse()
        .ok()
}

/// Resolve the calling account from the `Authorization` header.
async fn require_account(state: &AppState, headers: &HeaderMap) -> Result<Account, TattaError> {
    let token =
        bearer_token(headers).ok_or_else(|| TattaError::Unauthorized("login required".into()))?;
    let account_id = state
        .sessions
        .resolve(token)
        .await
        .ok_or_else(|| TattaError::Unauthorized("login required".into()))?;
    state
        .store
        .find_account(account_id)
        .await
        .ok_or_else(|| TattaError::Unauthorized("login required".into()))
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<Account, TattaError> {
    let account = require_account(state, headers).await?;
    if !account.admin {
        return Err(TattaError::Forbidden("administrator capability required".into()));
    }
    Ok(account)
}

// ---------------------------------------------------------------------------
// Public routes
// ---------------------------------------------------------------------------

/// POST /api/signup
pub async fn signup(
    State(state): State<SharedState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<SessionResponse>, TattaError> {
    let admin = state.game.is_admin(&req.name, &req.number);
    let (account, token) = AuthEngine::signup(
        &state.store,
        &state.sessions,
        &req.name,
        &req.number,
        &req.password,
        admin,
        state.game.starting_balance(),
    )
    .await?;
    Ok(Json(SessionResponse { token, account: AccountView::from(&account) }))
}

/// POST /api/login
pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, TattaError> {
    let (account, token) =
        AuthEngine::login(&state.store, &state.sessions, &req.name, &req.number, &req.password)
            .await?;
    Ok(Json(SessionResponse { token, account: AccountView::from(&account) }))
}

/// POST /api/logout
pub async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = bearer_token(&headers) {
        AuthEngine::logout(&state.sessions, token).await;
    }
    StatusCode::NO_CONTENT
}

/// GET /api/me
pub async fn me(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<AccountView>, TattaError> {
    let account = require_account(&state, &headers).await?;
    Ok(Json(AccountView::from(&account)))
}

/// POST /api/bet
pub async fn bet(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<BetRequest>,
) -> Result<Json<AccountView>, TattaError> {
    let account = require_account(&state, &headers).await?;
    let team = Team::try_from(req.team)?;
    let account = WagerEngine::place(&state.store, account.id, team, req.amount).await?;
    Ok(Json(AccountView::from(&account)))
}

/// GET /api/ranking
pub async fn ranking(State(state): State<SharedState>) -> Json<Vec<AccountView>> {
    let accounts = RankingView::by_balance(&state.store).await;
    Json(accounts.iter().map(AccountView::from).collect())
}

/// GET /api/pool
pub async fn pool(State(state): State<SharedState>) -> Json<PoolResponse> {
    let totals = RankingView::pool_totals(&state.store).await;
    let rates = Team::ALL.map(|t| totals.rate(t));
    let latest = RankingView::latest_history(&state.store).await.map(HistoryView::from);
    Json(PoolResponse { total: totals.total, by_team: totals.by_team, rates, latest })
}

/// GET /api/history/latest
pub async fn latest_history(State(state): State<SharedState>) -> Json<Option<HistoryView>> {
    Json(RankingView::latest_history(&state.store).await.map(HistoryView::from))
}

// ---------------------------------------------------------------------------
// Admin routes
// ---------------------------------------------------------------------------

/// POST /api/admin/settle
pub async fn settle(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<SettleRequest>,
) -> Result<Json<SettlementReport>, TattaError> {
    let admin = require_admin(&state, &headers).await?;
    let winner = Team::try_from(req.winner_team)?;
    let report = SettlementEngine::settle(&state.store, winner, &admin.name).await?;
    Ok(Json(report))
}

/// POST /api/admin/bonus
pub async fn bonus(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<BonusRequest>,
) -> Result<StatusCode, TattaError> {
    require_admin(&state, &headers).await?;
    let number = req.number.parse()?;
    SettlementEngine::grant_bonus(&state.store, &req.name, number, req.amount).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/reset-code
///
/// Challenge phrase the operator must retype to confirm a full reset.
pub async fn reset_code(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<ResetCodeResponse>, TattaError> {
    require_admin(&state, &headers).await?;
    let codes = &state.game.reset_codes;
    if codes.is_empty() {
        return Err(TattaError::Validation("no reset codes configured".into()));
    }
    let idx = Utc::now().timestamp_millis() as usize % codes.len();
    Ok(Json(ResetCodeResponse { code: codes[idx].clone() }))
}

/// POST /api/admin/reset
pub async fn reset(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<ResetRequest>,
) -> Result<Json<ResetResponse>, TattaError> {
    require_admin(&state, &headers).await?;
    if req.code != req.typed_code {
        return Err(TattaError::Validation("security code does not match".into()));
    }
    let accounts_reset =
        SettlementEngine::reset_all(&state.store, state.game.starting_balance()).await?;
    Ok(Json(ResetResponse { accounts_reset }))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
