// Ledger Command API Endpoints

use axum::{extract::State, middleware, routing::post, Extension, Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiState, AuthSubject};
use crate::error::WalletError;
use crate::models::Transaction;

pub fn routes(state: ApiState) -> Router<ApiState> {
    Router::new()
        .route("/deposit", post(deposit))
        .route("/withdrawal", post(withdrawal))
        .route("/transfer", post(transfer))
        .layer(middleware::from_fn_with_state(state, super::auth_middleware))
}

// Request DTOs. Every command carries a caller-supplied idempotency key.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositRequest {
    idempotency_key: String,
    to_wallet_id: Uuid,
    amount: Decimal,
    currency: String,
    metadata: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalRequest {
    idempotency_key: String,
    from_wallet_id: Uuid,
    amount: Decimal,
    currency: String,
    metadata: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest {
    idempotency_key: String,
    from_wallet_id: Uuid,
    to_wallet_id: Uuid,
    amount: Decimal,
    currency: String,
    metadata: Option<serde_json::Value>,
}

// Endpoint handlers. Commands are admitted for any authenticated principal;
// the ledger core validates the wallet endpoints themselves.

async fn deposit(
    State(state): State<ApiState>,
    Extension(AuthSubject(_subject)): Extension<AuthSubject>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<Transaction>, WalletError> {
    let transaction = state
        .ledger
        .deposit(
            req.to_wallet_id,
            req.amount,
            req.currency,
            req.idempotency_key,
            req.metadata,
        )
        .await?;

    Ok(Json(transaction))
}

async fn withdrawal(
    State(state): State<ApiState>,
    Extension(AuthSubject(_subject)): Extension<AuthSubject>,
    Json(req): Json<WithdrawalRequest>,
) -> Result<Json<Transaction>, WalletError> {
    let transaction = state
        .ledger
        .withdraw(
            req.from_wallet_id,
            req.amount,
            req.currency,
            req.idempotency_key,
            req.metadata,
        )
        .await?;

    Ok(Json(transaction))
}

async fn transfer(
    State(state): State<ApiState>,
    Extension(AuthSubject(_subject)): Extension<AuthSubject>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<Transaction>, WalletError> {
    let transaction = state
        .ledger
        .transfer(
            req.from_wallet_id,
            req.to_wallet_id,
            req.amount,
            req.currency,
            req.idempotency_key,
            req.metadata,
        )
        .await?;

    Ok(Json(transaction))
}
