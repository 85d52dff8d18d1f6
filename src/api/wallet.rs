// Wallet API Endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiState, AuthSubject};
use crate::error::WalletError;
use crate::models::{
    BalanceSnapshot, Transaction, TransactionStatus, TransactionType, Wallet,
};
use crate::services::ledger::{PageRequest, TransactionFilter};

pub fn routes(state: ApiState) -> Router<ApiState> {
    Router::new()
        .route("/", post(create_wallet))
        .route("/me", get(get_my_wallets))
        .route("/:id", get(get_wallet))
        .route("/:id/balance", get(get_balance))
        .route("/:id/suspend", put(suspend_wallet))
        .route("/:id/activate", put(activate_wallet))
        .route("/:id/transactions", get(list_transactions))
        .layer(middleware::from_fn_with_state(state, super::auth_middleware))
}

// Request/Response DTOs

#[derive(Deserialize)]
struct CreateWalletRequest {
    currency: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionListQuery {
    from_date: Option<chrono::DateTime<chrono::Utc>>,
    to_date: Option<chrono::DateTime<chrono::Utc>>,
    status: Option<String>,
    transaction_type: Option<String>,
    page: Option<i64>,
    size: Option<i64>,
    sort_by: Option<String>,
    sort_direction: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaginationMeta {
    page: i64,
    size: i64,
    total_elements: i64,
    total_pages: i64,
    has_next: bool,
    has_previous: bool,
}

#[derive(Serialize)]
struct TransactionPage {
    transactions: Vec<Transaction>,
    pagination: PaginationMeta,
}

fn pagination_meta(page: i64, size: i64, total_elements: i64) -> PaginationMeta {
    let total_pages = if total_elements == 0 {
        0
    } else {
        (total_elements + size - 1) / size
    };

    PaginationMeta {
        page,
        size,
        total_elements,
        total_pages,
        has_next: page + 1 < total_pages,
        has_previous: page > 0 && total_pages > 0,
    }
}

// Endpoint handlers

async fn create_wallet(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Json(req): Json<CreateWalletRequest>,
) -> Result<(StatusCode, Json<Wallet>), WalletError> {
    let customer_id = state.customers.resolve_customer_id(&subject).await?;
    let wallet = state.wallets.create_wallet(customer_id, &req.currency).await?;

    Ok((StatusCode::CREATED, Json(wallet)))
}

async fn get_my_wallets(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
) -> Result<Json<Vec<Wallet>>, WalletError> {
    let customer_id = state.customers.resolve_customer_id(&subject).await?;
    let wallets = state.wallets.get_my_wallets(customer_id).await?;

    Ok(Json(wallets))
}

async fn get_wallet(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Path(id): Path<Uuid>,
) -> Result<Json<Wallet>, WalletError> {
    let customer_id = state.customers.resolve_customer_id(&subject).await?;
    let wallet = state.wallets.get_wallet(id, customer_id).await?;

    Ok(Json(wallet))
}

async fn get_balance(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Path(id): Path<Uuid>,
) -> Result<Json<BalanceSnapshot>, WalletError> {
    let customer_id = state.customers.resolve_customer_id(&subject).await?;
    let snapshot = state.wallets.get_balance(id, customer_id).await?;

    Ok(Json(snapshot))
}

async fn suspend_wallet(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Path(id): Path<Uuid>,
) -> Result<Json<Wallet>, WalletError> {
    let customer_id = state.customers.resolve_customer_id(&subject).await?;
    let wallet = state.wallets.suspend(id, customer_id).await?;

    Ok(Json(wallet))
}

async fn activate_wallet(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Path(id): Path<Uuid>,
) -> Result<Json<Wallet>, WalletError> {
    let customer_id = state.customers.resolve_customer_id(&subject).await?;
    let wallet = state.wallets.activate(id, customer_id).await?;

    Ok(Json(wallet))
}

async fn list_transactions(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Path(id): Path<Uuid>,
    Query(query): Query<TransactionListQuery>,
) -> Result<Json<TransactionPage>, WalletError> {
    let customer_id = state.customers.resolve_customer_id(&subject).await?;
    // Ownership check; the history itself is served by the ledger core
    state.wallets.get_wallet(id, customer_id).await?;

    let status = query
        .status
        .as_deref()
        .map(|s| {
            TransactionStatus::parse(s)
                .ok_or_else(|| WalletError::InvalidInput(format!("Unknown status: {}", s)))
        })
        .transpose()?;

    let transaction_type = query
        .transaction_type
        .as_deref()
        .map(|t| {
            TransactionType::parse(t)
                .ok_or_else(|| WalletError::InvalidInput(format!("Unknown transaction type: {}", t)))
        })
        .transpose()?;

    let filter = TransactionFilter {
        from_date: query.from_date,
        to_date: query.to_date,
        status,
        transaction_type,
    };

    let page = PageRequest::from_params(
        query.page,
        query.size,
        query.sort_by.as_deref(),
        query.sort_direction.as_deref(),
    )?;

    let (transactions, total) = state
        .ledger
        .list_wallet_transactions(id, &filter, &page)
        .await?;

    Ok(Json(TransactionPage {
        pagination: pagination_meta(page.page, page.size, total),
        transactions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_meta_math() {
        let meta = pagination_meta(0, 20, 45);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(!meta.has_previous);

        let meta = pagination_meta(2, 20, 45);
        assert!(!meta.has_next);
        assert!(meta.has_previous);

        let meta = pagination_meta(0, 20, 0);
        assert_eq!(meta.total_pages, 0);
        assert!(!meta.has_next);
        assert!(!meta.has_previous);

        let meta = pagination_meta(0, 20, 20);
        assert_eq!(meta.total_pages, 1);
        assert!(!meta.has_next);
    }
}
