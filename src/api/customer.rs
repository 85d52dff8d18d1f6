// Customer & KYC API Endpoints

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{ApiState, AuthSubject};
use crate::error::WalletError;
use crate::models::{Customer, KycStatus};
use crate::services::customer::{CreateCustomerData, UpdateCustomerData};
use crate::services::kyc::KycStatusView;

/// Customer routes. The verification provider calls the webhook
/// unauthenticated; everything else requires a bearer token.
pub fn routes(state: ApiState) -> Router<ApiState> {
    let protected = Router::new()
        .route("/", post(create_customer))
        .route("/me", get(get_my_profile).put(update_my_profile))
        .route("/me/kyc/initiate", post(initiate_kyc))
        .route("/me/kyc/status", get(kyc_status))
        .layer(middleware::from_fn_with_state(state, super::auth_middleware));

    Router::new()
        .route("/kyc/webhook", post(kyc_webhook))
        .merge(protected)
}

// Request/Response DTOs

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCustomerRequest {
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    address: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCustomerRequest {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
}

#[derive(Deserialize)]
struct InitiateKycRequest {
    documents: serde_json::Value,
}

#[derive(Serialize)]
struct InitiateKycResponse {
    status: KycStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KycWebhookRequest {
    customer_id: i64,
    status: String,
    verified_at: Option<String>,
    rejection_reason: Option<String>,
}

#[derive(Serialize)]
struct KycWebhookResponse {
    status: KycStatus,
}

// Endpoint handlers

async fn create_customer(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Json(req): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<Customer>), WalletError> {
    let customer = state
        .customers
        .create_customer(
            &subject,
            CreateCustomerData {
                first_name: req.first_name,
                last_name: req.last_name,
                email: req.email,
                phone: req.phone,
                address: req.address,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(customer)))
}

async fn get_my_profile(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
) -> Result<Json<Customer>, WalletError> {
    let customer = state.customers.get_profile(&subject).await?;
    Ok(Json(customer))
}

async fn update_my_profile(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Json(req): Json<UpdateCustomerRequest>,
) -> Result<Json<Customer>, WalletError> {
    let customer = state
        .customers
        .update_profile(
            &subject,
            UpdateCustomerData {
                first_name: req.first_name,
                last_name: req.last_name,
                email: req.email,
                phone: req.phone,
                address: req.address,
            },
        )
        .await?;

    Ok(Json(customer))
}

async fn initiate_kyc(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
    Json(req): Json<InitiateKycRequest>,
) -> Result<Json<InitiateKycResponse>, WalletError> {
    let customer_id = state.customers.resolve_customer_id(&subject).await?;
    let check = state.kyc.initiate(customer_id, req.documents).await?;

    Ok(Json(InitiateKycResponse {
        status: check.status,
    }))
}

async fn kyc_status(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
) -> Result<Json<KycStatusView>, WalletError> {
    let customer_id = state.customers.resolve_customer_id(&subject).await?;
    let view = state.kyc.status(customer_id).await?;

    Ok(Json(view))
}

/// Public webhook called by the verification provider.
async fn kyc_webhook(
    State(state): State<ApiState>,
    Json(req): Json<KycWebhookRequest>,
) -> Result<Json<KycWebhookResponse>, WalletError> {
    let check = state
        .kyc
        .apply_webhook(
            req.customer_id,
            &req.status,
            req.verified_at.as_deref(),
            req.rejection_reason.as_deref(),
        )
        .await?;

    Ok(Json(KycWebhookResponse {
        status: check.status,
    }))
}
