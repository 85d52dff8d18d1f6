// Pesa Wallet API Layer
// REST endpoints over the core services

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{Result, WalletError};
use crate::identity::IdentityClient;
use crate::services::{AuthService, CustomerService, KycService, LedgerService, WalletService};

pub mod auth;
pub mod customer;
pub mod ledger;
pub mod wallet;

/// Shared handler state. Services are immutable after construction.
#[derive(Clone)]
pub struct ApiState {
    pub auth: Arc<AuthService>,
    pub customers: Arc<CustomerService>,
    pub kyc: Arc<KycService>,
    pub wallets: Arc<WalletService>,
    pub ledger: Arc<LedgerService>,
    pub identity: Arc<IdentityClient>,
}

/// The authenticated subject, resolved by the bearer middleware and injected
/// into request extensions.
#[derive(Debug, Clone)]
pub struct AuthSubject(pub String);

/// Start the API server
pub async fn serve(bind_addr: &str, state: ApiState) -> Result<()> {
    let cors = configure_cors();

    let app = Router::new()
        .nest("/auth", auth::routes(state.clone()))
        .nest("/customers", customer::routes(state.clone()))
        .nest("/wallets", wallet::routes(state.clone()))
        .nest("/ledger", ledger::routes(state.clone()))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| WalletError::Internal(format!("Failed to bind to {}: {}", bind_addr, e)))?;

    tracing::info!("Pesa Wallet API listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| WalletError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// CORS layer over the origin whitelist in WALLET_CORS_ORIGINS
/// (comma-separated). Unset or empty means no browser origin is admitted.
fn configure_cors() -> CorsLayer {
    let origins = parse_origins(&std::env::var("WALLET_CORS_ORIGINS").unwrap_or_default());

    if origins.is_empty() {
        tracing::warn!("No CORS origins configured; browser clients will be refused");
    } else {
        tracing::info!("CORS whitelist holds {} origin(s)", origins.len());
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
}

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    let mut origins = Vec::new();

    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match entry.parse::<HeaderValue>() {
            Ok(value) => origins.push(value),
            Err(_) => tracing::warn!("Dropping unparseable CORS origin '{}'", entry),
        }
    }

    origins
}

/// Bearer-auth middleware: introspects the token against the identity
/// provider and injects the resolved subject.
pub(crate) async fn auth_middleware(
    State(state): State<ApiState>,
    mut req: Request<Body>,
    next: middleware::Next,
) -> std::result::Result<Response, WalletError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(WalletError::InvalidToken)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(WalletError::InvalidToken)?;

    let subject = state.identity.introspect(token).await?;

    req.extensions_mut().insert(AuthSubject(subject));

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins_splits_and_trims() {
        let origins = parse_origins("http://localhost:3000, https://app.pesa.example ,,");
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "http://localhost:3000");
    }

    #[test]
    fn test_parse_origins_drops_garbage() {
        assert!(parse_origins("").is_empty());
        assert!(parse_origins("bad\u{0}origin").is_empty());
    }
}
