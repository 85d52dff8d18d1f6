// Pesa Wallet
//
// A digital wallet backend: users register against an external identity
// provider, complete KYC, and move money between wallets through an
// append-only double-entry ledger.
//
// Architecture:
// - Auth: thin layer over the identity gateway, emits user lifecycle events
// - Customer & KYC: profiles, subject mapping and the verification lifecycle
// - Wallet: wallet CRUD, balance reads and event-driven provisioning
// - Ledger: idempotent deposit/withdrawal/transfer with double entry
// - Limit engine: rolling daily/monthly admission control
// - Balance projector: materializes balances from completed transactions
// - Event bus: in-process ordered topics with at-least-once delivery

pub mod api;
pub mod cache;
pub mod db;
pub mod error;
pub mod events;
pub mod identity;
pub mod models;
pub mod services;
pub mod validation;

// Re-export commonly used items
pub use cache::BalanceCache;
pub use db::{Database, DatabaseConfig};
pub use error::{Result, WalletError};
pub use identity::IdentityClient;

use std::sync::Arc;

use events::{EventBus, EventBusConfig, Topic};
use services::{
    AuthService, BalanceProjector, CustomerService, KycService, LedgerService, LimitEngine,
    WalletService,
};

/// Wallet platform
///
/// Main entry point: wires the database, cache, identity gateway, event bus
/// and core services together, and registers the event consumers that drive
/// onboarding and balance projection.
pub struct WalletPlatform {
    pub database: Database,
    pub event_bus: Arc<EventBus>,
    pub identity: Arc<IdentityClient>,

    pub auth_service: Arc<AuthService>,
    pub customer_service: Arc<CustomerService>,
    pub kyc_service: Arc<KycService>,
    pub wallet_service: Arc<WalletService>,
    pub ledger_service: Arc<LedgerService>,
    pub balance_projector: Arc<BalanceProjector>,
}

impl WalletPlatform {
    /// Create a new platform instance and start the event consumers.
    pub async fn new(db_config: DatabaseConfig) -> Result<Self> {
        let database = Database::new(db_config).await?;
        let pool = database.pool().clone();

        // Run migrations
        database.migrate().await?;

        let event_bus = Arc::new(EventBus::new(EventBusConfig::default()));
        let identity = Arc::new(IdentityClient::from_env());
        let cache = BalanceCache::from_env();

        // Core services
        let auth_service = Arc::new(AuthService::new(identity.clone(), event_bus.clone()));
        let customer_service = Arc::new(CustomerService::new(pool.clone(), event_bus.clone()));
        let kyc_service = Arc::new(KycService::new(pool.clone(), event_bus.clone()));
        let wallet_service = Arc::new(WalletService::new(
            pool.clone(),
            cache.clone(),
            event_bus.clone(),
        ));
        let limit_engine = Arc::new(LimitEngine::new(pool.clone()));
        let ledger_service = Arc::new(LedgerService::new(
            pool.clone(),
            limit_engine,
            event_bus.clone(),
        ));
        let balance_projector = Arc::new(BalanceProjector::new(pool, cache));

        // Onboarding chain and projection consumers
        event_bus.subscribe(Topic::UserEvents, customer_service.clone());
        event_bus.subscribe(Topic::CustomerEvents, wallet_service.clone());
        event_bus.subscribe(Topic::KycEvents, wallet_service.clone());
        event_bus.subscribe(Topic::TransactionEvents, balance_projector.clone());
        event_bus.start();

        Ok(Self {
            database,
            event_bus,
            identity,
            auth_service,
            customer_service,
            kyc_service,
            wallet_service,
            ledger_service,
            balance_projector,
        })
    }

    /// Start the REST API server
    pub async fn start_api_server(&self, bind_addr: &str) -> Result<()> {
        let state = api::ApiState {
            auth: self.auth_service.clone(),
            customers: self.customer_service.clone(),
            kyc: self.kyc_service.clone(),
            wallets: self.wallet_service.clone(),
            ledger: self.ledger_service.clone(),
            identity: self.identity.clone(),
        };

        api::serve(bind_addr, state).await
    }

    /// Stop the event consumers. In-flight deliveries are dropped.
    pub fn shutdown(&self) {
        self.event_bus.shutdown();
    }
}
