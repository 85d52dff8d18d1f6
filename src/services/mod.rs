// Pesa Wallet Services

pub mod auth;
pub mod customer;
pub mod kyc;
pub mod ledger;
pub mod limits;
pub mod projector;
pub mod wallet;

pub use auth::AuthService;
pub use customer::CustomerService;
pub use kyc::KycService;
pub use ledger::LedgerService;
pub use limits::LimitEngine;
pub use projector::BalanceProjector;
pub use wallet::WalletService;
