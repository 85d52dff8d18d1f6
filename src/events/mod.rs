// Event Bus Module
// Envelope format, topics and the in-process ordered bus

pub mod bus;
pub mod envelope;

pub use bus::{EventBus, EventBusConfig, EventHandler};
pub use envelope::{
    CustomerCreatedPayload, EventEnvelope, EventMetadata, EventType, KycEventPayload, Topic,
    TransactionEventPayload, UserEventPayload, WalletCreatedPayload,
};
