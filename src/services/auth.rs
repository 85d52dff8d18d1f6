// Auth Service - registration, login and session lifecycle
//
// Thin wrapper over the identity gateway. Credentials and tokens live in the
// external provider; this service adds validation and the user lifecycle
// events that drive onboarding. A provider failure on register/login fails
// the call and emits nothing; logout stays best-effort and always emits.

use std::sync::Arc;

use crate::error::{Result, WalletError};
use crate::events::{EventBus, EventEnvelope, EventType, UserEventPayload};
use crate::identity::{IdentityClient, TokenPair};
use crate::validation;

pub struct AuthService {
    identity: Arc<IdentityClient>,
    bus: Arc<EventBus>,
}

/// Outcome of a successful registration.
#[derive(Debug, Clone)]
pub struct RegisteredUser {
    pub user_id: String,
    pub username: String,
    pub email: String,
}

impl AuthService {
    pub fn new(identity: Arc<IdentityClient>, bus: Arc<EventBus>) -> Self {
        Self { identity, bus }
    }

    /// Create the user principal at the identity provider and emit
    /// USER_REGISTERED to start the onboarding chain.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisteredUser> {
        validation::validate_username(username)?;
        validation::validate_email(email)?;
        validation::validate_password(password)?;

        let subject = self.identity.create_user(username, email, password).await?;
        tracing::info!("Registered user {} as subject {}", username, subject);

        self.publish_user_event(
            EventType::UserRegistered,
            &subject,
            username,
            Some(email),
            "register",
        )
        .await;

        Ok(RegisteredUser {
            user_id: subject,
            username: username.to_string(),
            email: email.to_string(),
        })
    }

    /// Password grant. The subject is resolved from the username so the
    /// login event can be keyed correctly.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        if username.is_empty() || password.is_empty() {
            return Err(WalletError::InvalidCredentials);
        }

        let tokens = self.identity.password_grant(username, password).await?;

        let subject = self.identity.find_subject(username).await?;
        tracing::debug!("Login for subject {}", subject);

        self.publish_user_event(EventType::UserLogin, &subject, username, None, "login")
            .await;

        Ok(tokens)
    }

    /// Exchange a refresh token. Emits no events.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        if refresh_token.is_empty() {
            return Err(WalletError::InvalidInput("Refresh token is required".into()));
        }

        self.identity.refresh(refresh_token).await
    }

    /// Revoke the subject's sessions. Downstream failure is logged, not
    /// surfaced; USER_LOGOUT is emitted either way.
    pub async fn logout(&self, subject: &str) -> Result<()> {
        if let Err(e) = self.identity.logout(subject).await {
            tracing::warn!("Best-effort logout for {} failed downstream: {}", subject, e);
        }

        self.publish_user_event(EventType::UserLogout, subject, "", None, "logout")
            .await;

        Ok(())
    }

    async fn publish_user_event(
        &self,
        event_type: EventType,
        subject: &str,
        username: &str,
        email: Option<&str>,
        action: &str,
    ) {
        let payload = UserEventPayload {
            user_id: subject.to_string(),
            username: username.to_string(),
            email: email.map(str::to_string),
        };

        let envelope = match EventEnvelope::new(event_type, subject, &payload) {
            Ok(envelope) => envelope.with_action(action),
            Err(e) => {
                tracing::error!("Failed to build {} event: {}", event_type.as_str(), e);
                return;
            }
        };

        if let Err(e) = self.bus.publish(envelope).await {
            tracing::warn!(
                "Failed to publish {} for subject {}: {}",
                event_type.as_str(),
                subject,
                e
            );
        }
    }
}
