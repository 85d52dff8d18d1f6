// Identity Gateway - HTTP client for the external identity provider
//
// The provider is treated as an opaque service: it owns usernames, passwords
// and token issuance. This client covers create-user, password grant, token
// refresh, introspection, subject lookup and revocation. Nothing
// credential-shaped is stored on our side.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, WalletError};

/// Identity provider HTTP client
pub struct IdentityClient {
    base_url: String,
    client: Client,
}

impl IdentityClient {
    /// Create a new identity client
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { base_url, client }
    }

    /// Create from environment variable or default
    pub fn from_env() -> Self {
        let base_url = std::env::var("IDENTITY_HTTP_URL")
            .unwrap_or_else(|_| "http://localhost:8180".to_string());
        Self::new(base_url)
    }

    /// Create a user principal. Returns the subject assigned by the provider.
    pub async fn create_user(&self, username: &str, email: &str, password: &str) -> Result<String> {
        let request = CreateUserRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/users", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::IdentityProvider(format!("HTTP request failed: {}", e)))?;

        if response.status().as_u16() == 409 {
            return Err(WalletError::AlreadyExists(format!(
                "User {} already exists",
                username
            )));
        }

        if !response.status().is_success() {
            return Err(WalletError::IdentityProvider(format!(
                "Create user failed: HTTP {}",
                response.status()
            )));
        }

        let body: CreateUserResponse = response
            .json()
            .await
            .map_err(|e| WalletError::IdentityProvider(format!("Failed to parse response: {}", e)))?;

        Ok(body.subject)
    }

    /// Password grant. Returns an access/refresh token pair.
    pub async fn password_grant(&self, username: &str, password: &str) -> Result<TokenPair> {
        let request = TokenRequest {
            grant_type: "password".to_string(),
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            refresh_token: None,
        };

        self.token(request).await
    }

    /// Exchange a refresh token for a fresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let request = TokenRequest {
            grant_type: "refresh_token".to_string(),
            username: None,
            password: None,
            refresh_token: Some(refresh_token.to_string()),
        };

        self.token(request).await
    }

    async fn token(&self, request: TokenRequest) -> Result<TokenPair> {
        let response = self
            .client
            .post(format!("{}/token", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::IdentityProvider(format!("HTTP request failed: {}", e)))?;

        if response.status().as_u16() == 400 || response.status().as_u16() == 401 {
            return Err(WalletError::InvalidCredentials);
        }

        if !response.status().is_success() {
            return Err(WalletError::IdentityProvider(format!(
                "Token grant failed: HTTP {}",
                response.status()
            )));
        }

        response
            .json::<TokenPair>()
            .await
            .map_err(|e| WalletError::IdentityProvider(format!("Failed to parse response: {}", e)))
    }

    /// Introspect a bearer token. Returns the subject when the token is active.
    pub async fn introspect(&self, access_token: &str) -> Result<String> {
        let request = IntrospectRequest {
            token: access_token.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/introspect", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::IdentityProvider(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WalletError::IdentityProvider(format!(
                "Introspection failed: HTTP {}",
                response.status()
            )));
        }

        let body: IntrospectResponse = response
            .json()
            .await
            .map_err(|e| WalletError::IdentityProvider(format!("Failed to parse response: {}", e)))?;

        if !body.active {
            return Err(WalletError::InvalidToken);
        }

        body.subject.ok_or(WalletError::InvalidToken)
    }

    /// Resolve the subject for a username.
    pub async fn find_subject(&self, username: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/users/by-username/{}", self.base_url, username))
            .send()
            .await
            .map_err(|e| WalletError::IdentityProvider(format!("HTTP request failed: {}", e)))?;

        if response.status().as_u16() == 404 {
            return Err(WalletError::NotFound(format!("User {} not found", username)));
        }

        if !response.status().is_success() {
            return Err(WalletError::IdentityProvider(format!(
                "Subject lookup failed: HTTP {}",
                response.status()
            )));
        }

        let body: UserInfoResponse = response
            .json()
            .await
            .map_err(|e| WalletError::IdentityProvider(format!("Failed to parse response: {}", e)))?;

        Ok(body.subject)
    }

    /// Revoke all sessions for a subject. Best-effort from the caller's view.
    pub async fn logout(&self, subject: &str) -> Result<()> {
        let request = LogoutRequest {
            subject: subject.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/logout", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::IdentityProvider(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WalletError::IdentityProvider(format!(
                "Logout failed: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}

impl Clone for IdentityClient {
    fn clone(&self) -> Self {
        Self::new(self.base_url.clone())
    }
}

// Request/Response types

#[derive(Serialize)]
struct CreateUserRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct CreateUserResponse {
    subject: String,
}

#[derive(Serialize)]
struct TokenRequest {
    grant_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

/// Access/refresh token pair as issued by the provider
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
}

#[derive(Serialize)]
struct IntrospectRequest {
    token: String,
}

#[derive(Deserialize)]
struct IntrospectResponse {
    active: bool,
    subject: Option<String>,
}

#[derive(Deserialize)]
struct UserInfoResponse {
    subject: String,
    #[allow(dead_code)]
    username: Option<String>,
}

#[derive(Serialize)]
struct LogoutRequest {
    subject: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = IdentityClient::new("http://localhost:8180".to_string());
        assert_eq!(client.base_url, "http://localhost:8180");
    }

    #[test]
    fn test_token_pair_parsing() {
        let json = r#"{"access_token":"abc","refresh_token":"def","expires_in":900}"#;
        let pair: TokenPair = serde_json::from_str(json).unwrap();
        assert_eq!(pair.access_token, "abc");
        assert_eq!(pair.expires_in, 900);
    }

    #[test]
    fn test_introspect_response_without_subject() {
        let json = r#"{"active":false}"#;
        let body: IntrospectResponse = serde_json::from_str(json).unwrap();
        assert!(!body.active);
        assert!(body.subject.is_none());
    }
}
