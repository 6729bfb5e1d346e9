//! Account service client — lookups, phone linking, and registration.
//!
//! User records live in the account service; the engine only resolves
//! identities over HTTP and never touches their storage.

use serde::Deserialize;

use crate::error::CollaboratorError;

const SERVICE: &str = "account service";

/// A resolved account.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LookupResponse {
    found: bool,
    id: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    id: String,
}

/// HTTP client for the account service.
pub struct AccountClient {
    base_url: String,
    client: reqwest::Client,
}

impl AccountClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Resolve an account by normalized email. `Ok(None)` when unknown.
    pub async fn lookup_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Account>, CollaboratorError> {
        let url = format!("{}/api/auth/lookup", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(request_failed)?;

        let resp = check_status(resp)?;
        let body: LookupResponse = resp.json().await.map_err(invalid_response)?;
        Ok(to_account(body))
    }

    /// Resolve an account by the phone it was previously linked to.
    pub async fn lookup_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<Account>, CollaboratorError> {
        let url = format!("{}/api/users/by-phone/{phone}", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(request_failed)?;

        let resp = check_status(resp)?;
        let body: LookupResponse = resp.json().await.map_err(invalid_response)?;
        Ok(to_account(body))
    }

    /// Attach a phone number to an existing account.
    pub async fn link_phone(&self, user_id: &str, phone: &str) -> Result<(), CollaboratorError> {
        let url = format!("{}/api/users/link-phone", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "userId": user_id, "phone": phone }))
            .send()
            .await
            .map_err(request_failed)?;
        check_status(resp)?;
        Ok(())
    }

    /// Create an account from the chat login flow. The password arrives
    /// already hashed; the cleartext never leaves this process.
    pub async fn register(
        &self,
        email: &str,
        password_hash: &str,
        phone: &str,
    ) -> Result<String, CollaboratorError> {
        let url = format!("{}/api/auth/register", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "email": email,
                "passwordHash": password_hash,
                "phone": phone,
            }))
            .send()
            .await
            .map_err(request_failed)?;

        let resp = check_status(resp)?;
        let body: RegisterResponse = resp.json().await.map_err(invalid_response)?;
        Ok(body.id)
    }
}

fn to_account(body: LookupResponse) -> Option<Account> {
    match (body.found, body.id) {
        (true, Some(id)) => Some(Account {
            id,
            email: body.email,
        }),
        _ => None,
    }
}

fn request_failed(e: reqwest::Error) -> CollaboratorError {
    CollaboratorError::RequestFailed {
        service: SERVICE,
        reason: e.to_string(),
    }
}

fn invalid_response(e: reqwest::Error) -> CollaboratorError {
    CollaboratorError::InvalidResponse {
        service: SERVICE,
        reason: e.to_string(),
    }
}

fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, CollaboratorError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(CollaboratorError::BadStatus {
            service: SERVICE,
            status: resp.status().as_u16(),
        })
    }
}
