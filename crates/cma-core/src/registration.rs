use crate::client::ApiClient;
use crate::credentials::Credentials;
use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    manager_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
}

/// Obtains a new access token when the control plane rejects the current one.
#[derive(Debug, Clone)]
pub struct Registration {
    client: ApiClient,
    creds: Credentials,
}

impl Registration {
    pub fn new(client: ApiClient, creds: Credentials) -> Self {
        Self { client, creds }
    }

    /// Exchange the refresh token for a new access token, persist both and
    /// install the new access token on the shared client.
    pub async fn refresh(&self) -> Result<()> {
        info!("refreshing access token");

        let refresh_token = self.creds.load_refresh_token()?;
        let manager_id = self.creds.load_manager_id()?;

        let body = self
            .client
            .post_json_as(
                "manager/register",
                &refresh_token,
                &RefreshRequest {
                    manager_id: &manager_id,
                },
            )
            .await?;
        let resp: RegisterResponse = serde_json::from_slice(&body)
            .map_err(|e| AgentError::Parse(format!("registration response: {e}")))?;

        if !resp.refresh_token.is_empty() {
            self.creds.save_refresh_token(&resp.refresh_token)?;
        }
        self.creds.save_jwt(&resp.access_token)?;
        self.client.set_token(&resp.access_token);
        Ok(())
    }
}
