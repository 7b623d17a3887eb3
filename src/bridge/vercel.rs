use serde::{Deserialize, Serialize};

use super::BridgeError;
use crate::config::Config;

const PROVIDER: &str = "vercel";

#[derive(Clone)]
pub struct VercelClient {
    http: reqwest::Client,
    api_base: String,
}

/// What we persist about a triggered deployment: the external id and URL,
/// nothing more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "readyState")]
    pub ready_state: Option<String>,
}

impl VercelClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.vercel_api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Trigger a deployment of a linked GitHub repo.
    pub async fn deploy(
        &self,
        token: &str,
        name: &str,
        repo_full_name: &str,
        branch: &str,
    ) -> Result<DeploymentInfo, BridgeError> {
        let body = serde_json::json!({
            "name": name,
            "gitSource": {
                "type": "github",
                "repo": repo_full_name,
                "ref": branch,
            },
        });

        let response = self
            .http
            .post(format!("{}/v13/deployments", self.api_base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(BridgeError::AuthExpired {
                provider: PROVIDER.to_string(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BridgeError::Api {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        response.json().await.map_err(Into::into)
    }
}
