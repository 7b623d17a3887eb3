use serde::Deserialize;

use super::BridgeError;
use crate::config::Config;

const PROVIDER: &str = "github";

#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    oauth_base: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub scope: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub id: i64,
    pub login: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct GithubRepo {
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl GithubClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.github_api_base.trim_end_matches('/').to_string(),
            oauth_base: config.github_oauth_base.trim_end_matches('/').to_string(),
            client_id: config.github_client_id.clone(),
            client_secret: config.github_client_secret.clone(),
        }
    }

    /// Where the browser gets sent to grant access.
    pub fn authorize_url(&self, state: &str, redirect_uri: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", "repo read:user")
            .append_pair("state", state)
            .finish();
        format!("{}/login/oauth/authorize?{}", self.oauth_base, query)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<AccessToken, BridgeError> {
        let response = self
            .http
            .post(format!("{}/login/oauth/access_token", self.oauth_base))
            .header("accept", "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await?;
        Self::classify(response).await?.json().await.map_err(Into::into)
    }

    pub async fn get_user(&self, token: &str) -> Result<GithubUser, BridgeError> {
        let response = self
            .http
            .get(format!("{}/user", self.api_base))
            .bearer_auth(token)
            .header("user-agent", "setlog")
            .send()
            .await?;
        Self::classify(response).await?.json().await.map_err(Into::into)
    }

    pub async fn list_repos(&self, token: &str) -> Result<Vec<GithubRepo>, BridgeError> {
        let response = self
            .http
            .get(format!("{}/user/repos", self.api_base))
            .query(&[("sort", "updated"), ("per_page", "100")])
            .bearer_auth(token)
            .header("user-agent", "setlog")
            .send()
            .await?;
        Self::classify(response).await?.json().await.map_err(Into::into)
    }

    async fn classify(response: reqwest::Response) -> Result<reqwest::Response, BridgeError> {
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
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api: &str, oauth: &str) -> GithubClient {
        GithubClient {
            http: reqwest::Client::new(),
            api_base: api.trim_end_matches('/').to_string(),
            oauth_base: oauth.trim_end_matches('/').to_string(),
            client_id: "cid".into(),
            client_secret: "secret".into(),
        }
    }

    #[test]
    fn authorize_url_carries_state() {
        let c = client("https://api.github.com", "https://github.com");
        let url = c.authorize_url("tok123", "http://localhost:8090/cb");
        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("state=tok123"));
        assert!(url.contains("client_id=cid"));
    }

    #[tokio::test]
    async fn expired_credential_is_classified() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/user"))
            .respond_with(wiremock::ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let c = client(&server.uri(), &server.uri());
        let err = c.get_user("stale-token").await.unwrap_err();
        assert!(matches!(err, BridgeError::AuthExpired { .. }));
    }

    #[tokio::test]
    async fn other_failures_stay_generic() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/user/repos"))
            .respond_with(wiremock::ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let c = client(&server.uri(), &server.uri());
        let err = c.list_repos("token").await.unwrap_err();
        assert!(matches!(err, BridgeError::Api { status: 502, .. }));
    }

    #[tokio::test]
    async fn repos_parse() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/user/repos"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"full_name": "octocat/hello", "private": false, "default_branch": "main"},
                {"full_name": "octocat/secret", "private": true}
            ])))
            .mount(&server)
            .await;

        let c = client(&server.uri(), &server.uri());
        let repos = c.list_repos("token").await.unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].full_name, "octocat/hello");
        assert_eq!(repos[1].default_branch, "main");
    }
}
