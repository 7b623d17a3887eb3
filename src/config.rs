use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// 64-char hex AES-256 key for the credential vault.
    pub master_key: String,
    /// Base URL this instance is reachable at, used for OAuth redirects.
    pub public_base_url: String,
    pub github_client_id: String,
    pub github_client_secret: String,
    /// Overridable in tests to point at a mock server.
    pub github_api_base: String,
    pub github_oauth_base: String,
    pub vercel_api_base: String,
    /// Mutations allowed per user per minute.
    pub write_rate_limit: u32,
    /// Secret-decrypt calls allowed per user per minute. Deliberately much
    /// stricter than the write limit.
    pub decrypt_rate_limit: u32,
}

const PLACEHOLDER_KEY: &str = "CHANGE_ME_32_BYTE_HEX_KEY";

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let master_key =
        std::env::var("SETLOG_MASTER_KEY").unwrap_or_else(|_| PLACEHOLDER_KEY.into());

    if master_key == PLACEHOLDER_KEY {
        let env_mode = std::env::var("SETLOG_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "SETLOG_MASTER_KEY is still the insecure placeholder. \
                 Set a proper 64-char hex key before running in production."
            );
        }
        eprintln!(
            "⚠️  SETLOG_MASTER_KEY is not set — using insecure placeholder. \
             Set a 64-char hex key for production."
        );
    }

    Ok(Config {
        port: std::env::var("SETLOG_PORT")
            .unwrap_or_else(|_| "8090".into())
            .parse()
            .unwrap_or(8090),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://setlog.db".into()),
        master_key,
        public_base_url: std::env::var("SETLOG_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:8090".into()),
        github_client_id: std::env::var("SETLOG_GITHUB_CLIENT_ID").unwrap_or_default(),
        github_client_secret: std::env::var("SETLOG_GITHUB_CLIENT_SECRET")
            .unwrap_or_default(),
        github_api_base: std::env::var("SETLOG_GITHUB_API_BASE")
            .unwrap_or_else(|_| "https://api.github.com".into()),
        github_oauth_base: std::env::var("SETLOG_GITHUB_OAUTH_BASE")
            .unwrap_or_else(|_| "https://github.com".into()),
        vercel_api_base: std::env::var("SETLOG_VERCEL_API_BASE")
            .unwrap_or_else(|_| "https://api.vercel.com".into()),
        write_rate_limit: std::env::var("SETLOG_WRITE_RPM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120),
        decrypt_rate_limit: std::env::var("SETLOG_DECRYPT_RPM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10),
    })
}

impl Config {
    /// The vault key used when SETLOG_MASTER_KEY is absent in dev mode.
    /// Matches the placeholder check in `load`.
    pub fn effective_master_key(&self) -> String {
        if self.master_key == PLACEHOLDER_KEY {
            // Deterministic dev-only key.
            "0".repeat(64)
        } else {
            self.master_key.clone()
        }
    }
}
