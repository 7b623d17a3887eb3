//! SetLog — service-dependency tracking and encrypted credential management.
//!
//! Library crate so integration tests in `tests/` can assemble the full
//! router against an in-memory database.

pub mod api;
pub mod audit;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod errors;
pub mod graph;
pub mod models;
pub mod package;
pub mod rate_limit;
pub mod store;
pub mod vault;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use bridge::github::GithubClient;
use bridge::vercel::VercelClient;
use errors::AppError;
use rate_limit::RateLimiter;
use store::sqlite::SqliteStore;
use vault::VaultCrypto;

/// Shared application state passed to handlers.
pub struct AppState {
    pub db: SqliteStore,
    pub vault: VaultCrypto,
    pub limiter: Arc<dyn RateLimiter>,
    pub github: GithubClient,
    pub vercel: VercelClient,
    pub config: config::Config,
}

impl AppState {
    /// Must pass before any side-effecting work in a mutating handler.
    pub fn check_write_limit(&self, user_id: Uuid) -> Result<(), AppError> {
        if self.limiter.check(
            &format!("write:{user_id}"),
            self.config.write_rate_limit,
            Duration::from_secs(60),
        ) {
            Ok(())
        } else {
            Err(AppError::RateLimited)
        }
    }

    /// Stricter limit for the one path that materializes plaintext secrets.
    pub fn check_decrypt_limit(&self, user_id: Uuid) -> Result<(), AppError> {
        if self.limiter.check(
            &format!("decrypt:{user_id}"),
            self.config.decrypt_rate_limit,
            Duration::from_secs(60),
        ) {
            Ok(())
        } else {
            Err(AppError::RateLimited)
        }
    }
}

/// Assemble state from config. The vault key check happens here: a missing
/// or malformed master key aborts startup.
pub async fn build_state(config: config::Config) -> anyhow::Result<AppState> {
    let db = SqliteStore::connect(&config.database_url).await?;
    db.migrate().await?;
    let vault = VaultCrypto::new(&config.effective_master_key())?;
    let github = GithubClient::new(&config);
    let vercel = VercelClient::new(&config);
    Ok(AppState {
        db,
        vault,
        limiter: Arc::new(rate_limit::InMemoryRateLimiter::new()),
        github,
        vercel,
        config,
    })
}
