//! Thin clients for third-party REST APIs. Upstream failures are classified
//! at this layer: a 401 from the provider means the stored credential is no
//! longer valid and the account needs a reconnect, which callers surface
//! differently from a generic upstream failure.

pub mod github;
pub mod oauth;
pub mod vercel;

use thiserror::Error;

use crate::errors::AppError;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Provider rejected the stored credential (401): reconnect required.
    #[error("{provider} rejected the stored credential")]
    AuthExpired { provider: String },

    #[error("{provider} returned {status}: {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<BridgeError> for AppError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::AuthExpired { provider } => {
                AppError::UpstreamAuthExpired { provider }
            }
            BridgeError::Api {
                provider,
                status,
                message,
            } => AppError::Upstream {
                provider,
                message: format!("HTTP {status}: {message}"),
            },
            BridgeError::Transport(e) => AppError::Upstream {
                provider: "upstream".to_string(),
                message: e.to_string(),
            },
        }
    }
}
