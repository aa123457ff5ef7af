use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, Utc};
use color_eyre::eyre::{OptionExt, Result, WrapErr, eyre};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Provider;
use crate::ports::session::SessionRefresher;

/// Tokens are refreshed when they expire within this window.
const REFRESH_MARGIN_SECS: i64 = 60;

/// An authenticated provider session.
///
/// Passed explicitly into every catalog call; loading, refreshing and
/// persisting it is the job of [`SessionStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub provider: Provider,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Session {
    pub fn new(provider: Provider, access_token: impl Into<String>) -> Self {
        Self {
            provider,
            token_type: default_token_type(),
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            user_id: None,
            country_code: None,
        }
    }

    /// Sessions without an expiry are assumed valid.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - now <= TimeDelta::seconds(REFRESH_MARGIN_SECS))
    }

    pub fn user_id(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .ok_or_eyre("Session has no user id; refresh the session first")
    }
}

/// Failure to exchange a refresh token at a provider's token endpoint.
#[derive(Debug, thiserror::Error)]
pub enum TokenRefreshError {
    #[error("{provider} rejected the refresh token ({status}): {body}")]
    Rejected {
        provider: Provider,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{provider} token endpoint could not be reached")]
    Unreachable {
        provider: Provider,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} token response could not be decoded")]
    Malformed {
        provider: Provider,
        #[source]
        source: reqwest::Error,
    },
}

/// Decode a token endpoint response. A non-success status keeps the response
/// body, which carries the provider's reason (`invalid_grant` and the like).
pub async fn read_token_response<T: DeserializeOwned>(
    provider: Provider,
    sent: reqwest::Result<reqwest::Response>,
) -> Result<T, TokenRefreshError> {
    let response = sent.map_err(|source| TokenRefreshError::Unreachable { provider, source })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TokenRefreshError::Rejected {
            provider,
            status,
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|source| TokenRefreshError::Malformed { provider, source })
}

/// Loads, refreshes and persists the session file for one provider.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<Session> {
        let contents = std::fs::read_to_string(&self.path).wrap_err(format!(
            "No session at {}; sign in with the provider and save the token there",
            self.path.display()
        ))?;
        serde_json::from_str(&contents)
            .wrap_err(format!("Failed to parse session file: {}", self.path.display()))
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err(format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, contents)
            .wrap_err(format!("Failed to write session file: {}", self.path.display()))
    }

    /// Load the session, refreshing and persisting it if it is about to expire.
    pub async fn ensure_fresh<R>(&self, provider: Provider, refresher: &R) -> Result<Session>
    where
        R: SessionRefresher + ?Sized,
    {
        let session = self.load()?;
        if session.provider != provider {
            return Err(eyre!(
                "Session file {} belongs to {}, not {}",
                self.path.display(),
                session.provider,
                provider
            ));
        }

        if !session.needs_refresh(Utc::now()) {
            log::debug!("Using stored {} session", provider);
            return Ok(session);
        }

        if session.refresh_token.is_none() {
            return Err(eyre!(
                "{} session expired and has no refresh token; sign in again",
                provider
            ));
        }

        log::info!("Refreshing expired {} session", provider);
        let refreshed = refresher
            .refresh(&session)
            .await
            .wrap_err(format!("Failed to refresh {} session", provider))?;
        self.save(&refreshed)?;
        Ok(refreshed)
    }
}
