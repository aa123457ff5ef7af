use std::time::Duration;

use chrono::{TimeDelta, Utc};
use color_eyre::eyre::{OptionExt, Result, WrapErr};

use crate::config::Provider;
use crate::ports::session::SessionRefresher;
use crate::session::{Session, TokenRefreshError, read_token_response};
use crate::tidal_rs::client::TIDAL_API_URL;
use crate::tidal_rs::types::{TidalSessionInfo, TidalTokenResponse};

const TIDAL_TOKEN_URL: &str = "https://auth.tidal.com/v1/oauth2/token";

pub async fn refresh_access_token(
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TidalTokenResponse, TokenRefreshError> {
    let sent = reqwest::Client::new()
        .post(token_url)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ])
        .timeout(Duration::from_secs(10))
        .send()
        .await;

    read_token_response(Provider::Tidal, sent).await
}

/// Refreshes TIDAL sessions and fills in the user id and country code that
/// user-scoped endpoints need.
pub struct TidalAuth {
    client_id: String,
    client_secret: String,
    token_url: String,
    api_url: String,
}

impl TidalAuth {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::with_urls(client_id, client_secret, TIDAL_TOKEN_URL, TIDAL_API_URL)
    }

    pub fn with_urls(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: token_url.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn session_info(&self, access_token: &str) -> Result<TidalSessionInfo> {
        reqwest::Client::new()
            .get(format!("{}/sessions", self.api_url))
            .bearer_auth(access_token)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .wrap_err("GET /sessions failed")?
            .error_for_status()
            .wrap_err("GET /sessions failed")?
            .json()
            .await
            .wrap_err("Failed to parse TIDAL session info")
    }
}

#[async_trait::async_trait]
impl SessionRefresher for TidalAuth {
    async fn refresh(&self, session: &Session) -> Result<Session> {
        let refresh_token = session
            .refresh_token
            .as_deref()
            .ok_or_eyre("Session has no refresh token")?;

        let token = refresh_access_token(
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            refresh_token,
        )
        .await?;
        let info = self.session_info(&token.access_token).await?;
        log::debug!("TIDAL session for user {} ({})", info.user_id, info.country_code);

        Ok(Session {
            token_type: token.token_type,
            access_token: token.access_token,
            refresh_token: token.refresh_token.or_else(|| session.refresh_token.clone()),
            expires_at: Some(Utc::now() + TimeDelta::seconds(token.expires_in as i64)),
            user_id: Some(info.user_id),
            country_code: Some(info.country_code),
            ..session.clone()
        })
    }
}
