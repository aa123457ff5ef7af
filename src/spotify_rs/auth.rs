use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{TimeDelta, Utc};
use color_eyre::eyre::{OptionExt, Result};

use crate::config::Provider;
use crate::ports::session::SessionRefresher;
use crate::session::{Session, TokenRefreshError, read_token_response};
use crate::spotify_rs::types::SpotifyTokenResponse;

const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Refresh an access token using a refresh token
/// https://developer.spotify.com/documentation/web-api/tutorials/refreshing-tokens
pub async fn refresh_access_token(
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<SpotifyTokenResponse, TokenRefreshError> {
    let client = reqwest::Client::new();

    let mut params = HashMap::new();
    params.insert("grant_type", "refresh_token");
    params.insert("refresh_token", refresh_token);
    params.insert("client_id", client_id);

    let sent = client
        .post(token_url)
        // This serializes to x-www-form-urlencoded and sets the header (as required by spotify)
        .form(&params)
        .header(
            "Authorization",
            format!(
                "Basic {}",
                STANDARD.encode(format!("{}:{}", client_id, client_secret))
            ),
        )
        .timeout(Duration::from_secs(10))
        .send()
        .await;

    read_token_response(Provider::Spotify, sent).await
}

/// Refreshes Spotify sessions with the app's client credentials.
pub struct SpotifyAuth {
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl SpotifyAuth {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::with_token_url(client_id, client_secret, SPOTIFY_TOKEN_URL)
    }

    pub fn with_token_url(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: token_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl SessionRefresher for SpotifyAuth {
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

        Ok(Session {
            token_type: token.token_type,
            access_token: token.access_token,
            // Spotify may omit the refresh token, in which case the old one stays valid
            refresh_token: token.refresh_token.or_else(|| session.refresh_token.clone()),
            expires_at: Some(Utc::now() + TimeDelta::seconds(token.expires_in as i64)),
            ..session.clone()
        })
    }
}
