use color_eyre::eyre::Result;

use crate::session::Session;

/// Port trait for renewing an expired provider session.
///
/// Implementations live in `spotify_rs::auth` and `tidal_rs::auth`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh(&self, session: &Session) -> Result<Session>;
}
