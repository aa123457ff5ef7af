use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};

use crate::session::Session;

/// An artist as returned by a provider search or the user's follow list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArtist {
    pub id: String,
    pub name: String,
}

/// One row of a provider's per-artist album listing.
///
/// Several rows may share the same `(artist_id, name)` when the provider
/// carries remasters or regional editions of one release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAlbumListing {
    pub artist_id: String,
    pub album_id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// An album in the user's favorites / saved library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoritedAlbum {
    pub id: String,
    pub name: String,
    pub artist_id: String,
    pub artist_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePlaylist {
    pub id: String,
    pub name: String,
}

/// A single page request. Offset-paginated endpoints read `offset`,
/// cursor-paginated endpoints read `after`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u32,
    pub after: Option<String>,
}

impl PageRequest {
    pub fn first(limit: u32) -> Self {
        Self {
            limit,
            offset: 0,
            after: None,
        }
    }
}

/// Port trait wrapping the remote catalog capabilities used by the sync core.
///
/// Implementations live in `spotify_rs::client` and `tidal_rs::client`
/// (production) or test mocks. Every call receives the session explicitly.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    async fn search_artists(
        &self,
        session: &Session,
        query: &str,
        limit: u32,
    ) -> Result<Vec<RemoteArtist>>;

    async fn artist_albums_page(
        &self,
        session: &Session,
        artist_id: &str,
        page: &PageRequest,
    ) -> Result<Vec<RemoteAlbumListing>>;

    async fn followed_artists_page(
        &self,
        session: &Session,
        page: &PageRequest,
    ) -> Result<Vec<RemoteArtist>>;

    async fn favorited_albums_page(
        &self,
        session: &Session,
        page: &PageRequest,
    ) -> Result<Vec<FavoritedAlbum>>;

    /// One page of an album's track ids. Tracks that cannot be played
    /// (local files, region locks) come back as `None` so the page keeps
    /// its full length.
    async fn album_tracks_page(
        &self,
        session: &Session,
        album_id: &str,
        page: &PageRequest,
    ) -> Result<Vec<Option<String>>>;

    async fn playlists_page(
        &self,
        session: &Session,
        page: &PageRequest,
    ) -> Result<Vec<RemotePlaylist>>;

    async fn follow_artists(&self, session: &Session, ids: &[String]) -> Result<()>;

    async fn favorite_albums(&self, session: &Session, ids: &[String]) -> Result<()>;

    async fn replace_playlist_tracks(
        &self,
        session: &Session,
        playlist_id: &str,
        ids: &[String],
    ) -> Result<()>;

    async fn add_playlist_tracks(
        &self,
        session: &Session,
        playlist_id: &str,
        ids: &[String],
    ) -> Result<()>;
}
