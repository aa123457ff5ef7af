use serde::{Deserialize, Serialize};

/// Spotify OAuth token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpotifyExternalUrls {
    pub spotify: Option<String>,
}

/// Simplified album object from `/artists/{id}/albums` and `/me/albums`
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyAlbum {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    #[serde(default)]
    pub external_urls: SpotifyExternalUrls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifySavedAlbum {
    pub album: SpotifyAlbum,
}

/// Track ids are null for local files and some unavailable tracks
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifySimplifiedTrack {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPlaylist {
    pub id: String,
    pub name: String,
}

/// Offset paging object
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPage<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtistSearch {
    pub artists: SpotifyPage<SpotifyArtist>,
}

/// Cursor paging object returned by `/me/following`
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyFollowedArtists {
    pub artists: SpotifyPage<SpotifyArtist>,
}
