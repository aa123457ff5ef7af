use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ports::catalog::{
    CatalogClient, FavoritedAlbum, PageRequest, RemoteAlbumListing, RemoteArtist, RemotePlaylist,
};
use crate::session::Session;
use crate::spotify_rs::types::{
    SpotifyAlbum, SpotifyArtistSearch, SpotifyFollowedArtists, SpotifyPage, SpotifyPlaylist,
    SpotifySavedAlbum, SpotifySimplifiedTrack,
};

const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Spotify Web API client
pub struct SpotifyClient {
    client: reqwest::Client,
    base_url: String,
    album_types: String,
}

impl SpotifyClient {
    /// `album_types` is passed as `include_groups` when listing an artist's albums.
    pub fn new(album_types: impl Into<String>) -> Self {
        Self::with_base_url(SPOTIFY_API_URL, album_types)
    }

    pub fn with_base_url(base_url: impl Into<String>, album_types: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            album_types: album_types.into(),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        session: &Session,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&session.access_token)
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .wrap_err(format!("GET {path} failed"))?
            .error_for_status()
            .wrap_err(format!("GET {path} failed"))?;

        response
            .json()
            .await
            .wrap_err(format!("Failed to parse response from {path}"))
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        session: &Session,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<()> {
        self.client
            .request(method.clone(), format!("{}{}", self.base_url, path))
            .bearer_auth(&session.access_token)
            .query(query)
            .json(body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .wrap_err(format!("{method} {path} failed"))?
            .error_for_status()
            .wrap_err(format!("{method} {path} failed"))?;
        Ok(())
    }

    fn offset_query(page: &PageRequest) -> Vec<(&'static str, String)> {
        vec![
            ("limit", page.limit.to_string()),
            ("offset", page.offset.to_string()),
        ]
    }
}

fn track_uris(ids: &[String]) -> Vec<String> {
    ids.iter().map(|id| format!("spotify:track:{id}")).collect()
}

#[async_trait::async_trait]
impl CatalogClient for SpotifyClient {
    async fn search_artists(
        &self,
        session: &Session,
        query: &str,
        limit: u32,
    ) -> Result<Vec<RemoteArtist>> {
        let response: SpotifyArtistSearch = self
            .get(
                session,
                "/search",
                &[
                    ("q", query.to_string()),
                    ("type", "artist".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        Ok(response
            .artists
            .items
            .into_iter()
            .map(|artist| RemoteArtist {
                id: artist.id,
                name: artist.name,
            })
            .collect())
    }

    async fn artist_albums_page(
        &self,
        session: &Session,
        artist_id: &str,
        page: &PageRequest,
    ) -> Result<Vec<RemoteAlbumListing>> {
        let mut query = Self::offset_query(page);
        query.push(("include_groups", self.album_types.clone()));

        let response: SpotifyPage<SpotifyAlbum> = self
            .get(session, &format!("/artists/{artist_id}/albums"), &query)
            .await?;

        Ok(response
            .items
            .into_iter()
            .map(|album| RemoteAlbumListing {
                artist_id: artist_id.to_string(),
                album_id: album.id,
                name: album.name,
                url: album.external_urls.spotify,
            })
            .collect())
    }

    async fn followed_artists_page(
        &self,
        session: &Session,
        page: &PageRequest,
    ) -> Result<Vec<RemoteArtist>> {
        let mut query = vec![
            ("type", "artist".to_string()),
            ("limit", page.limit.to_string()),
        ];
        if let Some(after) = &page.after {
            query.push(("after", after.clone()));
        }

        let response: SpotifyFollowedArtists = self.get(session, "/me/following", &query).await?;
        Ok(response
            .artists
            .items
            .into_iter()
            .map(|artist| RemoteArtist {
                id: artist.id,
                name: artist.name,
            })
            .collect())
    }

    async fn favorited_albums_page(
        &self,
        session: &Session,
        page: &PageRequest,
    ) -> Result<Vec<FavoritedAlbum>> {
        let response: SpotifyPage<SpotifySavedAlbum> = self
            .get(session, "/me/albums", &Self::offset_query(page))
            .await?;

        Ok(response
            .items
            .into_iter()
            .map(|saved| {
                let album = saved.album;
                let (artist_id, artist_name) = album
                    .artists
                    .into_iter()
                    .next()
                    .map(|artist| (artist.id, artist.name))
                    .unwrap_or_default();
                FavoritedAlbum {
                    id: album.id,
                    name: album.name,
                    artist_id,
                    artist_name,
                }
            })
            .collect())
    }

    async fn album_tracks_page(
        &self,
        session: &Session,
        album_id: &str,
        page: &PageRequest,
    ) -> Result<Vec<Option<String>>> {
        let response: SpotifyPage<SpotifySimplifiedTrack> = self
            .get(
                session,
                &format!("/albums/{album_id}/tracks"),
                &Self::offset_query(page),
            )
            .await?;

        Ok(response.items.into_iter().map(|track| track.id).collect())
    }

    async fn playlists_page(
        &self,
        session: &Session,
        page: &PageRequest,
    ) -> Result<Vec<RemotePlaylist>> {
        let response: SpotifyPage<SpotifyPlaylist> = self
            .get(session, "/me/playlists", &Self::offset_query(page))
            .await?;

        Ok(response
            .items
            .into_iter()
            .map(|playlist| RemotePlaylist {
                id: playlist.id,
                name: playlist.name,
            })
            .collect())
    }

    async fn follow_artists(&self, session: &Session, ids: &[String]) -> Result<()> {
        self.send(
            session,
            Method::PUT,
            "/me/following",
            &[("type", "artist")],
            &serde_json::json!({ "ids": ids }),
        )
        .await
    }

    async fn favorite_albums(&self, session: &Session, ids: &[String]) -> Result<()> {
        self.send(
            session,
            Method::PUT,
            "/me/albums",
            &[],
            &serde_json::json!({ "ids": ids }),
        )
        .await
    }

    async fn replace_playlist_tracks(
        &self,
        session: &Session,
        playlist_id: &str,
        ids: &[String],
    ) -> Result<()> {
        self.send(
            session,
            Method::PUT,
            &format!("/playlists/{playlist_id}/tracks"),
            &[],
            &serde_json::json!({ "uris": track_uris(ids) }),
        )
        .await
    }

    async fn add_playlist_tracks(
        &self,
        session: &Session,
        playlist_id: &str,
        ids: &[String],
    ) -> Result<()> {
        self.send(
            session,
            Method::POST,
            &format!("/playlists/{playlist_id}/tracks"),
            &[],
            &serde_json::json!({ "uris": track_uris(ids) }),
        )
        .await
    }
}
