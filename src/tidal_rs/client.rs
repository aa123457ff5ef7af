use std::time::Duration;

use color_eyre::eyre::{OptionExt, Result, WrapErr};
use reqwest::RequestBuilder;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use serde::de::DeserializeOwned;

use crate::ports::catalog::{
    CatalogClient, FavoritedAlbum, PageRequest, RemoteAlbumListing, RemoteArtist, RemotePlaylist,
};
use crate::session::Session;
use crate::tidal_rs::types::{
    TidalAlbum, TidalArtist, TidalFavorite, TidalPage, TidalPlaylist, TidalTrack,
};

pub const TIDAL_API_URL: &str = "https://api.tidal.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Playlist items removed per DELETE request.
const PLAYLIST_DELETE_CHUNK: u32 = 50;

/// TIDAL v1 API client
pub struct TidalClient {
    client: reqwest::Client,
    base_url: String,
    default_country_code: String,
}

impl TidalClient {
    /// `country_code` is used when the session does not carry one.
    pub fn new(country_code: impl Into<String>) -> Self {
        Self::with_base_url(TIDAL_API_URL, country_code)
    }

    pub fn with_base_url(base_url: impl Into<String>, country_code: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_country_code: country_code.into(),
        }
    }

    fn request(&self, session: &Session, method: reqwest::Method, path: &str) -> RequestBuilder {
        let country_code = session
            .country_code
            .as_deref()
            .unwrap_or(&self.default_country_code);
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&session.access_token)
            .query(&[("countryCode", country_code)])
            .timeout(REQUEST_TIMEOUT)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        session: &Session,
        path: &str,
        page: Option<&PageRequest>,
    ) -> Result<T> {
        let mut request = self.request(session, reqwest::Method::GET, path);
        if let Some(page) = page {
            request = request.query(&[("limit", page.limit), ("offset", page.offset)]);
        }

        request
            .send()
            .await
            .wrap_err(format!("GET {path} failed"))?
            .error_for_status()
            .wrap_err(format!("GET {path} failed"))?
            .json()
            .await
            .wrap_err(format!("Failed to parse response from {path}"))
    }

    async fn post_form(&self, session: &Session, path: &str, form: &[(&str, String)]) -> Result<()> {
        self.request(session, reqwest::Method::POST, path)
            .form(form)
            .send()
            .await
            .wrap_err(format!("POST {path} failed"))?
            .error_for_status()
            .wrap_err(format!("POST {path} failed"))?;
        Ok(())
    }

    /// Playlist metadata plus the ETag that guards modifications.
    async fn playlist_with_etag(
        &self,
        session: &Session,
        playlist_id: &str,
    ) -> Result<(TidalPlaylist, String)> {
        let path = format!("/playlists/{playlist_id}");
        let response = self
            .request(session, reqwest::Method::GET, &path)
            .send()
            .await
            .wrap_err(format!("GET {path} failed"))?
            .error_for_status()
            .wrap_err(format!("GET {path} failed"))?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .ok_or_eyre(format!("Playlist {playlist_id} response has no ETag"))?
            .to_string();
        let playlist = response
            .json()
            .await
            .wrap_err(format!("Failed to parse response from {path}"))?;
        Ok((playlist, etag))
    }

    async fn clear_playlist(&self, session: &Session, playlist_id: &str) -> Result<()> {
        let (playlist, mut etag) = self.playlist_with_etag(session, playlist_id).await?;
        let mut remaining = playlist.number_of_tracks + playlist.number_of_videos;

        while remaining > 0 {
            let count = remaining.min(PLAYLIST_DELETE_CHUNK);
            let indices: Vec<String> = (0..count).map(|i| i.to_string()).collect();
            let path = format!("/playlists/{playlist_id}/items/{}", indices.join(","));

            self.request(session, reqwest::Method::DELETE, &path)
                .header(IF_NONE_MATCH, &etag)
                .send()
                .await
                .wrap_err(format!("DELETE {path} failed"))?
                .error_for_status()
                .wrap_err(format!("DELETE {path} failed"))?;

            let (playlist, next_etag) = self.playlist_with_etag(session, playlist_id).await?;
            let left = playlist.number_of_tracks + playlist.number_of_videos;
            if left >= remaining {
                color_eyre::eyre::bail!("Playlist {playlist_id} did not shrink while clearing");
            }
            remaining = left;
            etag = next_etag;
        }
        Ok(())
    }

    fn user_path(session: &Session, suffix: &str) -> Result<String> {
        Ok(format!("/users/{}/{}", session.user_id()?, suffix))
    }
}

fn album_url(album_id: &str) -> String {
    format!("https://tidal.com/browse/album/{album_id}")
}

#[async_trait::async_trait]
impl CatalogClient for TidalClient {
    async fn search_artists(
        &self,
        session: &Session,
        query: &str,
        limit: u32,
    ) -> Result<Vec<RemoteArtist>> {
        let path = "/search/artists";
        let response: TidalPage<TidalArtist> = self
            .request(session, reqwest::Method::GET, path)
            .query(&[("query", query.to_string()), ("limit", limit.to_string())])
            .send()
            .await
            .wrap_err(format!("GET {path} failed"))?
            .error_for_status()
            .wrap_err(format!("GET {path} failed"))?
            .json()
            .await
            .wrap_err(format!("Failed to parse response from {path}"))?;

        Ok(response
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
        let response: TidalPage<TidalAlbum> = self
            .get(session, &format!("/artists/{artist_id}/albums"), Some(page))
            .await?;

        Ok(response
            .items
            .into_iter()
            .map(|album| RemoteAlbumListing {
                artist_id: artist_id.to_string(),
                url: Some(album_url(&album.id)),
                album_id: album.id,
                name: album.title,
            })
            .collect())
    }

    async fn followed_artists_page(
        &self,
        session: &Session,
        page: &PageRequest,
    ) -> Result<Vec<RemoteArtist>> {
        let path = Self::user_path(session, "favorites/artists")?;
        let response: TidalPage<TidalFavorite<TidalArtist>> =
            self.get(session, &path, Some(page)).await?;

        Ok(response
            .items
            .into_iter()
            .map(|favorite| RemoteArtist {
                id: favorite.item.id,
                name: favorite.item.name,
            })
            .collect())
    }

    async fn favorited_albums_page(
        &self,
        session: &Session,
        page: &PageRequest,
    ) -> Result<Vec<FavoritedAlbum>> {
        let path = Self::user_path(session, "favorites/albums")?;
        let response: TidalPage<TidalFavorite<TidalAlbum>> =
            self.get(session, &path, Some(page)).await?;

        Ok(response
            .items
            .into_iter()
            .map(|favorite| {
                let album = favorite.item;
                let (artist_id, artist_name) = album
                    .artist
                    .map(|artist| (artist.id, artist.name))
                    .unwrap_or_default();
                FavoritedAlbum {
                    id: album.id,
                    name: album.title,
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
        let response: TidalPage<TidalTrack> = self
            .get(session, &format!("/albums/{album_id}/tracks"), Some(page))
            .await?;
        Ok(response
            .items
            .into_iter()
            .map(|track| Some(track.id))
            .collect())
    }

    async fn playlists_page(
        &self,
        session: &Session,
        page: &PageRequest,
    ) -> Result<Vec<RemotePlaylist>> {
        let path = Self::user_path(session, "playlists")?;
        let response: TidalPage<TidalPlaylist> = self.get(session, &path, Some(page)).await?;

        Ok(response
            .items
            .into_iter()
            .map(|playlist| RemotePlaylist {
                id: playlist.uuid,
                name: playlist.title,
            })
            .collect())
    }

    async fn follow_artists(&self, session: &Session, ids: &[String]) -> Result<()> {
        let path = Self::user_path(session, "favorites/artists")?;
        self.post_form(session, &path, &[("artistIds", ids.join(","))])
            .await
    }

    async fn favorite_albums(&self, session: &Session, ids: &[String]) -> Result<()> {
        let path = Self::user_path(session, "favorites/albums")?;
        self.post_form(session, &path, &[("albumIds", ids.join(","))])
            .await
    }

    async fn replace_playlist_tracks(
        &self,
        session: &Session,
        playlist_id: &str,
        ids: &[String],
    ) -> Result<()> {
        self.clear_playlist(session, playlist_id).await?;
        if ids.is_empty() {
            return Ok(());
        }
        self.add_playlist_tracks(session, playlist_id, ids).await
    }

    async fn add_playlist_tracks(
        &self,
        session: &Session,
        playlist_id: &str,
        ids: &[String],
    ) -> Result<()> {
        let (_, etag) = self.playlist_with_etag(session, playlist_id).await?;
        let path = format!("/playlists/{playlist_id}/items");

        self.request(session, reqwest::Method::POST, &path)
            .header(IF_NONE_MATCH, etag)
            .form(&[
                ("trackIds", ids.join(",")),
                ("onArtifactNotFound", "FAIL".to_string()),
                ("onDupes", "ADD".to_string()),
            ])
            .send()
            .await
            .wrap_err(format!("POST {path} failed"))?
            .error_for_status()
            .wrap_err(format!("POST {path} failed"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, TidalClient, Session) {
        let server = MockServer::start().await;
        let client = TidalClient::with_base_url(server.uri(), "US");
        let session = Session {
            user_id: Some("u1".into()),
            country_code: Some("NL".into()),
            ..Session::new(Provider::Tidal, "token-456")
        };
        (server, client, session)
    }

    async fn mount_playlist(server: &MockServer, tracks: u32, etag: &str) {
        Mock::given(method("GET"))
            .and(path("/playlists/pl-uuid"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", etag)
                    .set_body_json(json!({
                        "uuid": "pl-uuid",
                        "title": "My CDs",
                        "numberOfTracks": tracks,
                        "numberOfVideos": 0
                    })),
            )
            .up_to_n_times(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_search_normalizes_numeric_ids() {
        let (server, client, session) = setup().await;
        Mock::given(method("GET"))
            .and(path("/search/artists"))
            .and(query_param("query", "Beatles"))
            .and(query_param("countryCode", "NL"))
            .and(header("authorization", "Bearer token-456"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "limit": 3,
                "offset": 0,
                "totalNumberOfItems": 1,
                "items": [{"id": 3634161, "name": "The Beatles"}]
            })))
            .mount(&server)
            .await;

        let artists = client.search_artists(&session, "Beatles", 3).await.unwrap();
        assert_eq!(artists[0].id, "3634161");
    }

    #[tokio::test]
    async fn test_artist_albums_use_title_and_browse_url() {
        let (server, client, session) = setup().await;
        Mock::given(method("GET"))
            .and(path("/artists/3634161/albums"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"id": 77, "title": "Abbey Road", "artist": {"id": 3634161, "name": "The Beatles"}}]
            })))
            .mount(&server)
            .await;

        let albums = client
            .artist_albums_page(&session, "3634161", &PageRequest::first(50))
            .await
            .unwrap();
        assert_eq!(albums[0].album_id, "77");
        assert_eq!(albums[0].name, "Abbey Road");
        assert_eq!(albums[0].url.as_deref(), Some("https://tidal.com/browse/album/77"));
    }

    #[tokio::test]
    async fn test_favorites_are_scoped_to_user() {
        let (server, client, session) = setup().await;
        Mock::given(method("GET"))
            .and(path("/users/u1/favorites/albums"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"created": "2024-01-01T00:00:00.000+0000", "item": {
                    "id": 77, "title": "Abbey Road", "artist": {"id": 1, "name": "The Beatles"}
                }}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users/u1/favorites/artists"))
            .and(body_string_contains("artistIds=1%2C2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let albums = client
            .favorited_albums_page(&session, &PageRequest::first(50))
            .await
            .unwrap();
        assert_eq!(albums[0].artist_id, "1");

        client
            .follow_artists(&session, &["1".to_string(), "2".to_string()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_user_scoped_calls_need_user_id() {
        let (_server, client, mut session) = setup().await;
        session.user_id = None;
        assert!(
            client
                .favorite_albums(&session, &["77".to_string()])
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_replace_with_empty_clears_playlist() {
        let (server, client, session) = setup().await;
        mount_playlist(&server, 3, "\"etag-1\"").await;
        mount_playlist(&server, 0, "\"etag-2\"").await;
        Mock::given(method("DELETE"))
            .and(path("/playlists/pl-uuid/items/0,1,2"))
            .and(header("if-none-match", "\"etag-1\""))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client
            .replace_playlist_tracks(&session, "pl-uuid", &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_playlist_tracks_sends_etag() {
        let (server, client, session) = setup().await;
        mount_playlist(&server, 0, "\"etag-9\"").await;
        Mock::given(method("POST"))
            .and(path("/playlists/pl-uuid/items"))
            .and(header("if-none-match", "\"etag-9\""))
            .and(body_string_contains("trackIds=10%2C11"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client
            .add_playlist_tracks(&session, "pl-uuid", &["10".to_string(), "11".to_string()])
            .await
            .unwrap();
    }
}
