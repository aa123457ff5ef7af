use color_eyre::eyre::Result;

use crate::ports::catalog::{
    CatalogClient, FavoritedAlbum, RemoteAlbumListing, RemoteArtist, RemotePlaylist,
};
use crate::services::pacing::Pacer;
use crate::services::pagination::fetch_all;
use crate::session::Session;

/// Read side of a provider catalog: a client bound to a session, with every
/// call paced and every listing fully paginated.
pub struct Catalog<'a, C: CatalogClient + ?Sized> {
    client: &'a C,
    session: &'a Session,
    pacer: &'a Pacer,
    page_size: u32,
}

impl<'a, C: CatalogClient + ?Sized> Catalog<'a, C> {
    pub fn new(client: &'a C, session: &'a Session, pacer: &'a Pacer, page_size: u32) -> Self {
        Self {
            client,
            session,
            pacer,
            page_size,
        }
    }

    pub fn client(&self) -> &'a C {
        self.client
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub fn pacer(&self) -> &'a Pacer {
        self.pacer
    }

    pub async fn search_artists(&self, query: &str, limit: u32) -> Result<Vec<RemoteArtist>> {
        self.pacer.wait().await;
        self.client.search_artists(self.session, query, limit).await
    }

    pub async fn list_followed_artists(&self) -> Result<Vec<RemoteArtist>> {
        let (client, session) = (self.client, self.session);
        let artists = fetch_all(
            self.pacer,
            self.page_size,
            |page| async move { client.followed_artists_page(session, &page).await },
            |artist: &RemoteArtist| artist.id.clone(),
        )
        .await?;
        log::info!("Retrieved {} followed artists", artists.len());
        Ok(artists)
    }

    pub async fn list_favorited_albums(&self) -> Result<Vec<FavoritedAlbum>> {
        let (client, session) = (self.client, self.session);
        let albums = fetch_all(
            self.pacer,
            self.page_size,
            |page| async move { client.favorited_albums_page(session, &page).await },
            |album: &FavoritedAlbum| album.id.clone(),
        )
        .await?;
        log::info!("Retrieved {} favorited albums", albums.len());
        Ok(albums)
    }

    pub async fn list_albums_for_artist(&self, artist_id: &str) -> Result<Vec<RemoteAlbumListing>> {
        let (client, session) = (self.client, self.session);
        fetch_all(
            self.pacer,
            self.page_size,
            |page| async move { client.artist_albums_page(session, artist_id, &page).await },
            |album: &RemoteAlbumListing| album.album_id.clone(),
        )
        .await
    }

    /// Playable track ids of an album in album order.
    pub async fn list_tracks_for_album(&self, album_id: &str) -> Result<Vec<String>> {
        let (client, session) = (self.client, self.session);
        let tracks = fetch_all(
            self.pacer,
            self.page_size,
            |page| async move { client.album_tracks_page(session, album_id, &page).await },
            |track_id: &Option<String>| track_id.clone().unwrap_or_default(),
        )
        .await?;

        let total = tracks.len();
        let playable: Vec<String> = tracks.into_iter().flatten().collect();
        if playable.len() < total {
            log::debug!(
                "Album {} has {} unplayable tracks",
                album_id,
                total - playable.len()
            );
        }
        Ok(playable)
    }

    pub async fn find_playlist_by_name(&self, name: &str) -> Result<Option<RemotePlaylist>> {
        let (client, session) = (self.client, self.session);
        let playlists = fetch_all(
            self.pacer,
            self.page_size,
            |page| async move { client.playlists_page(session, &page).await },
            |playlist: &RemotePlaylist| playlist.id.clone(),
        )
        .await?;
        Ok(playlists.into_iter().find(|playlist| playlist.name == name))
    }
}
