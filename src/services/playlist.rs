use color_eyre::eyre::{Result, WrapErr};
use serde::Serialize;

use crate::ports::catalog::CatalogClient;
use crate::services::batch::{BatchSyncExecutor, SyncReport};
use crate::services::catalog::Catalog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedAlbum {
    pub album_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistRebuildReport {
    pub playlist_id: String,
    pub albums: usize,
    pub tracks_found: usize,
    pub tracks_submitted: usize,
    pub truncated: bool,
    pub skipped_albums: Vec<SkippedAlbum>,
    pub additions: SyncReport,
}

/// Regenerates a playlist from a set of favorited albums.
///
/// The playlist is always cleared and refilled; its current contents are
/// never diffed.
pub struct PlaylistRebuilder<'a, 'c, C: CatalogClient + ?Sized> {
    catalog: &'a Catalog<'c, C>,
    max_tracks: usize,
    batch_size: usize,
    dry_run: bool,
}

impl<'a, 'c, C: CatalogClient + ?Sized> PlaylistRebuilder<'a, 'c, C> {
    pub fn new(catalog: &'a Catalog<'c, C>, max_tracks: usize, batch_size: usize) -> Self {
        Self {
            catalog,
            max_tracks,
            batch_size,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Expand albums to tracks in iteration order, cap at `max_tracks`,
    /// clear the playlist, then add the tracks in batches.
    ///
    /// An album whose tracks cannot be listed is skipped. Failing to clear
    /// the playlist is fatal, since adding on top would duplicate contents.
    pub async fn rebuild(&self, playlist_id: &str, album_ids: &[String]) -> Result<PlaylistRebuildReport> {
        let mut tracks = Vec::new();
        let mut skipped_albums = Vec::new();

        for (index, album_id) in album_ids.iter().enumerate() {
            match self.catalog.list_tracks_for_album(album_id).await {
                Ok(album_tracks) => {
                    log::debug!(
                        "[{}/{}] Album {} has {} tracks",
                        index + 1,
                        album_ids.len(),
                        album_id,
                        album_tracks.len()
                    );
                    tracks.extend(album_tracks);
                }
                Err(e) => {
                    log::warn!("Skipping album {}: failed to list tracks: {:#}", album_id, e);
                    skipped_albums.push(SkippedAlbum {
                        album_id: album_id.clone(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        let tracks_found = tracks.len();
        let truncated = tracks_found > self.max_tracks;
        if truncated {
            log::warn!(
                "Playlist would have {} tracks; truncating to the first {}",
                tracks_found,
                self.max_tracks
            );
            tracks.truncate(self.max_tracks);
        }

        let client = self.catalog.client();
        let session = self.catalog.session();

        if self.dry_run {
            log::info!("[dry run] Would clear playlist {}", playlist_id);
        } else {
            self.catalog.pacer().wait().await;
            client
                .replace_playlist_tracks(session, playlist_id, &[])
                .await
                .wrap_err(format!("Failed to clear playlist {playlist_id}"))?;
            log::info!("Cleared playlist {}", playlist_id);
        }

        let executor =
            BatchSyncExecutor::new(self.catalog.pacer(), self.batch_size).dry_run(self.dry_run);
        let additions = executor
            .apply_in_order("add playlist tracks", &tracks, |batch| async move {
                client.add_playlist_tracks(session, playlist_id, &batch).await
            })
            .await;

        Ok(PlaylistRebuildReport {
            playlist_id: playlist_id.to_string(),
            albums: album_ids.len(),
            tracks_found,
            tracks_submitted: tracks.len(),
            truncated,
            skipped_albums,
            additions,
        })
    }
}
