use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{OptionExt, Result, WrapErr, eyre};
use serde::Serialize;

use crate::config::ProviderSettings;
use crate::library::{LocalAlbum, scan_library};
use crate::ports::catalog::{CatalogClient, RemoteAlbumListing, RemoteArtist};
use crate::records::{AlbumMatch, RecordStore};
use crate::services::batch::{BatchSyncExecutor, SyncReport};
use crate::services::catalog::Catalog;
use crate::services::dedup::deduplicate;
use crate::services::diff::diff;
use crate::services::pacing::Pacer;
use crate::services::playlist::{PlaylistRebuildReport, PlaylistRebuilder};
use crate::services::resolver::{ArtistMatch, EntityResolver};
use crate::session::Session;

/// The named pipeline stages, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Scan,
    ResolveArtists,
    FollowArtists,
    FetchAlbums,
    MatchAlbums,
    FavoriteAlbums,
    RebuildPlaylist,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Scan,
        Stage::ResolveArtists,
        Stage::FollowArtists,
        Stage::FetchAlbums,
        Stage::MatchAlbums,
        Stage::FavoriteAlbums,
        Stage::RebuildPlaylist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scan => "scan",
            Stage::ResolveArtists => "resolve-artists",
            Stage::FollowArtists => "follow-artists",
            Stage::FetchAlbums => "fetch-albums",
            Stage::MatchAlbums => "match-albums",
            Stage::FavoriteAlbums => "favorite-albums",
            Stage::RebuildPlaylist => "rebuild-playlist",
        }
    }

    /// Stages from `from` to `to`, inclusive.
    pub fn range(from: Stage, to: Stage) -> Result<Vec<Stage>> {
        if from > to {
            return Err(eyre!("Stage {} comes after {}", from, to));
        }
        Ok(Self::ALL
            .into_iter()
            .filter(|stage| (from..=to).contains(stage))
            .collect())
    }

    /// Every stage but the library scan works against a provider session.
    pub fn needs_session(&self) -> bool {
        !matches!(self, Stage::Scan)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a single item within a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Resolved { id: String },
    Fetched { count: usize },
    Skipped { reason: String },
    Unresolved,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub item: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Per-item outcomes of a resolve or fetch stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub items: Vec<ItemResult>,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            items: Vec::new(),
        }
    }

    pub fn record(&mut self, item: impl Into<String>, outcome: ItemOutcome) {
        self.items.push(ItemResult {
            item: item.into(),
            outcome,
        });
    }

    pub fn count(&self, predicate: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|r| predicate(&r.outcome)).count()
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    pub fn unresolved(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Unresolved))
    }

    fn log_summary(&self) {
        log::info!(
            "{}: {} items, {} unresolved, {} failed",
            self.stage,
            self.items.len(),
            self.unresolved(),
            self.failed()
        );
    }
}

/// Scan the library and write the album table.
pub fn scan(library_dir: &Path, records: &RecordStore) -> Result<Vec<LocalAlbum>> {
    let albums = scan_library(library_dir)?;
    records.write_albums(&albums)?;
    Ok(albums)
}

/// Runs the reconciliation stages against one provider.
///
/// Every stage reads its inputs from the record store and writes its output
/// back, so stages can be re-run individually after a manual review.
pub struct Pipeline<'a, C: CatalogClient + ?Sized> {
    client: &'a C,
    session: &'a Session,
    settings: ProviderSettings,
    records: RecordStore,
    library_dir: PathBuf,
    pacer: Pacer,
    resolver: EntityResolver,
    dry_run: bool,
}

impl<'a, C: CatalogClient + ?Sized> Pipeline<'a, C> {
    pub fn new(
        client: &'a C,
        session: &'a Session,
        settings: ProviderSettings,
        records: RecordStore,
        library_dir: PathBuf,
    ) -> Result<Self> {
        let resolver = EntityResolver::new(settings.album_match_cutoff, settings.search_limit)?;
        Ok(Self {
            client,
            session,
            pacer: Pacer::new(settings.delay),
            settings,
            records,
            library_dir,
            resolver,
            dry_run: false,
        })
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn catalog(&self) -> Catalog<'_, C> {
        Catalog::new(self.client, self.session, &self.pacer, self.settings.page_size)
    }

    fn executor(&self) -> BatchSyncExecutor<'_> {
        BatchSyncExecutor::new(&self.pacer, self.settings.batch_size).dry_run(self.dry_run)
    }

    /// Run every stage from `from` to `to` in order.
    ///
    /// Returns the stages that finished with failed mutation batches.
    pub async fn run(&self, from: Stage, to: Stage) -> Result<Vec<Stage>> {
        let mut with_failures = Vec::new();
        for stage in Stage::range(from, to)? {
            log::info!("=== {} ===", stage);
            let failed = self
                .run_stage(stage)
                .await
                .wrap_err(format!("Stage {stage} failed"))?;
            if failed {
                with_failures.push(stage);
            }
        }
        Ok(with_failures)
    }

    /// Run one stage and write its report. Returns whether any mutation
    /// batch failed.
    pub async fn run_stage(&self, stage: Stage) -> Result<bool> {
        let failed = match stage {
            Stage::Scan => {
                scan(&self.library_dir, &self.records)?;
                false
            }
            Stage::ResolveArtists => {
                let report = self.resolve_artists().await?;
                self.records.write_report(stage.as_str(), &report)?;
                false
            }
            Stage::FollowArtists => {
                let report = self.follow_artists().await?;
                self.records.write_report(stage.as_str(), &report)?;
                report.has_failures()
            }
            Stage::FetchAlbums => {
                let report = self.fetch_albums().await?;
                self.records.write_report(stage.as_str(), &report)?;
                false
            }
            Stage::MatchAlbums => {
                let report = self.match_albums()?;
                self.records.write_report(stage.as_str(), &report)?;
                false
            }
            Stage::FavoriteAlbums => {
                let report = self.favorite_albums().await?;
                self.records.write_report(stage.as_str(), &report)?;
                report.has_failures()
            }
            Stage::RebuildPlaylist => {
                let report = self.rebuild_playlist().await?;
                self.records.write_report(stage.as_str(), &report)?;
                report.additions.has_failures()
            }
        };
        Ok(failed)
    }

    /// Manual lookup used while reviewing the artist match table.
    pub async fn search_artist(&self, name: &str, limit: u32) -> Result<Vec<RemoteArtist>> {
        self.catalog().search_artists(name, limit).await
    }

    /// Resolve every distinct local artist and write the artist match table.
    ///
    /// Rows from an earlier run that already carry an `artist_id` are kept
    /// as they are, so hand-reviewed ids survive a re-run.
    pub async fn resolve_artists(&self) -> Result<StageReport> {
        let albums = self.records.read_albums()?;
        let previous: HashMap<String, ArtistMatch> = self
            .records
            .read_artist_matches_if_present()?
            .unwrap_or_default()
            .into_iter()
            .map(|m| (m.local_artist.clone(), m))
            .collect();

        let mut seen = HashSet::new();
        let artists: Vec<&str> = albums
            .iter()
            .map(|album| album.artist.as_str())
            .filter(|artist| !artist.is_empty() && seen.insert(*artist))
            .collect();

        let catalog = self.catalog();
        let mut report = StageReport::new(Stage::ResolveArtists);
        let mut matches = Vec::with_capacity(artists.len());

        for (index, artist) in artists.iter().enumerate() {
            let progress = format!("[{}/{}]", index + 1, artists.len());

            if let Some(existing) = previous.get(*artist)
                && let Some(id) = existing.artist_id()
            {
                log::info!("{} {}: keeping reviewed id {}", progress, artist, id);
                report.record(*artist, ItemOutcome::Skipped {
                    reason: format!("kept reviewed artist_id {id}"),
                });
                matches.push(existing.clone());
                continue;
            }

            match self.resolver.resolve_artist(&catalog, artist).await {
                Ok(candidates) if candidates.is_empty() => {
                    log::warn!("{} {}: no match found", progress, artist);
                    report.record(*artist, ItemOutcome::Unresolved);
                    matches.push(ArtistMatch::unresolved(*artist));
                }
                Ok(candidates) => {
                    let matched = ArtistMatch::from_candidates(*artist, candidates);
                    let id = matched.artist_id().unwrap_or_default().to_string();
                    log::info!("{} {}: {}", progress, artist, id);
                    report.record(*artist, ItemOutcome::Resolved { id });
                    matches.push(matched);
                }
                Err(e) => {
                    log::warn!("{} {}: search failed: {:#}", progress, artist, e);
                    report.record(*artist, ItemOutcome::Failed {
                        error: format!("{e:#}"),
                    });
                    matches.push(ArtistMatch::unresolved(*artist));
                }
            }
        }

        self.records.write_artist_matches(&matches)?;
        log::info!(
            "Review {} and fix artist_id where needed before syncing",
            self.records.artist_matches_path().display()
        );
        report.log_summary();
        Ok(report)
    }

    /// Follow every reviewed artist that is not followed yet.
    pub async fn follow_artists(&self) -> Result<SyncReport> {
        let matches = self.records.read_artist_matches()?;
        let target = matches
            .iter()
            .filter_map(|m| m.artist_id().map(str::to_string));

        let followed = self
            .catalog()
            .list_followed_artists()
            .await
            .wrap_err("Failed to list followed artists")?;

        let artist_diff = diff(target, followed.into_iter().map(|artist| artist.id));
        if artist_diff.is_empty() {
            log::info!("Every reviewed artist is already followed");
        }
        log::info!(
            "{} target artists, {} already followed, {} to follow",
            artist_diff.target_ids.len(),
            artist_diff.target_ids.len() - artist_diff.to_add.len(),
            artist_diff.to_add.len()
        );

        let (client, session) = (self.client, self.session);
        Ok(self
            .executor()
            .apply("follow artists", &artist_diff.to_add, |batch| async move {
                client.follow_artists(session, &batch).await
            })
            .await)
    }

    /// List the albums of every resolved artist and write the raw lookup table.
    pub async fn fetch_albums(&self) -> Result<StageReport> {
        let matches = self.records.read_artist_matches()?;
        let mut seen = HashSet::new();
        let artist_ids: Vec<&str> = matches
            .iter()
            .filter_map(ArtistMatch::artist_id)
            .filter(|id| seen.insert(*id))
            .collect();

        let catalog = self.catalog();
        let mut report = StageReport::new(Stage::FetchAlbums);
        let mut listings: Vec<RemoteAlbumListing> = Vec::new();

        for (index, artist_id) in artist_ids.iter().enumerate() {
            match catalog.list_albums_for_artist(artist_id).await {
                Ok(albums) => {
                    log::info!(
                        "[{}/{}] Retrieved {} albums for artist {}",
                        index + 1,
                        artist_ids.len(),
                        albums.len(),
                        artist_id
                    );
                    report.record(*artist_id, ItemOutcome::Fetched {
                        count: albums.len(),
                    });
                    listings.extend(albums);
                }
                Err(e) => {
                    log::warn!(
                        "[{}/{}] Failed to retrieve albums for artist {}: {:#}",
                        index + 1,
                        artist_ids.len(),
                        artist_id,
                        e
                    );
                    report.record(*artist_id, ItemOutcome::Failed {
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        self.records.write_album_lookup(&listings)?;
        report.log_summary();
        Ok(report)
    }

    /// Match each local album to a canonical remote album and write the join
    /// table. Rows that already carry an `album_id` for the same artist are
    /// kept as reviewed.
    pub fn match_albums(&self) -> Result<StageReport> {
        let albums = self.records.read_albums()?;
        let artist_matches = self.records.read_artist_matches()?;
        let lookup = self.records.read_album_lookup()?;
        let previous: HashMap<String, AlbumMatch> = self
            .records
            .read_album_matches_if_present()?
            .unwrap_or_default()
            .into_iter()
            .map(|m| (m.folder.clone(), m))
            .collect();

        let mut artist_ids: HashMap<&str, &str> = HashMap::new();
        for matched in &artist_matches {
            if let Some(id) = matched.artist_id() {
                artist_ids.entry(matched.local_artist.as_str()).or_insert(id);
            }
        }

        let canonical = deduplicate(&lookup);
        if canonical.is_empty() {
            log::warn!(
                "{} has no albums, run fetch-albums first",
                self.records.album_lookup_path().display()
            );
        }
        let mut report = StageReport::new(Stage::MatchAlbums);
        let mut rows = Vec::with_capacity(albums.len());

        for album in &albums {
            let mut row = AlbumMatch {
                folder: album.folder.clone(),
                local_artist: album.artist.clone(),
                local_album: album.album.clone(),
                ..AlbumMatch::default()
            };

            let Some(&artist_id) = artist_ids.get(album.artist.as_str()) else {
                report.record(&album.folder, ItemOutcome::Skipped {
                    reason: "artist unresolved".to_string(),
                });
                rows.push(row);
                continue;
            };
            row.artist_id = Some(artist_id.to_string());

            if let Some(existing) = previous.get(&album.folder)
                && existing.artist_id.as_deref() == Some(artist_id)
                && let Some(album_id) = existing.album_id()
            {
                report.record(&album.folder, ItemOutcome::Skipped {
                    reason: format!("kept reviewed album_id {album_id}"),
                });
                rows.push(existing.clone());
                continue;
            }

            let candidates = canonical.names_for_artist(artist_id);
            let best = self
                .resolver
                .match_album(&album.album, candidates)
                .and_then(|name| canonical.get(artist_id, name));

            match best {
                Some(chosen) => {
                    row.resolved_album_name = Some(chosen.name.clone());
                    row.album_id = Some(chosen.album_id.clone());
                    row.name = Some(chosen.name.clone());
                    row.url = chosen.url.clone();
                    report.record(&album.folder, ItemOutcome::Resolved {
                        id: chosen.album_id.clone(),
                    });
                }
                None => {
                    log::warn!(
                        "No album of {} matches '{}' ({} candidates)",
                        album.artist,
                        album.album,
                        candidates.len()
                    );
                    report.record(&album.folder, ItemOutcome::Unresolved);
                }
            }
            rows.push(row);
        }

        self.records.write_album_matches(&rows)?;
        log::info!(
            "Review {} and fix album_id where needed before syncing",
            self.records.album_matches_path().display()
        );
        report.log_summary();
        Ok(report)
    }

    /// Favorite every matched album that is not favorited yet.
    pub async fn favorite_albums(&self) -> Result<SyncReport> {
        let rows = self.records.read_album_matches()?;
        let target = rows
            .iter()
            .filter_map(|row| row.album_id().map(str::to_string));

        let favorites = self
            .catalog()
            .list_favorited_albums()
            .await
            .wrap_err("Failed to list favorited albums")?;

        let album_diff = diff(target, favorites.into_iter().map(|album| album.id));
        if album_diff.is_empty() {
            log::info!("Every matched album is already favorited");
        }
        log::info!(
            "{} target albums, {} already favorited, {} to favorite",
            album_diff.target_ids.len(),
            album_diff.target_ids.len() - album_diff.to_add.len(),
            album_diff.to_add.len()
        );

        let (client, session) = (self.client, self.session);
        Ok(self
            .executor()
            .apply("favorite albums", &album_diff.to_add, |batch| async move {
                client.favorite_albums(session, &batch).await
            })
            .await)
    }

    /// Refill the configured playlist with the tracks of every favorited album.
    pub async fn rebuild_playlist(&self) -> Result<PlaylistRebuildReport> {
        let catalog = self.catalog();
        let favorites = catalog
            .list_favorited_albums()
            .await
            .wrap_err("Failed to list favorited albums")?;

        let playlist = catalog
            .find_playlist_by_name(&self.settings.playlist_name)
            .await
            .wrap_err("Failed to list playlists")?
            .ok_or_eyre(format!(
                "No playlist named '{}'; create it in the provider's app first",
                self.settings.playlist_name
            ))?;

        log::info!(
            "Rebuilding playlist '{}' ({}) from {} favorited albums",
            playlist.name,
            playlist.id,
            favorites.len()
        );

        let album_ids: Vec<String> = favorites.into_iter().map(|album| album.id).collect();
        PlaylistRebuilder::new(
            &catalog,
            self.settings.max_playlist_tracks,
            self.settings.playlist_batch_size,
        )
        .dry_run(self.dry_run)
        .rebuild(&playlist.id, &album_ids)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use crate::ports::catalog::{FavoritedAlbum, MockCatalogClient, RemotePlaylist};
    use color_eyre::eyre::eyre;
    use std::time::Duration;

    struct Fixture {
        library: tempfile::TempDir,
        data: tempfile::TempDir,
        session: Session,
    }

    impl Fixture {
        fn new(folders: &[&str]) -> Self {
            let library = tempfile::tempdir().unwrap();
            for folder in folders {
                std::fs::create_dir(library.path().join(folder)).unwrap();
            }
            Self {
                library,
                data: tempfile::tempdir().unwrap(),
                session: Session::new(Provider::Spotify, "at"),
            }
        }

        fn records(&self) -> RecordStore {
            RecordStore::new(self.data.path().to_path_buf(), Provider::Spotify)
        }

        fn pipeline<'a>(&'a self, client: &'a MockCatalogClient) -> Pipeline<'a, MockCatalogClient> {
            let settings = ProviderSettings {
                delay: Duration::ZERO,
                ..ProviderSettings::defaults_for(Provider::Spotify)
            };
            Pipeline::new(
                client,
                &self.session,
                settings,
                self.records(),
                self.library.path().to_path_buf(),
            )
            .unwrap()
        }
    }

    fn artist(id: &str, name: &str) -> RemoteArtist {
        RemoteArtist {
            id: id.into(),
            name: name.into(),
        }
    }

    fn listing(album_id: &str, name: &str) -> RemoteAlbumListing {
        RemoteAlbumListing {
            artist_id: "A1".into(),
            album_id: album_id.into(),
            name: name.into(),
            url: None,
        }
    }

    fn favorited(id: &str) -> FavoritedAlbum {
        FavoritedAlbum {
            id: id.into(),
            name: "Abbey Road".into(),
            artist_id: "A1".into(),
            artist_name: "The Beatles".into(),
        }
    }

    fn beatles_client(favorites: Vec<FavoritedAlbum>, expect_favorite: bool) -> MockCatalogClient {
        let mut client = MockCatalogClient::new();
        client
            .expect_search_artists()
            .withf(|_, query, _| query == "Beatles")
            .returning(|_, _, _| Ok(vec![artist("A1", "The Beatles")]));
        client
            .expect_followed_artists_page()
            .returning(|_, _| Ok(vec![artist("A1", "The Beatles")]));
        client.expect_follow_artists().never();
        client
            .expect_artist_albums_page()
            .withf(|_, artist_id, _| artist_id == "A1")
            .returning(|_, _, _| {
                Ok(vec![
                    listing("X", "Abbey Road"),
                    listing("Y", "Abbey Road (Remastered)"),
                ])
            });
        client
            .expect_favorited_albums_page()
            .returning(move |_, _| Ok(favorites.clone()));
        if expect_favorite {
            client
                .expect_favorite_albums()
                .withf(|_, ids| ids == ["X"])
                .times(1)
                .returning(|_, _| Ok(()));
        } else {
            client.expect_favorite_albums().never();
        }
        client
    }

    #[tokio::test]
    async fn test_end_to_end_favorites_exact_edition() {
        let fixture = Fixture::new(&["Beatles - Abbey Road"]);
        let client = beatles_client(Vec::new(), true);
        let pipeline = fixture.pipeline(&client);

        let with_failures = pipeline
            .run(Stage::Scan, Stage::FavoriteAlbums)
            .await
            .unwrap();
        assert!(with_failures.is_empty());

        let records = fixture.records();
        let lookup = records.read_album_lookup().unwrap();
        assert_eq!(lookup.len(), 2);

        let rows = records.read_album_matches().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].artist_id.as_deref(), Some("A1"));
        assert_eq!(rows[0].resolved_album_name.as_deref(), Some("Abbey Road"));
        assert_eq!(rows[0].album_id(), Some("X"));

        let reports = std::fs::read_dir(records.reports_dir()).unwrap().count();
        assert_eq!(reports, 5);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let fixture = Fixture::new(&["Beatles - Abbey Road"]);
        let client = beatles_client(vec![favorited("X")], false);
        let pipeline = fixture.pipeline(&client);

        pipeline
            .run(Stage::Scan, Stage::FavoriteAlbums)
            .await
            .unwrap();
        let report = pipeline.favorite_albums().await.unwrap();
        assert_eq!(report.requested, 0);
        assert!(report.succeeded_batches.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_failures_do_not_stop_the_stage() {
        let fixture = Fixture::new(&["Beatles - Abbey Road", "Nirvana - Nevermind", "Zzz - Nothing"]);
        let mut client = MockCatalogClient::new();
        client.expect_search_artists().returning(|_, query, _| match query {
            "Beatles" => Err(eyre!("503 Service Unavailable")),
            "Nirvana" => Ok(vec![artist("N1", "Nirvana")]),
            _ => Ok(Vec::new()),
        });
        let pipeline = fixture.pipeline(&client);

        pipeline.run_stage(Stage::Scan).await.unwrap();
        let report = pipeline.resolve_artists().await.unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.unresolved(), 1);
        let matches = fixture.records().read_artist_matches().unwrap();
        let ids: Vec<_> = matches.iter().map(|m| m.artist_id()).collect();
        assert_eq!(ids, vec![None, Some("N1"), None]);
    }

    #[tokio::test]
    async fn test_reviewed_artist_ids_are_kept_on_rerun() {
        let fixture = Fixture::new(&["Beatles - Abbey Road"]);
        let records = fixture.records();
        scan(fixture.library.path(), &records).unwrap();
        records
            .write_artist_matches(&[ArtistMatch {
                local_artist: "Beatles".into(),
                resolved_id: Some("A9".into()),
                candidates: vec![artist("A1", "Beatles Tribute"), artist("A9", "The Beatles")],
            }])
            .unwrap();

        let mut client = MockCatalogClient::new();
        client.expect_search_artists().never();
        client
            .expect_followed_artists_page()
            .returning(|_, _| Ok(Vec::new()));
        client
            .expect_follow_artists()
            .withf(|_, ids| ids == ["A9"])
            .times(1)
            .returning(|_, _| Ok(()));
        let pipeline = fixture.pipeline(&client);

        pipeline.resolve_artists().await.unwrap();
        let report = pipeline.follow_artists().await.unwrap();
        assert_eq!(report.succeeded_ids(), 1);
    }

    #[tokio::test]
    async fn test_failed_follow_batch_is_reported_not_fatal() {
        let fixture = Fixture::new(&[]);
        fixture
            .records()
            .write_artist_matches(&[ArtistMatch::from_candidates(
                "Beatles",
                vec![artist("A1", "The Beatles")],
            )])
            .unwrap();

        let mut client = MockCatalogClient::new();
        client
            .expect_followed_artists_page()
            .returning(|_, _| Ok(Vec::new()));
        client
            .expect_follow_artists()
            .times(1)
            .returning(|_, _| Err(eyre!("429 Too Many Requests")));
        let pipeline = fixture.pipeline(&client);

        let with_failures = pipeline
            .run(Stage::FollowArtists, Stage::FollowArtists)
            .await
            .unwrap();
        assert_eq!(with_failures, vec![Stage::FollowArtists]);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_artist() {
        let fixture = Fixture::new(&[]);
        let records = fixture.records();
        records
            .write_artist_matches(&[
                ArtistMatch::from_candidates("Beatles", vec![artist("A1", "The Beatles")]),
                ArtistMatch::from_candidates("Oasis", vec![artist("O1", "Oasis")]),
            ])
            .unwrap();

        let mut client = MockCatalogClient::new();
        client
            .expect_artist_albums_page()
            .returning(|_, artist_id, _| {
                if artist_id == "A1" {
                    Err(eyre!("connection reset"))
                } else {
                    Ok(vec![RemoteAlbumListing {
                        artist_id: "O1".into(),
                        album_id: "M1".into(),
                        name: "Definitely Maybe".into(),
                        url: None,
                    }])
                }
            });
        let pipeline = fixture.pipeline(&client);

        let report = pipeline.fetch_albums().await.unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(records.read_album_lookup().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_records_are_fatal() {
        let fixture = Fixture::new(&[]);
        let client = MockCatalogClient::new();
        let pipeline = fixture.pipeline(&client);

        assert!(pipeline.follow_artists().await.is_err());
        assert!(pipeline.match_albums().is_err());
    }

    #[tokio::test]
    async fn test_rebuild_playlist_requires_existing_playlist() {
        let fixture = Fixture::new(&[]);
        let mut client = MockCatalogClient::new();
        client
            .expect_favorited_albums_page()
            .returning(|_, _| Ok(vec![favorited("X")]));
        client.expect_playlists_page().returning(|_, _| {
            Ok(vec![RemotePlaylist {
                id: "p1".into(),
                name: "Road Trip".into(),
            }])
        });
        let pipeline = fixture.pipeline(&client);

        let err = pipeline.rebuild_playlist().await.unwrap_err();
        assert!(err.to_string().contains("My CDs"));
    }

    #[test]
    fn test_stage_range() {
        assert_eq!(
            Stage::range(Stage::FetchAlbums, Stage::FavoriteAlbums).unwrap(),
            vec![Stage::FetchAlbums, Stage::MatchAlbums, Stage::FavoriteAlbums]
        );
        assert!(Stage::range(Stage::RebuildPlaylist, Stage::Scan).is_err());
    }
}
