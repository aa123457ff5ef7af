use std::path::{Path, PathBuf};

use chrono::Utc;
use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::config::Provider;
use crate::library::LocalAlbum;
use crate::ports::catalog::{RemoteAlbumListing, RemoteArtist};
use crate::services::resolver::{ArtistMatch, MAX_ARTIST_CANDIDATES};

const ALBUM_COLUMNS: &[&str] = &["folder", "artist", "album"];
const ARTIST_MATCH_COLUMNS: &[&str] = &[
    "artist",
    "artist_id",
    "match_0_id",
    "match_0_name",
    "match_1_id",
    "match_1_name",
    "match_2_id",
    "match_2_name",
];
const ALBUM_LOOKUP_COLUMNS: &[&str] = &["artist_id", "album_id", "name", "url"];
const ALBUM_MATCH_COLUMNS: &[&str] = &[
    "folder",
    "artist",
    "album",
    "artist_id",
    "album_name_best_match",
    "album_id",
    "name",
    "url",
];

/// A stage input that cannot be trusted. Always fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Record file {} does not exist; run the stage that produces it first", path.display())]
    Missing { path: PathBuf },

    #[error("Record file {} has no '{column}' column", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("Record file {} is malformed", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// One row of the hand-editable artist match table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ArtistMatchRow {
    artist: String,
    artist_id: Option<String>,
    match_0_id: Option<String>,
    match_0_name: Option<String>,
    match_1_id: Option<String>,
    match_1_name: Option<String>,
    match_2_id: Option<String>,
    match_2_name: Option<String>,
}

impl From<&ArtistMatch> for ArtistMatchRow {
    fn from(matched: &ArtistMatch) -> Self {
        let slot = |index: usize| matched.candidates.get(index);
        Self {
            artist: matched.local_artist.clone(),
            artist_id: matched.resolved_id.clone(),
            match_0_id: slot(0).map(|c| c.id.clone()),
            match_0_name: slot(0).map(|c| c.name.clone()),
            match_1_id: slot(1).map(|c| c.id.clone()),
            match_1_name: slot(1).map(|c| c.name.clone()),
            match_2_id: slot(2).map(|c| c.id.clone()),
            match_2_name: slot(2).map(|c| c.name.clone()),
        }
    }
}

impl From<ArtistMatchRow> for ArtistMatch {
    fn from(row: ArtistMatchRow) -> Self {
        let slots = [
            (row.match_0_id, row.match_0_name),
            (row.match_1_id, row.match_1_name),
            (row.match_2_id, row.match_2_name),
        ];
        let candidates = slots
            .into_iter()
            .take(MAX_ARTIST_CANDIDATES)
            .filter_map(|(id, name)| {
                id.map(|id| RemoteArtist {
                    id,
                    name: name.unwrap_or_default(),
                })
            })
            .collect();

        Self {
            local_artist: row.artist,
            resolved_id: row.artist_id,
            candidates,
        }
    }
}

/// A local album joined to its best-guess canonical album.
///
/// Serialized with the join table's column names; the canonical fields stay
/// empty when the artist is unresolved or no album name cleared the cutoff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumMatch {
    pub folder: String,
    #[serde(rename = "artist")]
    pub local_artist: String,
    #[serde(rename = "album")]
    pub local_album: String,
    pub artist_id: Option<String>,
    #[serde(rename = "album_name_best_match")]
    pub resolved_album_name: Option<String>,
    pub album_id: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
}

impl AlbumMatch {
    pub fn album_id(&self) -> Option<&str> {
        self.album_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// The durable, human-inspectable records passed between pipeline stages.
///
/// Every read goes back to disk, so hand edits made between runs are always
/// seen by the next stage.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
    provider: Provider,
}

impl RecordStore {
    pub fn new(dir: PathBuf, provider: Provider) -> Self {
        Self { dir, provider }
    }

    pub fn albums_path(&self) -> PathBuf {
        self.dir.join("albums.csv")
    }

    pub fn artist_matches_path(&self) -> PathBuf {
        self.dir.join(format!("{}_artist_matches.csv", self.provider))
    }

    pub fn album_lookup_path(&self) -> PathBuf {
        self.dir.join(format!("{}_album_lookup.csv", self.provider))
    }

    pub fn album_matches_path(&self) -> PathBuf {
        self.dir.join(format!("{}_albums_join.csv", self.provider))
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.dir.join("reports")
    }

    pub fn read_albums(&self) -> Result<Vec<LocalAlbum>> {
        read_table(&self.albums_path(), ALBUM_COLUMNS)
    }

    pub fn write_albums(&self, albums: &[LocalAlbum]) -> Result<PathBuf> {
        write_table(&self.albums_path(), ALBUM_COLUMNS, albums)
    }

    pub fn read_artist_matches(&self) -> Result<Vec<ArtistMatch>> {
        let rows: Vec<ArtistMatchRow> =
            read_table(&self.artist_matches_path(), ARTIST_MATCH_COLUMNS)?;
        Ok(rows.into_iter().map(ArtistMatch::from).collect())
    }

    /// Previously reviewed matches, if the table has been written before.
    pub fn read_artist_matches_if_present(&self) -> Result<Option<Vec<ArtistMatch>>> {
        if !self.artist_matches_path().exists() {
            return Ok(None);
        }
        self.read_artist_matches().map(Some)
    }

    pub fn write_artist_matches(&self, matches: &[ArtistMatch]) -> Result<PathBuf> {
        let rows: Vec<ArtistMatchRow> = matches.iter().map(ArtistMatchRow::from).collect();
        write_table(&self.artist_matches_path(), ARTIST_MATCH_COLUMNS, &rows)
    }

    pub fn read_album_lookup(&self) -> Result<Vec<RemoteAlbumListing>> {
        read_table(&self.album_lookup_path(), ALBUM_LOOKUP_COLUMNS)
    }

    pub fn write_album_lookup(&self, listings: &[RemoteAlbumListing]) -> Result<PathBuf> {
        write_table(&self.album_lookup_path(), ALBUM_LOOKUP_COLUMNS, listings)
    }

    pub fn read_album_matches(&self) -> Result<Vec<AlbumMatch>> {
        read_table(&self.album_matches_path(), ALBUM_MATCH_COLUMNS)
    }

    pub fn read_album_matches_if_present(&self) -> Result<Option<Vec<AlbumMatch>>> {
        if !self.album_matches_path().exists() {
            return Ok(None);
        }
        self.read_album_matches().map(Some)
    }

    pub fn write_album_matches(&self, matches: &[AlbumMatch]) -> Result<PathBuf> {
        write_table(&self.album_matches_path(), ALBUM_MATCH_COLUMNS, matches)
    }

    /// Write a run report as `reports/<provider>-<stage>-<timestamp>.json`.
    pub fn write_report<T: Serialize>(&self, stage: &str, report: &T) -> Result<PathBuf> {
        let dir = self.reports_dir();
        std::fs::create_dir_all(&dir)
            .wrap_err(format!("Failed to create {}", dir.display()))?;

        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let path = dir.join(format!("{}-{}-{}.json", self.provider, stage, timestamp));
        let contents = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, contents)
            .wrap_err(format!("Failed to write report {}", path.display()))?;

        log::info!("Wrote report to {}", path.display());
        Ok(path)
    }
}

fn read_table<T: DeserializeOwned>(path: &Path, required: &[&str]) -> Result<Vec<T>> {
    if !path.exists() {
        return Err(RecordError::Missing {
            path: path.to_path_buf(),
        }
        .into());
    }

    let malformed = |source| RecordError::Malformed {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(malformed)?;

    let headers = reader.headers().map_err(malformed)?.clone();
    if let Some(column) = required
        .iter()
        .find(|column| !headers.iter().any(|header| header == **column))
    {
        return Err(RecordError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        }
        .into());
    }

    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, csv::Error>>()
        .map_err(malformed)?;

    log::debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn write_table<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .wrap_err(format!("Failed to create {}", parent.display()))?;
    }

    // The header is written by hand so empty tables still carry their schema.
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .wrap_err(format!("Failed to create {}", path.display()))?;
    writer.write_record(columns)?;
    for row in rows {
        writer
            .serialize(row)
            .wrap_err(format!("Failed to write row to {}", path.display()))?;
    }
    writer
        .flush()
        .wrap_err(format!("Failed to write {}", path.display()))?;

    log::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> RecordStore {
        RecordStore::new(dir.to_path_buf(), Provider::Spotify)
    }

    fn record_error(err: &color_eyre::Report) -> &RecordError {
        err.downcast_ref::<RecordError>().unwrap()
    }

    #[test]
    fn test_provider_file_names() {
        let store = RecordStore::new(PathBuf::from("data"), Provider::Tidal);
        assert_eq!(store.artist_matches_path(), PathBuf::from("data/tidal_artist_matches.csv"));
        assert_eq!(store.album_matches_path(), PathBuf::from("data/tidal_albums_join.csv"));
        assert_eq!(store.albums_path(), PathBuf::from("data/albums.csv"));
    }

    #[test]
    fn test_artist_matches_keep_schema_and_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let matches = vec![
            ArtistMatch::from_candidates(
                "Beatles",
                vec![
                    RemoteArtist { id: "A1".into(), name: "The Beatles".into() },
                    RemoteArtist { id: "A2".into(), name: "Beatles Revival".into() },
                ],
            ),
            ArtistMatch::unresolved("Nobody"),
        ];
        store.write_artist_matches(&matches).unwrap();

        let contents = std::fs::read_to_string(store.artist_matches_path()).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "artist,artist_id,match_0_id,match_0_name,match_1_id,match_1_name,match_2_id,match_2_name"
        );
        assert_eq!(lines.next().unwrap(), "Beatles,A1,A1,The Beatles,A2,Beatles Revival,,");
        assert_eq!(lines.next().unwrap(), "Nobody,,,,,,,");

        assert_eq!(store.read_artist_matches().unwrap(), matches);
    }

    #[test]
    fn test_hand_edited_artist_id_is_authoritative() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(
            store.artist_matches_path(),
            "artist,artist_id,match_0_id,match_0_name,match_1_id,match_1_name,match_2_id,match_2_name,notes\n\
             Beatles, A9 ,A1,Beatles Tribute,A9,The Beatles,,,fixed by hand\n\
             Nobody,,,,,,,,\n",
        )
        .unwrap();

        let matches = store.read_artist_matches().unwrap();
        assert_eq!(matches[0].artist_id(), Some("A9"));
        assert_eq!(matches[0].candidates.len(), 2);
        assert_eq!(matches[1].artist_id(), None);
    }

    #[test]
    fn test_missing_file_is_record_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(dir.path()).read_albums().unwrap_err();
        assert!(matches!(record_error(&err), RecordError::Missing { .. }));
    }

    #[test]
    fn test_missing_column_is_record_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(store.albums_path(), "folder,artist\nBeatles - Abbey Road,Beatles\n").unwrap();

        let err = store.read_albums().unwrap_err();
        match record_error(&err) {
            RecordError::MissingColumn { column, .. } => assert_eq!(column, "album"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_row_is_record_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(
            store.albums_path(),
            "folder,artist,album\nBeatles - Abbey Road,Beatles,Abbey Road,extra\n",
        )
        .unwrap();

        let err = store.read_albums().unwrap_err();
        assert!(matches!(record_error(&err), RecordError::Malformed { .. }));
    }

    #[test]
    fn test_album_matches_with_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let rows = vec![
            AlbumMatch {
                folder: "Beatles - Abbey Road".into(),
                local_artist: "Beatles".into(),
                local_album: "Abbey Road".into(),
                artist_id: Some("A1".into()),
                resolved_album_name: Some("Abbey Road".into()),
                album_id: Some("X".into()),
                name: Some("Abbey Road".into()),
                url: None,
            },
            AlbumMatch {
                folder: "Nobody - Nothing".into(),
                local_artist: "Nobody".into(),
                local_album: "Nothing".into(),
                ..AlbumMatch::default()
            },
        ];
        store.write_album_matches(&rows).unwrap();

        let read = store.read_album_matches().unwrap();
        assert_eq!(read, rows);
        assert_eq!(read[0].album_id(), Some("X"));
        assert_eq!(read[1].album_id(), None);
    }

    #[test]
    fn test_empty_table_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.write_album_lookup(&[]).unwrap();

        let contents = std::fs::read_to_string(store.album_lookup_path()).unwrap();
        assert_eq!(contents.trim(), "artist_id,album_id,name,url");
        assert!(store.read_album_lookup().unwrap().is_empty());
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let path = store
            .write_report("follow-artists", &serde_json::json!({"requested": 3}))
            .unwrap();

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("spotify-follow-artists-"));
        assert!(name.ends_with(".json"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("\"requested\": 3"));
    }
}
