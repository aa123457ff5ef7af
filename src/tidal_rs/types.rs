use serde::{Deserialize, Deserializer};

/// TIDAL ids are numbers (artists, albums, tracks) or uuids (playlists).
/// Both are carried as strings.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(id) => id.to_string(),
        RawId::Text(id) => id,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct TidalTokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Response of `GET /sessions`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TidalSessionInfo {
    #[serde(deserialize_with = "deserialize_id")]
    pub user_id: String,
    pub country_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TidalArtist {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TidalAlbum {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub title: String,
    pub artist: Option<TidalArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TidalTrack {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TidalPlaylist {
    pub uuid: String,
    pub title: String,
    #[serde(rename = "numberOfTracks", default)]
    pub number_of_tracks: u32,
    #[serde(rename = "numberOfVideos", default)]
    pub number_of_videos: u32,
}

/// Favorites wrap each entry with the time it was added
#[derive(Debug, Clone, Deserialize)]
pub struct TidalFavorite<T> {
    pub item: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TidalPage<T> {
    pub items: Vec<T>,
}
