use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{Context, OptionExt, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// The remote catalogs this tool knows how to reconcile against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Spotify,
    Tidal,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Spotify => "spotify",
            Provider::Tidal => "tidal",
        }
    }

    /// Largest `limit` the provider's listing endpoints accept.
    pub fn max_page_size(&self) -> u32 {
        match self {
            Provider::Spotify => 50,
            Provider::Tidal => 100,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DEFAULT_CONFIG: &str = r#"# catalog-sync configuration

# Local library, one folder per album named "Artist - Album"
library_dir = "~/Music"

# Where stage records (CSV), sessions and run reports are written
data_dir = "~/.local/share/catalog-sync"

[spotify]
client_id = ""
client_secret = ""
# delay = "500ms"
# batch_size = 50
# playlist_name = "My CDs"

[tidal]
client_id = ""
client_secret = ""
# delay = "200ms"
# country_code = "US"
"#;

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    library_dir: String,
    data_dir: String,
    #[serde(default)]
    spotify: Option<ProviderConfig>,
    #[serde(default)]
    tidal: Option<ProviderConfig>,
}

/// Per-provider table as written in the config file. Unset tunables fall back
/// to the provider defaults in [`ProviderSettings::defaults_for`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub session_file: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_duration",
        skip_serializing
    )]
    pub delay: Option<Duration>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub playlist_batch_size: Option<usize>,
    #[serde(default)]
    pub playlist_name: Option<String>,
    #[serde(default)]
    pub max_playlist_tracks: Option<usize>,
    #[serde(default)]
    pub search_limit: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub album_match_cutoff: Option<f64>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub album_types: Option<String>,
}

/// Resolved tunables used by the sync pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub delay: Duration,
    pub batch_size: usize,
    pub playlist_batch_size: usize,
    pub playlist_name: String,
    pub max_playlist_tracks: usize,
    pub search_limit: u32,
    pub page_size: u32,
    pub album_match_cutoff: f64,
    pub country_code: String,
    pub album_types: String,
}

impl ProviderSettings {
    pub fn defaults_for(provider: Provider) -> Self {
        let delay = match provider {
            Provider::Spotify => Duration::from_millis(500),
            Provider::Tidal => Duration::from_millis(200),
        };
        Self {
            delay,
            batch_size: 50,
            playlist_batch_size: 100,
            playlist_name: "My CDs".to_string(),
            max_playlist_tracks: 10_000,
            search_limit: 3,
            page_size: 50,
            album_match_cutoff: 0.6,
            country_code: "US".to_string(),
            album_types: "album".to_string(),
        }
    }
}

fn deserialize_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err(format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&contents)
            .wrap_err(format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("catalog-sync").join("config.toml"))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path().ok_or_eyre("Config file not found")?;

        Self::from_file(&config_path)
    }

    /// Write the default config file unless one already exists.
    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path().ok_or_eyre("No config directory on this platform")?;
        if path.exists() {
            log::info!("Config already exists at {}", path.display());
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err(format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, DEFAULT_CONFIG)
            .wrap_err(format!("Failed to write config file: {}", path.display()))?;
        Ok(path)
    }

    /// Expand ~ to home directory
    fn expand_path(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }

    pub fn library_path(&self) -> PathBuf {
        self.expand_path(&self.library_dir)
    }

    pub fn data_path(&self) -> PathBuf {
        self.expand_path(&self.data_dir)
    }

    pub fn provider(&self, provider: Provider) -> Result<&ProviderConfig> {
        match provider {
            Provider::Spotify => self.spotify.as_ref(),
            Provider::Tidal => self.tidal.as_ref(),
        }
        .ok_or_eyre(format!("No [{}] section in config", provider))
    }

    /// Tunables for a provider, falling back to defaults when the table or a
    /// field is absent.
    pub fn provider_settings(&self, provider: Provider) -> ProviderSettings {
        let defaults = ProviderSettings::defaults_for(provider);
        let Ok(table) = self.provider(provider) else {
            return defaults;
        };

        ProviderSettings {
            delay: table.delay.unwrap_or(defaults.delay),
            batch_size: table.batch_size.unwrap_or(defaults.batch_size),
            playlist_batch_size: table
                .playlist_batch_size
                .unwrap_or(defaults.playlist_batch_size),
            playlist_name: table
                .playlist_name
                .clone()
                .unwrap_or(defaults.playlist_name),
            max_playlist_tracks: table
                .max_playlist_tracks
                .unwrap_or(defaults.max_playlist_tracks),
            search_limit: table.search_limit.unwrap_or(defaults.search_limit),
            page_size: Self::clamp_page_size(
                provider,
                table.page_size.unwrap_or(defaults.page_size),
            ),
            album_match_cutoff: table
                .album_match_cutoff
                .unwrap_or(defaults.album_match_cutoff),
            country_code: table
                .country_code
                .clone()
                .unwrap_or(defaults.country_code),
            album_types: table.album_types.clone().unwrap_or(defaults.album_types),
        }
    }

    // A page shorter than requested ends pagination, so never ask for more
    // than the provider will return.
    fn clamp_page_size(provider: Provider, page_size: u32) -> u32 {
        let max = provider.max_page_size();
        if page_size > max {
            log::warn!(
                "page_size {} exceeds the {} maximum, using {}",
                page_size,
                provider,
                max
            );
        }
        page_size.clamp(1, max)
    }

    /// Session file for a provider; defaults to `<data_dir>/<provider>_session.json`.
    pub fn session_path(&self, provider: Provider) -> PathBuf {
        self.provider(provider)
            .ok()
            .and_then(|table| table.session_file.as_deref())
            .map(|path| self.expand_path(path))
            .unwrap_or_else(|| {
                self.data_path()
                    .join(format!("{}_session.json", provider.as_str()))
            })
    }
}
