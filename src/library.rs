use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, eyre};
use serde::{Deserialize, Serialize};

/// An album folder in the local library, named `"Artist - Album"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAlbum {
    pub folder: String,
    pub artist: String,
    pub album: String,
}

impl LocalAlbum {
    /// Split a folder name into artist and album.
    ///
    /// The artist is everything before the first `-`; the album is what
    /// follows the artist and its two separator characters. `"Beatles, The"`
    /// becomes `"The Beatles"`.
    pub fn from_folder_name(folder: &str) -> Self {
        let raw_artist = folder.split('-').next().unwrap_or_default().trim();
        let album: String = folder
            .chars()
            .skip(raw_artist.chars().count() + 2)
            .collect();

        let artist = match raw_artist.strip_suffix(", The") {
            Some(surname) => format!("The {surname}"),
            None => raw_artist.to_string(),
        };

        Self {
            folder: folder.to_string(),
            artist,
            album: album.trim().to_string(),
        }
    }
}

/// List the album folders directly under `library_dir`, sorted by name.
///
/// Files and hidden entries are ignored. Duplicate artist/album pairs are
/// kept as they are.
pub fn scan_library(library_dir: &Path) -> Result<Vec<LocalAlbum>> {
    if !library_dir.is_dir() {
        return Err(eyre!(
            "Library directory {} does not exist",
            library_dir.display()
        ));
    }

    let mut folders = Vec::new();
    for entry in walkdir::WalkDir::new(library_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.wrap_err(format!("Failed to read {}", library_dir.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            log::warn!("Skipping non UTF-8 folder name: {}", entry.path().display());
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        folders.push(name.to_string());
    }

    let albums: Vec<LocalAlbum> = folders
        .iter()
        .map(|folder| LocalAlbum::from_folder_name(folder))
        .collect();

    for album in albums.iter().filter(|a| a.album.is_empty()) {
        log::warn!("Folder '{}' has no album part", album.folder);
    }

    log::info!(
        "Found {} album folders in {}",
        albums.len(),
        library_dir.display()
    );
    Ok(albums)
}
