use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::Serialize;

use crate::ports::catalog::RemoteAlbumListing;

/// The single representative kept for an `(artist_id, name)` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalAlbum {
    pub artist_id: String,
    pub name: String,
    pub album_id: String,
    pub url: Option<String>,
}

impl From<&RemoteAlbumListing> for CanonicalAlbum {
    fn from(listing: &RemoteAlbumListing) -> Self {
        Self {
            artist_id: listing.artist_id.clone(),
            name: listing.name.clone(),
            album_id: listing.album_id.clone(),
            url: listing.url.clone(),
        }
    }
}

/// One canonical album per `(artist_id, name)`, plus each artist's distinct
/// names in first-seen order for the album name matcher.
#[derive(Debug, Default)]
pub struct CanonicalCatalog {
    albums: HashMap<(String, String), CanonicalAlbum>,
    names_by_artist: HashMap<String, Vec<String>>,
}

impl CanonicalCatalog {
    pub fn get(&self, artist_id: &str, name: &str) -> Option<&CanonicalAlbum> {
        self.albums.get(&(artist_id.to_string(), name.to_string()))
    }

    pub fn names_for_artist(&self, artist_id: &str) -> &[String] {
        self.names_by_artist
            .get(artist_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.albums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.albums.is_empty()
    }
}

/// Collapse a raw album listing to one entry per exact `(artist_id, name)`.
///
/// Grouping is case-sensitive and exact; within a group the first listing
/// encountered wins. Edition variants with different names ("Abbey Road"
/// vs "Abbey Road (Remastered)") stay separate entries.
pub fn deduplicate(listings: &[RemoteAlbumListing]) -> CanonicalCatalog {
    let mut catalog = CanonicalCatalog::default();
    let mut duplicates = 0;

    for listing in listings {
        let key = (listing.artist_id.clone(), listing.name.clone());
        match catalog.albums.entry(key) {
            Entry::Occupied(_) => duplicates += 1,
            Entry::Vacant(slot) => {
                slot.insert(CanonicalAlbum::from(listing));
                catalog
                    .names_by_artist
                    .entry(listing.artist_id.clone())
                    .or_default()
                    .push(listing.name.clone());
            }
        }
    }

    log::info!(
        "Deduplicated {} album listings into {} canonical albums ({} duplicates dropped)",
        listings.len(),
        catalog.len(),
        duplicates
    );

    catalog
}
