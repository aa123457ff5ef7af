use color_eyre::eyre::Result;

use crate::ports::catalog::{CatalogClient, RemoteArtist};
use crate::services::catalog::Catalog;
use crate::services::similarity::{TitleNormalizer, sequence_ratio};

/// Candidate slots kept per artist in the match record.
pub const MAX_ARTIST_CANDIDATES: usize = 3;

/// Below this Jaro-Winkler score the top search hit is flagged for review.
const ARTIST_REVIEW_THRESHOLD: f64 = 0.8;

/// The resolution of one distinct local artist name.
///
/// `resolved_id` defaults to the provider's top candidate and may be edited
/// by hand before downstream stages consume it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistMatch {
    pub local_artist: String,
    pub resolved_id: Option<String>,
    pub candidates: Vec<RemoteArtist>,
}

impl ArtistMatch {
    pub fn unresolved(local_artist: impl Into<String>) -> Self {
        Self {
            local_artist: local_artist.into(),
            resolved_id: None,
            candidates: Vec::new(),
        }
    }

    pub fn from_candidates(local_artist: impl Into<String>, candidates: Vec<RemoteArtist>) -> Self {
        Self {
            local_artist: local_artist.into(),
            resolved_id: candidates.first().map(|c| c.id.clone()),
            candidates,
        }
    }

    /// The resolved id, ignoring blank cells left by hand edits.
    pub fn artist_id(&self) -> Option<&str> {
        self.resolved_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Maps local names onto remote catalog identities.
pub struct EntityResolver {
    normalizer: TitleNormalizer,
    album_cutoff: f64,
    search_limit: u32,
}

impl EntityResolver {
    pub fn new(album_cutoff: f64, search_limit: u32) -> Result<Self> {
        Ok(Self {
            normalizer: TitleNormalizer::new()?,
            album_cutoff,
            search_limit: search_limit.clamp(1, MAX_ARTIST_CANDIDATES as u32),
        })
    }

    /// Search the provider for `name` and return its top candidates in the
    /// provider's own relevance order. An empty result means "unresolved".
    pub async fn resolve_artist<C>(
        &self,
        catalog: &Catalog<'_, C>,
        name: &str,
    ) -> Result<Vec<RemoteArtist>>
    where
        C: CatalogClient + ?Sized,
    {
        let mut candidates = catalog.search_artists(name, self.search_limit).await?;
        candidates.truncate(self.search_limit as usize);

        if let Some(top) = candidates.first() {
            let similarity = self.normalizer.name_similarity(name, &top.name);
            if similarity < ARTIST_REVIEW_THRESHOLD {
                log::warn!(
                    "Top match for '{}' is '{}' (similarity {:.2}); review recommended",
                    name,
                    top.name,
                    similarity
                );
            }
        }

        Ok(candidates)
    }

    /// Pick the candidate album name closest to `local_album_name`.
    ///
    /// Names are compared in normalized form with the Ratcliff/Obershelp
    /// ratio. Only candidates scoring at least the cutoff qualify; on equal
    /// scores the earlier candidate wins.
    pub fn match_album<'c, S>(&self, local_album_name: &str, candidate_names: &'c [S]) -> Option<&'c str>
    where
        S: AsRef<str>,
    {
        let local = self.normalizer.normalize(local_album_name);
        let mut best: Option<(&'c str, f64)> = None;

        for candidate in candidate_names {
            let candidate = candidate.as_ref();
            let score = sequence_ratio(&local, &self.normalizer.normalize(candidate));
            if score < self.album_cutoff {
                continue;
            }
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((candidate, score));
            }
        }

        if let Some((name, score)) = best {
            log::debug!("Matched album '{}' to '{}' ({:.2})", local_album_name, name, score);
        }
        best.map(|(name, _)| name)
    }
}
