use color_eyre::eyre::{Context, Result};
use regex::Regex;
use unaccent::unaccent;

/// Folds titles and names into a comparable form: accents removed,
/// lowercased, punctuation dropped, whitespace collapsed.
#[derive(Debug, Clone)]
pub struct TitleNormalizer {
    punctuation: Regex,
    whitespace: Regex,
}

impl TitleNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            punctuation: Regex::new(r"[^\p{L}\p{N}\s]+").wrap_err("Failed to create regex")?,
            whitespace: Regex::new(r"\s+").wrap_err("Failed to create regex")?,
        })
    }

    pub fn normalize(&self, value: &str) -> String {
        let lower = unaccent(value).to_lowercase();
        let no_punct = self.punctuation.replace_all(lower.trim(), "");
        let collapsed = self.whitespace.replace_all(&no_punct, " ");
        let collapsed = collapsed.trim();
        if collapsed.is_empty() {
            // Titles made only of punctuation ("!!!") still need to compare.
            lower.trim().to_string()
        } else {
            collapsed.to_string()
        }
    }

    /// Jaro-Winkler similarity of the normalized forms.
    pub fn name_similarity(&self, a: &str, b: &str) -> f64 {
        jaro_winkler::jaro_winkler(&self.normalize(a), &self.normalize(b))
    }
}

/// Ratcliff/Obershelp similarity: twice the number of characters in the
/// recursively found longest common blocks, over the combined length.
///
/// Returns a value in `[0, 1]`; two empty strings are identical.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((a_lo, a_hi, b_lo, b_hi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, a_lo, a_hi, b_lo, b_hi);
        if size == 0 {
            continue;
        }
        matched += size;
        if a_lo < i && b_lo < j {
            pending.push((a_lo, i, b_lo, j));
        }
        if i + size < a_hi && j + size < b_hi {
            pending.push((i + size, a_hi, j + size, b_hi));
        }
    }

    matched
}

/// Longest common block inside `a[a_lo..a_hi]` and `b[b_lo..b_hi]`.
/// Among equally long blocks the one starting earliest in `a`, then in `b`, wins.
fn longest_match(
    a: &[char],
    b: &[char],
    a_lo: usize,
    a_hi: usize,
    b_lo: usize,
    b_hi: usize,
) -> (usize, usize, usize) {
    let width = b_hi - b_lo + 1;
    let mut best = (a_lo, b_lo, 0);
    // run[j - b_lo + 1] = length of the common run ending at (i, j)
    let mut previous = vec![0usize; width];
    let mut current = vec![0usize; width];

    for i in a_lo..a_hi {
        for j in b_lo..b_hi {
            let slot = j - b_lo + 1;
            if a[i] == b[j] {
                let size = previous[slot - 1] + 1;
                current[slot] = size;
                if size > best.2 {
                    best = (i + 1 - size, j + 1 - size, size);
                }
            } else {
                current[slot] = 0;
            }
        }
        std::mem::swap(&mut previous, &mut current);
    }

    best
}
