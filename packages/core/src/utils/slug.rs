//! Slug derivation
//!
//! Slugs are lowercase ASCII: runs of anything that is not `[a-z0-9]` collapse
//! into a single hyphen, leading and trailing hyphens are trimmed and the
//! result is capped at a configurable length. Input is NFKD-decomposed first:
//! combining marks are dropped, so "Electrónica" becomes "electronica", and any
//! letter or digit still outside ASCII is dropped without splitting the word.
//!
//! Collisions are resolved by the caller walking [`SlugGenerator::candidates`]
//! (`base`, `base-1`, `base-2`, ...) while holding the catalog lock.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Default maximum slug length
pub const DEFAULT_SLUG_MAX_LENGTH: usize = 100;

/// Fallback base when a title has no slug-able characters at all
pub const FALLBACK_SLUG: &str = "category";

fn separator_regex() -> &'static Regex {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    SEPARATORS.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid separator pattern"))
}

/// Deterministic slug derivation with a length cap
#[derive(Debug, Clone, Copy)]
pub struct SlugGenerator {
    max_length: usize,
}

impl Default for SlugGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SLUG_MAX_LENGTH)
    }
}

impl SlugGenerator {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Normalize arbitrary text into a slug. May return an empty string.
    ///
    /// ```rust
    /// # use taxonomy_core::utils::SlugGenerator;
    /// let slugs = SlugGenerator::default();
    /// assert_eq!(slugs.slugify("  Phones & Tablets!! "), "phones-tablets");
    /// assert_eq!(slugs.slugify("Electrónica"), "electronica");
    /// ```
    pub fn slugify(&self, input: &str) -> String {
        let folded: String = input
            .nfkd()
            .filter(|c| !is_combining_mark(*c))
            .filter(|c| c.is_ascii() || !c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();

        let hyphenated = separator_regex().replace_all(&folded, "-");
        self.truncate(hyphenated.trim_matches('-'))
    }

    fn truncate(&self, slug: &str) -> String {
        // Slugs are pure ASCII here, so byte slicing is char-safe
        if slug.len() <= self.max_length {
            return slug.to_string();
        }
        slug[..self.max_length].trim_end_matches('-').to_string()
    }

    /// Candidate `n`: `base` for 0, `base-n` otherwise, cut to fit the cap.
    pub fn with_suffix(&self, base: &str, n: usize) -> String {
        if n == 0 {
            return self.truncate(base);
        }
        let suffix = format!("-{}", n);
        let room = self.max_length.saturating_sub(suffix.len());
        let stem = if base.len() > room {
            base[..room].trim_end_matches('-')
        } else {
            base
        };
        format!("{}{}", stem, suffix)
    }

    /// `base`, `base-1`, `base-2`, ... (at most `budget` candidates)
    pub fn candidates<'a>(&'a self, base: &'a str, budget: usize) -> impl Iterator<Item = String> + 'a {
        (0..budget).map(move |n| self.with_suffix(base, n))
    }
}
