//! Name analysis: fingerprints, phonetic codes, and symbol tokens derived
//! from entity name properties (spec §4.2/§4.8 — `name_keys`, `name_phonetic`,
//! `name_symbols`). The spec treats the name-analysis library itself as an
//! external, swappable dependency (spec §1 Non-goals); this module defines
//! the trait seam and a default implementation, grounded on
//! `other_examples/9a9ba718_apognu-motiva__...elastic-queries.rs.rs`, which
//! uses exactly this `rphonetic` + `unicode-normalization` combination for an
//! entity-matching service against Elasticsearch. Not claimed to be
//! production-grade transliteration; swap in a real one via [`NameAnalysis`].

use rphonetic::{Encoder, Metaphone};
use unicode_normalization::UnicodeNormalization;

/// Derives the three name-analysis signals the Matcher and mapping layers
/// consume. Implementations may be backed by a real transliteration/fuzzy
/// matching library; the default here is intentionally simple.
pub trait NameAnalysis: Send + Sync {
    /// A normalized "fingerprint" key suitable for exact-ish blocking:
    /// lowercased, diacritics stripped, whitespace collapsed, tokens sorted.
    fn name_key(&self, name: &str) -> String;

    /// Per-token phonetic codes for fuzzy blocking (e.g. Metaphone), one
    /// code per name token. Callers filter by individual code length.
    fn phonetic(&self, name: &str) -> Vec<String>;

    /// Individual alphanumeric symbol tokens extracted from the name,
    /// lowercased, used as a coarse token-overlap blocking signal.
    fn symbols(&self, name: &str) -> Vec<String>;

    /// Symbol tokens tagged under person-name conventions (spec §6
    /// `tag_person_name`). Defaults to [`NameAnalysis::symbols`]; a real
    /// tagger overrides this to emit person-specific tokens (e.g. given/
    /// family name markers).
    fn tag_person_name(&self, name: &str) -> Vec<String> {
        self.symbols(name)
    }

    /// Symbol tokens tagged under organization-name conventions (spec §6
    /// `tag_org_name`). Defaults to [`NameAnalysis::symbols`]; a real
    /// tagger overrides this to emit legal-form/abbreviation tokens.
    fn tag_org_name(&self, name: &str) -> Vec<String> {
        self.symbols(name)
    }
}

/// Default [`NameAnalysis`] impl: Unicode NFKD decomposition to strip
/// diacritics, `rphonetic`'s Metaphone for phonetic codes, and naive
/// whitespace/punctuation tokenization for symbols.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNameAnalysis;

impl DefaultNameAnalysis {
    fn strip_diacritics(input: &str) -> String {
        input
            .nfkd()
            .filter(|c| !matches!(c, '\u{0300}'..='\u{036f}'))
            .collect()
    }

    fn tokenize(input: &str) -> Vec<String> {
        Self::strip_diacritics(input)
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl NameAnalysis for DefaultNameAnalysis {
    fn name_key(&self, name: &str) -> String {
        let mut tokens = Self::tokenize(name);
        tokens.sort();
        tokens.join("-")
    }

    fn phonetic(&self, name: &str) -> Vec<String> {
        let metaphone = Metaphone::new(None);
        Self::tokenize(name)
            .iter()
            .map(|tok| metaphone.encode(tok))
            .collect()
    }

    fn symbols(&self, name: &str) -> Vec<String> {
        Self::tokenize(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_key_normalizes_case_and_diacritics() {
        let na = DefaultNameAnalysis;
        assert_eq!(na.name_key("José García"), na.name_key("jose garcia"));
    }

    #[test]
    fn name_key_is_order_insensitive() {
        let na = DefaultNameAnalysis;
        assert_eq!(na.name_key("John Smith"), na.name_key("Smith John"));
    }

    #[test]
    fn symbols_split_on_punctuation() {
        let na = DefaultNameAnalysis;
        assert_eq!(
            na.symbols("O'Brien & Co."),
            vec!["o", "brien", "co"]
        );
    }

    #[test]
    fn phonetic_is_non_empty_for_real_names() {
        let na = DefaultNameAnalysis;
        assert!(!na.phonetic("Vladimir").is_empty());
    }

    #[test]
    fn phonetic_returns_one_code_per_token() {
        let na = DefaultNameAnalysis;
        assert_eq!(na.phonetic("Vladimir Putin").len(), 2);
    }

    proptest::proptest! {
        /// Blocking relies on `name_key` being stable under token reordering
        /// for any alphabetic name (spec §4.6 "name_keys ... order-insensitive").
        #[test]
        fn name_key_is_stable_under_token_shuffle(
            first in "[a-z]{2,8}",
            second in "[a-z]{2,8}",
        ) {
            let na = DefaultNameAnalysis;
            let forward = format!("{first} {second}");
            let reversed = format!("{second} {first}");
            prop_assert_eq!(na.name_key(&forward), na.name_key(&reversed));
        }

        /// `symbols` never produces more tokens than whitespace/punctuation
        /// boundaries in the input admit, and is idempotent on its own output.
        #[test]
        fn symbols_is_idempotent(first in "[a-z]{2,8}", second in "[a-z]{2,8}") {
            let na = DefaultNameAnalysis;
            let name = format!("{first} {second}");
            let once = na.symbols(&name);
            let twice = na.symbols(&once.join(" "));
            prop_assert_eq!(once, twice);
        }
    }
}
