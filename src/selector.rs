//! Picking the one variant to download.

use std::{fmt, sync::Arc};

use crate::{config::DEFAULT_LANGUAGE, resolver::AssetVariant};

type LanguagePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Selects the first variant whose language label satisfies a predicate.
///
/// Ties go to the earliest variant in resolver order; labels are not ranked
/// by size or closeness of match.
#[derive(Clone)]
pub struct VariantSelector {
    predicate: LanguagePredicate,
    description: String,
}

impl VariantSelector {
    /// Matches labels containing `language` (case-sensitive).
    pub fn language(language: impl Into<String>) -> Self {
        let language = language.into();
        let needle = language.clone();
        Self {
            predicate: Arc::new(move |label: &str| label.contains(needle.as_str())),
            description: language,
        }
    }

    /// Uses an arbitrary predicate over the language label.
    pub fn with_predicate(
        description: impl Into<String>,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            predicate: Arc::new(predicate),
            description: description.into(),
        }
    }

    /// Returns `None` when no variant matches.
    pub fn select<'a>(&self, variants: &'a [AssetVariant]) -> Option<&'a AssetVariant> {
        variants
            .iter()
            .find(|variant| (self.predicate)(&variant.language_label))
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Default for VariantSelector {
    fn default() -> Self {
        Self::language(DEFAULT_LANGUAGE)
    }
}

impl fmt::Debug for VariantSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantSelector")
            .field("language", &self.description)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn variant(label: &str, url: &str) -> AssetVariant {
        AssetVariant {
            language_label: label.to_string(),
            asset_url: Url::parse(url).unwrap(),
        }
    }

    fn cop29_variants() -> Vec<AssetVariant> {
        vec![
            variant("Arabic PDF 0.55 MB", "https://unfccc.int/files/doc_a.pdf"),
            variant("English PDF 0.12 MB", "https://unfccc.int/files/doc.pdf"),
            variant("French PDF 0.16 MB", "https://unfccc.int/files/doc_f.pdf"),
        ]
    }

    #[test]
    fn test_default_selects_english() {
        let variants = cop29_variants();
        let chosen = VariantSelector::default().select(&variants).unwrap();
        assert_eq!(chosen.asset_url.as_str(), "https://unfccc.int/files/doc.pdf");
    }

    #[test]
    fn test_first_match_wins() {
        let variants = vec![
            variant("English PDF 1.20 MB", "https://unfccc.int/files/big.pdf"),
            variant("English PDF 0.10 MB", "https://unfccc.int/files/small.pdf"),
        ];
        let chosen = VariantSelector::default().select(&variants).unwrap();
        assert_eq!(chosen.asset_url.as_str(), "https://unfccc.int/files/big.pdf");
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let variants = vec![variant("english pdf", "https://unfccc.int/files/doc.pdf")];
        assert!(VariantSelector::default().select(&variants).is_none());
    }

    #[test]
    fn test_no_match_is_none() {
        let variants = cop29_variants();
        assert!(VariantSelector::language("Spanish").select(&variants).is_none());
        assert!(VariantSelector::default().select(&[]).is_none());
    }

    #[test]
    fn test_other_language_and_custom_predicate() {
        let variants = cop29_variants();
        let french = VariantSelector::language("French").select(&variants).unwrap();
        assert_eq!(french.asset_url.as_str(), "https://unfccc.int/files/doc_f.pdf");

        let small = VariantSelector::with_predicate("under 0.2 MB", |label| label.ends_with("0.12 MB"));
        assert_eq!(
            small.select(&variants).unwrap().language_label,
            "English PDF 0.12 MB"
        );
    }
}
