//! Discovery of documents and their language variants in rendered pages.
//!
//! All extraction here is pure: it reads a [`RenderedContent`] and never
//! navigates or fetches anything.

use tracing::debug;
use url::Url;

use crate::{
    config::{Config, DEFAULT_MARKER, DEFAULT_VARIANT_CONTROL},
    error::PageError,
    page::{Element, RenderedContent, parse_selector},
};

/// A link from a listing page to one document's landing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReference {
    pub label: String,
    pub landing_url: Url,
}

/// One language rendition of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetVariant {
    /// Free text such as `"English PDF 0.12 MB"`.
    pub language_label: String,
    /// Always absolute.
    pub asset_url: Url,
}

/// A document whose download control sits directly on the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineDocument {
    pub variants: Vec<AssetVariant>,
}

#[derive(Debug, Clone)]
pub struct AssetResolver {
    marker: String,
    variant_control: String,
}

impl Default for AssetResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER, DEFAULT_VARIANT_CONTROL)
    }
}

impl AssetResolver {
    /// `marker` is the anchor text identifying document links and
    /// `variant_control` the CSS selector of the per-language dropdown.
    pub fn new(marker: impl Into<String>, variant_control: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            variant_control: variant_control.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.marker.as_str(), config.variant_control.as_str())
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Fails if the configured variant control is not a valid CSS selector.
    pub fn check(&self) -> Result<(), PageError> {
        parse_selector(&self.variant_control).map(|_| ())
    }

    /// Finds every anchor whose visible text contains the marker, in
    /// document order. Duplicates are kept.
    pub fn resolve(&self, listing: &RenderedContent) -> Result<Vec<DocumentReference>, PageError> {
        let references = listing
            .select("a[href]")?
            .into_iter()
            .filter(|anchor| anchor.text().contains(self.marker.as_str()))
            .filter_map(|anchor| {
                let href = anchor.attr("href")?;
                let landing_url = absolutize(listing.url(), href)?;
                Some(DocumentReference {
                    label: anchor.text().to_string(),
                    landing_url,
                })
            })
            .collect();
        Ok(references)
    }

    /// Reads the options of the landing page's variant control.
    ///
    /// A page without the control yields an empty list, not an error.
    pub fn resolve_variants(
        &self,
        landing: &RenderedContent,
    ) -> Result<Vec<AssetVariant>, PageError> {
        let mut variants = Vec::new();
        for control in landing.select(&self.variant_control)? {
            variants.extend(options_of(&control, landing.url())?);
        }
        Ok(variants)
    }

    /// Treats each variant control found on the listing page as its own
    /// document. Saved document-search pages are laid out this way.
    pub fn inline_documents(
        &self,
        listing: &RenderedContent,
    ) -> Result<Vec<InlineDocument>, PageError> {
        let mut documents = Vec::new();
        for control in listing.select(&self.variant_control)? {
            let variants = options_of(&control, listing.url())?;
            if !variants.is_empty() {
                documents.push(InlineDocument { variants });
            }
        }
        Ok(documents)
    }

    /// Anchors that look related to documents, for diagnosing a listing
    /// where the marker matched nothing.
    pub fn similar_links(
        &self,
        listing: &RenderedContent,
        limit: usize,
    ) -> Result<Vec<DocumentReference>, PageError> {
        let references = listing
            .select("a[href]")?
            .into_iter()
            .filter(|anchor| {
                let text = anchor.text().to_lowercase();
                text.contains("access") || text.contains("document")
            })
            .filter_map(|anchor| {
                Some(DocumentReference {
                    label: anchor.text().to_string(),
                    landing_url: absolutize(listing.url(), anchor.attr("href")?)?,
                })
            })
            .take(limit)
            .collect();
        Ok(references)
    }
}

fn options_of(control: &Element, base: &Url) -> Result<Vec<AssetVariant>, PageError> {
    let variants = control
        .select("option")?
        .into_iter()
        .filter_map(|option| {
            let value = option.attr("value").map(str::trim).filter(|v| !v.is_empty())?;
            let asset_url = absolutize(base, value)?;
            Some(AssetVariant {
                language_label: option.text().to_string(),
                asset_url,
            })
        })
        .collect();
    Ok(variants)
}

/// Resolves `href` against `base`, keeping only http(s) targets.
pub fn absolutize(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    match base.join(href) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(url) => {
            debug!(%url, "ignoring non-http link");
            None
        }
        Err(e) => {
            debug!(href, error = %e, "ignoring unparsable link");
            None
        }
    }
}
