//! Listing page in, downloaded documents out.
//!
//! Each document goes through
//! `Discovered -> VariantsResolved -> VariantSelected -> (AlreadyPresent | Fetched | Failed)`.
//! A document that fails is logged and counted; the run always moves on to
//! the next one. Only a listing that cannot be loaded at all stops a run.

use std::{collections::HashSet, fmt, path::PathBuf, time::Duration};

use futures::TryStreamExt;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::Config,
    error::{Error, FetchError, PageError, Result, SaveError},
    fetcher::Fetch,
    listing::{ListingSource, read_links},
    page::{PageSession, RenderedContent},
    resolver::{AssetResolver, AssetVariant, DocumentReference},
    selector::VariantSelector,
    store::DownloadStore,
};

/// How many related-looking links are logged when the marker finds nothing.
const SIMILAR_LINK_LIMIT: usize = 10;

/// Why a single document did not end up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    PageLoadTimeout,
    PageLoadFailed,
    NoVariants,
    NoMatchingLanguage,
    NetworkError,
    HttpStatusError(u16),
    BlockedResponse,
    FilesystemError,
}

impl From<&FetchError> for FailureKind {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::Network(_) => Self::NetworkError,
            FetchError::HttpStatus(code) => Self::HttpStatusError(*code),
            FetchError::Blocked(_) => Self::BlockedResponse,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageLoadTimeout => f.write_str("page load timeout"),
            Self::PageLoadFailed => f.write_str("page load failed"),
            Self::NoVariants => f.write_str("no variants"),
            Self::NoMatchingLanguage => f.write_str("no matching language"),
            Self::NetworkError => f.write_str("network error"),
            Self::HttpStatusError(code) => write!(f, "HTTP status {code}"),
            Self::BlockedResponse => f.write_str("blocked response"),
            Self::FilesystemError => f.write_str("filesystem error"),
        }
    }
}

/// Terminal state of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Downloaded { path: PathBuf, bytes: u64 },
    AlreadyPresent { path: PathBuf },
    Failed(FailureKind),
}

/// Per-outcome tally of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub discovered: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub page_load_timeout: usize,
    pub page_load_failed: usize,
    pub no_variants: usize,
    pub no_matching_language: usize,
    pub network_error: usize,
    pub http_status_error: usize,
    pub blocked_response: usize,
    pub filesystem_error: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Downloaded { .. } => &mut self.downloaded,
            Outcome::AlreadyPresent { .. } => &mut self.already_present,
            Outcome::Failed(kind) => match kind {
                FailureKind::PageLoadTimeout => &mut self.page_load_timeout,
                FailureKind::PageLoadFailed => &mut self.page_load_failed,
                FailureKind::NoVariants => &mut self.no_variants,
                FailureKind::NoMatchingLanguage => &mut self.no_matching_language,
                FailureKind::NetworkError => &mut self.network_error,
                FailureKind::HttpStatusError(_) => &mut self.http_status_error,
                FailureKind::BlockedResponse => &mut self.blocked_response,
                FailureKind::FilesystemError => &mut self.filesystem_error,
            },
        };
        *counter += 1;
    }

    pub fn failed(&self) -> usize {
        self.page_load_timeout
            + self.page_load_failed
            + self.no_variants
            + self.no_matching_language
            + self.network_error
            + self.http_status_error
            + self.blocked_response
            + self.filesystem_error
    }

    /// Number of documents that reached a terminal state.
    pub fn processed(&self) -> usize {
        self.downloaded + self.already_present + self.failed()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} discovered, {} downloaded, {} already present, {} failed \
             (timeout {}, load {}, no variants {}, no language {}, network {}, http {}, blocked {}, filesystem {})",
            self.discovered,
            self.downloaded,
            self.already_present,
            self.failed(),
            self.page_load_timeout,
            self.page_load_failed,
            self.no_variants,
            self.no_matching_language,
            self.network_error,
            self.http_status_error,
            self.blocked_response,
            self.filesystem_error,
        )
    }
}

/// What `collect_links` found on a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedLinks {
    pub references: Vec<DocumentReference>,
    /// Related-looking anchors, only filled when `references` is empty.
    pub similar: Vec<DocumentReference>,
}

/// Sequential orchestrator over a page session, a fetcher and the store.
pub struct Pipeline<S, F> {
    session: S,
    fetcher: F,
    store: DownloadStore,
    resolver: AssetResolver,
    selector: VariantSelector,
    base_url: Url,
    page_timeout: Duration,
}

impl<S: PageSession, F: Fetch> Pipeline<S, F> {
    pub fn new(config: &Config, session: S, fetcher: F) -> Self {
        Self {
            session,
            fetcher,
            store: DownloadStore::new(config.output_dir.clone()),
            resolver: AssetResolver::from_config(config),
            selector: VariantSelector::language(config.language.as_str()),
            base_url: config.base_url.clone(),
            page_timeout: config.page_timeout,
        }
    }

    /// Replaces the language predicate.
    pub fn with_selector(mut self, selector: VariantSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Hands the session back, e.g. to close a browser.
    pub fn into_session(self) -> S {
        self.session
    }

    /// Loads the listing, then processes every document found on it.
    ///
    /// # Errors
    ///
    /// Fails only before any document is processed: bad configuration, an
    /// output directory that cannot be created, or an unreadable listing.
    pub async fn run(&mut self, source: &ListingSource) -> Result<RunSummary> {
        self.resolver
            .check()
            .map_err(|e| Error::Usage(e.to_string()))?;

        let summary = match source {
            ListingSource::Links(path) => {
                let references = links_to_references(read_links(path).await?);
                self.store.ensure_dir().await?;
                self.process_references(&dedupe(references)).await
            }
            ListingSource::Url(_) | ListingSource::File(_) => {
                self.store.ensure_dir().await?;
                let listing = self.load_listing(source).await?;
                let saved_page = matches!(source, ListingSource::File(_));
                self.process_listing(&listing, saved_page).await
            }
        };
        info!(%summary, "run complete");
        Ok(summary)
    }

    /// Discovers document references without visiting them.
    ///
    /// When the marker matches nothing, the related-looking links are
    /// returned alongside for diagnosis.
    pub async fn collect_links(&mut self, source: &ListingSource) -> Result<CollectedLinks> {
        if let ListingSource::Links(path) = source {
            let references = dedupe(links_to_references(read_links(path).await?));
            return Ok(CollectedLinks {
                references,
                similar: Vec::new(),
            });
        }

        let listing = self.load_listing(source).await?;
        let references = self.discover(&listing);
        let similar = if references.is_empty() {
            self.log_similar_links(&listing)
        } else {
            Vec::new()
        };
        Ok(CollectedLinks {
            references,
            similar,
        })
    }

    /// Reads a live or saved listing page. A links file has no page to load.
    pub async fn load_listing(&mut self, source: &ListingSource) -> Result<RenderedContent> {
        info!(%source, "loading listing");
        let unavailable = |reason: String| Error::ListingUnavailable {
            source_name: source.to_string(),
            reason,
        };
        match source {
            ListingSource::Url(url) => self
                .session
                .navigate(url, self.page_timeout)
                .await
                .map_err(|e| unavailable(e.to_string())),
            ListingSource::File(path) => {
                let html = fs::read_to_string(path)
                    .await
                    .map_err(|e| unavailable(e.to_string()))?;
                Ok(RenderedContent::new(self.base_url.clone(), html))
            }
            ListingSource::Links(_) => Err(unavailable(
                "a links file is not a listing page".to_string(),
            )),
        }
    }

    /// Processes every document on an already loaded listing.
    ///
    /// Marker links are followed to their landing pages. On a `saved_page`
    /// with no marker links, download controls sitting on the page itself
    /// (a saved document-search page) are processed in place; a live
    /// listing without marker links yields an empty summary.
    pub async fn process_listing(
        &mut self,
        listing: &RenderedContent,
        saved_page: bool,
    ) -> RunSummary {
        let references = self.discover(listing);
        if !references.is_empty() {
            return self.process_references(&references).await;
        }

        let inline = if saved_page {
            self.resolver.inline_documents(listing).unwrap_or_else(|e| {
                warn!(error = %e, "could not read download controls on listing");
                Vec::new()
            })
        } else {
            Vec::new()
        };
        let mut summary = RunSummary::default();
        if inline.is_empty() {
            warn!(marker = self.resolver.marker(), "no documents found on listing");
            self.log_similar_links(listing);
            return summary;
        }

        info!(count = inline.len(), "no document links; using download controls on the saved page");
        summary.discovered = inline.len();
        let total = inline.len();
        for (index, document) in inline.iter().enumerate() {
            info!(document = index + 1, total, "processing inline document");
            let outcome = self.process_variants(&document.variants).await;
            log_outcome(&outcome);
            summary.record(&outcome);
        }
        summary
    }

    /// Follows each reference to its landing page, in order.
    pub async fn process_references(
        &mut self,
        references: &[DocumentReference],
    ) -> RunSummary {
        let mut summary = RunSummary {
            discovered: references.len(),
            ..RunSummary::default()
        };
        let total = references.len();
        for (index, reference) in references.iter().enumerate() {
            info!(
                document = index + 1,
                total,
                url = %reference.landing_url,
                "processing document"
            );
            let outcome = self.process_reference(reference).await;
            log_outcome(&outcome);
            summary.record(&outcome);
        }
        summary
    }

    /// Visits one landing page and downloads its selected variant.
    pub async fn process_reference(&mut self, reference: &DocumentReference) -> Outcome {
        let landing = match self
            .session
            .navigate(&reference.landing_url, self.page_timeout)
            .await
        {
            Ok(content) => content,
            Err(err @ PageError::Timeout { .. }) => {
                warn!(error = %err, "landing page timed out");
                return Outcome::Failed(FailureKind::PageLoadTimeout);
            }
            Err(err) => {
                warn!(error = %err, "landing page failed to load");
                return Outcome::Failed(FailureKind::PageLoadFailed);
            }
        };

        let variants = self.resolver.resolve_variants(&landing).unwrap_or_else(|e| {
            warn!(error = %e, "could not read variant control");
            Vec::new()
        });
        debug!(count = variants.len(), "variants resolved");
        if variants.is_empty() {
            return Outcome::Failed(FailureKind::NoVariants);
        }

        self.process_variants(&variants).await
    }

    /// Selects a variant and downloads it unless it is already on disk.
    pub async fn process_variants(&self, variants: &[AssetVariant]) -> Outcome {
        let Some(variant) = self.selector.select(variants) else {
            debug!(
                language = self.selector.description(),
                labels = ?variants.iter().map(|v| v.language_label.as_str()).collect::<Vec<_>>(),
                "no variant matches"
            );
            return Outcome::Failed(FailureKind::NoMatchingLanguage);
        };
        debug!(label = %variant.language_label, url = %variant.asset_url, "variant selected");
        self.download(&variant.asset_url).await
    }

    async fn download(&self, url: &Url) -> Outcome {
        let path = match self.store.path_for(url) {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "cannot name download");
                return Outcome::Failed(FailureKind::FilesystemError);
            }
        };

        if self.store.exists(&path).await {
            return Outcome::AlreadyPresent { path };
        }

        let body = match self.fetcher.fetch(url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(%url, error = %e, "fetch failed");
                return Outcome::Failed(FailureKind::from(&e));
            }
        };

        let mut bytes = 0u64;
        let saved = self
            .store
            .save(&path, body.inspect_ok(|chunk| bytes += chunk.len() as u64))
            .await;
        match saved {
            Ok(true) => Outcome::Downloaded { path, bytes },
            Ok(false) => Outcome::AlreadyPresent { path },
            Err(SaveError::Stream(e)) => {
                warn!(%url, error = %e, "transfer failed");
                Outcome::Failed(FailureKind::from(&e))
            }
            Err(SaveError::Store(e)) => {
                warn!(error = %e, "could not write download");
                Outcome::Failed(FailureKind::FilesystemError)
            }
        }
    }

    fn discover(&self, listing: &RenderedContent) -> Vec<DocumentReference> {
        let found = self.resolver.resolve(listing).unwrap_or_else(|e| {
            warn!(error = %e, "could not scan listing");
            Vec::new()
        });
        info!(count = found.len(), "document links found");
        dedupe(found)
    }

    fn log_similar_links(&self, listing: &RenderedContent) -> Vec<DocumentReference> {
        let similar = self
            .resolver
            .similar_links(listing, SIMILAR_LINK_LIMIT)
            .unwrap_or_default();
        if !similar.is_empty() {
            warn!(count = similar.len(), "links that look related");
            for link in &similar {
                warn!(text = %link.label, url = %link.landing_url, "similar link");
            }
        }
        similar
    }
}

/// Drops repeated landing URLs, keeping the first occurrence.
fn dedupe(references: Vec<DocumentReference>) -> Vec<DocumentReference> {
    let before = references.len();
    let mut seen = HashSet::new();
    let unique: Vec<_> = references
        .into_iter()
        .filter(|r| seen.insert(r.landing_url.clone()))
        .collect();
    if unique.len() < before {
        info!(dropped = before - unique.len(), "skipping duplicate document links");
    }
    unique
}

fn links_to_references(urls: Vec<Url>) -> Vec<DocumentReference> {
    urls.into_iter()
        .map(|landing_url| DocumentReference {
            label: landing_url.to_string(),
            landing_url,
        })
        .collect()
}

fn log_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Downloaded { path, bytes } => {
            info!(path = %path.display(), bytes, "downloaded");
        }
        Outcome::AlreadyPresent { path } => {
            info!(path = %path.display(), "already present, skipping");
        }
        Outcome::Failed(kind) => warn!(reason = %kind, "document failed"),
    }
}
