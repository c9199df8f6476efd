//! # Docportal Fetch
//!
//! Downloads one language rendition of every document linked from a
//! document-portal listing page.
//!
//! The work is a short pipeline:
//!
//! 1. **Discovery** - find "Access document" links on the listing page
//!    ([`AssetResolver::resolve`]).
//! 2. **Variant resolution** - open each landing page and read the language
//!    options of its download dropdown ([`AssetResolver::resolve_variants`]).
//! 3. **Selection** - keep the first option whose label matches the target
//!    language ([`VariantSelector`]).
//! 4. **Download** - stream the asset to disk unless a file with the same
//!    name is already there ([`Fetch`], [`DownloadStore`]).
//!
//! Pages are loaded through a [`PageSession`]: a real browser over WebDriver
//! ([`WebDriverSession`]) or plain HTTP ([`HttpSession`]).
//!
//! ## Example
//!
//! ```no_run
//! use docportal_fetch::{Config, HttpFetcher, ListingSource, Pipeline, WebDriverSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let session = WebDriverSession::connect(&config).await?;
//!     let fetcher = HttpFetcher::new(&config)?;
//!
//!     let mut pipeline = Pipeline::new(&config, session, fetcher);
//!     let source = ListingSource::Url(config.listing_url.clone());
//!     let summary = pipeline.run(&source).await?;
//!     println!("{summary}");
//!
//!     pipeline.into_session().quit().await?;
//!     Ok(())
//! }
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod listing;
pub mod page;
pub mod pipeline;
pub mod resolver;
pub mod selector;
pub mod store;
pub mod telemetry;

pub use browser::WebDriverSession;
pub use config::Config;
pub use error::{Error, FetchError, PageError, Result, SaveError, StoreError};
pub use fetcher::{ByteStream, Fetch, HttpFetcher, classify_body};
pub use listing::{ListingSource, read_links};
pub use page::{Element, HttpSession, PageSession, RenderedContent};
pub use pipeline::{CollectedLinks, FailureKind, Outcome, Pipeline, RunSummary};
pub use resolver::{AssetResolver, AssetVariant, DocumentReference, InlineDocument};
pub use selector::VariantSelector;
pub use store::DownloadStore;
