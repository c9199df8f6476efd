//! Run configuration.
//!
//! A [`Config`] is built once at process start (the binary fills it from
//! command-line arguments and `DOCFETCH_*` environment variables) and is
//! handed to the components that need it. Nothing reads the environment
//! after that.

use std::{path::PathBuf, time::Duration};

use url::Url;

/// The COP-29 event page, which lists "Access document" links.
pub const DEFAULT_LISTING_URL: &str = "https://unfccc.int/event/cop-29";

/// Origin used to absolutize links found in saved listing files.
pub const DEFAULT_BASE_URL: &str = "https://unfccc.int";

pub const DEFAULT_OUTPUT_DIR: &str = "downloads";

pub const DEFAULT_LANGUAGE: &str = "English";

/// Visible anchor text that marks a link to a document landing page.
pub const DEFAULT_MARKER: &str = "Access document";

/// The per-document download dropdown, one `option` per language.
pub const DEFAULT_VARIANT_CONTROL: &str = "select.small-download";

pub const DEFAULT_WEBDRIVER_URL: &str = "http://127.0.0.1:4444";

pub const DEFAULT_USER_AGENT: &str = concat!("docportal-fetch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct Config {
    pub listing_url: Url,
    pub base_url: Url,
    pub output_dir: PathBuf,
    /// Substring a variant's language label must contain to be selected.
    pub language: String,
    pub marker: String,
    pub variant_control: String,
    pub webdriver_url: String,
    pub headless: bool,
    /// Bound on each navigation, including the wait for rendered content.
    pub page_timeout: Duration,
    /// Extra pause after a browser page reports completion.
    pub settle_delay: Duration,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_url: Url::parse(DEFAULT_LISTING_URL).expect("valid default listing URL"),
            base_url: Url::parse(DEFAULT_BASE_URL).expect("valid default base URL"),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            language: DEFAULT_LANGUAGE.to_string(),
            marker: DEFAULT_MARKER.to_string(),
            variant_control: DEFAULT_VARIANT_CONTROL.to_string(),
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            headless: true,
            page_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(3),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
