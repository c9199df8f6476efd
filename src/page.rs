//! Rendered pages and the sessions that produce them.
//!
//! The pipeline only ever sees a [`PageSession`]: something that can be told
//! to go to a URL and hands back a [`RenderedContent`] once the page is ready
//! to be read. [`HttpSession`] fetches static HTML; the browser-backed
//! implementation lives in [`crate::browser`].

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::{
    config::Config,
    error::{Error, PageError},
};

/// Navigation capability the pipeline depends on.
#[async_trait]
pub trait PageSession: Send {
    /// Navigates to `url` and waits, at most `timeout`, for the page to be
    /// readable. Content is never returned before the completion signal.
    async fn navigate(&mut self, url: &Url, timeout: Duration)
    -> Result<RenderedContent, PageError>;
}

/// Owned snapshot of a page's markup together with the URL it was loaded
/// from, which relative links are resolved against.
#[derive(Debug, Clone)]
pub struct RenderedContent {
    url: Url,
    html: String,
}

impl RenderedContent {
    pub fn new(url: Url, html: impl Into<String>) -> Self {
        Self {
            url,
            html: html.into(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns every element matching the CSS selector, in document order.
    pub fn select(&self, css: &str) -> Result<Vec<Element>, PageError> {
        let selector = parse_selector(css)?;
        let document = Html::parse_document(&self.html);
        Ok(document.select(&selector).map(Element::from_ref).collect())
    }
}

/// An element detached from its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    text: String,
    attrs: BTreeMap<String, String>,
    html: String,
}

impl Element {
    fn from_ref(element: ElementRef<'_>) -> Self {
        Self {
            text: collapse_whitespace(&element.text().collect::<String>()),
            attrs: element
                .value()
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            html: element.html(),
        }
    }

    /// Visible text with runs of whitespace collapsed to single spaces.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Matches `css` against this element's subtree.
    pub fn select(&self, css: &str) -> Result<Vec<Element>, PageError> {
        let selector = parse_selector(css)?;
        let fragment = Html::parse_fragment(&self.html);
        Ok(fragment.select(&selector).map(Element::from_ref).collect())
    }
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector, PageError> {
    Selector::parse(css).map_err(|e| PageError::Selector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Loads pages with plain HTTP GETs. No script runs, so this only suits
/// pages whose links are present in the served markup.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: reqwest::Client,
}

impl HttpSession {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageSession for HttpSession {
    async fn navigate(
        &mut self,
        url: &Url,
        timeout: Duration,
    ) -> Result<RenderedContent, PageError> {
        debug!(%url, "GET page");
        let classify = |err: reqwest::Error| {
            if err.is_timeout() {
                PageError::Timeout {
                    url: url.clone(),
                    after: timeout,
                }
            } else {
                PageError::Navigation {
                    url: url.clone(),
                    reason: err.to_string(),
                }
            }
        };

        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PageError::Navigation {
                url: url.clone(),
                reason: format!("HTTP {status}"),
            });
        }

        let final_url = response.url().clone();
        let html = response.text().await.map_err(classify)?;
        Ok(RenderedContent::new(final_url, html))
    }
}
