//! Browser-backed [`PageSession`] driven over WebDriver.
//!
//! Requires a WebDriver server (geckodriver by default) listening on the
//! configured URL, `http://127.0.0.1:4444` unless overridden.

use std::time::Duration;

use async_trait::async_trait;
use thirtyfour::{error::WebDriverError, prelude::*};
use tokio::time::{Instant, sleep, timeout as within};
use tracing::{debug, info};
use url::Url;

use crate::{
    config::Config,
    error::{Error, PageError},
    page::{PageSession, RenderedContent},
};

const READY_STATE_SCRIPT: &str = "return document.readyState;";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A live browser session.
///
/// Navigation waits for the `body` element and for `document.readyState` to
/// reach `"complete"`, then pauses for the settle delay so script-rendered
/// content has a chance to appear before the source is read.
pub struct WebDriverSession {
    driver: WebDriver,
    settle_delay: Duration,
}

impl WebDriverSession {
    /// Starts a Firefox session on the configured WebDriver server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Driver`] if the server cannot be reached or refuses
    /// the session.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let mut caps = DesiredCapabilities::firefox();
        if config.headless {
            caps.set_headless().map_err(driver_error)?;
        }
        info!(server = %config.webdriver_url, headless = config.headless, "starting browser session");
        let driver = WebDriver::new(config.webdriver_url.as_str(), caps)
            .await
            .map_err(driver_error)?;

        Ok(Self {
            driver,
            settle_delay: config.settle_delay,
        })
    }

    /// Closes the browser.
    pub async fn quit(self) -> Result<(), Error> {
        self.driver.quit().await.map_err(driver_error)?;
        info!("browser session closed");
        Ok(())
    }

    async fn wait_until_complete(&self, deadline: Instant) -> bool {
        while Instant::now() < deadline {
            if let Ok(ret) = self.driver.execute(READY_STATE_SCRIPT, vec![]).await
                && serde_json::from_value::<String>(ret.json().clone()).is_ok_and(|s| s == "complete")
            {
                return true;
            }
            sleep(POLL_INTERVAL).await;
        }
        false
    }
}

#[async_trait]
impl PageSession for WebDriverSession {
    async fn navigate(
        &mut self,
        url: &Url,
        timeout: Duration,
    ) -> Result<RenderedContent, PageError> {
        let timed_out = || PageError::Timeout {
            url: url.clone(),
            after: timeout,
        };
        let failed = |err: WebDriverError| PageError::Navigation {
            url: url.clone(),
            reason: err.to_string(),
        };

        debug!(%url, "navigating");
        let deadline = Instant::now() + timeout;
        // Slightly past our own bound so a slow page surfaces as a timeout.
        self.driver
            .set_page_load_timeout(timeout + POLL_INTERVAL)
            .await
            .map_err(failed)?;

        match within(timeout, self.driver.goto(url.as_str())).await {
            Ok(result) => result.map_err(failed)?,
            Err(_) => return Err(timed_out()),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        self.driver
            .query(By::Tag("body"))
            .wait(remaining, POLL_INTERVAL)
            .first()
            .await
            .map_err(|_| timed_out())?;

        if !self.wait_until_complete(deadline).await {
            return Err(timed_out());
        }

        sleep(self.settle_delay).await;

        let source = self.driver.source().await.map_err(failed)?;
        let current = self
            .driver
            .current_url()
            .await
            .ok()
            .and_then(|u| Url::parse(u.as_str()).ok())
            .unwrap_or_else(|| url.clone());

        Ok(RenderedContent::new(current, source))
    }
}

fn driver_error(err: WebDriverError) -> Error {
    Error::Driver(err.to_string())
}
