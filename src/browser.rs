use anyhow::{anyhow, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::wait::poll_until;

/// The page-rendering capability the scraper depends on.
///
/// Element lookup and text extraction happen on the rendered DOM snapshot
/// returned by [`PageRenderer::content`], see `extractor`.
pub trait PageRenderer {
    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Whether the current page contains at least one element matching `selector`.
    fn has_element(&self, selector: &str) -> Result<bool>;

    /// Serialized DOM of the current page, after scripts have run.
    fn content(&self) -> Result<String>;

    fn close(&mut self) -> Result<()>;

    /// Waits until `selector` matches something, polling every `interval`.
    async fn wait_for(&self, selector: &str, timeout: Duration, interval: Duration) -> Result<bool> {
        poll_until(timeout, interval, || self.has_element(selector)).await
    }
}

#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub headless: bool,
    /// Browser binary; `None` lets headless_chrome locate one.
    pub chrome_path: Option<PathBuf>,
}

/// Headless Chrome driven over the DevTools protocol.
pub struct ChromeRenderer {
    // Field order matters: the tab must go before the browser process.
    tab: Option<Arc<Tab>>,
    browser: Option<Browser>,
}

impl ChromeRenderer {
    pub fn launch(settings: &LaunchSettings) -> Result<Self> {
        let args = vec![
            std::ffi::OsStr::new("--no-sandbox"),
            std::ffi::OsStr::new("--disable-dev-shm-usage"),
            std::ffi::OsStr::new("--disable-infobars"),
        ];

        debug!(headless = settings.headless, path = ?settings.chrome_path, "launching chrome");
        let browser = Browser::new(LaunchOptions {
            headless: settings.headless,
            window_size: Some((1920, 1080)),
            path: settings.chrome_path.clone(),
            args,
            ..Default::default()
        })?;
        let tab = browser.new_tab()?;

        Ok(Self {
            tab: Some(tab),
            browser: Some(browser),
        })
    }

    fn tab(&self) -> Result<&Arc<Tab>> {
        self.tab.as_ref().ok_or_else(|| anyhow!("browser session already closed"))
    }
}

impl PageRenderer for ChromeRenderer {
    fn navigate(&mut self, url: &str) -> Result<()> {
        let tab = self.tab()?;
        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;
        Ok(())
    }

    fn has_element(&self, selector: &str) -> Result<bool> {
        let script = format!("document.querySelector({}) !== null", serde_json::to_string(selector)?);
        let found = self
            .tab()?
            .evaluate(&script, false)?
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Ok(found)
    }

    fn content(&self) -> Result<String> {
        self.tab()?.get_content()
    }

    fn close(&mut self) -> Result<()> {
        let tab = self.tab.take();
        let browser = self.browser.take();
        let closed = match tab {
            Some(tab) => tab.close(false).map(|_| ()),
            None => Ok(()),
        };
        // Dropping the handle kills the chrome process.
        drop(browser);
        closed
    }
}

/// Owns a renderer for the length of one run and guarantees it is closed.
///
/// Call [`BrowserSession::close`] on the normal path to see close errors;
/// any other exit (early return, panic) closes the renderer from `Drop`.
pub struct BrowserSession<R: PageRenderer> {
    renderer: R,
    closed: bool,
}

impl<R: PageRenderer> BrowserSession<R> {
    pub fn open<F>(open: F) -> Result<Self>
    where
        F: FnOnce() -> Result<R>,
    {
        Ok(Self {
            renderer: open()?,
            closed: false,
        })
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.renderer.close()
    }
}

impl<R: PageRenderer> Drop for BrowserSession<R> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.renderer.close() {
                warn!("failed to close browser session: {:#}", e);
            }
        }
    }
}
