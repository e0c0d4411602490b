use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::browser::page::{PageSource, RenderedPage};
use crate::config::BrowserSettings;
use crate::error::{NotifierError, Result};

/// One launched Chromium process with a single page.
///
/// Dropping the session aborts the CDP handler task and removes the
/// temporary profile; `close` additionally shuts the browser down cleanly.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    profile_dir: PathBuf,
}

impl BrowserSession {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        // unique profile dir so concurrent runs never share a singleton lock
        let profile_dir = std::env::temp_dir().join(format!(
            "tender-notifier-{}-{}",
            std::process::id(),
            Uuid::new_v4()
        ));
        std::fs::create_dir_all(&profile_dir)
            .map_err(|e| NotifierError::BrowserError(format!("Failed to create profile dir: {}", e)))?;

        let browser_config = build_browser_config(settings, &profile_dir)?;

        info!("Launching browser (headless: {})", settings.headless);
        let (mut browser, mut handler) = match Browser::launch(browser_config).await {
            Ok(launched) => launched,
            Err(e) => {
                release_profile(async {}, &profile_dir).await;
                return Err(NotifierError::BrowserError(format!("Failed to launch browser: {}", e)).into());
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    // filter out common websocket deserialization errors
                    let error_msg = e.to_string();
                    if error_msg.contains("data did not match any variant")
                        || error_msg.contains("untagged enum Message")
                    {
                        debug!("Ignoring WebSocket deserialization error: {}", e);
                    } else {
                        warn!("Browser handler error: {}", e);
                    }
                }
            }
            debug!("Browser handler task ended");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                // the session does not exist yet, so tear down by hand
                release_profile(
                    async {
                        if let Err(e) = browser.close().await {
                            debug!("Failed to close browser after page error: {}", e);
                        }
                        let _ = browser.wait().await;
                        handler_task.abort();
                    },
                    &profile_dir,
                )
                .await;
                return Err(NotifierError::BrowserError(format!("Failed to create new page: {}", e)).into());
            }
        };

        Ok(Self {
            browser,
            page,
            handler_task,
            profile_dir,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            error!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Failed waiting for browser process to exit: {}", e);
        }
        info!("Browser session closed");
        // Drop finishes the teardown
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler_task.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.profile_dir) {
            debug!("Could not remove profile dir {}: {}", self.profile_dir.display(), e);
        }
    }
}

/// Awaits `shutdown` (which must stop every process using the profile)
/// and only then deletes `profile_dir`.
pub(crate) async fn release_profile<F>(shutdown: F, profile_dir: &Path)
where
    F: Future<Output = ()>,
{
    shutdown.await;
    if let Err(e) = std::fs::remove_dir_all(profile_dir) {
        debug!("Could not remove profile dir {}: {}", profile_dir.display(), e);
    }
}

pub(crate) fn build_browser_config(settings: &BrowserSettings, profile_dir: &Path) -> Result<BrowserConfig> {
    let (width, height) = settings.window_size;

    let mut builder = BrowserConfig::builder()
        .no_sandbox()
        .user_data_dir(profile_dir)
        .window_size(width, height)
        .args(launch_args(settings));

    if !settings.headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| NotifierError::BrowserError(format!("Failed to create browser config: {}", e)).into())
}

pub(crate) fn launch_args(settings: &BrowserSettings) -> Vec<String> {
    let (width, height) = settings.window_size;
    let mut args = vec![
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        format!("--window-size={},{}", width, height),
        "--no-first-run".to_string(),
        "--disable-extensions".to_string(),
        "--mute-audio".to_string(),
        "--log-level=3".to_string(), // Only fatal errors
    ];
    if !settings.headless {
        args.push("--start-maximized".to_string());
    }
    args
}

/// Script that clicks the first `<button>` whose visible text contains
/// `phrase` (case-insensitive) and reports whether it found one.
pub(crate) fn consent_click_script(phrase: &str) -> String {
    let phrase = serde_json::Value::String(phrase.to_lowercase()).to_string();
    format!(
        r#"(() => {{
    const phrase = {phrase};
    for (const button of document.querySelectorAll('button')) {{
        const text = (button.innerText || button.textContent || '').toLowerCase();
        if (text.includes(phrase)) {{
            button.click();
            return true;
        }}
    }}
    return false;
}})()"#
    )
}

/// Repeats `check` every `interval` until it yields a value or `limit` elapses.
pub(crate) async fn poll_until<T, F, Fut>(limit: Duration, interval: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    tokio::time::timeout(limit, async {
        loop {
            if let Some(value) = check().await {
                return value;
            }
            tokio::time::sleep(interval).await;
        }
    })
    .await
    .ok()
}

/// Headless Chromium implementation of [`PageSource`].
pub struct ChromePageSource {
    settings: BrowserSettings,
}

impl ChromePageSource {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    async fn render(&self, page: &Page, url: &str) -> Result<RenderedPage> {
        let settings = &self.settings;

        info!("Navigating to {}", url);
        page.goto(url)
            .await
            .map_err(|e| NotifierError::BrowserError(format!("Failed to navigate to {}: {}", url, e)))?;

        let ready = poll_until(settings.load_timeout, settings.poll_interval, || async move {
            let state = page.evaluate("document.readyState").await.ok()?;
            match state.into_value::<String>() {
                Ok(s) if s == "complete" => Some(()),
                _ => None,
            }
        })
        .await;
        if ready.is_none() {
            return Err(NotifierError::BrowserError(format!(
                "Page {} did not finish loading within {:?}",
                url, settings.load_timeout
            ))
            .into());
        }
        debug!("Document ready on {}", url);

        self.dismiss_consent(page).await;

        let selector = settings.result_selector.as_str();
        let found = poll_until(settings.results_timeout, settings.poll_interval, || async move {
            match page.find_elements(selector).await {
                Ok(elements) if !elements.is_empty() => Some(elements.len()),
                _ => None,
            }
        })
        .await;
        match found {
            Some(count) => info!("Found {} {} element(s)", count, selector),
            None => {
                return Err(NotifierError::BrowserError(format!(
                    "No {} elements appeared within {:?}",
                    selector, settings.results_timeout
                ))
                .into())
            }
        }

        let html = page
            .content()
            .await
            .map_err(|e| NotifierError::BrowserError(format!("Failed to get page content: {}", e)))?;

        // links resolve against where the browser ended up, not what was asked for
        let final_url = match page.url().await {
            Ok(Some(current)) if !current.is_empty() => current,
            _ => url.to_string(),
        };
        if final_url != url {
            debug!("{} was redirected to {}", url, final_url);
        }

        Ok(RenderedPage::from_html(final_url, html))
    }

    // a missing dialog is normal, so nothing here is an error
    async fn dismiss_consent(&self, page: &Page) {
        let script = consent_click_script(&self.settings.consent_phrase);
        let script = script.as_str();

        let clicked = poll_until(self.settings.consent_timeout, self.settings.poll_interval, || async move {
            let result = page.evaluate(script).await.ok()?;
            match result.into_value::<bool>() {
                Ok(true) => Some(()),
                _ => None,
            }
        })
        .await;

        if clicked.is_some() {
            info!("Cookie consent dialog dismissed");
        } else {
            info!("No cookie consent dialog found");
        }
    }
}

#[async_trait]
impl PageSource for ChromePageSource {
    async fn load(&self, url: &str) -> Result<RenderedPage> {
        let session = BrowserSession::launch(&self.settings).await?;
        let outcome = self.render(session.page(), url).await;
        session.close().await;
        outcome
    }
}
