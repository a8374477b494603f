//! Browser session provisioning and lifecycle.
//!
//! One [`Session`] per acquisition: created, used, and torn down inside a
//! single operation; never shared across operations. Provisioning itself is
//! a two-level fallback (stealth posture first, then a portable minimal
//! configuration), not a retry loop. The concurrent-session cap is a
//! semaphore whose permit lives inside the session, so capacity frees
//! exactly when the session is released.

pub mod stealth;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::settle::ScrollSurface;
use crate::snapshot::PageSnapshot;

/// Find the Chromium binary.
pub fn find_chromium(configured: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(p) = configured {
        if p.exists() {
            return Some(p.clone());
        }
    }

    if let Ok(p) = std::env::var("SCOUT_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let candidates = [
            home.join(".scout/chromium/chrome-linux64/chrome"),
            home.join(".scout/chromium/chrome"),
        ];
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    None
}

/// Produces configured, stealth-postured sessions.
pub struct SessionProvisioner {
    config: Arc<EngineConfig>,
    limiter: Arc<Semaphore>,
}

impl SessionProvisioner {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_sessions));
        Self { config, limiter }
    }

    /// Acquire a live session, blocking until a concurrency slot frees.
    ///
    /// Tries the stealth configuration first; if the engine fails to launch
    /// (binary missing, resource exhaustion), falls back once to a portable
    /// minimal configuration before surfacing `SessionInit`.
    pub async fn acquire(&self) -> Result<Session, EngineError> {
        let permit = Arc::clone(&self.limiter)
            .acquire_owned()
            .await
            .map_err(|e| EngineError::SessionInit(format!("session limiter closed: {e}")))?;

        let profile = stealth::StealthProfile::randomized();

        let stealth_err = match self.launch(&profile, true).await {
            Ok(parts) => return Ok(Session::assemble(parts, profile, permit, &self.config)),
            Err(e) => e,
        };
        warn!("stealth provisioning failed, trying portable configuration: {stealth_err:#}");

        match self.launch(&profile, false).await {
            Ok(parts) => Ok(Session::assemble(parts, profile, permit, &self.config)),
            Err(portable_err) => Err(EngineError::SessionInit(format!(
                "stealth: {stealth_err:#}; portable: {portable_err:#}"
            ))),
        }
    }

    async fn launch(
        &self,
        profile: &stealth::StealthProfile,
        stealthy: bool,
    ) -> Result<(Browser, Page, JoinHandle<()>)> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage");

        if let Some(path) = find_chromium(self.config.chromium_path.as_ref()) {
            builder = builder.chrome_executable(path);
        }

        if stealthy {
            builder = builder
                .window_size(profile.viewport.0, profile.viewport.1)
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-extensions")
                .arg("--disable-background-networking")
                .arg(format!("--user-agent={}", profile.user_agent));
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create page")?;

        if stealthy {
            let script = AddScriptToEvaluateOnNewDocumentParams::builder()
                .source(stealth::INIT_SCRIPT)
                .build()
                .map_err(|e| anyhow!("bad init script params: {e}"))?;
            page.execute(script)
                .await
                .context("failed to install stealth init script")?;
        }

        info!(
            "session provisioned (stealth={stealthy}, viewport={}x{})",
            profile.viewport.0, profile.viewport.1
        );
        Ok((browser, page, handler_task))
    }
}

/// Single-shot latch guarding session teardown. `begin` answers true
/// exactly once; later calls, including from `Drop`, see it spent.
#[derive(Debug, Default)]
struct ReleaseLatch {
    released: bool,
}

impl ReleaseLatch {
    fn begin(&mut self) -> bool {
        !std::mem::replace(&mut self.released, true)
    }

    fn spent(&self) -> bool {
        self.released
    }
}

/// An owned handle to one live browser instance.
///
/// Invariant: no session outlives the operation that created it. Callers
/// must run [`Session::release`] before returning; `Drop` only covers the
/// panic path with a best-effort abort.
pub struct Session {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    _permit: OwnedSemaphorePermit,
    pub profile: stealth::StealthProfile,
    nav_timeout_ms: u64,
    latch: ReleaseLatch,
}

impl Session {
    fn assemble(
        (browser, page, handler_task): (Browser, Page, JoinHandle<()>),
        profile: stealth::StealthProfile,
        permit: OwnedSemaphorePermit,
        config: &EngineConfig,
    ) -> Self {
        Self {
            browser,
            page,
            handler_task,
            _permit: permit,
            profile,
            nav_timeout_ms: config.nav_timeout_ms,
            latch: ReleaseLatch::default(),
        }
    }

    /// Navigate with the session's timeout bound. An in-flight navigation
    /// fails with a timeout error rather than hanging the worker.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.navigate_with_timeout(url, self.nav_timeout_ms).await
    }

    pub async fn navigate_with_timeout(&self, url: &str, timeout_ms: u64) -> Result<()> {
        let result = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url.to_string()),
        )
        .await;

        match result {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    /// Capture an immutable snapshot of the current page state.
    pub async fn snapshot(&self) -> Result<PageSnapshot> {
        let final_url = self
            .page
            .url()
            .await
            .unwrap_or_default()
            .map(|u| u.to_string())
            .unwrap_or_default();

        let title = self
            .evaluate_string("document.title")
            .await
            .unwrap_or_default();

        let raw_markup = self
            .evaluate_string("document.documentElement.outerHTML")
            .await
            .context("failed to read page markup")?;

        let visible_text = crate::extract::visible_text(&raw_markup);

        Ok(PageSnapshot {
            final_url,
            title,
            raw_markup,
            visible_text,
        })
    }

    async fn evaluate_string(&self, script: &str) -> Result<String> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }

    /// Tear down the browser. Idempotent and infallible: double release and
    /// release after a crash are both no-ops.
    pub async fn release(&mut self) {
        if !self.latch.begin() {
            return;
        }

        if let Err(e) = self.browser.close().await {
            debug!("browser close failed (already gone?): {e}");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        debug!("session released");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.latch.spent() {
            // Panic/early-drop path. The browser process is reaped by
            // chromiumoxide's own drop; the handler task must not linger.
            self.handler_task.abort();
            warn!("session dropped without release");
        }
    }
}

#[async_trait]
impl ScrollSurface for Session {
    async fn content_height(&self) -> Result<u64> {
        let value: serde_json::Value = self
            .page
            .evaluate("document.body ? document.body.scrollHeight : 0")
            .await
            .context("failed to read scroll height")?
            .into_value()
            .map_err(|e| anyhow!("scroll height was not a number: {e:?}"))?;
        Ok(value.as_u64().unwrap_or(0))
    }

    async fn scroll_to(&self, y: u64) -> Result<()> {
        self.page
            .evaluate(format!("window.scrollTo(0, {y})"))
            .await
            .context("scroll failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_acquire_snapshot_release_is_idempotent() {
        let config = Arc::new(EngineConfig::default());
        let provisioner = SessionProvisioner::new(config);

        let mut session = provisioner.acquire().await.expect("provisioning failed");
        session
            .navigate("data:text/html,<title>T</title><h1>Hello</h1>")
            .await
            .expect("navigation failed");

        let snapshot = session.snapshot().await.expect("snapshot failed");
        assert!(snapshot.raw_markup.contains("<h1>Hello</h1>"));
        assert_eq!(snapshot.title, "T");

        // Double release must be a no-op, not a fault.
        session.release().await;
        session.release().await;
    }

    #[test]
    fn test_release_latch_fires_teardown_exactly_once() {
        let mut latch = ReleaseLatch::default();
        assert!(!latch.spent());
        assert!(latch.begin());
        // Second release is a no-op; teardown must not run again.
        assert!(!latch.begin());
        assert!(!latch.begin());
        assert!(latch.spent());
    }

    #[test]
    fn test_find_chromium_honors_configured_path_only_if_present() {
        let missing = PathBuf::from("/definitely/not/here/chrome");
        // Must not return the configured path when it does not exist.
        if let Some(found) = find_chromium(Some(&missing)) {
            assert_ne!(found, missing);
        }
    }
}
