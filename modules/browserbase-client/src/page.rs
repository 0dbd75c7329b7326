use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::{BrowserError, Result};
use crate::session::CdpTransport;

pub const DEFAULT_VIEWPORT: (u32, u32) = (1280, 800);

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// When navigation is considered done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
}

#[derive(Debug, Clone, Copy)]
pub struct NavigateOptions {
    pub wait_until: WaitUntil,
    pub timeout: Duration,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            wait_until: WaitUntil::Load,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaitForSelectorOptions {
    pub timeout: Duration,
    pub visible: bool,
}

impl Default for WaitForSelectorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            visible: false,
        }
    }
}

/// One page within a remote session. Pages are cheap; the pool hands them to
/// concurrent detail-page visits.
pub struct Page {
    transport: Arc<CdpTransport>,
    session_id: String,
    target_id: String,
    closed: AtomicBool,
}

impl Page {
    pub(crate) fn new(transport: Arc<CdpTransport>, session_id: String, target_id: String) -> Self {
        Self {
            transport,
            session_id,
            target_id,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) async fn init(&self) -> Result<()> {
        self.command("Page.enable", json!({})).await?;
        self.command("Runtime.enable", json!({})).await?;
        let (width, height) = DEFAULT_VIEWPORT;
        self.command(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
        )
        .await?;
        Ok(())
    }

    async fn command(&self, method: &str, params: Value) -> Result<Value> {
        self.transport
            .send(method, Some(&self.session_id), params)
            .await
    }

    /// Navigate and wait for the document to reach the requested readiness.
    pub async fn navigate(&self, url: &str, opts: NavigateOptions) -> Result<()> {
        let result = self
            .transport
            .send_with_timeout(
                "Page.navigate",
                Some(&self.session_id),
                json!({ "url": url }),
                opts.timeout,
            )
            .await
            .map_err(|e| match e {
                BrowserError::Timeout { .. } => e,
                other => BrowserError::Navigation(other.to_string()),
            })?;

        if let Some(reason) = result.get("errorText").and_then(Value::as_str) {
            if !reason.is_empty() {
                return Err(BrowserError::Navigation(format!("{url}: {reason}")));
            }
        }

        let target_state = match opts.wait_until {
            WaitUntil::Load => "complete",
            WaitUntil::DomContentLoaded => "interactive",
        };

        let deadline = tokio::time::Instant::now() + opts.timeout;
        loop {
            let state = self.evaluate("document.readyState").await?;
            let state = state.as_str().unwrap_or("");
            let done = match target_state {
                "interactive" => state == "interactive" || state == "complete",
                _ => state == "complete",
            };
            if done {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::timeout(format!("navigation to {url}"), opts.timeout));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    /// Poll for a selector at 100ms until it exists (and, optionally, is
    /// visible) or the timeout lapses.
    pub async fn wait_for_selector(&self, selector: &str, opts: WaitForSelectorOptions) -> Result<()> {
        let check = if opts.visible {
            format!(
                "(() => {{ const el = document.querySelector({sel}); \
                 return !!el && el.offsetParent !== null; }})()",
                sel = json!(selector)
            )
        } else {
            format!(
                "!!document.querySelector({sel})",
                sel = json!(selector)
            )
        };

        let deadline = tokio::time::Instant::now() + opts.timeout;
        loop {
            if self.evaluate(&check).await?.as_bool().unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::timeout(
                    format!("selector {selector}"),
                    opts.timeout,
                ));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    /// Run JavaScript in the page, awaiting any returned promise. The value
    /// must be JSON-serializable; page exceptions surface as
    /// [`BrowserError::Evaluation`].
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(Value::as_str)
                .or_else(|| details.get("text").and_then(Value::as_str))
                .unwrap_or("unknown page exception");
            return Err(BrowserError::Evaluation(message.to_string()));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Serialize a function source plus JSON-encoded args into an invocation
    /// expression and evaluate it.
    pub async fn evaluate_function(&self, fn_source: &str, args: &[Value]) -> Result<Value> {
        let encoded: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let expression = format!("({})({})", fn_source, encoded.join(", "));
        self.evaluate(&expression).await
    }

    /// Full page HTML.
    pub async fn content(&self) -> Result<String> {
        let html = self.evaluate("document.documentElement.outerHTML").await?;
        Ok(html.as_str().unwrap_or_default().to_string())
    }

    /// Document title.
    pub async fn title(&self) -> Result<String> {
        let title = self.evaluate("document.title").await?;
        Ok(title.as_str().unwrap_or_default().to_string())
    }

    /// Close the page. Idempotent; never fails.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self
            .transport
            .send_with_timeout(
                "Target.closeTarget",
                None,
                json!({ "targetId": self.target_id }),
                Duration::from_secs(5),
            )
            .await
        {
            debug!(error = %e, "Target.closeTarget failed during teardown");
        }
    }
}
