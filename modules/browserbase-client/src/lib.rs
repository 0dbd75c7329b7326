pub mod error;
mod page;
mod pool;
mod session;

pub use error::{BrowserError, Result};
pub use page::{NavigateOptions, Page, WaitForSelectorOptions, WaitUntil, DEFAULT_VIEWPORT};
pub use pool::PagePool;
pub use session::Session;

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::info;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Residential-proxy geolocation hint for a session.
#[derive(Debug, Clone, Default)]
pub struct Geolocation {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Per-session options.
#[derive(Debug, Clone, Default)]
pub struct BrowserConfig {
    pub proxies: bool,
    pub geolocation: Option<Geolocation>,
}

/// A live session plus its primary page.
pub struct BrowserHandle {
    pub session: Session,
    pub page: Page,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    id: String,
    connect_url: String,
}

/// Client for the remote browser vendor's session API.
pub struct BrowserbaseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    project_id: String,
}

impl BrowserbaseClient {
    pub fn new(api_key: &str, project_id: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: "https://api.browserbase.com".to_string(),
            api_key: api_key.to_string(),
            project_id: project_id.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn create_session(&self, config: &BrowserConfig) -> Result<SessionInfo> {
        let mut body = json!({ "projectId": self.project_id });

        if let Some(geo) = &config.geolocation {
            body["proxies"] = json!([{
                "type": "browserbase",
                "geolocation": {
                    "city": geo.city,
                    "state": geo.state,
                    "country": geo.country,
                },
            }]);
        } else if config.proxies {
            body["proxies"] = json!(true);
        }

        let resp = self
            .http
            .post(format!("{}/v1/sessions", self.base_url))
            .header("X-BB-API-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }

    /// Create a session, connect the control channel, and open the primary
    /// page. The whole acquisition must finish within 30s.
    pub async fn acquire(&self, config: &BrowserConfig) -> Result<BrowserHandle> {
        let handle = tokio::time::timeout(ACQUIRE_TIMEOUT, async {
            let info = self.create_session(config).await?;
            info!(session_id = %info.id, "Browser session created");
            let session = Session::connect(info.id, &info.connect_url).await?;
            let page = session.create_page().await?;
            Ok::<BrowserHandle, BrowserError>(BrowserHandle { session, page })
        })
        .await
        .map_err(|_| {
            BrowserError::Unavailable(format!(
                "session acquisition timed out after {}s",
                ACQUIRE_TIMEOUT.as_secs()
            ))
        })??;

        Ok(handle)
    }
}
