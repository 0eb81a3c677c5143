//! Authenticated portal session.
//!
//! Signing in happens outside this crate (a browser drives the identity
//! provider). What the pipeline needs from the resulting session is reduced
//! to the [`PortalSession`] trait: fetch a path with the session's cookies,
//! and read the session-scoped CSRF token, user, and current classes.
//!
//! [`HttpSession`] implements it over `reqwest` with a session cookie taken
//! from the configuration. Portal bootstrap values come from the
//! `PortalData = {...};` assignment embedded in the portal page.
//!
//! Every response's final URL (after redirects) must still be on the portal
//! origin. An expired session bounces to the identity provider, which is
//! reported as [`SyncError::SessionOrigin`].

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::config::PortalConfig;
use crate::error::{SyncError, SyncResult};
use crate::models::SessionUser;

/// A request issued through the authenticated session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Path (with optional query) relative to the portal origin.
    pub path: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl SessionRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }

    /// A form-encoded POST.
    pub fn post_form(path: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        Self {
            path: path.into(),
            method: Method::POST,
            headers: vec![(
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded; charset=UTF-8".to_string(),
            )],
            body: Some(body),
        }
    }
}

/// Capabilities the pipeline needs from a signed-in portal session.
#[async_trait]
pub trait PortalSession: Send + Sync {
    /// Issue a request and return the response body.
    async fn fetch(&self, request: SessionRequest) -> SyncResult<String>;

    /// The session's CSRF token.
    async fn session_token(&self) -> SyncResult<String>;

    /// The signed-in user.
    async fn session_user(&self) -> SyncResult<SessionUser>;

    /// Identifiers of the classes the user is currently enrolled in.
    async fn current_classes(&self) -> SyncResult<Vec<u64>>;
}

/// Fetch the week calendar fragment for the session's classes.
///
/// `start_date` selects the week; without it the portal returns the
/// current week.
pub async fn fetch_week_fragment(
    session: &dyn PortalSession,
    start_date: Option<NaiveDate>,
) -> SyncResult<String> {
    let user = session.session_user().await?;
    let token = session.session_token().await?;
    let classes = session.current_classes().await?;
    info!(login = %user.login, classes = classes.len(), "fetching week calendar");

    let request = week_request(&user.login, &classes, &token, start_date);
    let fragment = session.fetch(request).await?;
    debug!(bytes = fragment.len(), "week fragment received");
    Ok(fragment)
}

fn week_request(
    login: &str,
    classes: &[u64],
    token: &str,
    start_date: Option<NaiveDate>,
) -> SessionRequest {
    let ids = classes
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let start = start_date.map(|d| d.format("%Y-%m-%d 00:00:00").to_string());

    let mut fields = vec![("id", ids.as_str()), ("csrf_token", token)];
    if let Some(ref start) = start {
        fields.push(("start_date", start.as_str()));
    }
    SessionRequest::post_form(format!("/u/{}/portal/portlet_calendar_week", login), &fields)
}

// ============ HTTP session ============

/// Bootstrap data the portal page assigns to `PortalData`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortalData {
    csrf_token: Option<String>,
    user: Option<SessionUser>,
    #[serde(default)]
    current_classes: Vec<u64>,
}

static PORTAL_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)PortalData\s*=\s*(\{.*?\})\s*;\s*(?:\n|</script>)")
        .unwrap_or_else(|e| panic!("invalid PortalData pattern: {e}"))
});

/// A portal session backed by a plain HTTP client and a session cookie.
pub struct HttpSession {
    client: reqwest::Client,
    origin: Url,
    cookie: String,
    portal_data: OnceCell<PortalData>,
}

impl HttpSession {
    pub fn new(config: &PortalConfig) -> SyncResult<Self> {
        Self::with_client(config, client_builder().build()?)
    }

    /// Use a preconfigured client (proxy, TLS or timeout settings).
    pub fn with_client(config: &PortalConfig, client: reqwest::Client) -> SyncResult<Self> {
        let origin = Url::parse(&config.base_url)
            .map_err(|e| SyncError::Config(format!("invalid portal base url: {}", e)))?;
        Ok(Self {
            client,
            origin,
            cookie: config.session_cookie.clone(),
            portal_data: OnceCell::new(),
        })
    }

    async fn portal_data(&self) -> SyncResult<&PortalData> {
        self.portal_data
            .get_or_try_init(|| async {
                let page = self.fetch(SessionRequest::get("/")).await?;
                parse_portal_data(&page)
            })
            .await
    }
}

#[async_trait]
impl PortalSession for HttpSession {
    async fn fetch(&self, request: SessionRequest) -> SyncResult<String> {
        let url = self
            .origin
            .join(&request.path)
            .map_err(|e| SyncError::Fetch(format!("invalid path {:?}: {}", request.path, e)))?;
        if !same_origin(&url, &self.origin) {
            return Err(SyncError::SessionOrigin {
                expected: self.origin.origin().ascii_serialization(),
                actual: url.origin().ascii_serialization(),
            });
        }

        debug!(method = %request.method, %url, "session request");
        let mut builder = self
            .client
            .request(request.method.clone(), url.clone())
            .header("Cookie", &self.cookie);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| SyncError::Fetch(format!("{} {}: {}", request.method, url, e)))?;

        if !same_origin(resp.url(), &self.origin) {
            return Err(SyncError::SessionOrigin {
                expected: self.origin.origin().ascii_serialization(),
                actual: resp.url().origin().ascii_serialization(),
            });
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Fetch(format!(
                "{} {} returned HTTP {}: {}",
                request.method,
                url,
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        Ok(resp.text().await?)
    }

    async fn session_token(&self) -> SyncResult<String> {
        self.portal_data()
            .await?
            .csrf_token
            .clone()
            .ok_or_else(|| SyncError::Parse("PortalData has no csrfToken".to_string()))
    }

    async fn session_user(&self) -> SyncResult<SessionUser> {
        self.portal_data()
            .await?
            .user
            .clone()
            .ok_or_else(|| SyncError::Parse("PortalData has no user".to_string()))
    }

    async fn current_classes(&self) -> SyncResult<Vec<u64>> {
        Ok(self.portal_data().await?.current_classes.clone())
    }
}

fn client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder().user_agent(concat!("learning-sync/", env!("CARGO_PKG_VERSION")))
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

fn parse_portal_data(page: &str) -> SyncResult<PortalData> {
    let json = PORTAL_DATA
        .captures(page)
        .and_then(|c| c.get(1))
        .ok_or_else(|| {
            SyncError::Parse(
                "PortalData missing from portal page; the session may not be on the portal"
                    .to_string(),
            )
        })?;
    serde_json::from_str(json.as_str())
        .map_err(|e| SyncError::Parse(format!("PortalData is not valid JSON: {}", e)))
}
