//! Authenticated HTTP plumbing shared by the inventory and wiki calls.

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use projectmap_shared::{PlatformConfig, ProjectMapError, Result};

/// API version used by every call except wiki creation.
pub(crate) const API_VERSION: &str = "5.1";

/// Wiki creation is still a preview API on the 5.1 surface.
pub(crate) const WIKI_CREATE_API_VERSION: &str = "5.1-preview.1";

/// User-Agent string for platform requests.
const USER_AGENT: &str = concat!("projectmap/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in an [`ProjectMapError::Api`] message.
const MAX_ERROR_BODY: usize = 512;

// ---------------------------------------------------------------------------
// DevOpsClient
// ---------------------------------------------------------------------------

/// HTTP client for one organization on the platform.
///
/// Cheap to clone: the underlying `reqwest::Client` is reference counted.
#[derive(Clone)]
pub struct DevOpsClient {
    base_url: Url,
    organization: String,
    username: String,
    pat: String,
    client: Client,
}

impl std::fmt::Debug for DevOpsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevOpsClient")
            .field("base_url", &self.base_url.as_str())
            .field("organization", &self.organization)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl DevOpsClient {
    /// Create a client from resolved platform settings.
    ///
    /// Certificate verification follows `accept_invalid_certs`; on-prem
    /// servers commonly run with self-signed certificates.
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProjectMapError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            organization: config.organization.clone(),
            username: config.username.clone(),
            pat: config.pat.clone(),
            client,
        })
    }

    /// Organization display name.
    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// Build an endpoint URL.
    ///
    /// `project` and `segments` are pushed as individual path segments, so
    /// names with spaces or reserved characters are percent-encoded.
    pub(crate) fn endpoint(
        &self,
        project: Option<&str>,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ProjectMapError::config(format!(
                    "organization url cannot carry a path: {}",
                    self.base_url
                ))
            })?;
            path.pop_if_empty();
            if let Some(project) = project {
                path.push(project);
            }
            path.extend(segments);
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Start an authenticated request.
    pub(crate) fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        self.client
            .request(method, url.clone())
            .basic_auth(&self.username, Some(&self.pat))
    }

    /// Send a request, mapping transport failures to [`ProjectMapError::Network`].
    pub(crate) async fn send(&self, method: &Method, url: &Url, request: RequestBuilder) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| ProjectMapError::Network(format!("{method} {url}: {e}")))
    }

    /// Send a request and require a 2xx status.
    pub(crate) async fn send_ok(&self, method: Method, url: &Url, request: RequestBuilder) -> Result<Response> {
        let response = self.send(&method, url, request).await?;
        if !response.status().is_success() {
            return Err(api_error(&method, url, response).await);
        }
        Ok(response)
    }

    /// GET a URL and decode its JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let request = self.request(Method::GET, url);
        let response = self.send_ok(Method::GET, url, request).await?;
        decode_json(url, response).await
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Convert a non-accepted response into an API error, keeping a bounded body excerpt.
pub(crate) async fn api_error(method: &Method, url: &Url, response: Response) -> ProjectMapError {
    let status = response.status().as_u16();
    let mut body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
        body.push_str("...");
    }
    ProjectMapError::Api {
        method: method.to_string(),
        url: url.to_string(),
        status,
        body,
    }
}

/// Decode a JSON response body.
///
/// The platform answers rejected credentials with `203` and an HTML sign-in
/// page, which surfaces here as a parse failure.
pub(crate) async fn decode_json<T: DeserializeOwned>(url: &Url, response: Response) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProjectMapError::Network(format!("{url}: failed to read body: {e}")))?;

    serde_json::from_str(&body).map_err(|e| {
        let hint = if status.as_u16() == 203 {
            " (HTTP 203 usually means the access token was rejected)"
        } else {
            ""
        };
        ProjectMapError::parse(format!("{url}: unexpected response shape: {e}{hint}"))
    })
}
