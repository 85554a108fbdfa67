//! Wiki calls: create the project wiki, upload attachments, replace pages.

use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, instrument, warn};

use projectmap_shared::{ProjectRef, Result};

use crate::client::{API_VERSION, DevOpsClient, WIKI_CREATE_API_VERSION, api_error};

/// Name of the wiki resource created for a project.
pub fn wiki_name(project: &str) -> String {
    format!("{project}.wiki")
}

/// Outcome of [`DevOpsClient::create_wiki`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WikiCreation {
    Created,
    /// HTTP 409: a wiki with this name is already there.
    AlreadyExists,
}

/// Outcome of [`DevOpsClient::delete_page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDeletion {
    Deleted,
    /// HTTP 404: nothing to delete (first run).
    NotFound,
}

impl DevOpsClient {
    /// Create the `{project}.wiki` resource. A conflict counts as success.
    #[instrument(skip_all, fields(project = %project.name))]
    pub async fn create_wiki(&self, project: &ProjectRef) -> Result<WikiCreation> {
        let url = self.endpoint(
            Some(&project.name),
            &["_apis", "wiki", "wikis"],
            &[("api-version", WIKI_CREATE_API_VERSION)],
        )?;

        let mut body = serde_json::json!({
            "name": wiki_name(&project.name),
            "type": "projectWiki",
        });
        if !project.id.is_empty() {
            body["projectId"] = serde_json::Value::String(project.id.clone());
        }

        let request = self.request(Method::POST, &url).json(&body);
        let response = self.send(&Method::POST, &url, request).await?;
        let status = response.status();

        if status.as_u16() == 409 {
            warn!(wiki = %wiki_name(&project.name), "wiki already exists");
            return Ok(WikiCreation::AlreadyExists);
        }
        if !status.is_success() {
            return Err(api_error(&Method::POST, &url, response).await);
        }

        let text = response.text().await.unwrap_or_default();
        debug!(%status, body = %text, "wiki created");
        Ok(WikiCreation::Created)
    }

    /// Upload a base64-encoded attachment into the project wiki.
    #[instrument(skip(self, encoded), fields(bytes = encoded.len()))]
    pub async fn upload_attachment(&self, project: &str, name: &str, encoded: String) -> Result<()> {
        let wiki = wiki_name(project);
        let url = self.endpoint(
            Some(project),
            &["_apis", "wiki", "wikis", &wiki, "attachments"],
            &[("name", name), ("api-version", API_VERSION)],
        )?;

        let request = self
            .request(Method::PUT, &url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(encoded);
        let response = self.send_ok(Method::PUT, &url, request).await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        debug!(%status, body = %text, "attachment uploaded");
        Ok(())
    }

    /// Delete the wiki page at `page_path`. A missing page counts as success.
    #[instrument(skip(self))]
    pub async fn delete_page(&self, project: &str, page_path: &str) -> Result<PageDeletion> {
        let wiki = wiki_name(project);
        let url = self.endpoint(
            Some(project),
            &["_apis", "wiki", "wikis", &wiki, "pages"],
            &[("path", page_path), ("api-version", API_VERSION)],
        )?;

        let request = self.request(Method::DELETE, &url);
        let response = self.send(&Method::DELETE, &url, request).await?;
        let status = response.status();

        if status.as_u16() == 404 {
            debug!(%status, "no existing page to delete");
            return Ok(PageDeletion::NotFound);
        }
        if !status.is_success() {
            return Err(api_error(&Method::DELETE, &url, response).await);
        }

        let text = response.text().await.unwrap_or_default();
        debug!(%status, body = %text, "page deleted");
        Ok(PageDeletion::Deleted)
    }

    /// Create the wiki page at `page_path` with Markdown `content`.
    #[instrument(skip(self, content))]
    pub async fn put_page(&self, project: &str, page_path: &str, content: &str) -> Result<()> {
        let wiki = wiki_name(project);
        let url = self.endpoint(
            Some(project),
            &["_apis", "wiki", "wikis", &wiki, "pages"],
            &[("path", page_path), ("api-version", API_VERSION)],
        )?;

        let request = self
            .request(Method::PUT, &url)
            .header(ACCEPT, "text/plain")
            .json(&serde_json::json!({ "content": content }));
        let response = self.send_ok(Method::PUT, &url, request).await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        debug!(%status, body = %text, "page created");
        Ok(())
    }
}
