//! Wiki publication: ensure wiki → encode → upload → delete page → create page.
//!
//! Steps run strictly in order and are never retried. There is no rollback:
//! an attachment uploaded before a later failure stays in the wiki.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info, instrument};

use projectmap_devops::{DevOpsClient, PageDeletion, WikiCreation};
use projectmap_shared::{ProjectMapError, ProjectRef, Result};

use crate::naming::image_markdown;

/// Step names carried by [`ProjectMapError::Publish`].
pub mod step {
    pub const ENSURE_WIKI: &str = "ensure_wiki";
    pub const ENCODE: &str = "encode";
    pub const UPLOAD_ATTACHMENT: &str = "upload_attachment";
    pub const DELETE_EXISTING_PAGE: &str = "delete_existing_page";
    pub const CREATE_PAGE: &str = "create_page";
}

/// What a successful publication did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub wiki: WikiCreation,
    pub attachment_name: String,
    pub previous_page: PageDeletion,
    pub page_path: String,
    /// Size of the uploaded base64 payload.
    pub encoded_len: usize,
}

/// Read an image and base64-encode it for upload.
pub fn encode_image(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| ProjectMapError::io(path, e))?;
    Ok(STANDARD.encode(bytes))
}

/// Publishes a rendered diagram as a wiki page.
#[derive(Debug, Clone)]
pub struct WikiPublisher {
    client: DevOpsClient,
    page_path: String,
}

impl WikiPublisher {
    pub fn new(client: DevOpsClient, page_path: impl Into<String>) -> Self {
        Self {
            client,
            page_path: page_path.into(),
        }
    }

    /// Run the publication state machine for one project.
    #[instrument(skip_all, fields(project = %project.name, attachment = %attachment_name))]
    pub async fn publish(
        &self,
        project: &ProjectRef,
        image: &Path,
        attachment_name: &str,
    ) -> Result<PublishReport> {
        let name = project.name.as_str();

        let wiki = self
            .client
            .create_wiki(project)
            .await
            .map_err(|e| ProjectMapError::at_step(step::ENSURE_WIKI, e))?;
        debug!(outcome = ?wiki, "ensured wiki");

        let encoded = encode_image(image).map_err(|e| ProjectMapError::at_step(step::ENCODE, e))?;
        let encoded_len = encoded.len();
        debug!(bytes = encoded_len, "encoded image");

        self.client
            .upload_attachment(name, attachment_name, encoded)
            .await
            .map_err(|e| ProjectMapError::at_step(step::UPLOAD_ATTACHMENT, e))?;
        info!("attached image to wiki");

        let previous_page = self
            .client
            .delete_page(name, &self.page_path)
            .await
            .map_err(|e| ProjectMapError::at_step(step::DELETE_EXISTING_PAGE, e))?;
        debug!(outcome = ?previous_page, "removed previous page");

        self.client
            .put_page(name, &self.page_path, &image_markdown(attachment_name))
            .await
            .map_err(|e| ProjectMapError::at_step(step::CREATE_PAGE, e))?;
        info!(page = %self.page_path, "created wiki page");

        Ok(PublishReport {
            wiki,
            attachment_name: attachment_name.to_string(),
            previous_page,
            page_path: self.page_path.clone(),
            encoded_len,
        })
    }
}
