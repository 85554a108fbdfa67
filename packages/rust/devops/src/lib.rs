//! REST client for the source-control platform.
//!
//! This crate provides:
//! - [`DevOpsClient`] — authenticated HTTP plumbing and URL building
//! - Inventory calls ([`DevOpsClient::list_projects`],
//!   [`DevOpsClient::fetch_project_inventory`], ...)
//! - Wiki calls ([`DevOpsClient::create_wiki`], [`DevOpsClient::put_page`], ...)

mod client;
mod inventory;
mod wiki;

pub use client::DevOpsClient;
pub use inventory::FetchOptions;
pub use wiki::{PageDeletion, WikiCreation, wiki_name};
