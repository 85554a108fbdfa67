//! Core run orchestration and wiki publication for projectmap.
//!
//! This crate ties together inventory fetching, diagram building, rendering,
//! and wiki publication into the per-project pipeline and the
//! multi-project [`run`].

pub mod bootstrap;
pub mod naming;
pub mod pipeline;
pub mod publish;

pub use bootstrap::{Workspace, bootstrap, ensure_dir, log_file_path};
pub use naming::{AttachmentNamer, file_stem, image_markdown};
pub use pipeline::{
    ProgressReporter, ProjectOutcome, ProjectSummary, RunContext, RunReport, SilentProgress,
    preview_project, process_project, run, select_projects,
};
pub use publish::{PublishReport, WikiPublisher, encode_image};
