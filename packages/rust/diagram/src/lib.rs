//! Work-breakdown diagram model for a project.
//!
//! Turns a project's inventory into the PlantUML WBS source consumed by the
//! renderer:
//! - [`resolve_associations`] joins repositories and enabled pipelines
//! - [`sanitize_name`] neutralises names before they reach the markup
//! - [`DiagramBuilder`] emits the ordered [`DiagramDocument`]

mod association;
mod builder;
mod sanitize;
mod template;

pub use association::{Association, Associations, resolve_associations};
pub use builder::{DiagramBuilder, DiagramDocument, FOOTER};
pub use sanitize::sanitize_name;
pub use template::{DEFAULT_HEADER, load_header};
