//! Diagram document assembly.

use std::path::Path;

use tracing::debug;

use projectmap_shared::{ProjectMapError, Repository, Result};

use crate::association::Associations;
use crate::sanitize::sanitize_name;

/// Closing sentinel of a WBS block.
pub const FOOTER: &str = "@endwbs";

const ORGANIZATION_MARKER: &str = "+ ORGANIZATION:";
const PROJECT_MARKER: &str = "++ PROJECT:";
const REPOSITORY_MARKER: &str = "+++ REPO:";
const PIPELINE_MARKER: &str = "++++ PIPELINE:";

// ---------------------------------------------------------------------------
// DiagramDocument
// ---------------------------------------------------------------------------

/// Ordered diagram source. The header block counts as a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramDocument {
    lines: Vec<String>,
    pipeline_lines: usize,
}

impl DiagramDocument {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn pipeline_line_count(&self) -> usize {
        self.pipeline_lines
    }

    /// Source text as handed to the compiler.
    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    /// Write the document to `path`, replacing any previous content.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_text()).map_err(|e| ProjectMapError::io(path, e))
    }
}

impl std::fmt::Display for DiagramDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

// ---------------------------------------------------------------------------
// DiagramBuilder
// ---------------------------------------------------------------------------

/// Builds a [`DiagramDocument`] from a fixed header and project facts.
#[derive(Debug, Clone)]
pub struct DiagramBuilder {
    header: String,
}

impl DiagramBuilder {
    pub fn new(header: impl Into<String>) -> Self {
        let header = header.into();
        Self {
            header: header.trim_end_matches(['\r', '\n']).to_string(),
        }
    }

    /// Emit header, organization, project, then each repository in the given
    /// order followed by its pipelines, and the footer last.
    pub fn build(
        &self,
        organization: &str,
        project: &str,
        repositories: &[Repository],
        associations: &Associations,
    ) -> DiagramDocument {
        let mut lines = Vec::with_capacity(4 + repositories.len() + associations.pipeline_count());
        let mut pipeline_lines = 0;

        lines.push(self.header.clone());
        lines.push(format!(
            "{ORGANIZATION_MARKER} {}",
            sanitize_name(&organization.replace('/', ""))
        ));
        lines.push(format!("{PROJECT_MARKER} {}", sanitize_name(project)));

        for repository in repositories {
            debug!(repository = %repository.name, "writing repository line");
            lines.push(format!("{REPOSITORY_MARKER} {}", sanitize_name(&repository.name)));

            for pipeline in associations.pipelines_for(&repository.name).unwrap_or_default() {
                lines.push(format!("{PIPELINE_MARKER} {}", sanitize_name(pipeline)));
                pipeline_lines += 1;
            }
        }

        lines.push(FOOTER.to_string());

        DiagramDocument {
            lines,
            pipeline_lines,
        }
    }
}
