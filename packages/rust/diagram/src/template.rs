//! Diagram header template.

use std::path::Path;

use projectmap_shared::{ProjectMapError, Result};

/// Header written by `config init` when no template exists yet.
pub const DEFAULT_HEADER: &str = "@startwbs
<style>
wbsDiagram {
  FontName Arial
  node {
    Padding 6
    RoundCorner 8
  }
  :depth(1) {
    BackgroundColor #C8E6C9
  }
  :depth(2) {
    BackgroundColor #BBDEFB
  }
  :depth(3) {
    BackgroundColor #FFF9C4
  }
}
</style>
";

/// Read the header fragment verbatim (trailing newlines trimmed).
pub fn load_header(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| ProjectMapError::io(path, e))?;
    let header = content.trim_end_matches(['\r', '\n']).to_string();
    if header.trim().is_empty() {
        return Err(ProjectMapError::validation(format!(
            "header template {} is empty",
            path.display()
        )));
    }
    if !header.trim_start().starts_with("@startwbs") {
        tracing::warn!(path = %path.display(), "header template does not start with @startwbs");
    }
    Ok(header)
}
