//! Startup checks: working folders and the header template.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, error};

use projectmap_diagram::load_header;
use projectmap_shared::{PathsConfig, ProjectMapError, Result};

/// Folders and assets verified before any platform call.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub models_dir: PathBuf,
    pub logs_dir: PathBuf,
    /// Header template content.
    pub header: String,
}

/// Create `dir` (and parents) if needed.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        ProjectMapError::bootstrap(format!("cannot create folder {}: {e}", dir.display()))
    })
}

/// Date-stamped log file for `date`, e.g. `logs/03142026.log`.
pub fn log_file_path(logs_dir: &Path, date: NaiveDate) -> PathBuf {
    logs_dir.join(format!("{}.log", date.format("%m%d%Y")))
}

/// Create the working folders and load the header template.
///
/// A missing template is fatal.
pub fn bootstrap(paths: &PathsConfig) -> Result<Workspace> {
    ensure_dir(&paths.logs_dir)?;
    ensure_dir(&paths.models_dir)?;

    if !paths.header_template.is_file() {
        let err = ProjectMapError::bootstrap(format!(
            "header template not found at {}",
            paths.header_template.display()
        ));
        error!(error = %err, "folder check failed");
        return Err(err);
    }

    let header = load_header(&paths.header_template).map_err(|e| {
        error!(error = %e, "header template unreadable");
        ProjectMapError::bootstrap(e.to_string())
    })?;

    debug!("folder check passed");
    Ok(Workspace {
        models_dir: paths.models_dir.clone(),
        logs_dir: paths.logs_dir.clone(),
        header,
    })
}
