//! Adapter around the external diagram compiler.
//!
//! The compiler (PlantUML by default) is run as a subprocess against a
//! `.wsd` source file and is expected to leave a same-stem `.png` beside it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use projectmap_shared::{ProjectMapError, RenderConfig, Result};

/// Extension of the image the compiler produces.
const IMAGE_EXTENSION: &str = "png";

/// Longest stderr excerpt kept in a render error.
const MAX_STDERR: usize = 2048;

/// Subprocess invocation settings for the diagram compiler.
#[derive(Debug, Clone)]
pub struct Renderer {
    /// Executable to run.
    pub command: String,
    /// Arguments placed before the document path.
    pub args: Vec<String>,
    /// Upper bound on one invocation.
    pub timeout: Duration,
}

impl From<&RenderConfig> for Renderer {
    fn from(config: &RenderConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Renderer {
    /// Path of the image the compiler writes for `source`.
    pub fn image_path(source: &Path) -> PathBuf {
        source.with_extension(IMAGE_EXTENSION)
    }

    /// Compile `source` and return the rendered image path.
    ///
    /// Blocks (asynchronously) until the compiler exits. Any stale image from
    /// a previous run is removed first so a silent compiler cannot leave an
    /// old picture in place.
    #[instrument(skip(self), fields(command = %self.command))]
    pub async fn render(&self, source: &Path) -> Result<PathBuf> {
        let image = Self::image_path(source);
        match std::fs::remove_file(&image) {
            Ok(()) => debug!(path = %image.display(), "removed stale image"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ProjectMapError::io(&image, e)),
        }

        let child = Command::new(&self.command)
            .args(&self.args)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProjectMapError::Render(format!(
                    "failed to spawn `{}`: {e}. Is it installed and on PATH?",
                    self.command
                ))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ProjectMapError::Render(format!(
                    "`{}` did not finish within {}s",
                    self.command,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| ProjectMapError::Render(format!("failed to wait for `{}`: {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(MAX_STDERR).collect();
            warn!(status = ?output.status.code(), "diagram compiler failed");
            return Err(ProjectMapError::Render(format!(
                "`{}` exited with status {}: {excerpt}",
                self.command,
                output.status.code().unwrap_or(-1)
            )));
        }

        if !image.is_file() {
            return Err(ProjectMapError::Render(format!(
                "`{}` succeeded but produced no image at {}",
                self.command,
                image.display()
            )));
        }

        info!(image = %image.display(), "rendered diagram");
        Ok(image)
    }
}
