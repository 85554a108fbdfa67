//! File and attachment naming.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local, TimeZone};

/// Filesystem- and URL-safe stem for a project name.
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; everything else becomes `-`.
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let stem = stem.trim_matches('.');
    if stem.is_empty() {
        "project".to_string()
    } else {
        stem.to_string()
    }
}

/// Markdown body of the published page: one image embed.
pub fn image_markdown(attachment: &str) -> String {
    format!("![{attachment}](/.attachments/{attachment})")
}

/// Produces unique attachment names for one run.
///
/// Names carry a millisecond timestamp plus a per-run sequence number, so
/// two uploads in the same minute (or millisecond) never collide.
#[derive(Debug, Default)]
pub struct AttachmentNamer {
    sequence: AtomicU64,
}

impl AttachmentNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next name for `project`, stamped with the local time.
    pub fn next_name(&self, project: &str) -> String {
        self.name_at(project, &Local::now())
    }

    /// Next name for `project`, stamped with `at`.
    pub fn name_at<Tz>(&self, project: &str, at: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{}-{seq}.png",
            file_stem(project),
            at.format("%Y%m%d-%H%M%S%3f")
        )
    }
}
