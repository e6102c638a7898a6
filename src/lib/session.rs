//! Editor state behind the command line front end.
//!
//! An [`EditorSession`] holds the Markdown being edited, the export basename
//! and the style table, and exposes the user actions: clear, insert the
//! example, count words and export.

use crate::config::example_markdown;
use crate::markdown;
use crate::pdf::{self, DEFAULT_BASENAME};
use crate::styling::StyleMatch;
use crate::MdpError;
use log::info;
use std::path::{Path, PathBuf};

/// Something that can show the user an export is in progress.
pub trait BusyIndicator {
    fn show(&mut self);
    fn hide(&mut self);
}

/// Reports progress through the log.
#[derive(Debug, Default)]
pub struct LogIndicator;

impl BusyIndicator for LogIndicator {
    fn show(&mut self) {
        info!("rendering...");
    }

    fn hide(&mut self) {
        info!("done");
    }
}

/// Shows an indicator for as long as it lives.
pub struct BusyGuard<'a> {
    indicator: &'a mut dyn BusyIndicator,
}

impl<'a> BusyGuard<'a> {
    pub fn new(indicator: &'a mut dyn BusyIndicator) -> Self {
        indicator.show();
        Self { indicator }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.indicator.hide();
    }
}

#[derive(Debug, Clone)]
pub struct EditorSession {
    pub content: String,
    pub filename: String,
    pub style: StyleMatch,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(StyleMatch::default())
    }
}

impl EditorSession {
    pub fn new(style: StyleMatch) -> Self {
        Self {
            content: String::new(),
            filename: DEFAULT_BASENAME.to_string(),
            style,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn clear(&mut self) {
        self.content.clear();
    }

    /// Appends the bundled example, separated from existing text by a blank line.
    pub fn insert_example(&mut self) {
        let Some(example) = example_markdown() else {
            return;
        };
        if !self.content.trim().is_empty() {
            if !self.content.ends_with('\n') {
                self.content.push('\n');
            }
            self.content.push('\n');
        }
        self.content.push_str(&example);
    }

    /// Whitespace-separated words in the raw content.
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    /// Renders the content and writes `{filename}.pdf` into `out_dir`.
    ///
    /// The indicator is shown for the duration of the call and hidden again
    /// whether the export succeeds or fails.
    pub fn export(
        &self,
        out_dir: &Path,
        indicator: &mut dyn BusyIndicator,
    ) -> Result<PathBuf, MdpError> {
        let _busy = BusyGuard::new(indicator);
        let document = markdown::parse(&self.content)?;
        let mut resolver = pdf::resolver_for(&self.style);
        let artifact = pdf::export(&document, &self.filename, &self.style, &mut resolver)?;
        artifact.save_in(out_dir)
    }
}
