//! Export orchestration.
//!
//! [`export`] runs one complete layout pass over a fresh [`PdfSurface`],
//! fills in the document metadata and serializes the result. Nothing touches
//! the filesystem until the caller saves the returned [`Artifact`], so a
//! failed export never leaves a partial file behind.

use crate::document::Document;
use crate::latex::{default_typesetter, Typesetter};
use crate::math::MathResolver;
use crate::paginate::{Paginator, RenderReport};
use crate::styling::StyleMatch;
use crate::surface::Surface;
use crate::writer::{PdfMetadata, PdfSurface};
use crate::MdpError;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Basename used when none is given.
pub const DEFAULT_BASENAME: &str = "documento";

/// A finished PDF held in memory.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// `{basename}.pdf`
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub report: RenderReport,
}

impl Artifact {
    /// Writes the PDF into `dir` and returns the full path.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf, MdpError> {
        if !dir.as_os_str().is_empty() && !dir.is_dir() {
            return Err(MdpError::IoError {
                message: "Output directory does not exist".to_string(),
                path: dir.display().to_string(),
                suggestion: format!("Create the directory first: mkdir -p {}", dir.display()),
            });
        }
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes).map_err(|e| {
            let message = e.to_string();
            MdpError::PdfError {
                path: Some(path.display().to_string()),
                suggestion: Some(if e.kind() == std::io::ErrorKind::PermissionDenied {
                    "Check that you have write permissions for this location".to_string()
                } else {
                    "Try a different output path or check available disk space".to_string()
                }),
                message,
            }
        })?;
        info!("wrote {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// Normalizes a user supplied file name into a basename without extension.
///
/// ```
/// use mathdown2pdf::pdf::basename;
///
/// assert_eq!(basename("notes.pdf"), "notes");
/// assert_eq!(basename("  "), "documento");
/// assert_eq!(basename("a/b"), "a_b");
/// ```
pub fn basename(filename: &str) -> String {
    let trimmed = filename.trim();
    let stem = if trimmed.to_lowercase().ends_with(".pdf") {
        &trimmed[..trimmed.len() - 4]
    } else {
        trimmed
    };
    let cleaned: String = stem
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    if cleaned.trim().is_empty() {
        DEFAULT_BASENAME.to_string()
    } else {
        cleaned
    }
}

/// A resolver configured from the `[math]` section, backed by the compiled-in typesetter.
pub fn resolver_for(style: &StyleMatch) -> MathResolver {
    let typesetter = default_typesetter();
    if !typesetter.is_available() {
        debug!("no LaTeX engine in this build, equations fall back to text");
    }
    MathResolver::new(typesetter)
        .with_oversample(style.math.oversample)
        .with_cache(style.math.cache)
}

/// Lays `document` out on any surface.
pub fn render_to_surface(
    document: &Document,
    surface: &mut dyn Surface,
    style: &StyleMatch,
    resolver: &mut MathResolver,
) -> Result<RenderReport, MdpError> {
    Paginator::new(surface, style, resolver)
        .run(document)
        .map_err(|failure| MdpError::RenderError {
            message: failure.to_string(),
            block: Some(failure.index),
            suggestion: Some(
                "Set `strict = false` under [render] to skip elements that cannot be drawn"
                    .to_string(),
            ),
        })
}

/// Renders `document` to an in-memory PDF named after `filename`.
pub fn export(
    document: &Document,
    filename: &str,
    style: &StyleMatch,
    resolver: &mut MathResolver,
) -> Result<Artifact, MdpError> {
    let name = basename(filename);
    info!(
        "exporting {}.pdf: {} blocks, {} equations",
        name,
        document.blocks.len(),
        document.equation_count()
    );

    let mut surface = PdfSurface::new(style.page);
    let report = render_to_surface(document, &mut surface, style, resolver)?;
    surface.set_metadata(PdfMetadata {
        title: name.clone(),
        author: style.metadata.author.clone(),
        creator: style.metadata.creator.clone(),
    });
    let bytes = surface.to_bytes();

    info!(
        "rendered {} page(s), {} equation fallback(s), {} skipped block(s)",
        report.pages, report.equation_failures, report.skipped
    );
    Ok(Artifact {
        file_name: format!("{}.pdf", name),
        bytes,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Node;
    use crate::latex::UnavailableTypesetter;
    use lopdf::Document as PdfDocument;

    fn resolver() -> MathResolver {
        MathResolver::new(Box::new(UnavailableTypesetter))
    }

    fn sample() -> Document {
        Document::new(vec![
            Node::Heading {
                level: 1,
                children: vec![Node::Text("Report".into())],
            },
            Node::Paragraph(vec![Node::Text("Body text.".into())]),
        ])
    }

    #[test]
    fn test_export_produces_pdf_bytes() {
        let artifact = export(&sample(), "report", &StyleMatch::default(), &mut resolver()).unwrap();
        assert_eq!(artifact.file_name, "report.pdf");
        assert!(artifact.bytes.starts_with(b"%PDF-"));
        assert_eq!(artifact.report.blocks.len(), 2);
        let doc = PdfDocument::load_mem(&artifact.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_export_sets_title_and_creator() {
        let artifact = export(&sample(), "", &StyleMatch::default(), &mut resolver()).unwrap();
        assert_eq!(artifact.file_name, "documento.pdf");
        let doc = PdfDocument::load_mem(&artifact.bytes).unwrap();
        let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
        let info = doc.get_dictionary(info_id).unwrap();
        let value = |key: &[u8]| {
            let bytes = info.get(key).unwrap().as_str().unwrap();
            let units: Vec<u16> = match bytes.strip_prefix(&[0xFE, 0xFF]) {
                Some(utf16) => utf16
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect(),
                None => bytes.iter().map(|b| *b as u16).collect(),
            };
            String::from_utf16_lossy(&units)
        };
        assert_eq!(value(b"Title"), "documento");
        assert_eq!(value(b"Creator"), "mathdown2pdf");
    }

    #[test]
    fn test_empty_document_still_has_a_page() {
        let artifact = export(&Document::default(), "empty", &StyleMatch::default(), &mut resolver())
            .unwrap();
        let doc = PdfDocument::load_mem(&artifact.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_strict_failure_is_a_render_error() {
        let style = StyleMatch {
            strict: true,
            ..StyleMatch::default()
        };
        let doc = Document::new(vec![Node::TableRow(vec![])]);
        let err = export(&doc, "x", &style, &mut resolver()).unwrap_err();
        assert!(matches!(err, MdpError::RenderError { block: Some(0), .. }));
    }

    #[test]
    fn test_save_in_missing_directory_fails() {
        let artifact = export(&sample(), "x", &StyleMatch::default(), &mut resolver()).unwrap();
        let err = artifact
            .save_in(Path::new("/nonexistent/mathdown2pdf/dir"))
            .unwrap_err();
        assert!(matches!(err, MdpError::IoError { .. }));
    }

    #[test]
    fn test_save_in_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = export(&sample(), "saved", &StyleMatch::default(), &mut resolver()).unwrap();
        let path = artifact.save_in(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "saved.pdf");
        assert_eq!(std::fs::read(path).unwrap(), artifact.bytes);
    }
}
