//! The mathdown2pdf library renders Markdown with embedded LaTeX into paginated PDF documents.
//!
//! The pipeline parses Markdown into a [`document::Document`] tree, resolves
//! every equation into a raster image, and lays the tree out block by block
//! on A4 pages, tracking a single vertical cursor and breaking pages between
//! blocks. Text is set in the PDF built-in Helvetica and Courier faces, so no
//! font files are needed.
//!
//! Basic usage involves passing Markdown content as a string along with an output path:
//! ```rust
//! use mathdown2pdf::config::ConfigSource;
//! use std::error::Error;
//!
//! fn example() -> Result<(), Box<dyn Error>> {
//!     let markdown = "# Energy\n\nHello $E = mc^2$ world.".to_string();
//!     mathdown2pdf::parse_into_file(markdown, "output.pdf", ConfigSource::Default)?;
//!     Ok(())
//! }
//! ```
//!
//! Styling is configured through TOML, either from a file or an embedded string:
//! ```toml
//! [page]
//! margin = 25
//!
//! [heading.1]
//! textcolor = { r = 0, g = 0, b = 0 }
//!
//! [math]
//! oversample = 4
//! ```
//!
//! Equations are typeset by MicroTeX when the crate is built with the
//! `latex` feature. Without it, and whenever an equation cannot be typeset,
//! the literal `$...$` source is printed in its place.
//!
//! ## Rendering Flow
//! ```text
//! +-------------+     +----------------+     +-------------------+
//! |  Markdown   |     |  Node tree     |     |  Paginator        |
//! |  # Title    | --> |  Heading       | --> |  - page breaks    |
//! |  $x^2$      |     |  MathInline    |     |  - block handlers |
//! +-------------+     +----------------+     +-------------------+
//!                                                     |
//! +---------------+     +------------------+     +----v---------+
//! | MathResolver  |     | TextFlow         |     | Surface      |
//! | - typeset     | --> | - word wrapping  | --> | - PdfSurface |
//! | - rasterize   |     | - inline images  |     | - Recording  |
//! +---------------+     +------------------+     +--------------+
//! ```

pub mod blocks;
pub mod config;
mod debug;
pub mod document;
pub mod flow;
pub mod highlighting;
pub mod inline;
pub mod latex;
pub mod markdown;
pub mod math;
pub mod metrics;
pub mod paginate;
pub mod pdf;
pub mod session;
pub mod styling;
pub mod surface;
pub mod validation;
pub mod wrap;
pub mod writer;

use std::error::Error;
use std::fmt;
use std::path::Path;

/// Represents errors that can occur during the conversion process.
#[derive(Debug)]
pub enum MdpError {
    /// Indicates an error occurred while parsing the Markdown content
    ParseError {
        message: String,
        position: Option<usize>,
        suggestion: Option<String>,
    },
    /// An element could not be laid out and `[render] strict` is set
    RenderError {
        message: String,
        block: Option<usize>,
        suggestion: Option<String>,
    },
    /// Indicates an error occurred during PDF file generation
    PdfError {
        message: String,
        path: Option<String>,
        suggestion: Option<String>,
    },
    /// Indicates an invalid configuration
    ConfigError { message: String, suggestion: String },
    /// Indicates an I/O error
    IoError {
        message: String,
        path: String,
        suggestion: String,
    },
}

impl Error for MdpError {}
impl fmt::Display for MdpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MdpError::ParseError {
                message,
                position,
                suggestion,
            } => {
                write!(f, "❌ Markdown Parsing Error: {}", message)?;
                if let Some(pos) = position {
                    write!(f, " (at position {})", pos)?;
                }
                if let Some(hint) = suggestion {
                    write!(f, "\n💡 Suggestion: {}", hint)?;
                }
                Ok(())
            }
            MdpError::RenderError {
                message,
                block,
                suggestion,
            } => {
                write!(f, "❌ Layout Error: {}", message)?;
                if let Some(index) = block {
                    write!(f, "\n📍 Block: {}", index + 1)?;
                }
                if let Some(hint) = suggestion {
                    write!(f, "\n💡 Suggestion: {}", hint)?;
                }
                Ok(())
            }
            MdpError::PdfError {
                message,
                path,
                suggestion,
            } => {
                write!(f, "❌ PDF Generation Error: {}", message)?;
                if let Some(p) = path {
                    write!(f, "\n📁 Path: {}", p)?;
                }
                if let Some(hint) = suggestion {
                    write!(f, "\n💡 Suggestion: {}", hint)?;
                }
                Ok(())
            }
            MdpError::ConfigError {
                message,
                suggestion,
            } => {
                write!(f, "❌ Configuration Error: {}", message)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)?;
                Ok(())
            }
            MdpError::IoError {
                message,
                path,
                suggestion,
            } => {
                write!(f, "❌ File Error: {}", message)?;
                write!(f, "\n📁 Path: {}", path)?;
                write!(f, "\n💡 Suggestion: {}", suggestion)?;
                Ok(())
            }
        }
    }
}

impl MdpError {
    /// Creates a simple parse error with just a message
    pub fn parse_error(message: impl Into<String>) -> Self {
        MdpError::ParseError {
            message: message.into(),
            position: None,
            suggestion: Some(
                "Check your Markdown for deeply nested quotes or lists".to_string(),
            ),
        }
    }

    /// Creates a simple PDF error with just a message
    pub fn pdf_error(message: impl Into<String>) -> Self {
        MdpError::PdfError {
            message: message.into(),
            path: None,
            suggestion: Some(
                "Check that the output directory exists and you have write permissions".to_string(),
            ),
        }
    }
}

/// Renders Markdown into a PDF and saves it at `path`.
///
/// The document title is taken from the file stem. Nothing is written when
/// parsing or layout fails.
///
/// # Example
/// ```rust
/// use std::error::Error;
/// use mathdown2pdf::config::ConfigSource;
///
/// fn example() -> Result<(), Box<dyn Error>> {
///     let markdown = "# Hello World\nThis is a test.".to_string();
///
///     // Use default configuration
///     mathdown2pdf::parse_into_file(markdown.clone(), "output1.pdf", ConfigSource::Default)?;
///
///     // Use file-based configuration
///     mathdown2pdf::parse_into_file(markdown.clone(), "output2.pdf", ConfigSource::File("config.toml"))?;
///
///     // Use embedded configuration
///     const EMBEDDED: &str = r#"
///         [heading]
///         sizes = [26, 22, 18]
///     "#;
///     mathdown2pdf::parse_into_file(markdown, "output3.pdf", ConfigSource::Embedded(EMBEDDED))?;
///
///     Ok(())
/// }
/// ```
pub fn parse_into_file(
    markdown: String,
    path: &str,
    config: config::ConfigSource,
) -> Result<(), MdpError> {
    let target = Path::new(path);
    let dir = target.parent().unwrap_or_else(|| Path::new(""));
    if !dir.as_os_str().is_empty() && !dir.exists() {
        return Err(MdpError::IoError {
            message: "Output directory does not exist".to_string(),
            path: dir.display().to_string(),
            suggestion: format!("Create the directory first: mkdir -p {}", dir.display()),
        });
    }

    let document = markdown::parse(&markdown)?;
    let style = config::load_config_from_source(config);
    let mut resolver = pdf::resolver_for(&style);
    let name = target
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let artifact = pdf::export(&document, &name, &style, &mut resolver)?;

    std::fs::write(target, &artifact.bytes).map_err(|e| {
        let err = e.to_string();
        MdpError::PdfError {
            message: err.clone(),
            path: Some(path.to_string()),
            suggestion: Some(if e.kind() == std::io::ErrorKind::PermissionDenied {
                "Check that you have write permissions for this location".to_string()
            } else if e.kind() == std::io::ErrorKind::NotFound {
                "Make sure the output directory exists".to_string()
            } else {
                "Try a different output path or check available disk space".to_string()
            }),
        }
    })
}

/// Renders Markdown into a PDF and returns the bytes.
///
/// # Example
/// ```rust
/// use mathdown2pdf::config::ConfigSource;
///
/// let pdf = mathdown2pdf::parse_into_bytes(
///     "Area: $\\pi r^2$".to_string(),
///     ConfigSource::Embedded("[page]\nmargin = 15"),
/// ).unwrap();
/// assert!(pdf.starts_with(b"%PDF-"));
/// ```
pub fn parse_into_bytes(markdown: String, config: config::ConfigSource) -> Result<Vec<u8>, MdpError> {
    let document = markdown::parse(&markdown)?;
    let style = config::load_config_from_source(config);
    let mut resolver = pdf::resolver_for(&style);
    let artifact = pdf::export(&document, pdf::DEFAULT_BASENAME, &style, &mut resolver)?;
    Ok(artifact.bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSource;
    use std::fs;

    #[test]
    fn test_basic_markdown_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("basic.pdf");
        let result = parse_into_file(
            "# Test\nHello world".to_string(),
            out.to_str().unwrap(),
            ConfigSource::Default,
        );
        assert!(result.is_ok());
        assert!(fs::read(&out).unwrap().starts_with(b"%PDF-"));
    }

    #[test]
    fn test_invalid_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never.pdf");
        let markdown = ">".repeat(markdown::MAX_NESTING + 5) + " too deep";
        let result = parse_into_file(markdown, out.to_str().unwrap(), ConfigSource::Default);
        assert!(matches!(result, Err(MdpError::ParseError { .. })));
        assert!(!out.exists());
    }

    #[test]
    fn test_invalid_output_path() {
        let result = parse_into_file(
            "# Test".to_string(),
            "/nonexistent/directory/output.pdf",
            ConfigSource::Default,
        );
        assert!(matches!(result, Err(MdpError::IoError { .. })));
    }

    #[test]
    fn test_basic_markdown_to_bytes() {
        let result = parse_into_bytes("# Test\nHello world".to_string(), ConfigSource::Default);
        assert!(result.is_ok());
        let pdf_bytes = result.unwrap();
        assert!(!pdf_bytes.is_empty());
        assert!(pdf_bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_embedded_config_bytes_output() {
        const EMBEDDED: &str = r#"
            [text]
            size = 12
            textcolor = { r = 0, g = 0, b = 0 }

            [heading.1]
            textcolor = { r = 200, g = 0, b = 0 }
        "#;
        let result = parse_into_bytes(
            "# Red title\n\nBlack text".to_string(),
            ConfigSource::Embedded(EMBEDDED),
        );
        let pdf_bytes = result.unwrap();
        assert!(pdf_bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_embedded_config_invalid_toml() {
        let result = parse_into_bytes(
            "# Test".to_string(),
            ConfigSource::Embedded("this is not valid toml {{{"),
        );
        assert!(result.is_ok());
        assert!(!result.unwrap().is_empty());
    }

    #[test]
    fn test_config_source_variants() {
        let markdown = "# Test\nContent".to_string();
        assert!(parse_into_bytes(markdown.clone(), ConfigSource::Default).is_ok());
        assert!(parse_into_bytes(markdown.clone(), ConfigSource::File("missing.toml")).is_ok());
        assert!(parse_into_bytes(markdown, ConfigSource::Embedded("[page]\nmargin = 10")).is_ok());
    }

    #[test]
    fn test_complex_markdown_to_bytes() {
        let markdown = r#"
# Main Title

## Subtitle

This is a paragraph with **bold** and *italic* text, plus $a^2 + b^2 = c^2$.

- List item 1
- List item 2
  - Nested item

1. Ordered item
2. Another item

```rust
fn main() {
    println!("Hello, world!");
}
```

> This is a blockquote

| Column 1 | Column 2 |
|----------|----------|
| Cell 1   | Cell 2   |

$$
\int_0^1 x\,dx = \frac{1}{2}
$$

---

[Link example](https://example.com)
"#
        .to_string();

        let result = parse_into_bytes(markdown, ConfigSource::Default);
        assert!(result.is_ok());
        let pdf_bytes = result.unwrap();
        assert!(pdf_bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_empty_markdown_to_bytes() {
        let result = parse_into_bytes(String::new(), ConfigSource::Default);
        let pdf_bytes = result.unwrap();
        assert!(pdf_bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_code_blocks_render_with_monospace_by_default() {
        let markdown = "```\nlet x = 1;\n```".to_string();
        let pdf_bytes = parse_into_bytes(markdown, ConfigSource::Default).unwrap();
        let doc = lopdf::Document::load_mem(&pdf_bytes).unwrap();
        let fonts = doc.get_page_fonts(doc.get_pages()[&1]).unwrap();
        assert!(fonts
            .values()
            .filter_map(|f| f.get(b"BaseFont").and_then(|n| n.as_name()).ok())
            .any(|name| name.starts_with(b"Courier")));
    }

    #[test]
    fn test_render_error_display_names_block() {
        let err = MdpError::RenderError {
            message: "block 2 (table) could not be rendered".to_string(),
            block: Some(1),
            suggestion: None,
        };
        let s = format!("{}", err);
        assert!(s.contains("Layout Error"));
        assert!(s.contains("📍 Block: 2"));
    }

    #[test]
    fn test_mdp_error_display_variants_and_constructors() {
        let s = format!("{}", MdpError::parse_error("bad parse"));
        assert!(s.contains("Markdown Parsing Error"));
        assert!(s.contains("bad parse"));

        let s2 = format!("{}", MdpError::pdf_error("render failed"));
        assert!(s2.contains("PDF Generation Error"));
        assert!(s2.contains("render failed"));

        let s4 = format!(
            "{}",
            MdpError::ConfigError {
                message: "bad cfg".to_string(),
                suggestion: "fix cfg".to_string(),
            }
        );
        assert!(s4.contains("Configuration Error"));
        assert!(s4.contains("fix cfg"));

        let s5 = format!(
            "{}",
            MdpError::IoError {
                message: "io fail".to_string(),
                path: "/path/to".to_string(),
                suggestion: "check".to_string(),
            }
        );
        assert!(s5.contains("File Error: io fail"));
        assert!(s5.contains("📁 Path: /path/to"));
    }
}
