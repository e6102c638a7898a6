//! LaTeX to SVG typesetting.
//!
//! Equations are typeset by a [`Typesetter`], which turns LaTeX source into an
//! SVG document. With the `latex` feature the MicroTeX engine does the work;
//! without it [`UnavailableTypesetter`] refuses every request and each equation
//! falls back to its literal source text in the PDF.
//!
//! # Examples
//!
//! ```ignore
//! use mathdown2pdf::latex::{default_typesetter, Typesetter};
//! use mathdown2pdf::math::MathMode;
//!
//! let typesetter = default_typesetter();
//! let svg = typesetter.typeset("E = mc^2", MathMode::Inline);
//! assert!(svg.is_ok());
//! ```
//!
//! Rendering examples are excluded from doctests because the MicroTeX engine
//! links against C++ code that is not always present in test environments.

use crate::math::MathMode;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TypesetError {
    /// The source was empty after trimming.
    Empty,
    /// No typesetting engine was compiled in.
    Unavailable,
    /// The engine rejected the input or failed internally.
    Engine(String),
}

impl fmt::Display for TypesetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypesetError::Empty => write!(f, "LaTeX content is empty"),
            TypesetError::Unavailable => write!(
                f,
                "no LaTeX engine available (rebuild with `--features latex`)"
            ),
            TypesetError::Engine(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for TypesetError {}

/// Converts LaTeX math source to an SVG document.
pub trait Typesetter {
    /// Typesets `source` (without `$` delimiters) and returns the SVG markup.
    fn typeset(&self, source: &str, mode: MathMode) -> Result<String, TypesetError>;

    /// Whether this typesetter can produce anything at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// Wraps the source in the delimiters MicroTeX expects for `mode`.
pub fn delimit(source: &str, mode: MathMode) -> Result<String, TypesetError> {
    let latex = source.trim();
    if latex.is_empty() {
        return Err(TypesetError::Empty);
    }
    Ok(match mode {
        MathMode::Display => format!("\\[{}\\]", latex),
        MathMode::Inline => format!("${{{}}}", latex),
    })
}

/// Typesetter backed by the MicroTeX engine.
#[cfg(feature = "latex")]
#[derive(Debug, Default)]
pub struct MicroTexTypesetter;

#[cfg(feature = "latex")]
impl Typesetter for MicroTexTypesetter {
    fn typeset(&self, source: &str, mode: MathMode) -> Result<String, TypesetError> {
        use microtex_rs::{MicroTex, RenderConfig};

        let latex = delimit(source, mode)?;
        let renderer = MicroTex::new()
            .map_err(|e| TypesetError::Engine(format!("Failed to initialize MicroTeX: {}", e)))?;
        let config = RenderConfig::default();
        renderer
            .render(&latex, &config)
            .map_err(|e| TypesetError::Engine(format!("Failed to render LaTeX: {}", e)))
    }
}

/// Used when the crate is built without a LaTeX engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableTypesetter;

impl Typesetter for UnavailableTypesetter {
    fn typeset(&self, source: &str, _mode: MathMode) -> Result<String, TypesetError> {
        if source.trim().is_empty() {
            return Err(TypesetError::Empty);
        }
        Err(TypesetError::Unavailable)
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// The best typesetter this build offers.
pub fn default_typesetter() -> Box<dyn Typesetter> {
    #[cfg(feature = "latex")]
    {
        Box::new(MicroTexTypesetter)
    }
    #[cfg(not(feature = "latex"))]
    {
        Box::new(UnavailableTypesetter)
    }
}

/// Whether equations will be rendered as images in this build.
pub fn engine_available() -> bool {
    cfg!(feature = "latex")
}
