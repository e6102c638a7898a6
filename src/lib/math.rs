//! Equation images.
//!
//! [`MathResolver`] turns LaTeX source into an [`EquationImage`]: the
//! [`Typesetter`] produces SVG, `usvg` parses it, the tight bounding box of the
//! drawn content is measured, and `resvg` rasterizes that box at an oversampled
//! resolution. The natural size reported back is the size before
//! oversampling, in CSS pixels, so callers can scale it to millimetres.

use crate::latex::{TypesetError, Typesetter};
use crate::styling::MM_PER_PX;
use crate::surface::SurfaceError;
use log::{debug, warn};
use resvg::{tiny_skia, usvg};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Largest raster edge, in device pixels.
const MAX_RASTER_EDGE: u32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathMode {
    Inline,
    Display,
}

/// Straight (not premultiplied) RGBA pixels, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Raster {
    pub fn validate(&self) -> Result<(), SurfaceError> {
        if self.width == 0 || self.height == 0 {
            return Err(SurfaceError::InvalidImage(format!(
                "empty raster {}x{}",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize * 4;
        if self.pixels.len() != expected {
            return Err(SurfaceError::InvalidImage(format!(
                "expected {} bytes of RGBA data, got {}",
                expected,
                self.pixels.len()
            )));
        }
        Ok(())
    }
}

/// A rendered equation.
#[derive(Debug, Clone, PartialEq)]
pub struct EquationImage {
    pub raster: Raster,
    /// Width of the drawn content in CSS px, before oversampling.
    pub natural_width: f32,
    pub natural_height: f32,
}

impl EquationImage {
    /// Natural size in millimetres multiplied by `scale`.
    pub fn size_mm(&self, scale: f32) -> (f32, f32) {
        (
            self.natural_width * MM_PER_PX * scale,
            self.natural_height * MM_PER_PX * scale,
        )
    }

    /// Like [`size_mm`](Self::size_mm) but shrunk to fit `max_width`, keeping the aspect ratio.
    pub fn fit_mm(&self, scale: f32, max_width: f32) -> (f32, f32) {
        let (w, h) = self.size_mm(scale);
        if w > max_width && w > 0.0 {
            (max_width, h * max_width / w)
        } else {
            (w, h)
        }
    }
}

/// Why an equation could not be turned into an image. Every variant carries
/// the offending source.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    Typeset { source: String, error: TypesetError },
    Parse { source: String, message: String },
    EmptyBox { source: String },
    Surface { source: String, message: String },
}

impl ResolveError {
    pub fn source_text(&self) -> &str {
        match self {
            ResolveError::Typeset { source, .. }
            | ResolveError::Parse { source, .. }
            | ResolveError::EmptyBox { source }
            | ResolveError::Surface { source, .. } => source,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ResolveError::Typeset { source, error } => {
                write!(f, "could not typeset `{}`: {}", source, error)
            }
            ResolveError::Parse { source, message } => {
                write!(f, "invalid SVG for `{}`: {}", source, message)
            }
            ResolveError::EmptyBox { source } => {
                write!(f, "equation `{}` rendered nothing", source)
            }
            ResolveError::Surface { source, message } => {
                write!(f, "could not rasterize `{}`: {}", source, message)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Resolves equation sources to images, in document order.
pub struct MathResolver {
    typesetter: Box<dyn Typesetter>,
    oversample: f32,
    cache: Option<HashMap<(String, MathMode), Result<Rc<EquationImage>, ResolveError>>>,
    failures: usize,
}

impl MathResolver {
    pub fn new(typesetter: Box<dyn Typesetter>) -> Self {
        Self {
            typesetter,
            oversample: 3.0,
            cache: Some(HashMap::new()),
            failures: 0,
        }
    }

    /// Sets the rasterization factor; values below 2 are raised to 2.
    pub fn with_oversample(mut self, factor: f32) -> Self {
        self.oversample = if factor.is_finite() { factor.max(2.0) } else { 3.0 };
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = if enabled { Some(HashMap::new()) } else { None };
        self
    }

    pub fn oversample(&self) -> f32 {
        self.oversample
    }

    /// Number of equations that fell back to text since construction.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Counts an equation that resolved but could not be placed.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn resolve(
        &mut self,
        source: &str,
        mode: MathMode,
    ) -> Result<Rc<EquationImage>, ResolveError> {
        let key = (source.to_string(), mode);
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            debug!("equation cache hit: {}", source);
            return hit.clone();
        }

        let outcome = self.render(source, mode).map(Rc::new);
        if let Err(e) = &outcome {
            self.failures += 1;
            warn!("{}", e);
        }
        if let Some(cache) = self.cache.as_mut() {
            cache.insert(key, outcome.clone());
        }
        outcome
    }

    fn render(&self, source: &str, mode: MathMode) -> Result<EquationImage, ResolveError> {
        let svg = self
            .typesetter
            .typeset(source, mode)
            .map_err(|error| ResolveError::Typeset {
                source: source.to_string(),
                error,
            })?;
        rasterize_svg(&svg, self.oversample).map_err(|e| e.with_source(source))
    }
}

impl fmt::Debug for MathResolver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MathResolver")
            .field("oversample", &self.oversample)
            .field("cached", &self.cache.as_ref().map(|c| c.len()))
            .field("failures", &self.failures)
            .finish()
    }
}

impl ResolveError {
    fn with_source(self, source: &str) -> Self {
        let source = source.to_string();
        match self {
            ResolveError::Typeset { error, .. } => ResolveError::Typeset { source, error },
            ResolveError::Parse { message, .. } => ResolveError::Parse { source, message },
            ResolveError::EmptyBox { .. } => ResolveError::EmptyBox { source },
            ResolveError::Surface { message, .. } => ResolveError::Surface { source, message },
        }
    }
}

/// Rasterizes the drawn content of an SVG document.
///
/// The returned image is cropped to the content's stroke bounding box; the
/// nominal document size is used only when that box is empty.
pub fn rasterize_svg(svg: &str, oversample: f32) -> Result<EquationImage, ResolveError> {
    let options = usvg::Options::default();
    let tree = usvg::Tree::from_str(svg, &options).map_err(|e| ResolveError::Parse {
        source: String::new(),
        message: e.to_string(),
    })?;

    let bbox = tree.root().abs_stroke_bounding_box();
    let (x, y, width, height) = if bbox.width() > 0.0 && bbox.height() > 0.0 {
        (bbox.x(), bbox.y(), bbox.width(), bbox.height())
    } else {
        let size = tree.size();
        (0.0, 0.0, size.width(), size.height())
    };
    if !(width > 0.0 && height > 0.0) || tree.root().children().is_empty() {
        return Err(ResolveError::EmptyBox {
            source: String::new(),
        });
    }

    let px_width = (width * oversample).ceil() as u32;
    let px_height = (height * oversample).ceil() as u32;
    if px_width > MAX_RASTER_EDGE || px_height > MAX_RASTER_EDGE {
        return Err(ResolveError::Surface {
            source: String::new(),
            message: format!("raster of {}x{} px is too large", px_width, px_height),
        });
    }

    // Released at the end of this scope on every path.
    let mut pixmap = tiny_skia::Pixmap::new(px_width.max(1), px_height.max(1)).ok_or_else(|| {
        ResolveError::Surface {
            source: String::new(),
            message: format!("cannot allocate a {}x{} pixmap", px_width, px_height),
        }
    })?;
    let transform =
        tiny_skia::Transform::from_scale(oversample, oversample).pre_translate(-x, -y);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let mut pixels = Vec::with_capacity(pixmap.pixels().len() * 4);
    for px in pixmap.pixels() {
        let c = px.demultiply();
        pixels.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }

    Ok(EquationImage {
        raster: Raster {
            width: pixmap.width(),
            height: pixmap.height(),
            pixels,
        },
        natural_width: width,
        natural_height: height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const BOX_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20">
        <rect x="5" y="2" width="30" height="10" fill="black"/>
    </svg>"#;

    struct FixedSvg {
        svg: &'static str,
        calls: Rc<Cell<usize>>,
    }

    impl Typesetter for FixedSvg {
        fn typeset(&self, _source: &str, _mode: MathMode) -> Result<String, TypesetError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.svg.to_string())
        }
    }

    fn resolver(svg: &'static str) -> (MathResolver, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let t = FixedSvg {
            svg,
            calls: Rc::clone(&calls),
        };
        (MathResolver::new(Box::new(t)), calls)
    }

    #[test]
    fn measures_tight_content_box() {
        let image = rasterize_svg(BOX_SVG, 3.0).unwrap();
        assert!((image.natural_width - 30.0).abs() < 0.01);
        assert!((image.natural_height - 10.0).abs() < 0.01);
        assert_eq!(image.raster.width, 90);
        assert_eq!(image.raster.height, 30);
        image.raster.validate().unwrap();
        // Centre pixel is opaque black after un-premultiplying.
        let i = ((15 * 90 + 45) * 4) as usize;
        assert_eq!(&image.raster.pixels[i..i + 4], &[0, 0, 0, 255]);
    }

    #[test]
    fn oversample_is_clamped_to_two() {
        let (r, _) = resolver(BOX_SVG);
        assert_eq!(r.with_oversample(1.0).oversample(), 2.0);
    }

    #[test]
    fn cache_returns_same_image_without_retypesetting() {
        let (mut r, calls) = resolver(BOX_SVG);
        let a = r.resolve("x^2", MathMode::Inline).unwrap();
        let b = r.resolve("x^2", MathMode::Inline).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(calls.get(), 1);
        r.resolve("x^2", MathMode::Display).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn disabled_cache_resolves_every_time() {
        let (r, calls) = resolver(BOX_SVG);
        let mut r = r.with_cache(false);
        r.resolve("x", MathMode::Inline).unwrap();
        r.resolve("x", MathMode::Inline).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn invalid_svg_is_a_parse_error_with_source() {
        let (mut r, _) = resolver("not svg at all");
        let err = r.resolve("\\frac{1}{2}", MathMode::Display).unwrap_err();
        assert!(matches!(err, ResolveError::Parse { .. }));
        assert_eq!(err.source_text(), "\\frac{1}{2}");
        assert_eq!(r.failures(), 1);
    }

    #[test]
    fn cached_failure_is_counted_once() {
        let (mut r, calls) = resolver("not svg at all");
        assert!(r.resolve("x", MathMode::Inline).is_err());
        assert!(r.resolve("x", MathMode::Inline).is_err());
        assert_eq!(calls.get(), 1);
        assert_eq!(r.failures(), 1);
    }

    #[test]
    fn empty_svg_is_an_empty_box() {
        let (mut r, _) = resolver(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"></svg>"#,
        );
        let err = r.resolve("x", MathMode::Inline).unwrap_err();
        assert!(matches!(err, ResolveError::EmptyBox { .. }));
    }

    #[test]
    fn unavailable_typesetter_fails_with_typeset_error() {
        let mut r = MathResolver::new(Box::new(crate::latex::UnavailableTypesetter));
        let err = r.resolve("x", MathMode::Inline).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Typeset {
                error: TypesetError::Unavailable,
                ..
            }
        ));
    }

    #[test]
    fn fit_preserves_aspect_ratio() {
        let image = rasterize_svg(BOX_SVG, 2.0).unwrap();
        let (w, h) = image.fit_mm(1.0, 5.0);
        assert!((w - 5.0).abs() < 1e-4);
        assert!((w / h - 3.0).abs() < 0.03);
    }
}
