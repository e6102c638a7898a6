//! Drawing primitives consumed by the layout engine.
//!
//! Layout code only talks to the [`Surface`] trait. All coordinates are in
//! millimetres from the top-left corner of the current page; text is placed by
//! its baseline. [`crate::writer::PdfSurface`] turns the calls into PDF content
//! streams, [`RecordingSurface`] keeps them as [`DrawOp`]s for inspection.

use crate::math::Raster;
use crate::metrics::{self, FontFace};
use crate::styling::Color;
use std::fmt;

/// Whether a rectangle is filled or outlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintMode {
    Fill,
    Stroke,
}

/// The mutable drawing state of a surface.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    pub font: FontFace,
    pub font_size: f32,
    pub text_color: Color,
    pub draw_color: Color,
    pub fill_color: Color,
    pub line_width: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            font: FontFace::REGULAR,
            font_size: 11.0,
            text_color: Color::BLACK,
            draw_color: Color::BLACK,
            fill_color: Color::WHITE,
            line_width: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceError {
    /// The raster handed to `draw_image` is unusable.
    InvalidImage(String),
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SurfaceError::InvalidImage(msg) => write!(f, "invalid image: {}", msg),
        }
    }
}

impl std::error::Error for SurfaceError {}

/// A page-based drawing target.
///
/// A surface always has at least one page; drawing goes to the last one.
pub trait Surface {
    fn state(&self) -> &GraphicsState;
    fn state_mut(&mut self) -> &mut GraphicsState;

    /// Appends a page and makes it current.
    fn add_page(&mut self);
    fn page_count(&self) -> usize;

    /// Draws `text` with its baseline at `y`, using the current font and text colour.
    fn draw_text(&mut self, x: f32, y: f32, text: &str);
    /// Places an image with its top-left corner at `(x, y)`.
    fn draw_image(
        &mut self,
        raster: &Raster,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<(), SurfaceError>;
    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32);
    fn draw_rect(&mut self, x: f32, y: f32, width: f32, height: f32, mode: PaintMode);
    /// Makes the given area a hyperlink to `href`.
    fn add_link(&mut self, x: f32, y: f32, width: f32, height: f32, href: &str);

    /// Zero-based index of the page currently drawn on.
    fn current_page(&self) -> usize {
        self.page_count().saturating_sub(1)
    }

    fn set_font(&mut self, font: FontFace) {
        self.state_mut().font = font;
    }

    fn set_font_size(&mut self, size: f32) {
        self.state_mut().font_size = size;
    }

    fn set_text_color(&mut self, color: Color) {
        self.state_mut().text_color = color;
    }

    fn set_draw_color(&mut self, color: Color) {
        self.state_mut().draw_color = color;
    }

    fn set_fill_color(&mut self, color: Color) {
        self.state_mut().fill_color = color;
    }

    fn set_line_width(&mut self, width: f32) {
        self.state_mut().line_width = width;
    }

    /// Width of `text` in the current font and size, in millimetres.
    fn measure_text_width(&self, text: &str) -> f32 {
        let state = self.state();
        metrics::text_width_mm(text, state.font, state.font_size)
    }

    fn save_state(&self) -> GraphicsState {
        self.state().clone()
    }

    fn restore_state(&mut self, saved: GraphicsState) {
        *self.state_mut() = saved;
    }
}

/// One recorded drawing call. `page` is zero-based.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        page: usize,
        x: f32,
        y: f32,
        text: String,
        font: FontFace,
        size: f32,
        color: Color,
    },
    Image {
        page: usize,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Line {
        page: usize,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        color: Color,
        width: f32,
    },
    Rect {
        page: usize,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        mode: PaintMode,
        color: Color,
    },
    Link {
        page: usize,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        href: String,
    },
}

impl DrawOp {
    pub fn page(&self) -> usize {
        match self {
            DrawOp::Text { page, .. }
            | DrawOp::Image { page, .. }
            | DrawOp::Line { page, .. }
            | DrawOp::Rect { page, .. }
            | DrawOp::Link { page, .. } => *page,
        }
    }
}

/// A surface that keeps every call in memory.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    state: GraphicsState,
    pages: usize,
    ops: Vec<DrawOp>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            state: GraphicsState::default(),
            pages: 1,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Every text run in drawing order as `(page, x, y, text)`.
    pub fn texts(&self) -> Vec<(usize, f32, f32, &str)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text {
                    page, x, y, text, ..
                } => Some((*page, *x, *y, text.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Every image placement as `(page, x, y, width, height)`.
    pub fn images(&self) -> Vec<(usize, f32, f32, f32, f32)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Image {
                    page,
                    x,
                    y,
                    width,
                    height,
                } => Some((*page, *x, *y, *width, *height)),
                _ => None,
            })
            .collect()
    }
}

impl Surface for RecordingSurface {
    fn state(&self) -> &GraphicsState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut GraphicsState {
        &mut self.state
    }

    fn add_page(&mut self) {
        self.pages += 1;
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    fn draw_text(&mut self, x: f32, y: f32, text: &str) {
        self.ops.push(DrawOp::Text {
            page: self.current_page(),
            x,
            y,
            text: text.to_string(),
            font: self.state.font,
            size: self.state.font_size,
            color: self.state.text_color,
        });
    }

    fn draw_image(
        &mut self,
        raster: &Raster,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<(), SurfaceError> {
        raster.validate()?;
        self.ops.push(DrawOp::Image {
            page: self.current_page(),
            x,
            y,
            width,
            height,
        });
        Ok(())
    }

    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.ops.push(DrawOp::Line {
            page: self.current_page(),
            x1,
            y1,
            x2,
            y2,
            color: self.state.draw_color,
            width: self.state.line_width,
        });
    }

    fn draw_rect(&mut self, x: f32, y: f32, width: f32, height: f32, mode: PaintMode) {
        let color = match mode {
            PaintMode::Fill => self.state.fill_color,
            PaintMode::Stroke => self.state.draw_color,
        };
        self.ops.push(DrawOp::Rect {
            page: self.current_page(),
            x,
            y,
            width,
            height,
            mode,
            color,
        });
    }

    fn add_link(&mut self, x: f32, y: f32, width: f32, height: f32, href: &str) {
        self.ops.push(DrawOp::Link {
            page: self.current_page(),
            x,
            y,
            width,
            height,
            href: href.to_string(),
        });
    }
}
