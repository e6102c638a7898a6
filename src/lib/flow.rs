//! Inline flow: places words and images left to right inside a column,
//! breaking lines as they fill up.
//!
//! A [`TextFlow`] is created per block (or per table cell) with the top edge
//! of the area it writes into. Its first baseline sits one em below that edge.
//! The flow never inserts page breaks; pagination happens between blocks.
//!
//! In [`FlowMode::Measure`] the flow advances exactly as it would when
//! drawing but issues no surface calls at all, which is how table rows learn
//! their height before anything is painted.

use crate::math::EquationImage;
use crate::metrics;
use crate::styling::{pt_to_mm, Color, RenderStyle};
use crate::surface::{PaintMode, Surface, SurfaceError};
use crate::wrap::split_by_chars;

/// Horizontal gap after an inline image, in millimetres.
pub const IMAGE_GAP: f32 = 1.0;

/// Optical middle of a line, as a fraction of the font size above the baseline.
const OPTICAL_MIDDLE: f32 = 0.3;

/// Horizontal extent available to a flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub start_x: f32,
    pub max_x: f32,
}

impl Column {
    pub fn new(start_x: f32, max_x: f32) -> Self {
        Self { start_x, max_x }
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.start_x
    }

    /// The same column with its left edge moved right by `by`.
    pub fn indented(&self, by: f32) -> Self {
        Self {
            start_x: (self.start_x + by).min(self.max_x),
            max_x: self.max_x,
        }
    }
}

/// Position of the writing head. `y` is the current baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub x: f32,
    pub y: f32,
    pub page_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowMode {
    Draw,
    Measure,
}

pub struct TextFlow<'a> {
    surface: &'a mut dyn Surface,
    column: Column,
    mode: FlowMode,
    base_size: f32,
    x: f32,
    baseline: f32,
    /// Largest font size (pt) used on the current line.
    line_size: f32,
    /// Font size (pt) of the run being written; inline images centre on it.
    run_size: f32,
    /// How far inline images reach below the current baseline, in mm.
    line_depth: f32,
    last_was_space: bool,
    link: Option<String>,
}

impl<'a> TextFlow<'a> {
    pub fn new(
        surface: &'a mut dyn Surface,
        column: Column,
        top_y: f32,
        base_size: f32,
        mode: FlowMode,
    ) -> Self {
        Self {
            surface,
            column,
            mode,
            base_size,
            x: column.start_x,
            baseline: top_y + pt_to_mm(base_size),
            line_size: base_size,
            run_size: base_size,
            line_depth: 0.0,
            last_was_space: false,
            link: None,
        }
    }

    pub fn column(&self) -> Column {
        self.column
    }

    pub fn mode(&self) -> FlowMode {
        self.mode
    }

    /// The current baseline.
    pub fn current_y(&self) -> f32 {
        self.baseline
    }

    /// Lowest point reached by the current line, text descent or image.
    pub fn line_bottom(&self) -> f32 {
        self.baseline + pt_to_mm(self.line_size) * OPTICAL_MIDDLE + self.overhang()
    }

    /// How far inline images on the current line reach below the text descent.
    pub fn overhang(&self) -> f32 {
        (self.line_depth - pt_to_mm(self.line_size) * OPTICAL_MIDDLE).max(0.0)
    }

    pub fn cursor(&self) -> Cursor {
        Cursor {
            x: self.x,
            y: self.baseline,
            page_index: self.surface.current_page(),
        }
    }

    pub fn at_line_start(&self) -> bool {
        self.x <= self.column.start_x
    }

    /// Subsequent words become part of a hyperlink to `href`.
    pub fn set_link(&mut self, href: &str) {
        self.link = Some(href.to_string());
    }

    pub fn clear_link(&mut self) {
        self.link = None;
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    /// Sets the font size of the surrounding run for the next inline image.
    pub fn set_run_size(&mut self, size_pt: f32) {
        self.run_size = size_pt;
    }

    /// Starts a new line: `x` returns to the column start and the baseline
    /// moves down by 1.2 times the largest font size used on the line.
    pub fn break_line(&mut self) {
        let advance = pt_to_mm(self.line_size.max(self.base_size)) * 1.2;
        self.baseline += advance + self.overhang();
        self.x = self.column.start_x;
        self.line_size = self.base_size;
        self.line_depth = 0.0;
        self.last_was_space = false;
    }

    fn apply_style(&mut self, style: &RenderStyle) {
        if self.mode == FlowMode::Draw {
            self.surface.set_font(style.face());
            self.surface.set_font_size(style.font_size);
            self.surface.set_text_color(style.color);
        }
    }

    fn break_if_overflowing(&mut self, width: f32) {
        if self.x + width > self.column.max_x && self.x > self.column.start_x {
            self.break_line();
        }
    }

    fn link_area(&mut self, x: f32, width: f32, size_pt: f32) {
        if self.mode != FlowMode::Draw {
            return;
        }
        if let Some(href) = self.link.clone() {
            let em = pt_to_mm(size_pt);
            self.surface
                .add_link(x, self.baseline - em * 0.8, width, em, &href);
        }
    }

    /// Places one word, wrapping first if it does not fit.
    ///
    /// A word wider than the whole column is still placed at the column start
    /// and left overflowing.
    pub fn write_word(&mut self, text: &str, style: &RenderStyle, trailing_space: bool) {
        if text.is_empty() {
            if trailing_space {
                self.write_space(style);
            }
            return;
        }
        let width = metrics::text_width_mm(text, style.face(), style.font_size);
        self.break_if_overflowing(width);

        let x = self.x;
        if self.mode == FlowMode::Draw {
            self.apply_style(style);
            self.surface.draw_text(x, self.baseline, text);
        }
        self.link_area(x, width, style.font_size);
        self.line_size = self.line_size.max(style.font_size);
        self.run_size = style.font_size;
        self.x += width;
        self.last_was_space = false;

        if trailing_space {
            self.write_space(style);
        }
    }

    /// Advances by one space of `style`, unless the line is empty or a space
    /// was just written. The advance never pushes `x` past the column end.
    pub fn write_space(&mut self, style: &RenderStyle) {
        if self.at_line_start() || self.last_was_space {
            return;
        }
        let width = metrics::text_width_mm(" ", style.face(), style.font_size);
        self.x = (self.x + width).min(self.column.max_x);
        self.last_was_space = true;
    }

    /// Places an image of the given size, vertically centred on the optical
    /// middle of the current run's text.
    pub fn write_image(
        &mut self,
        image: &EquationImage,
        width: f32,
        height: f32,
    ) -> Result<(), SurfaceError> {
        self.break_if_overflowing(width);

        let middle = self.baseline - pt_to_mm(self.run_size) * OPTICAL_MIDDLE;
        let top = middle - height / 2.0;
        if self.mode == FlowMode::Draw {
            self.surface
                .draw_image(&image.raster, self.x, top, width, height)?;
        }
        self.line_depth = self.line_depth.max(top + height - self.baseline);
        self.x += width + IMAGE_GAP;
        self.last_was_space = false;
        Ok(())
    }

    /// Places inline code on a shaded background.
    ///
    /// The text is split into words, and words too wide for the column into
    /// characters; each placed piece gets its own shaded segment.
    pub fn write_code(
        &mut self,
        text: &str,
        style: &RenderStyle,
        shade: Color,
        trailing_space: bool,
    ) {
        let face = style.face();
        let size = style.font_size;
        let measure = |s: &str| metrics::text_width_mm(s, face, size);
        let words: Vec<&str> = text.split(' ').filter(|w| !w.is_empty()).collect();

        for (i, word) in words.iter().enumerate() {
            let pieces = if measure(word) > self.column.width() {
                split_by_chars(word, self.column.width(), &measure)
            } else {
                vec![word.to_string()]
            };
            let piece_count = pieces.len();
            for (j, piece) in pieces.iter().enumerate() {
                let width = measure(piece);
                self.break_if_overflowing(width);
                self.shade(self.x, width, size, shade);
                self.write_word(piece, style, false);
                if j + 1 < piece_count {
                    self.break_line();
                }
            }
            if i + 1 < words.len() {
                self.write_space(style);
            }
        }
        if trailing_space {
            self.write_space(style);
        }
    }

    fn shade(&mut self, x: f32, width: f32, size_pt: f32, color: Color) {
        if self.mode != FlowMode::Draw {
            return;
        }
        let em = pt_to_mm(size_pt);
        let saved = self.surface.save_state();
        self.surface.set_fill_color(color);
        self.surface.draw_rect(
            x - 0.5,
            self.baseline - em * 0.85,
            width + 1.0,
            em * 1.15,
            PaintMode::Fill,
        );
        self.surface.restore_state(saved);
    }
}
