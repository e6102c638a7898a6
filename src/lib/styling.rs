//! Style definitions shared by the layout engine.
//!
//! [`StyleMatch`] is the fully-resolved style table produced by the
//! configuration loader. Every visual constant the block handlers use lives
//! here so that a `mathdown2pdfrc.toml` can override it. [`RenderStyle`] is the
//! small value threaded through inline composition: it is `Copy`, never stored
//! on a node, and composed (not replaced) at each nesting level.

use crate::metrics::{FontFace, FontFamily};

/// Millimetres per typographic point.
pub const MM_PER_PT: f32 = 25.4 / 72.0;

/// Millimetres per CSS pixel (1/96 in), the unit equation images are measured in.
pub const MM_PER_PX: f32 = 25.4 / 96.0;

/// Converts a size in points to millimetres.
pub fn pt_to_mm(pt: f32) -> f32 {
    pt * MM_PER_PT
}

/// An RGB colour with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Returns the channels scaled to `0.0..=1.0`, as PDF colour operators expect.
    pub fn to_unit(self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Color::rgb(r, g, b)
    }
}

/// Page dimensions, constant for a whole export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
}

impl PageGeometry {
    /// A4 portrait with 20 mm margins.
    pub const A4: PageGeometry = PageGeometry {
        page_width: 210.0,
        page_height: 297.0,
        margin: 20.0,
    };

    pub fn content_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }

    /// The lowest y coordinate content may reach before a page break is due.
    pub fn bottom_limit(&self) -> f32 {
        self.page_height - self.margin
    }

    pub fn content_height(&self) -> f32 {
        self.page_height - 2.0 * self.margin
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        PageGeometry::A4
    }
}

/// Style of an inline run, composed down the inline tree.
///
/// Bold inside italic yields bold *and* italic; changes made for a subtree are
/// naturally scoped because the value is passed by copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStyle {
    pub bold: bool,
    pub italic: bool,
    pub monospace: bool,
    pub color: Color,
    pub font_size: f32,
}

impl RenderStyle {
    pub fn new(font_size: f32, color: Color) -> Self {
        Self {
            bold: false,
            italic: false,
            monospace: false,
            color,
            font_size,
        }
    }

    pub fn with_bold(self) -> Self {
        Self { bold: true, ..self }
    }

    pub fn with_italic(self) -> Self {
        Self {
            italic: true,
            ..self
        }
    }

    pub fn with_monospace(self) -> Self {
        Self {
            monospace: true,
            ..self
        }
    }

    pub fn with_color(self, color: Color) -> Self {
        Self { color, ..self }
    }

    pub fn with_font_size(self, font_size: f32) -> Self {
        Self { font_size, ..self }
    }

    /// The built-in face this style resolves to.
    pub fn face(&self) -> FontFace {
        let family = if self.monospace {
            FontFamily::Courier
        } else {
            FontFamily::Helvetica
        };
        FontFace::new(family, self.bold, self.italic)
    }

    /// Font size in millimetres.
    pub fn em(&self) -> f32 {
        pt_to_mm(self.font_size)
    }

    /// Distance between consecutive baselines, 1.2 em.
    pub fn line_height(&self) -> f32 {
        self.em() * 1.2
    }
}

/// Body text settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub size: f32,
    pub color: Color,
    /// Gap between the last baseline of a paragraph and the top of the next block.
    pub after_spacing: f32,
}

/// Heading settings shared by all levels, plus per-level colours.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadingStyle {
    /// Font sizes indexed by heading level; levels past the end use `fallback_size`.
    pub sizes: Vec<f32>,
    pub fallback_size: f32,
    pub top_margin_first: f32,
    pub top_margin: f32,
    pub bottom_margin: f32,
    /// Baseline advance per wrapped line, as a multiple of the font size.
    pub line_advance: f32,
    pub colors: [Color; 6],
    pub rule_colors: [Color; 2],
    pub rule_widths: [f32; 2],
}

impl HeadingStyle {
    pub fn size_for(&self, level: u8) -> f32 {
        self.sizes
            .get(level as usize)
            .copied()
            .unwrap_or(self.fallback_size)
    }

    pub fn color_for(&self, level: u8) -> Color {
        let idx = (level.clamp(1, 6) - 1) as usize;
        self.colors[idx]
    }

    pub fn top_margin_for(&self, level: u8) -> f32 {
        if level <= 1 {
            self.top_margin_first
        } else {
            self.top_margin
        }
    }
}

/// Fenced and indented code blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlockStyle {
    pub size: f32,
    pub color: Color,
    pub background: Color,
    pub line_height: f32,
    pub padding: f32,
    pub before_spacing: f32,
    pub after_spacing: f32,
    pub highlight: bool,
}

/// `inline code` spans.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineCodeStyle {
    pub size: f32,
    pub color: Color,
    pub background: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockQuoteStyle {
    pub color: Color,
    pub accent: Color,
    pub accent_width: f32,
    pub indent: f32,
    pub before_spacing: f32,
    pub after_spacing: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListStyle {
    pub indent: f32,
    pub item_spacing: f32,
    pub after_spacing: f32,
    pub bullet: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableStyle {
    pub size: f32,
    pub color: Color,
    pub header_background: Color,
    pub border: Color,
    pub border_width: f32,
    pub padding: f32,
    pub min_row_height: f32,
    pub before_spacing: f32,
    pub after_spacing: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleStyle {
    pub color: Color,
    pub width: f32,
    pub gap: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MathStyle {
    pub oversample: f32,
    pub inline_scale: f32,
    pub display_scale: f32,
    pub gap: f32,
    pub cache: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub creator: String,
    pub author: String,
}

/// The complete style table consulted by every block handler.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleMatch {
    pub page: PageGeometry,
    pub text: TextStyle,
    pub heading: HeadingStyle,
    pub code: CodeBlockStyle,
    pub inline_code: InlineCodeStyle,
    pub block_quote: BlockQuoteStyle,
    pub list: ListStyle,
    pub table: TableStyle,
    pub link_color: Color,
    pub horizontal_rule: RuleStyle,
    pub math: MathStyle,
    pub metadata: Metadata,
    /// Abort the export on the first element that fails to render.
    pub strict: bool,
}

impl StyleMatch {
    /// The style body text starts from.
    pub fn base_text(&self) -> RenderStyle {
        RenderStyle::new(self.text.size, self.text.color)
    }
}

impl Default for StyleMatch {
    fn default() -> Self {
        let ink = Color::rgb(50, 49, 48);
        let muted = Color::rgb(96, 94, 92);
        let accent = Color::rgb(0, 120, 212);
        Self {
            page: PageGeometry::A4,
            text: TextStyle {
                size: 11.0,
                color: ink,
                after_spacing: 10.0,
            },
            heading: HeadingStyle {
                sizes: vec![24.0, 20.0, 16.0, 14.0, 12.0, 11.0],
                fallback_size: 11.0,
                top_margin_first: 15.0,
                top_margin: 10.0,
                bottom_margin: 8.0,
                line_advance: 0.8,
                colors: [ink, ink, muted, muted, muted, muted],
                rule_colors: [Color::rgb(210, 208, 206), Color::rgb(237, 235, 233)],
                rule_widths: [0.5, 0.3],
            },
            code: CodeBlockStyle {
                size: 9.0,
                color: ink,
                background: Color::rgb(248, 248, 248),
                line_height: 5.0,
                padding: 4.0,
                before_spacing: 2.0,
                after_spacing: 8.0,
                highlight: true,
            },
            inline_code: InlineCodeStyle {
                size: 10.0,
                color: accent,
                background: Color::rgb(243, 242, 241),
            },
            block_quote: BlockQuoteStyle {
                color: muted,
                accent,
                accent_width: 1.0,
                indent: 6.0,
                before_spacing: 5.0,
                after_spacing: 5.0,
            },
            list: ListStyle {
                indent: 12.0,
                item_spacing: 1.5,
                after_spacing: 8.0,
                bullet: "\u{2022}".to_string(),
            },
            table: TableStyle {
                size: 10.0,
                color: ink,
                header_background: Color::rgb(250, 249, 248),
                border: Color::rgb(210, 208, 206),
                border_width: 0.2,
                padding: 2.0,
                min_row_height: 8.0,
                before_spacing: 4.0,
                after_spacing: 8.0,
            },
            link_color: accent,
            horizontal_rule: RuleStyle {
                color: Color::rgb(210, 208, 206),
                width: 0.3,
                gap: 8.0,
            },
            math: MathStyle {
                oversample: 3.0,
                inline_scale: 0.8,
                display_scale: 1.0,
                gap: 6.0,
                cache: true,
            },
            metadata: Metadata {
                creator: "mathdown2pdf".to_string(),
                author: "User".to_string(),
            },
            strict: false,
        }
    }
}
