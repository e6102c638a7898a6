//! PDF backend for [`Surface`].
//!
//! Each page is kept as a list of printpdf operations and the document is
//! assembled only in [`PdfSurface::to_bytes`], so nothing is serialized until
//! layout has finished. Text uses the eight built-in Helvetica/Courier faces.
//! Equation rasters are registered as RGBA image XObjects on first draw.

use crate::math::Raster;
use crate::metrics::to_winansi_text;
use crate::styling::{Color, PageGeometry};
use crate::surface::{GraphicsState, PaintMode, Surface, SurfaceError};
use log::debug;
use printpdf::{
    Actions, Line, LinePoint, LinkAnnotation, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions,
    Point, Polygon, PolygonRing, Pt, RawImage, RawImageData, RawImageFormat, Rect, Rgb,
    TextItem, WindingOrder, XObjectTransform,
};

const PT_PER_MM: f32 = 72.0 / 25.4;

/// Document metadata written to the Info dictionary.
#[derive(Debug, Clone, Default)]
pub struct PdfMetadata {
    pub title: String,
    pub author: String,
    pub creator: String,
}

/// A [`Surface`] that produces a PDF file.
pub struct PdfSurface {
    state: GraphicsState,
    geometry: PageGeometry,
    doc: PdfDocument,
    pages: Vec<Vec<Op>>,
    metadata: PdfMetadata,
}

impl PdfSurface {
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            state: GraphicsState::default(),
            geometry,
            doc: PdfDocument::new(""),
            pages: vec![Vec::new()],
            metadata: PdfMetadata::default(),
        }
    }

    pub fn set_metadata(&mut self, metadata: PdfMetadata) {
        self.metadata = metadata;
    }

    fn x(&self, mm: f32) -> Pt {
        Pt(mm * PT_PER_MM)
    }

    // Flips a top-down millimetre coordinate into PDF user space.
    fn y(&self, mm: f32) -> Pt {
        Pt((self.geometry.page_height - mm) * PT_PER_MM)
    }

    fn point(&self, x: f32, y: f32) -> LinePoint {
        LinePoint {
            p: Point {
                x: self.x(x),
                y: self.y(y),
            },
            bezier: false,
        }
    }

    fn page(&mut self) -> &mut Vec<Op> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn push(&mut self, op: Op) {
        self.page().push(op);
    }

    /// Assembles and serializes the document.
    pub fn to_bytes(mut self) -> Vec<u8> {
        let info = &mut self.doc.metadata.info;
        info.document_title = self.metadata.title;
        info.author = self.metadata.author;
        info.creator = self.metadata.creator;
        info.producer = concat!("mathdown2pdf ", env!("CARGO_PKG_VERSION")).to_string();

        let (width, height) = (
            Mm(self.geometry.page_width),
            Mm(self.geometry.page_height),
        );
        let pages: Vec<PdfPage> = self
            .pages
            .into_iter()
            .map(|ops| PdfPage::new(width, height, ops))
            .collect();

        let mut warnings = Vec::new();
        let bytes = self
            .doc
            .with_pages(pages)
            .save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            debug!("pdf serializer reported {} warning(s)", warnings.len());
        }
        bytes
    }
}

fn pdf_color(color: Color) -> printpdf::Color {
    let (r, g, b) = color.to_unit();
    printpdf::Color::Rgb(Rgb {
        r,
        g,
        b,
        icc_profile: None,
    })
}

impl Surface for PdfSurface {
    fn state(&self) -> &GraphicsState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut GraphicsState {
        &mut self.state
    }

    fn add_page(&mut self) {
        self.pages.push(Vec::new());
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn draw_text(&mut self, x: f32, y: f32, text: &str) {
        let text = to_winansi_text(text);
        if text.is_empty() {
            return;
        }
        let font = self.state.font.builtin();
        let size = Pt(self.state.font_size);
        let col = pdf_color(self.state.text_color);
        let pos = Point {
            x: self.x(x),
            y: self.y(y),
        };
        self.push(Op::SaveGraphicsState);
        self.push(Op::StartTextSection);
        self.push(Op::SetFillColor { col });
        self.push(Op::SetFontSizeBuiltinFont { size, font });
        self.push(Op::SetTextCursor { pos });
        self.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(text)],
            font,
        });
        self.push(Op::EndTextSection);
        self.push(Op::RestoreGraphicsState);
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
        let image = RawImage {
            pixels: RawImageData::U8(raster.pixels.clone()),
            width: raster.width as usize,
            height: raster.height as usize,
            data_format: RawImageFormat::RGBA8,
            tag: Vec::new(),
        };
        let id = self.doc.add_image(&image);

        // At 72 dpi one pixel spans one point.
        let transform = XObjectTransform {
            translate_x: Some(self.x(x)),
            translate_y: Some(self.y(y + height)),
            scale_x: Some(width * PT_PER_MM / raster.width as f32),
            scale_y: Some(height * PT_PER_MM / raster.height as f32),
            dpi: Some(72.0),
            ..Default::default()
        };
        self.push(Op::UseXobject { id, transform });
        Ok(())
    }

    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        let col = pdf_color(self.state.draw_color);
        let pt = Pt(self.state.line_width * PT_PER_MM);
        let line = Line {
            points: vec![self.point(x1, y1), self.point(x2, y2)],
            is_closed: false,
        };
        self.push(Op::SaveGraphicsState);
        self.push(Op::SetOutlineColor { col });
        self.push(Op::SetOutlineThickness { pt });
        self.push(Op::DrawLine { line });
        self.push(Op::RestoreGraphicsState);
    }

    fn draw_rect(&mut self, x: f32, y: f32, width: f32, height: f32, mode: PaintMode) {
        let points = vec![
            self.point(x, y),
            self.point(x + width, y),
            self.point(x + width, y + height),
            self.point(x, y + height),
        ];
        let paint = match mode {
            PaintMode::Fill => printpdf::PaintMode::Fill,
            PaintMode::Stroke => printpdf::PaintMode::Stroke,
        };
        let polygon = Polygon {
            rings: vec![PolygonRing { points }],
            mode: paint,
            winding_order: WindingOrder::NonZero,
        };
        self.push(Op::SaveGraphicsState);
        match mode {
            PaintMode::Fill => {
                let col = pdf_color(self.state.fill_color);
                self.push(Op::SetFillColor { col });
            }
            PaintMode::Stroke => {
                let col = pdf_color(self.state.draw_color);
                let pt = Pt(self.state.line_width * PT_PER_MM);
                self.push(Op::SetOutlineColor { col });
                self.push(Op::SetOutlineThickness { pt });
            }
        }
        self.push(Op::DrawPolygon { polygon });
        self.push(Op::RestoreGraphicsState);
    }

    fn add_link(&mut self, x: f32, y: f32, width: f32, height: f32, href: &str) {
        let rect = Rect {
            x: self.x(x),
            y: self.y(y + height),
            width: Pt(width * PT_PER_MM),
            height: Pt(height * PT_PER_MM),
        };
        let link = LinkAnnotation::new(rect, Actions::Uri(href.to_string()), None, None, None);
        self.push(Op::LinkAnnotation { link });
    }
}
