//! Block rendering.
//!
//! [`Dispatcher::render_block`] maps each block node to its handler. Every
//! handler receives the top edge of the area it may use and returns the top
//! edge of the next block, trailing spacing included. Handlers never leave
//! graphics state behind: the dispatcher saves it before and restores it
//! after each block.

use crate::document::{Node, NodeKind};
use crate::flow::{Column, FlowMode, TextFlow};
use crate::highlighting::{highlight_lines, is_supported};
use crate::inline::{literal_math, InlineComposer};
use crate::math::{MathMode, MathResolver};
use crate::metrics::{self, FontFace};
use crate::paginate::Pager;
use crate::styling::{pt_to_mm, PageGeometry, RenderStyle, StyleMatch};
use crate::surface::{PaintMode, Surface};
use crate::wrap::{wrap_code_line, wrap_text};
use log::{debug, warn};
use std::fmt;
use std::ops::Range;

/// Room kept below a heading so it does not end up alone at the bottom of a page.
const HEADING_KEEP_WITH_NEXT: f32 = 10.0;

/// Room reserved before a display equation is started.
const DISPLAY_MATH_RESERVE: f32 = 35.0;

/// Distance between a level 1-2 heading's last baseline and its rule.
const HEADING_RULE_OFFSET: f32 = 2.0;

/// Nesting at which list indentation stops growing.
const MAX_LIST_INDENT_DEPTH: usize = 1;

/// Where a block is being rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockContext {
    pub column: Column,
    pub quote_depth: usize,
    pub list_depth: usize,
}

impl BlockContext {
    /// The full content column of a page.
    pub fn root(geometry: &PageGeometry) -> Self {
        Self {
            column: Column::new(geometry.margin, geometry.page_width - geometry.margin),
            quote_depth: 0,
            list_depth: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A node that only exists inside a parent reached the dispatcher on its own.
    Unsupported { kind: NodeKind },
    /// A table whose first row has no cells, so no column width can be derived.
    EmptyTable,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RenderError::Unsupported { kind } => {
                write!(f, "a {} cannot be rendered outside its parent", kind)
            }
            RenderError::EmptyTable => write!(f, "table has no columns"),
        }
    }
}

impl std::error::Error for RenderError {}

/// The accent line of a quote that is still being rendered.
#[derive(Debug, Clone, Copy)]
struct OpenQuote {
    accent_x: f32,
    segment_top: f32,
}

/// Where an inline flow stopped.
#[derive(Debug, Clone, Copy)]
struct FlowEnd {
    baseline: f32,
    bottom: f32,
    overhang: f32,
}

pub struct Dispatcher<'a> {
    surface: &'a mut dyn Surface,
    style: &'a StyleMatch,
    resolver: &'a mut MathResolver,
    pager: Pager,
    open_quotes: Vec<OpenQuote>,
    /// Lowest position drawn on the current page by the block in progress.
    reach: f32,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        surface: &'a mut dyn Surface,
        style: &'a StyleMatch,
        resolver: &'a mut MathResolver,
    ) -> Self {
        Self {
            surface,
            style,
            resolver,
            pager: Pager::new(style.page),
            open_quotes: Vec::new(),
            reach: style.page.margin,
        }
    }

    pub fn surface(&self) -> &dyn Surface {
        &*self.surface
    }

    pub fn equation_failures(&self) -> usize {
        self.resolver.failures()
    }

    /// Marks the start of a top-level block at `top`.
    pub fn begin_block(&mut self, top: f32) {
        self.reach = top;
    }

    /// Lowest position the current block has reached on the current page.
    ///
    /// A block that fails halfway leaves its partial output behind; the next
    /// block starts here instead of on top of it.
    pub fn reach(&self) -> f32 {
        self.reach
    }

    fn advance(&mut self, y: f32) {
        self.reach = self.reach.max(y);
    }

    /// Returns `y` when `needed` fits, otherwise breaks the page and returns
    /// the new top.
    pub fn ensure_space(&mut self, y: f32, needed: f32) -> f32 {
        if self.pager.fits(y, needed) {
            y
        } else {
            self.break_page(y)
        }
    }

    /// Starts a new page. Quotes still open get their accent drawn down to
    /// `content_bottom` on the page being left and continue from the top of
    /// the new one.
    pub fn break_page(&mut self, content_bottom: f32) -> f32 {
        let saved = self.surface.save_state();
        for quote in self.open_quotes.clone() {
            self.quote_accent(quote.accent_x, quote.segment_top, content_bottom);
        }
        self.surface.restore_state(saved);

        let top = self.pager.new_page(&mut *self.surface);
        for quote in &mut self.open_quotes {
            quote.segment_top = top;
        }
        self.reach = top;
        top
    }

    /// Renders `node` with its top edge at `top` and returns the next block's top.
    pub fn render_block(
        &mut self,
        node: &Node,
        top: f32,
        ctx: &BlockContext,
    ) -> Result<f32, RenderError> {
        let saved = self.surface.save_state();
        let result = self.dispatch(node, top, ctx);
        self.surface.restore_state(saved);
        if let Ok(next) = result {
            self.advance(next);
        }
        result
    }

    /// The room `node` needs before it may start on the current page.
    pub fn min_height(&self, node: &Node, ctx: &BlockContext) -> f32 {
        let style = self.style;
        match node {
            Node::Heading { level, .. } => {
                let h = &style.heading;
                h.top_margin_for(*level)
                    + pt_to_mm(h.size_for(*level)) * h.line_advance
                    + h.bottom_margin
                    + HEADING_KEEP_WITH_NEXT
            }
            Node::CodeBlock { code, .. } => {
                let lines = self.code_layout(code, ctx.column).len();
                style.code.before_spacing + self.code_box_height(lines)
            }
            Node::Table { .. } => style.table.before_spacing + style.table.min_row_height,
            Node::BlockQuote(children) => {
                let inner = self.quote_context(ctx);
                style.block_quote.before_spacing
                    + children
                        .first()
                        .map(|c| self.min_height(c, &inner))
                        .unwrap_or(0.0)
            }
            Node::HorizontalRule => style.horizontal_rule.gap,
            Node::MathDisplay { .. } => DISPLAY_MATH_RESERVE,
            Node::ListItem(_) | Node::TableRow(_) | Node::TableCell { .. } => 0.0,
            _ => self.text_style(ctx).line_height(),
        }
    }

    fn dispatch(&mut self, node: &Node, top: f32, ctx: &BlockContext) -> Result<f32, RenderError> {
        match node {
            Node::Heading { level, children } => Ok(self.heading(*level, children, top, ctx)),
            Node::Paragraph(children) => Ok(self.paragraph(children, top, ctx)),
            Node::List {
                ordered,
                start,
                items,
            } => self.list(*ordered, *start, items, top, ctx),
            Node::Table { rows } => self.table(rows, top, ctx),
            Node::CodeBlock { language, code } => {
                Ok(self.code_block(language.as_deref(), code, top, ctx))
            }
            Node::BlockQuote(children) => self.block_quote(children, top, ctx),
            Node::HorizontalRule => Ok(self.horizontal_rule(top, ctx)),
            Node::MathDisplay { source } => Ok(self.display_math(source, top, ctx)),
            Node::ListItem(_) | Node::TableRow(_) | Node::TableCell { .. } => {
                Err(RenderError::Unsupported { kind: node.kind() })
            }
            // Inline content at block level reads as a paragraph of its own.
            Node::Text(_)
            | Node::Emphasis(_)
            | Node::Strong(_)
            | Node::CodeSpan(_)
            | Node::Link { .. }
            | Node::MathInline { .. }
            | Node::LineBreak
            | Node::Span(_) => Ok(self.paragraph(std::slice::from_ref(node), top, ctx)),
        }
    }

    /// Body text style for `ctx`; quoted text is italic and muted.
    fn text_style(&self, ctx: &BlockContext) -> RenderStyle {
        let base = self.style.base_text();
        if ctx.quote_depth > 0 {
            base.with_italic().with_color(self.style.block_quote.color)
        } else {
            base
        }
    }

    fn apply_style(&mut self, style: &RenderStyle) {
        self.surface.set_font(style.face());
        self.surface.set_font_size(style.font_size);
        self.surface.set_text_color(style.color);
    }

    /// Runs an inline flow over `children` in `column`.
    fn flow_inline(
        &mut self,
        children: &[Node],
        column: Column,
        top: f32,
        style: RenderStyle,
        mode: FlowMode,
    ) -> FlowEnd {
        let mut flow = TextFlow::new(&mut *self.surface, column, top, style.font_size, mode);
        let mut composer = InlineComposer::new(self.style, &mut *self.resolver);
        composer.compose(children, &mut flow, style);
        FlowEnd {
            baseline: flow.current_y(),
            bottom: flow.line_bottom(),
            overhang: flow.overhang(),
        }
    }

    fn heading(&mut self, level: u8, children: &[Node], top: f32, ctx: &BlockContext) -> f32 {
        let sm = self.style;
        let h = &sm.heading;
        let style = RenderStyle::new(h.size_for(level), h.color_for(level)).with_bold();
        let face = style.face();
        let text: String = children.iter().map(Node::text_content).collect();
        let lines = wrap_text(&text, ctx.column.width(), |s| {
            metrics::text_width_mm(s, face, style.font_size)
        });

        self.apply_style(&style);
        let mut y = top + h.top_margin_for(level);
        for line in &lines {
            y += style.em() * h.line_advance;
            if !line.is_empty() {
                self.surface.draw_text(ctx.column.start_x, y, line);
            }
        }

        if (1..=2).contains(&level) {
            let i = (level - 1) as usize;
            self.surface.set_draw_color(h.rule_colors[i]);
            self.surface.set_line_width(h.rule_widths[i]);
            let rule_y = y + HEADING_RULE_OFFSET;
            self.surface
                .draw_line(ctx.column.start_x, rule_y, ctx.column.max_x, rule_y);
        }
        y + h.bottom_margin
    }

    fn paragraph(&mut self, children: &[Node], top: f32, ctx: &BlockContext) -> f32 {
        let style = self.text_style(ctx);
        let end = self.flow_inline(children, ctx.column, top, style, FlowMode::Draw);
        end.baseline + end.overhang + self.style.text.after_spacing
    }

    fn list(
        &mut self,
        ordered: bool,
        start: u64,
        items: &[Node],
        top: f32,
        ctx: &BlockContext,
    ) -> Result<f32, RenderError> {
        let sm = self.style;
        let ls = &sm.list;
        let (marker_x, body) = if ctx.list_depth > MAX_LIST_INDENT_DEPTH {
            (ctx.column.start_x - ls.indent, ctx.column)
        } else {
            (ctx.column.start_x, ctx.column.indented(ls.indent))
        };
        let inner = BlockContext {
            column: body,
            list_depth: ctx.list_depth + 1,
            ..*ctx
        };
        let style = self.text_style(ctx);

        let mut y = top;
        for (i, item) in items.iter().enumerate() {
            y = self.ensure_space(y, style.line_height());
            let marker = if ordered {
                format!("{}.", start.saturating_add(i as u64))
            } else {
                ls.bullet.clone()
            };
            self.apply_style(&style);
            self.surface.draw_text(marker_x, y + style.em(), &marker);

            y = self.list_item(item.children(), y, &inner, style)?;
            if i + 1 < items.len() {
                y += ls.item_spacing;
            }
        }

        if ctx.list_depth == 0 {
            Ok(y + ls.after_spacing)
        } else {
            Ok(y)
        }
    }

    /// Flows the inline parts of an item and renders nested blocks below them.
    fn list_item(
        &mut self,
        children: &[Node],
        top: f32,
        ctx: &BlockContext,
        style: RenderStyle,
    ) -> Result<f32, RenderError> {
        let flows = |n: &Node| !n.is_block() || matches!(n, Node::Paragraph(_));
        let mut y = top;
        let mut i = 0;
        while i < children.len() {
            if flows(&children[i]) {
                let start = i;
                while i < children.len() && flows(&children[i]) {
                    i += 1;
                }
                let end =
                    self.flow_inline(&children[start..i], ctx.column, y, style, FlowMode::Draw);
                y = end.bottom;
                self.advance(y);
            } else {
                y = self.render_block(&children[i], y, ctx)?;
                i += 1;
            }
        }
        Ok(y)
    }

    fn table(&mut self, rows: &[Node], top: f32, ctx: &BlockContext) -> Result<f32, RenderError> {
        let sm = self.style;
        let ts = &sm.table;
        let cols = rows.first().map(|r| r.children().len()).unwrap_or(0);
        if cols == 0 {
            return Err(RenderError::EmptyTable);
        }
        let col_w = ctx.column.width() / cols as f32;
        let base = RenderStyle::new(ts.size, ts.color);
        let base = if ctx.quote_depth > 0 {
            base.with_italic()
        } else {
            base
        };
        let cell_column = |c: usize| {
            let x0 = ctx.column.start_x + c as f32 * col_w;
            Column::new(x0 + ts.padding, (x0 + col_w - ts.padding).max(x0 + ts.padding))
        };
        let cell_style = |cell: &Node| match cell {
            Node::TableCell { header: true, .. } => base.with_bold(),
            _ => base,
        };

        let mut y = top + ts.before_spacing;
        for row in rows {
            let cells = row.children();

            // Measure every cell first so the whole row shares one height.
            let mut row_h = ts.min_row_height;
            for (c, cell) in cells.iter().take(cols).enumerate() {
                let end = self.flow_inline(
                    cell.children(),
                    cell_column(c),
                    ts.padding,
                    cell_style(cell),
                    FlowMode::Measure,
                );
                row_h = row_h.max(end.bottom + ts.padding);
            }

            y = self.ensure_space(y, row_h);

            let header = cells
                .iter()
                .any(|c| matches!(c, Node::TableCell { header: true, .. }));
            if header {
                self.surface.set_fill_color(ts.header_background);
                self.surface.draw_rect(
                    ctx.column.start_x,
                    y,
                    col_w * cols as f32,
                    row_h,
                    PaintMode::Fill,
                );
            }

            for c in 0..cols {
                if let Some(cell) = cells.get(c) {
                    self.flow_inline(
                        cell.children(),
                        cell_column(c),
                        y + ts.padding,
                        cell_style(cell),
                        FlowMode::Draw,
                    );
                }
                self.surface.set_draw_color(ts.border);
                self.surface.set_line_width(ts.border_width);
                self.surface.draw_rect(
                    ctx.column.start_x + c as f32 * col_w,
                    y,
                    col_w,
                    row_h,
                    PaintMode::Stroke,
                );
            }
            y += row_h;
            self.advance(y);
        }
        Ok(y + ts.after_spacing)
    }

    /// Wrapped visual lines of a code block as `(source line, byte range)`.
    fn code_layout(&self, code: &str, column: Column) -> Vec<(usize, Range<usize>)> {
        let cs = &self.style.code;
        let inner = column.width() - 2.0 * cs.padding;
        let code = expand_tabs(code);
        code_lines(&code)
            .enumerate()
            .flat_map(|(i, line)| {
                wrap_code_line(line, inner, |s| {
                    metrics::text_width_mm(s, FontFace::MONO, cs.size)
                })
                .into_iter()
                .map(move |r| (i, r))
            })
            .collect()
    }

    fn code_box_height(&self, visual_lines: usize) -> f32 {
        visual_lines as f32 * self.style.code.line_height + 2.0 * self.style.code.padding
    }

    fn code_block(
        &mut self,
        language: Option<&str>,
        code: &str,
        top: f32,
        ctx: &BlockContext,
    ) -> f32 {
        let sm = self.style;
        let cs = &sm.code;
        let layout = self.code_layout(code, ctx.column);
        let code = expand_tabs(code);
        let lines: Vec<&str> = code_lines(&code).collect();
        let y0 = top + cs.before_spacing;
        let height = self.code_box_height(layout.len());

        self.surface.set_fill_color(cs.background);
        self.surface
            .draw_rect(ctx.column.start_x, y0, ctx.column.width(), height, PaintMode::Fill);

        let highlighted = match language {
            Some(lang) if cs.highlight && is_supported(lang) => {
                debug!("highlighting {} code block", lang);
                highlight_lines(lines.join("\n").as_str(), lang)
            }
            Some(lang) if cs.highlight => {
                debug!("no grammar for `{}`, drawing plain code", lang);
                None
            }
            _ => None,
        };

        let x0 = ctx.column.start_x + cs.padding;
        let plain = RenderStyle::new(cs.size, cs.color).with_monospace();
        for (n, (i, range)) in layout.iter().enumerate() {
            let line = lines.get(*i).copied().unwrap_or_default();
            let baseline = y0 + cs.padding + cs.line_height * (n as f32 + 0.75);
            let spans = highlighted.as_ref().and_then(|h| h.get(*i));
            match spans {
                Some(spans) => {
                    for span in spans {
                        let lo = span.range.start.max(range.start);
                        let hi = span.range.end.min(range.end);
                        if lo >= hi || line[lo..hi].trim().is_empty() {
                            continue;
                        }
                        let x = x0 + metrics::text_width_mm(&line[range.start..lo], FontFace::MONO, cs.size);
                        let mut piece = plain.with_color(span.color);
                        if span.bold {
                            piece = piece.with_bold();
                        }
                        self.apply_style(&piece);
                        self.surface.draw_text(x, baseline, &line[lo..hi]);
                    }
                }
                None => {
                    let text = &line[range.clone()];
                    if !text.trim().is_empty() {
                        self.apply_style(&plain);
                        self.surface.draw_text(x0, baseline, text);
                    }
                }
            }
        }
        y0 + height + cs.after_spacing
    }

    fn quote_context(&self, ctx: &BlockContext) -> BlockContext {
        BlockContext {
            column: ctx.column.indented(self.style.block_quote.indent),
            quote_depth: ctx.quote_depth + 1,
            ..*ctx
        }
    }

    /// Spacing a block leaves below its visible content.
    fn trailing_space(&self, node: &Node, ctx: &BlockContext) -> f32 {
        let style = self.style;
        match node {
            Node::Heading { .. } => style.heading.bottom_margin,
            Node::List { .. } if ctx.list_depth == 0 => style.list.after_spacing,
            Node::Table { .. } => style.table.after_spacing,
            Node::CodeBlock { .. } => style.code.after_spacing,
            Node::BlockQuote(_) => style.block_quote.after_spacing,
            Node::HorizontalRule => style.horizontal_rule.gap / 2.0,
            Node::MathDisplay { .. } => style.math.gap / 2.0,
            Node::List { .. } | Node::ListItem(_) | Node::TableRow(_) | Node::TableCell { .. } => {
                0.0
            }
            _ => style.text.after_spacing,
        }
    }

    fn block_quote(
        &mut self,
        children: &[Node],
        top: f32,
        ctx: &BlockContext,
    ) -> Result<f32, RenderError> {
        let sm = self.style;
        let qs = &sm.block_quote;
        let inner = self.quote_context(ctx);
        let accent_x = ctx.column.start_x + qs.accent_width / 2.0;

        let mut y = top + qs.before_spacing;
        let mut content_bottom = y;
        self.open_quotes.push(OpenQuote {
            accent_x,
            segment_top: y,
        });
        let mut result = Ok(());
        for child in children {
            let needed = self.min_height(child, &inner);
            if !self.pager.fits(y, needed) {
                y = self.break_page(content_bottom);
                content_bottom = y;
            }
            match self.render_block(child, y, &inner) {
                Ok(next) => {
                    y = next;
                    content_bottom = y - self.trailing_space(child, &inner);
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        // Children that break pages themselves move the segment top along.
        let segment_top = self
            .open_quotes
            .pop()
            .map(|q| q.segment_top)
            .unwrap_or(top);
        self.quote_accent(accent_x, segment_top, content_bottom.max(segment_top));
        result?;
        Ok(y.max(content_bottom) + qs.after_spacing)
    }

    fn quote_accent(&mut self, x: f32, from: f32, to: f32) {
        if to <= from {
            return;
        }
        let sm = self.style;
        let qs = &sm.block_quote;
        self.surface.set_draw_color(qs.accent);
        self.surface.set_line_width(qs.accent_width);
        self.surface.draw_line(x, from, x, to);
    }

    fn horizontal_rule(&mut self, top: f32, ctx: &BlockContext) -> f32 {
        let sm = self.style;
        let rs = &sm.horizontal_rule;
        let y = top + rs.gap / 2.0;
        self.surface.set_draw_color(rs.color);
        self.surface.set_line_width(rs.width);
        self.surface
            .draw_line(ctx.column.start_x, y, ctx.column.max_x, y);
        top + rs.gap
    }

    fn display_math(&mut self, source: &str, top: f32, ctx: &BlockContext) -> f32 {
        let sm = self.style;
        let ms = &sm.math;
        if let Ok(image) = self.resolver.resolve(source, MathMode::Display) {
            let (w, h) = image.fit_mm(ms.display_scale, ctx.column.width());
            let x = ctx.column.start_x + (ctx.column.width() - w) / 2.0;
            let y = top + ms.gap / 2.0;
            match self.surface.draw_image(&image.raster, x, y, w, h) {
                Ok(()) => return top + h + ms.gap,
                Err(e) => {
                    warn!("could not place equation `{}`: {}", source, e);
                    self.resolver.record_failure();
                }
            }
        }
        let literal = [Node::Text(literal_math(source, MathMode::Display))];
        self.paragraph(&literal, top, ctx)
    }
}

/// Literal lines of a code block, without the final newline.
fn code_lines(code: &str) -> std::str::Split<'_, char> {
    code.trim_end_matches('\n').split('\n')
}

fn expand_tabs(code: &str) -> String {
    code.replace('\t', "    ").replace('\r', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latex::{TypesetError, Typesetter};
    use crate::metrics::FontFamily;
    use crate::styling::Color;
    use crate::surface::{DrawOp, RecordingSurface};

    struct BoxTypesetter;

    impl Typesetter for BoxTypesetter {
        fn typeset(&self, source: &str, _mode: MathMode) -> Result<String, TypesetError> {
            if source.contains("bad") {
                return Err(TypesetError::Engine("rejected".into()));
            }
            Ok(r#"<svg xmlns="http://www.w3.org/2000/svg" width="120" height="40">
                <rect x="0" y="0" width="120" height="40" fill="black"/>
            </svg>"#
                .to_string())
        }
    }

    fn render(node: &Node) -> (RecordingSurface, f32) {
        render_at(node, 20.0)
    }

    fn render_at(node: &Node, top: f32) -> (RecordingSurface, f32) {
        let style = StyleMatch::default();
        let mut resolver = MathResolver::new(Box::new(BoxTypesetter));
        let mut surface = RecordingSurface::new();
        let next = {
            let mut d = Dispatcher::new(&mut surface, &style, &mut resolver);
            d.render_block(node, top, &BlockContext::root(&style.page))
                .unwrap()
        };
        (surface, next)
    }

    fn text(s: &str) -> Node {
        Node::Text(s.to_string())
    }

    fn words(surface: &RecordingSurface) -> Vec<&str> {
        surface.texts().iter().map(|t| t.3).collect()
    }

    #[test]
    fn heading_uses_level_size_and_bold() {
        let (surface, next) = render(&Node::Heading {
            level: 1,
            children: vec![text("Title")],
        });
        match &surface.ops()[0] {
            DrawOp::Text { text, font, size, y, .. } => {
                assert_eq!(text, "Title");
                assert!(font.bold);
                assert_eq!(*size, 20.0);
                assert!((*y - (20.0 + 15.0 + pt_to_mm(20.0) * 0.8)).abs() < 1e-4);
            }
            other => panic!("expected heading text, got {:?}", other),
        }
        assert!(surface.ops().iter().any(|op| matches!(op, DrawOp::Line { .. })));
        assert!(next > 20.0 + 15.0 + 8.0);
    }

    #[test]
    fn low_level_headings_have_no_rule() {
        let (surface, _) = render(&Node::Heading {
            level: 3,
            children: vec![text("Small")],
        });
        assert!(!surface.ops().iter().any(|op| matches!(op, DrawOp::Line { .. })));
    }

    #[test]
    fn paragraph_returns_baseline_plus_spacing() {
        let (surface, next) = render(&Node::Paragraph(vec![text("Hello world")]));
        let baseline = surface.texts()[0].2;
        assert!((next - (baseline + 10.0)).abs() < 1e-4);
    }

    #[test]
    fn graphics_state_is_restored_after_each_block() {
        let style = StyleMatch::default();
        let mut resolver = MathResolver::new(Box::new(BoxTypesetter));
        let mut surface = RecordingSurface::new();
        let before = surface.save_state();
        {
            let mut d = Dispatcher::new(&mut surface, &style, &mut resolver);
            let ctx = BlockContext::root(&style.page);
            d.render_block(
                &Node::Heading {
                    level: 2,
                    children: vec![text("x")],
                },
                20.0,
                &ctx,
            )
            .unwrap();
        }
        assert_eq!(surface.state(), &before);
    }

    #[test]
    fn list_markers_sit_left_of_indented_bodies() {
        let (surface, _) = render(&Node::List {
            ordered: true,
            start: 3,
            items: vec![
                Node::ListItem(vec![text("first")]),
                Node::ListItem(vec![text("second")]),
            ],
        });
        let texts = surface.texts();
        assert_eq!(texts[0].3, "3.");
        assert_eq!(texts[0].1, 20.0);
        assert_eq!(texts[1].3, "first");
        assert_eq!(texts[1].1, 32.0);
        assert_eq!(texts[0].2, texts[1].2);
        assert_eq!(texts[2].3, "4.");
        assert!(texts[2].2 > texts[1].2);
    }

    #[test]
    fn nested_lists_indent_once_then_clamp() {
        let deepest = Node::List {
            ordered: false,
            start: 1,
            items: vec![Node::ListItem(vec![text("c")])],
        };
        let middle = Node::List {
            ordered: false,
            start: 1,
            items: vec![Node::ListItem(vec![text("b"), deepest])],
        };
        let (surface, _) = render(&Node::List {
            ordered: false,
            start: 1,
            items: vec![Node::ListItem(vec![text("a"), middle])],
        });
        let x_of = |w: &str| {
            surface
                .texts()
                .iter()
                .find(|t| t.3 == w)
                .map(|t| t.1)
                .unwrap()
        };
        assert_eq!(x_of("a"), 32.0);
        assert_eq!(x_of("b"), 44.0);
        assert_eq!(x_of("c"), 44.0);
    }

    #[test]
    fn block_quote_text_is_italic_muted_with_accent() {
        let style = StyleMatch::default();
        let (surface, _) = render(&Node::BlockQuote(vec![Node::Paragraph(vec![text("quoted")])]));
        let text_op = surface.ops().iter().find_map(|op| match op {
            DrawOp::Text { font, color, x, .. } => Some((*font, *color, *x)),
            _ => None,
        });
        let (font, color, x) = text_op.unwrap();
        assert!(font.italic);
        assert_eq!(color, style.block_quote.color);
        assert_eq!(x, 20.0 + style.block_quote.indent);
        let accent = surface.ops().iter().find_map(|op| match op {
            DrawOp::Line { x1, x2, y1, y2, color, .. } => Some((*x1, *x2, *y1, *y2, *color)),
            _ => None,
        });
        let (x1, x2, y1, y2, color) = accent.unwrap();
        assert_eq!(x1, x2);
        assert!(y2 > y1);
        assert_eq!(color, style.block_quote.accent);
    }

    #[test]
    fn quote_accent_follows_a_list_across_pages() {
        let items = (0..30)
            .map(|i| Node::ListItem(vec![text(&format!("item {}", i))]))
            .collect();
        let quote = Node::BlockQuote(vec![Node::List {
            ordered: false,
            start: 1,
            items,
        }]);
        let (surface, _) = render_at(&quote, 200.0);
        assert!(surface.page_count() > 1);

        let accents: Vec<(usize, f32, f32)> = surface
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Line { page, x1, x2, y1, y2, .. } if x1 == x2 => Some((*page, *y1, *y2)),
                _ => None,
            })
            .collect();
        let mut text_pages: Vec<usize> = surface.texts().iter().map(|t| t.0).collect();
        text_pages.dedup();
        let accent_pages: Vec<usize> = accents.iter().map(|a| a.0).collect();
        assert_eq!(accent_pages, text_pages);

        for (page, y1, y2) in &accents {
            assert!(y2 > y1);
            let texts = surface.texts();
            let on_page: Vec<f32> = texts.iter().filter(|t| t.0 == *page).map(|t| t.2).collect();
            let lowest = on_page.iter().cloned().fold(f32::MIN, f32::max);
            let highest = on_page.iter().cloned().fold(f32::MAX, f32::min);
            assert!(*y1 <= highest && *y2 >= lowest - 5.0);
        }
        assert_eq!(accents[0].1, 200.0 + StyleMatch::default().block_quote.before_spacing);
        assert_eq!(accents[1].1, 20.0);
    }

    #[test]
    fn code_block_background_precedes_text_and_fits_lines() {
        let style = StyleMatch::default();
        let (surface, next) = render(&Node::CodeBlock {
            language: None,
            code: "let a = 1;\nlet b = 2;\n".into(),
        });
        let rect = match &surface.ops()[0] {
            DrawOp::Rect { height, mode: PaintMode::Fill, color, .. } => {
                assert_eq!(*color, style.code.background);
                *height
            }
            other => panic!("expected background first, got {:?}", other),
        };
        assert!((rect - (2.0 * 5.0 + 2.0 * 4.0)).abs() < 1e-4);
        assert_eq!(words(&surface), vec!["let a = 1;", "let b = 2;"]);
        match &surface.ops()[1] {
            DrawOp::Text { font, .. } => assert_eq!(font.family, FontFamily::Courier),
            other => panic!("expected code text, got {:?}", other),
        }
        assert!((next - (20.0 + 2.0 + rect + 8.0)).abs() < 1e-4);
    }

    #[test]
    fn long_code_lines_wrap_inside_the_box() {
        let long = "x".repeat(200);
        let (surface, _) = render(&Node::CodeBlock {
            language: None,
            code: long.clone(),
        });
        let texts = surface.texts();
        assert!(texts.len() > 1);
        let joined: String = texts.iter().map(|t| t.3).collect();
        assert_eq!(joined, long);
        for (_, x, _, t) in &texts {
            let w = metrics::text_width_mm(t, FontFace::MONO, 9.0);
            assert!(x + w <= 190.0 - 4.0 + 1e-3);
        }
    }

    #[test]
    fn highlighted_code_keeps_every_character() {
        let code = "fn main() {}";
        let (surface, _) = render(&Node::CodeBlock {
            language: Some("rust".into()),
            code: code.into(),
        });
        let colours: std::collections::HashSet<Color> = surface
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { color, .. } => Some(*color),
                _ => None,
            })
            .collect();
        assert!(colours.len() > 1);
        let visible: String = words(&surface).concat().replace(' ', "");
        assert_eq!(visible, code.replace(' ', ""));
    }

    #[test]
    fn unknown_language_draws_plain_code() {
        let style = StyleMatch::default();
        let (surface, _) = render(&Node::CodeBlock {
            language: Some("no-such-language".into()),
            code: "x = 1".into(),
        });
        let colours: Vec<Color> = surface
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { color, .. } => Some(*color),
                _ => None,
            })
            .collect();
        assert!(!colours.is_empty());
        assert!(colours.iter().all(|c| *c == style.code.color));
    }

    #[test]
    fn table_rows_share_the_tallest_cell_height() {
        let cell = |header: bool, s: &str| Node::TableCell {
            header,
            children: vec![text(s)],
        };
        let long = "word ".repeat(60);
        let (surface, _) = render(&Node::Table {
            rows: vec![
                Node::TableRow(vec![cell(true, "A"), cell(true, "B")]),
                Node::TableRow(vec![cell(false, &long), cell(false, "short")]),
                Node::TableRow(vec![cell(false, "1"), cell(false, "2")]),
            ],
        });
        let borders: Vec<(f32, f32, f32)> = surface
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Rect { mode: PaintMode::Stroke, x, y, height, .. } => Some((*x, *y, *height)),
                _ => None,
            })
            .collect();
        assert_eq!(borders.len(), 6);
        assert_eq!(borders[2].2, borders[3].2);
        assert_eq!(borders[2].1, borders[3].1);
        assert!(borders[2].2 > borders[0].2);
        let short_x = borders[3].0;
        let short = surface.texts().into_iter().find(|t| t.3 == "short").unwrap();
        assert!((short.1 - (short_x + 2.0)).abs() < 1e-4);
        let header = surface
            .ops()
            .iter()
            .filter(|op| matches!(op, DrawOp::Rect { mode: PaintMode::Fill, .. }))
            .count();
        assert_eq!(header, 1);
    }

    #[test]
    fn table_rows_move_whole_to_the_next_page() {
        let cell = |header: bool, s: String| Node::TableCell {
            header,
            children: vec![text(&s)],
        };
        let mut rows = vec![Node::TableRow(vec![
            cell(true, "Name".into()),
            cell(true, "Value".into()),
        ])];
        for i in 0..20 {
            rows.push(Node::TableRow(vec![
                cell(false, format!("row {}", i)),
                cell(false, format!("{}", i * i)),
            ]));
        }
        let (surface, next) = render_at(&Node::Table { rows }, 240.0);
        assert!(surface.page_count() > 1);

        let borders: Vec<(usize, f32, f32)> = surface
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Rect { page, mode: PaintMode::Stroke, y, height, .. } => {
                    Some((*page, *y, *height))
                }
                _ => None,
            })
            .collect();
        assert_eq!(borders.len(), 42);
        for row in borders.chunks(2) {
            assert_eq!(row[0].0, row[1].0);
            assert_eq!(row[0].1, row[1].1);
        }
        for (page, y, height) in &borders {
            if *page == 0 {
                assert!(y + height <= 277.0 + 1e-4);
            }
        }
        let first_moved = borders.iter().find(|b| b.0 == 1).unwrap();
        assert_eq!(first_moved.1, 20.0);
        assert!(next > 20.0 && next < 277.0);

        let fills: Vec<usize> = surface
            .ops()
            .iter()
            .filter_map(|op| match op {
                DrawOp::Rect { page, mode: PaintMode::Fill, .. } => Some(*page),
                _ => None,
            })
            .collect();
        assert_eq!(fills, vec![0]);
        let row_0 = surface.texts().into_iter().find(|t| t.3 == "0").unwrap();
        assert_eq!(row_0.0, 0);
    }

    #[test]
    fn ragged_rows_ignore_extras_and_pad_missing_cells() {
        let cell = |s: &str| Node::TableCell {
            header: false,
            children: vec![text(s)],
        };
        let (surface, _) = render(&Node::Table {
            rows: vec![
                Node::TableRow(vec![cell("a"), cell("b")]),
                Node::TableRow(vec![cell("c"), cell("d"), cell("extra")]),
                Node::TableRow(vec![cell("e")]),
            ],
        });
        assert!(!words(&surface).contains(&"extra"));
        let borders = surface
            .ops()
            .iter()
            .filter(|op| matches!(op, DrawOp::Rect { mode: PaintMode::Stroke, .. }))
            .count();
        assert_eq!(borders, 6);
    }

    #[test]
    fn empty_table_is_an_error() {
        let style = StyleMatch::default();
        let mut resolver = MathResolver::new(Box::new(BoxTypesetter));
        let mut surface = RecordingSurface::new();
        let mut d = Dispatcher::new(&mut surface, &style, &mut resolver);
        let err = d
            .render_block(&Node::Table { rows: vec![] }, 20.0, &BlockContext::root(&style.page))
            .unwrap_err();
        assert_eq!(err, RenderError::EmptyTable);
    }

    #[test]
    fn display_math_is_centred_and_fits_the_column() {
        let (surface, next) = render(&Node::MathDisplay {
            source: "\\int_0^1 x dx".into(),
        });
        let (_, x, y, w, h) = surface.images()[0];
        assert!(w <= 170.0 + 1e-4);
        assert!(((x - 20.0) - (190.0 - (x + w))).abs() < 1e-3);
        assert!((w / h - 3.0).abs() < 0.03);
        assert!((y - 23.0).abs() < 1e-4);
        assert!((next - (20.0 + h + 6.0)).abs() < 1e-4);
    }

    #[test]
    fn rejected_display_math_falls_back_to_literal() {
        let (surface, _) = render(&Node::MathDisplay {
            source: "badsource".into(),
        });
        assert!(surface.images().is_empty());
        assert_eq!(words(&surface), vec!["$$badsource$$"]);
    }

    #[test]
    fn horizontal_rule_spans_the_column() {
        let (surface, next) = render(&Node::HorizontalRule);
        match &surface.ops()[0] {
            DrawOp::Line { x1, x2, y1, .. } => {
                assert_eq!((*x1, *x2), (20.0, 190.0));
                assert_eq!(*y1, 24.0);
            }
            other => panic!("expected rule, got {:?}", other),
        }
        assert_eq!(next, 28.0);
    }

    #[test]
    fn list_items_break_pages_individually() {
        let items = (0..80)
            .map(|i| Node::ListItem(vec![text(&format!("item {}", i))]))
            .collect();
        let (surface, _) = render_at(
            &Node::List {
                ordered: false,
                start: 1,
                items,
            },
            200.0,
        );
        assert!(surface.page_count() > 1);
        for (page, _, y, _) in surface.texts() {
            if page == 0 {
                assert!(y <= 277.0);
            }
        }
    }
}
