//! Page breaking between blocks.
//!
//! The [`Paginator`] walks the top-level nodes in order. Before each one it
//! asks the dispatcher how much room the node needs to get started and opens
//! a new page when that would cross the bottom margin. Once a block has
//! started it is never split; a block taller than the remaining space simply
//! runs past the margin. Lists and tables use the same [`Pager`] check per
//! item and per row. A block that fails in non-strict mode is skipped; the
//! next one starts below whatever the failed block already drew.

use crate::blocks::{BlockContext, Dispatcher, RenderError};
use crate::document::{Document, NodeKind};
use crate::math::MathResolver;
use crate::styling::{PageGeometry, StyleMatch};
use crate::surface::Surface;
use log::{debug, warn};
use std::fmt;

/// Vertical positions closer than this to the top margin count as the top of the page.
const TOP_TOLERANCE: f32 = 0.01;

/// The page-break rule shared by every handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pager {
    geometry: PageGeometry,
}

impl Pager {
    pub fn new(geometry: PageGeometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    /// Whether `y` is the first writable position of a page.
    pub fn at_page_top(&self, y: f32) -> bool {
        y <= self.geometry.margin + TOP_TOLERANCE
    }

    /// Whether `needed` millimetres can start at `y` without a break.
    ///
    /// An empty page always fits: breaking there would only produce a blank page.
    pub fn fits(&self, y: f32, needed: f32) -> bool {
        y + needed <= self.geometry.bottom_limit() || self.at_page_top(y)
    }

    /// Appends a page and returns the cursor at its top margin.
    pub fn new_page(&self, surface: &mut dyn Surface) -> f32 {
        surface.add_page();
        debug!("page {} started", surface.page_count());
        self.geometry.margin
    }
}

/// Where one top-level node ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub index: usize,
    pub kind: NodeKind,
    /// Zero-based page the block started on.
    pub page: usize,
    pub top: f32,
    /// Cursor after the block, including its trailing spacing.
    pub bottom: f32,
    /// Room reserved before starting the block.
    pub reserved: f32,
    pub rendered: bool,
}

/// Summary of one layout pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub pages: usize,
    pub blocks: Vec<BlockRecord>,
    /// Equations that fell back to their literal source.
    pub equation_failures: usize,
    /// Blocks that failed and were left out.
    pub skipped: usize,
}

/// A block failure that aborted a strict layout pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockFailure {
    pub index: usize,
    pub kind: NodeKind,
    pub error: RenderError,
}

impl fmt::Display for BlockFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "block {} ({}) could not be rendered: {}",
            self.index + 1,
            self.kind,
            self.error
        )
    }
}

impl std::error::Error for BlockFailure {}

pub struct Paginator<'a> {
    dispatcher: Dispatcher<'a>,
    pager: Pager,
    strict: bool,
}

impl<'a> Paginator<'a> {
    pub fn new(
        surface: &'a mut dyn Surface,
        style: &'a StyleMatch,
        resolver: &'a mut MathResolver,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(surface, style, resolver),
            pager: Pager::new(style.page),
            strict: style.strict,
        }
    }

    /// Lays out every top-level node of `document`, in order.
    pub fn run(mut self, document: &Document) -> Result<RenderReport, BlockFailure> {
        let failures_before = self.dispatcher.equation_failures();
        let ctx = BlockContext::root(&self.pager.geometry());
        let mut report = RenderReport::default();
        let mut y = self.pager.geometry().margin;

        for (index, node) in document.blocks.iter().enumerate() {
            let reserved = self.dispatcher.min_height(node, &ctx);
            y = self.dispatcher.ensure_space(y, reserved);
            self.dispatcher.begin_block(y);
            let page = self.dispatcher.surface().current_page();
            debug!(
                "block {} ({}) on page {} at y={:.1}, reserving {:.1}mm",
                index + 1,
                node.kind(),
                page + 1,
                y,
                reserved
            );

            let (bottom, rendered) = match self.dispatcher.render_block(node, y, &ctx) {
                Ok(next) => (next, true),
                Err(error) => {
                    if self.strict {
                        return Err(BlockFailure {
                            index,
                            kind: node.kind(),
                            error,
                        });
                    }
                    warn!("skipping block {} ({}): {}", index + 1, node.kind(), error);
                    report.skipped += 1;
                    (self.dispatcher.reach(), false)
                }
            };
            report.blocks.push(BlockRecord {
                index,
                kind: node.kind(),
                page,
                top: y,
                bottom,
                reserved,
                rendered,
            });
            y = bottom;
        }

        report.pages = self.dispatcher.surface().page_count();
        report.equation_failures = self.dispatcher.equation_failures() - failures_before;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Node;
    use crate::latex::UnavailableTypesetter;
    use crate::surface::RecordingSurface;

    fn paragraph(text: &str) -> Node {
        Node::Paragraph(vec![Node::Text(text.to_string())])
    }

    fn run(document: &Document, style: &StyleMatch) -> (RecordingSurface, Result<RenderReport, BlockFailure>) {
        let mut surface = RecordingSurface::new();
        let mut resolver = MathResolver::new(Box::new(UnavailableTypesetter));
        let result = Paginator::new(&mut surface, style, &mut resolver).run(document);
        (surface, result)
    }

    #[test]
    fn pager_breaks_only_when_needed() {
        let pager = Pager::new(PageGeometry::A4);
        assert!(pager.fits(100.0, 50.0));
        assert!(!pager.fits(270.0, 10.0));

        let style = StyleMatch::default();
        let mut surface = RecordingSurface::new();
        let mut resolver = MathResolver::new(Box::new(UnavailableTypesetter));
        {
            let mut d = Dispatcher::new(&mut surface, &style, &mut resolver);
            assert_eq!(d.ensure_space(100.0, 50.0), 100.0);
            assert_eq!(d.ensure_space(270.0, 10.0), 20.0);
        }
        assert_eq!(surface.page_count(), 2);
    }

    #[test]
    fn empty_page_never_breaks() {
        let pager = Pager::new(PageGeometry::A4);
        assert!(pager.fits(20.0, 500.0));
        let mut surface = RecordingSurface::new();
        assert_eq!(pager.new_page(&mut surface), 20.0);
        assert_eq!(surface.page_count(), 2);
    }

    #[test]
    fn one_record_per_block_in_order() {
        let doc = Document::new(vec![
            Node::Heading {
                level: 1,
                children: vec![Node::Text("Title".into())],
            },
            paragraph("body"),
            Node::HorizontalRule,
        ]);
        let (_, report) = run(&doc, &StyleMatch::default());
        let report = report.unwrap();
        let kinds: Vec<NodeKind> = report.blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Heading, NodeKind::Paragraph, NodeKind::HorizontalRule]
        );
        for pair in report.blocks.windows(2) {
            assert_eq!(pair[0].bottom, pair[1].top);
        }
        assert_eq!(report.pages, 1);
    }

    #[test]
    fn long_documents_span_pages() {
        let doc = Document::new((0..60).map(|i| paragraph(&format!("paragraph {}", i))).collect());
        let style = StyleMatch::default();
        let (surface, report) = run(&doc, &style);
        let report = report.unwrap();
        assert!(report.pages > 1);
        assert_eq!(surface.page_count(), report.pages);
        for block in &report.blocks {
            assert!(
                block.top + block.reserved <= style.page.bottom_limit()
                    || (block.top - style.page.margin).abs() < 1e-3
            );
        }
    }

    #[test]
    fn failing_blocks_are_skipped_unless_strict() {
        let doc = Document::new(vec![
            paragraph("before"),
            Node::TableCell {
                header: false,
                children: vec![],
            },
            paragraph("after"),
        ]);
        let style = StyleMatch::default();
        let (surface, report) = run(&doc, &style);
        let report = report.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(!report.blocks[1].rendered);
        let words: Vec<&str> = surface.texts().iter().map(|t| t.3).collect();
        assert_eq!(words, vec!["before", "after"]);

        let strict = StyleMatch {
            strict: true,
            ..StyleMatch::default()
        };
        let (_, result) = run(&doc, &strict);
        let failure = result.unwrap_err();
        assert_eq!(failure.index, 1);
        assert_eq!(failure.kind, NodeKind::TableCell);
    }

    #[test]
    fn partially_drawn_failure_is_not_overprinted() {
        let doc = Document::new(vec![
            Node::List {
                ordered: false,
                start: 1,
                items: vec![Node::ListItem(vec![
                    Node::Text("drawn".into()),
                    Node::Table { rows: vec![] },
                ])],
            },
            paragraph("after"),
        ]);
        let (surface, report) = run(&doc, &StyleMatch::default());
        let report = report.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(report.blocks[0].bottom > report.blocks[0].top);
        let y_of = |w: &str| surface.texts().iter().find(|t| t.3 == w).map(|t| t.2).unwrap();
        assert!(y_of("after") > y_of("drawn"));
    }

    #[test]
    fn equation_failures_are_counted() {
        let doc = Document::new(vec![
            Node::Paragraph(vec![Node::MathInline { source: "x".into() }]),
            Node::MathDisplay { source: "y".into() },
        ]);
        let (_, report) = run(&doc, &StyleMatch::default());
        assert_eq!(report.unwrap().equation_failures, 2);
    }
}
