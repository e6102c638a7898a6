//! Inline composition: walks the inline children of a block and feeds them to
//! a [`TextFlow`] with the right style.
//!
//! Styles compose as the walk descends (bold inside italic is bold italic) and
//! revert automatically when a subtree ends, because [`RenderStyle`] is passed
//! by value. Equations are resolved through the [`MathResolver`]; an equation
//! that cannot be resolved or placed is written as its literal `$source$`.

use crate::document::Node;
use crate::flow::TextFlow;
use crate::math::{MathMode, MathResolver};
use crate::styling::{RenderStyle, StyleMatch};
use log::warn;

pub struct InlineComposer<'r> {
    style: &'r StyleMatch,
    resolver: &'r mut MathResolver,
}

impl<'r> InlineComposer<'r> {
    pub fn new(style: &'r StyleMatch, resolver: &'r mut MathResolver) -> Self {
        Self { style, resolver }
    }

    /// Composes `children` into `flow`, starting from `style`.
    pub fn compose(&mut self, children: &[Node], flow: &mut TextFlow, style: RenderStyle) {
        let mut previous_block = false;
        for child in children {
            let block = child.is_block() || matches!(child, Node::ListItem(_));
            if block && previous_block && !flow.at_line_start() {
                flow.break_line();
            }
            self.compose_node(child, flow, style);
            previous_block = block;
        }
    }

    fn compose_node(&mut self, node: &Node, flow: &mut TextFlow, style: RenderStyle) {
        match node {
            Node::Text(text) => write_text(text, flow, &style),
            Node::Strong(children) => self.compose(children, flow, style.with_bold()),
            Node::Emphasis(children) => self.compose(children, flow, style.with_italic()),
            Node::CodeSpan(code) => {
                let code_style = style
                    .with_monospace()
                    .with_color(self.style.inline_code.color)
                    .with_font_size(self.style.inline_code.size);
                flow.write_code(code, &code_style, self.style.inline_code.background, false);
            }
            Node::Link { href, children } => {
                let previous = flow.link().map(str::to_string);
                flow.set_link(href);
                self.compose(children, flow, style.with_color(self.style.link_color));
                match previous {
                    Some(outer) => flow.set_link(&outer),
                    None => flow.clear_link(),
                }
            }
            Node::MathInline { source } => self.write_math(source, MathMode::Inline, flow, &style),
            Node::MathDisplay { source } => {
                if !flow.at_line_start() {
                    flow.break_line();
                }
                self.write_math(source, MathMode::Display, flow, &style);
                flow.break_line();
            }
            Node::LineBreak => flow.break_line(),
            Node::CodeBlock { code, .. } => {
                let code_style = style.with_monospace().with_font_size(self.style.code.size);
                for line in code.lines() {
                    if !flow.at_line_start() {
                        flow.break_line();
                    }
                    write_text(line, flow, &code_style);
                }
            }
            Node::HorizontalRule => {
                if !flow.at_line_start() {
                    flow.break_line();
                }
            }
            Node::List { items, .. } => {
                for item in items {
                    if !flow.at_line_start() {
                        flow.break_line();
                    }
                    self.compose(item.children(), flow, style);
                }
            }
            Node::Heading { children, .. } => self.compose(children, flow, style.with_bold()),
            Node::Paragraph(children)
            | Node::ListItem(children)
            | Node::BlockQuote(children)
            | Node::TableRow(children)
            | Node::Span(children)
            | Node::TableCell { children, .. } => self.compose(children, flow, style),
            Node::Table { rows } => {
                for row in rows {
                    if !flow.at_line_start() {
                        flow.break_line();
                    }
                    self.compose(row.children(), flow, style);
                }
            }
        }
    }

    fn write_math(&mut self, source: &str, mode: MathMode, flow: &mut TextFlow, style: &RenderStyle) {
        let scale = match mode {
            MathMode::Inline => self.style.math.inline_scale,
            MathMode::Display => self.style.math.display_scale,
        };
        match self.resolver.resolve(source, mode) {
            Ok(image) => {
                let (w, h) = match mode {
                    MathMode::Inline => image.size_mm(scale),
                    MathMode::Display => image.fit_mm(scale, flow.column().width()),
                };
                flow.set_run_size(style.font_size);
                if let Err(e) = flow.write_image(&image, w, h) {
                    warn!("could not place equation `{}`: {}", source, e);
                    self.resolver.record_failure();
                    write_text(&literal_math(source, mode), flow, style);
                }
            }
            Err(_) => write_text(&literal_math(source, mode), flow, style),
        }
    }
}

/// The text written in place of an equation that could not be rendered.
pub fn literal_math(source: &str, mode: MathMode) -> String {
    match mode {
        MathMode::Inline => format!("${}$", source),
        MathMode::Display => format!("$${}$$", source),
    }
}

/// Writes `text` word by word. Leading and trailing whitespace turn into
/// inter-word spaces.
pub fn write_text(text: &str, flow: &mut TextFlow, style: &RenderStyle) {
    if text.is_empty() {
        return;
    }
    if text.starts_with(char::is_whitespace) {
        flow.write_space(style);
    }
    let ends_with_space = text.ends_with(char::is_whitespace);
    let words: Vec<&str> = text.split_whitespace().collect();
    let count = words.len();
    for (i, word) in words.into_iter().enumerate() {
        let trailing = i + 1 < count || ends_with_space;
        flow.write_word(word, style, trailing);
    }
}
