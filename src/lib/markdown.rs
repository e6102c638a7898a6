//! Markdown front end.
//!
//! pulldown-cmark produces a flat event stream; [`parse`] folds it into the
//! [`Node`] tree with a stack of open containers. Two passes run over the
//! result: `$…$` and `$$…$$` spans the parser left in plain text become math
//! nodes, and paragraphs holding display math are split so the equation
//! stands as a block of its own.

use crate::document::{Document, Node};
use crate::MdpError;
use log::debug;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

/// Deepest container nesting accepted.
pub const MAX_NESTING: usize = 64;

#[derive(Debug)]
enum Frame {
    Heading(u8),
    Paragraph,
    List { ordered: bool, start: u64 },
    Item,
    Table,
    TableHead,
    TableRow,
    TableCell,
    CodeBlock { language: Option<String>, code: String },
    BlockQuote,
    Emphasis,
    Strong,
    Link { href: String },
    /// Containers without a style of their own.
    Span,
}

#[derive(Debug)]
struct Open {
    frame: Frame,
    children: Vec<Node>,
}

#[derive(Debug, Default)]
struct TreeBuilder {
    stack: Vec<Open>,
    blocks: Vec<Node>,
    in_table_head: bool,
}

impl TreeBuilder {
    fn open(&mut self, frame: Frame, offset: usize) -> Result<(), MdpError> {
        if self.stack.len() >= MAX_NESTING {
            return Err(MdpError::ParseError {
                message: format!("Nesting deeper than {} levels", MAX_NESTING),
                position: Some(offset),
                suggestion: Some(
                    "Flatten deeply nested lists or block quotes".to_string(),
                ),
            });
        }
        self.stack.push(Open {
            frame,
            children: Vec::new(),
        });
        Ok(())
    }

    fn close(&mut self) {
        let Some(open) = self.stack.pop() else {
            return;
        };
        let children = open.children;
        let node = match open.frame {
            Frame::Heading(level) => Node::Heading { level, children },
            Frame::Paragraph => Node::Paragraph(children),
            Frame::List { ordered, start } => Node::List {
                ordered,
                start,
                items: children,
            },
            Frame::Item => Node::ListItem(children),
            Frame::Table => Node::Table { rows: children },
            Frame::TableHead | Frame::TableRow => Node::TableRow(children),
            Frame::TableCell => Node::TableCell {
                header: self.in_table_head,
                children,
            },
            Frame::CodeBlock { language, code } => Node::CodeBlock { language, code },
            Frame::BlockQuote => Node::BlockQuote(children),
            Frame::Emphasis => Node::Emphasis(children),
            Frame::Strong => Node::Strong(children),
            Frame::Link { href } => Node::Link { href, children },
            Frame::Span => {
                if children.is_empty() {
                    return;
                }
                Node::Span(children)
            }
        };
        self.push(node);
    }

    fn push(&mut self, node: Node) {
        let target = match self.stack.last_mut() {
            Some(open) => &mut open.children,
            None => &mut self.blocks,
        };
        if let (Node::Text(new), Some(Node::Text(last))) = (&node, target.last_mut()) {
            last.push_str(new);
            return;
        }
        target.push(node);
    }

    fn text(&mut self, text: &str) {
        if let Some(Open {
            frame: Frame::CodeBlock { code, .. },
            ..
        }) = self.stack.last_mut()
        {
            code.push_str(text);
            return;
        }
        self.push(Node::Text(text.to_string()));
    }

    fn start(&mut self, tag: Tag, offset: usize) -> Result<(), MdpError> {
        let frame = match tag {
            Tag::Paragraph => Frame::Paragraph,
            Tag::Heading { level, .. } => Frame::Heading(heading_level(level)),
            Tag::BlockQuote(_) => Frame::BlockQuote,
            Tag::CodeBlock(kind) => Frame::CodeBlock {
                language: match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_string),
                    CodeBlockKind::Indented => None,
                },
                code: String::new(),
            },
            Tag::List(start) => Frame::List {
                ordered: start.is_some(),
                start: start.unwrap_or(1),
            },
            Tag::Item => Frame::Item,
            Tag::Table(_) => Frame::Table,
            Tag::TableHead => {
                self.in_table_head = true;
                Frame::TableHead
            }
            Tag::TableRow => Frame::TableRow,
            Tag::TableCell => Frame::TableCell,
            Tag::Emphasis => Frame::Emphasis,
            Tag::Strong => Frame::Strong,
            Tag::Link { dest_url, .. } => Frame::Link {
                href: dest_url.to_string(),
            },
            Tag::FootnoteDefinition(label) => {
                self.open(Frame::Span, offset)?;
                self.push(Node::Text(format!("[{}] ", label)));
                return Ok(());
            }
            // Image alt text, strikethrough and the rest keep their content unstyled.
            _ => Frame::Span,
        };
        self.open(frame, offset)
    }

    fn end(&mut self, tag: TagEnd) {
        if tag == TagEnd::TableHead {
            self.close();
            self.in_table_head = false;
            return;
        }
        self.close();
    }

    fn event(&mut self, event: Event, offset: usize) -> Result<(), MdpError> {
        match event {
            Event::Start(tag) => self.start(tag, offset)?,
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => self.push(Node::CodeSpan(code.to_string())),
            Event::InlineMath(source) => self.push(Node::MathInline {
                source: source.to_string(),
            }),
            Event::DisplayMath(source) => self.push(Node::MathDisplay {
                source: source.trim().to_string(),
            }),
            Event::Html(html) | Event::InlineHtml(html) => {
                if is_line_break_tag(&html) {
                    self.push(Node::LineBreak);
                }
            }
            Event::FootnoteReference(label) => self.push(Node::Text(format!("[{}]", label))),
            Event::SoftBreak => self.text("\n"),
            Event::HardBreak => self.push(Node::LineBreak),
            Event::Rule => self.push(Node::HorizontalRule),
            Event::TaskListMarker(checked) => {
                self.push(Node::Text(if checked { "[x] " } else { "[ ] " }.to_string()))
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<Node> {
        while !self.stack.is_empty() {
            self.close();
        }
        self.blocks
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn is_line_break_tag(html: &str) -> bool {
    let tag: String = html
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    matches!(tag.as_str(), "<br>" | "<br/>")
}

/// Parses `markdown` into a document tree.
///
/// ```
/// use mathdown2pdf::document::Node;
/// use mathdown2pdf::markdown::parse;
///
/// let doc = parse("# Title\n\nHello $E=mc^2$ world.").unwrap();
/// assert!(matches!(doc.blocks[0], Node::Heading { level: 1, .. }));
/// assert_eq!(doc.equation_count(), 1);
/// ```
pub fn parse(markdown: &str) -> Result<Document, MdpError> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_MATH);

    let mut builder = TreeBuilder::default();
    for (event, range) in Parser::new_ext(markdown, options).into_offset_iter() {
        builder.event(event, range.start)?;
    }
    let blocks = split_display_math(builder.finish().into_iter().map(extract_math).collect());
    debug!("parsed {} top-level blocks", blocks.len());
    Ok(Document::new(blocks))
}

/// Turns `$…$` and `$$…$$` left in text runs into math nodes, recursively.
fn extract_math(node: Node) -> Node {
    let map = |children: Vec<Node>| -> Vec<Node> {
        children
            .into_iter()
            .flat_map(|child| match child {
                Node::Text(text) => split_math_text(&text),
                other => vec![extract_math(other)],
            })
            .collect()
    };
    match node {
        Node::Heading { level, children } => Node::Heading {
            level,
            children: map(children),
        },
        Node::Paragraph(c) => Node::Paragraph(map(c)),
        Node::List {
            ordered,
            start,
            items,
        } => Node::List {
            ordered,
            start,
            items: map(items),
        },
        Node::ListItem(c) => Node::ListItem(map(c)),
        Node::Table { rows } => Node::Table { rows: map(rows) },
        Node::TableRow(c) => Node::TableRow(map(c)),
        Node::TableCell { header, children } => Node::TableCell {
            header,
            children: map(children),
        },
        Node::BlockQuote(c) => Node::BlockQuote(map(c)),
        Node::Emphasis(c) => Node::Emphasis(map(c)),
        Node::Strong(c) => Node::Strong(map(c)),
        Node::Link { href, children } => Node::Link {
            href,
            children: map(children),
        },
        Node::Span(c) => Node::Span(map(c)),
        Node::Text(text) => {
            let mut parts = split_math_text(&text);
            if parts.len() == 1 {
                parts.remove(0)
            } else {
                Node::Span(parts)
            }
        }
        leaf => leaf,
    }
}

/// Splits one text run at math delimiters.
///
/// Inline math needs a closing `$` before the next blank line, no `$` inside,
/// some non-whitespace content and no digit right after the closing one, so
/// prices like `$5 and $6` stay text. Padding inside the delimiters is kept.
pub fn split_math_text(text: &str) -> Vec<Node> {
    let mut out = Vec::new();
    let mut plain = String::new();
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        plain.push_str(&rest[..pos]);
        let after = &rest[pos..];

        if let Some(body) = after.strip_prefix("$$") {
            if let Some(end) = body.find("$$") {
                flush_text(&mut out, &mut plain);
                out.push(Node::MathDisplay {
                    source: body[..end].trim().to_string(),
                });
                rest = &body[end + 2..];
                continue;
            }
            plain.push_str("$$");
            rest = body;
            continue;
        }

        let body = &after[1..];
        match inline_math_end(body) {
            Some(end) => {
                flush_text(&mut out, &mut plain);
                out.push(Node::MathInline {
                    source: body[..end].to_string(),
                });
                rest = &body[end + 1..];
            }
            None => {
                plain.push('$');
                rest = body;
            }
        }
    }
    plain.push_str(rest);
    flush_text(&mut out, &mut plain);
    if out.is_empty() {
        out.push(Node::Text(String::new()));
    }
    out
}

fn inline_math_end(body: &str) -> Option<usize> {
    let end = body.find('$')?;
    let source = &body[..end];
    if source.trim().is_empty() || crosses_blank_line(source) {
        return None;
    }
    match body[end + 1..].chars().next() {
        Some('$') => None,
        Some(c) if c.is_ascii_digit() => None,
        _ => Some(end),
    }
}

fn crosses_blank_line(source: &str) -> bool {
    let lines: Vec<&str> = source.split('\n').collect();
    lines.len() > 2 && lines[1..lines.len() - 1].iter().any(|l| l.trim().is_empty())
}

fn flush_text(out: &mut Vec<Node>, plain: &mut String) {
    if !plain.is_empty() {
        out.push(Node::Text(std::mem::take(plain)));
    }
}

/// Lifts display math out of paragraphs so it renders as a block.
fn split_display_math(blocks: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block {
            Node::Paragraph(children) => {
                let mut current = Vec::new();
                for child in flatten_spans_with_math(children) {
                    if let Node::MathDisplay { .. } = child {
                        push_paragraph(&mut out, std::mem::take(&mut current));
                        out.push(child);
                    } else {
                        current.push(child);
                    }
                }
                push_paragraph(&mut out, current);
            }
            Node::BlockQuote(children) => out.push(Node::BlockQuote(split_display_math(children))),
            Node::List {
                ordered,
                start,
                items,
            } => out.push(Node::List {
                ordered,
                start,
                items: items
                    .into_iter()
                    .map(|item| match item {
                        Node::ListItem(c) => Node::ListItem(split_display_math(c)),
                        other => other,
                    })
                    .collect(),
            }),
            other => out.push(other),
        }
    }
    out
}

// Spans created by `extract_math` around a text run are unwrapped so the
// display equations inside them become direct paragraph children.
fn flatten_spans_with_math(children: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Node::Span(inner)
                if inner
                    .iter()
                    .any(|n| matches!(n, Node::MathDisplay { .. })) =>
            {
                out.extend(inner)
            }
            other => out.push(other),
        }
    }
    out
}

fn push_paragraph(out: &mut Vec<Node>, children: Vec<Node>) {
    let blank = children.iter().all(|c| match c {
        Node::Text(t) => t.trim().is_empty(),
        Node::LineBreak => true,
        _ => false,
    });
    if !blank {
        out.push(Node::Paragraph(children));
    }
}
