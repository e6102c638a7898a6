//! The parsed document tree.
//!
//! A [`Document`] is an ordered list of block [`Node`]s. The tree is built once
//! by [`crate::markdown::parse`] and never mutated during layout. Math nodes
//! keep their LaTeX source verbatim, without delimiters.

/// One element of the document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Heading { level: u8, children: Vec<Node> },
    Paragraph(Vec<Node>),
    List {
        ordered: bool,
        start: u64,
        items: Vec<Node>,
    },
    ListItem(Vec<Node>),
    Table { rows: Vec<Node> },
    TableRow(Vec<Node>),
    TableCell { header: bool, children: Vec<Node> },
    CodeBlock {
        language: Option<String>,
        code: String,
    },
    BlockQuote(Vec<Node>),
    HorizontalRule,
    MathDisplay { source: String },
    MathInline { source: String },
    Text(String),
    Emphasis(Vec<Node>),
    Strong(Vec<Node>),
    CodeSpan(String),
    Link { href: String, children: Vec<Node> },
    /// A hard line break inside inline content.
    LineBreak,
    /// Transparent inline container for constructs without a style of their own.
    Span(Vec<Node>),
}

/// Fieldless discriminant of [`Node`], used in render reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Heading,
    Paragraph,
    List,
    ListItem,
    Table,
    TableRow,
    TableCell,
    CodeBlock,
    BlockQuote,
    HorizontalRule,
    MathDisplay,
    MathInline,
    Text,
    Emphasis,
    Strong,
    CodeSpan,
    Link,
    LineBreak,
    Span,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Heading => "heading",
            NodeKind::Paragraph => "paragraph",
            NodeKind::List => "list",
            NodeKind::ListItem => "list-item",
            NodeKind::Table => "table",
            NodeKind::TableRow => "table-row",
            NodeKind::TableCell => "table-cell",
            NodeKind::CodeBlock => "code-block",
            NodeKind::BlockQuote => "block-quote",
            NodeKind::HorizontalRule => "horizontal-rule",
            NodeKind::MathDisplay => "math-display",
            NodeKind::MathInline => "math-inline",
            NodeKind::Text => "text",
            NodeKind::Emphasis => "emphasis",
            NodeKind::Strong => "strong",
            NodeKind::CodeSpan => "code-span",
            NodeKind::Link => "link",
            NodeKind::LineBreak => "line-break",
            NodeKind::Span => "span",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Heading { .. } => NodeKind::Heading,
            Node::Paragraph(_) => NodeKind::Paragraph,
            Node::List { .. } => NodeKind::List,
            Node::ListItem(_) => NodeKind::ListItem,
            Node::Table { .. } => NodeKind::Table,
            Node::TableRow(_) => NodeKind::TableRow,
            Node::TableCell { .. } => NodeKind::TableCell,
            Node::CodeBlock { .. } => NodeKind::CodeBlock,
            Node::BlockQuote(_) => NodeKind::BlockQuote,
            Node::HorizontalRule => NodeKind::HorizontalRule,
            Node::MathDisplay { .. } => NodeKind::MathDisplay,
            Node::MathInline { .. } => NodeKind::MathInline,
            Node::Text(_) => NodeKind::Text,
            Node::Emphasis(_) => NodeKind::Emphasis,
            Node::Strong(_) => NodeKind::Strong,
            Node::CodeSpan(_) => NodeKind::CodeSpan,
            Node::Link { .. } => NodeKind::Link,
            Node::LineBreak => NodeKind::LineBreak,
            Node::Span(_) => NodeKind::Span,
        }
    }

    /// Child nodes, empty for leaves.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Heading { children, .. }
            | Node::TableCell { children, .. }
            | Node::Link { children, .. } => children,
            Node::List { items, .. } => items,
            Node::Table { rows } => rows,
            Node::Paragraph(c)
            | Node::ListItem(c)
            | Node::TableRow(c)
            | Node::BlockQuote(c)
            | Node::Emphasis(c)
            | Node::Strong(c)
            | Node::Span(c) => c,
            Node::CodeBlock { .. }
            | Node::HorizontalRule
            | Node::MathDisplay { .. }
            | Node::MathInline { .. }
            | Node::Text(_)
            | Node::CodeSpan(_)
            | Node::LineBreak => &[],
        }
    }

    /// Whether this node starts a block of its own.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Node::Heading { .. }
                | Node::Paragraph(_)
                | Node::List { .. }
                | Node::Table { .. }
                | Node::CodeBlock { .. }
                | Node::BlockQuote(_)
                | Node::HorizontalRule
                | Node::MathDisplay { .. }
        )
    }

    /// Concatenated plain text of the subtree, math included as `$src$`.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(t) | Node::CodeSpan(t) => out.push_str(t),
            Node::CodeBlock { code, .. } => out.push_str(code),
            Node::MathInline { source } => {
                out.push('$');
                out.push_str(source);
                out.push('$');
            }
            Node::MathDisplay { source } => {
                out.push_str("$$");
                out.push_str(source);
                out.push_str("$$");
            }
            Node::LineBreak => out.push('\n'),
            _ => {
                for child in self.children() {
                    child.collect_text(out);
                }
            }
        }
    }
}

/// Root of a parsed document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub blocks: Vec<Node>,
}

impl Document {
    pub fn new(blocks: Vec<Node>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of math nodes anywhere in the tree.
    pub fn equation_count(&self) -> usize {
        fn count(node: &Node) -> usize {
            let own = matches!(node, Node::MathInline { .. } | Node::MathDisplay { .. }) as usize;
            own + node.children().iter().map(count).sum::<usize>()
        }
        self.blocks.iter().map(count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_flattens_inline_tree() {
        let node = Node::Paragraph(vec![
            Node::Text("Area ".into()),
            Node::Strong(vec![Node::Text("is".into())]),
            Node::Text(" ".into()),
            Node::MathInline {
                source: "\\pi r^2".into(),
            },
        ]);
        assert_eq!(node.text_content(), "Area is $\\pi r^2$");
        assert_eq!(node.kind(), NodeKind::Paragraph);
        assert!(node.is_block());
    }

    #[test]
    fn equation_count_walks_nested_nodes() {
        let doc = Document::new(vec![
            Node::MathDisplay { source: "x".into() },
            Node::BlockQuote(vec![Node::Paragraph(vec![Node::MathInline {
                source: "y".into(),
            }])]),
        ]);
        assert_eq!(doc.equation_count(), 2);
    }
}
