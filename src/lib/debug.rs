use crate::document::{Document, Node};

/// Escapes a string for inclusion in a JSON string literal.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

impl Node {
    /// Attributes printed before `children`, already rendered as JSON values.
    fn json_attributes(&self) -> Vec<(&'static str, String)> {
        let quoted = |s: &str| format!("\"{}\"", escape(s));
        match self {
            Node::Heading { level, .. } => vec![("level", level.to_string())],
            Node::List { ordered, start, .. } => vec![
                ("ordered", ordered.to_string()),
                ("start", start.to_string()),
            ],
            Node::TableCell { header, .. } => vec![("header", header.to_string())],
            Node::CodeBlock { language, code } => vec![
                (
                    "language",
                    language.as_deref().map(quoted).unwrap_or_else(|| "null".to_string()),
                ),
                ("content", quoted(code)),
            ],
            Node::MathDisplay { source } | Node::MathInline { source } => {
                vec![("source", quoted(source))]
            }
            Node::Text(t) | Node::CodeSpan(t) => vec![("content", quoted(t))],
            Node::Link { href, .. } => vec![("href", quoted(href))],
            _ => Vec::new(),
        }
    }

    /// Converts a node into a readable JSON representation for visualization.
    /// Recursively formats nested nodes with proper indentation.
    fn to_readable_json(&self, indent_level: usize) -> String {
        let indent = "  ".repeat(indent_level);
        let inner_indent = "  ".repeat(indent_level + 1);

        let mut fields = vec![format!("{}\"type\": \"{}\"", inner_indent, self.kind())];
        for (key, value) in self.json_attributes() {
            fields.push(format!("{}\"{}\": {}", inner_indent, key, value));
        }

        let children = self.children();
        if !children.is_empty() {
            let mut list = format!("{}\"children\": [\n", inner_indent);
            for (i, child) in children.iter().enumerate() {
                list.push_str(&child.to_readable_json(indent_level + 2));
                if i < children.len() - 1 {
                    list.push(',');
                }
                list.push('\n');
            }
            list.push_str(&format!("{}]", inner_indent));
            fields.push(list);
        }

        format!("{}{{\n{}\n{}}}", indent, fields.join(",\n"), indent)
    }
}

impl Document {
    /// Renders the tree as an indented JSON array, one object per block.
    pub fn to_readable_json(&self) -> String {
        let mut result = String::from("[\n");
        for (i, node) in self.blocks.iter().enumerate() {
            result.push_str(&node.to_readable_json(1));
            if i < self.blocks.len() - 1 {
                result.push(',');
            }
            result.push('\n');
        }
        result.push(']');
        result
    }

    /// Saves the tree to a JSON file for inspection.
    ///
    /// # Example
    /// ```no_run
    /// let doc = mathdown2pdf::markdown::parse("# Title").unwrap();
    /// doc.save_to_json_file("tree.json").unwrap();
    /// ```
    pub fn save_to_json_file(&self, file_path: &str) -> std::io::Result<()> {
        std::fs::write(file_path, self.to_readable_json())
    }
}
