use lazy_static::lazy_static;
/// Syntax highlighting for code blocks using syntect.
/// Produces per-line colour spans the block renderer can intersect with
/// wrapped line ranges.
use crate::styling::Color;
use std::collections::HashMap;
use std::ops::Range;
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

/// A coloured run of one source line, as a byte range into that line.
///
/// # Examples
///
/// ```
/// use mathdown2pdf::highlighting::HighlightSpan;
/// use mathdown2pdf::styling::Color;
///
/// let span = HighlightSpan { range: 0..2, color: Color::rgb(167, 29, 93), bold: true };
/// assert_eq!(&"fn main()"[span.range.clone()], "fn");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightSpan {
    pub range: Range<usize>,
    pub color: Color,
    pub bold: bool,
}

lazy_static! {
    static ref SYNTAX_SET: SyntaxSet = SyntaxSet::load_defaults_newlines();
    static ref THEME_SET: ThemeSet = ThemeSet::load_defaults();
}

/// Maps fence info strings to syntect syntax names.
fn get_syntax_mapping() -> HashMap<&'static str, &'static str> {
    let mut map = HashMap::new();
    map.insert("c", "C");
    map.insert("cpp", "C++");
    map.insert("c++", "C++");
    map.insert("java", "Java");
    map.insert("python", "Python");
    map.insert("py", "Python");
    // No TypeScript grammar ships with syntect; JavaScript is close enough.
    map.insert("typescript", "JavaScript");
    map.insert("ts", "JavaScript");
    map.insert("javascript", "JavaScript");
    map.insert("js", "JavaScript");
    map.insert("jsx", "JavaScript");
    map.insert("rust", "Rust");
    map.insert("rs", "Rust");
    map.insert("go", "Go");
    map.insert("bash", "Bourne Again Shell (bash)");
    map.insert("sh", "Bourne Again Shell (bash)");
    map.insert("shell", "Bourne Again Shell (bash)");
    map.insert("html", "HTML");
    map.insert("xml", "XML");
    map.insert("json", "JSON");
    map.insert("yaml", "YAML");
    map.insert("yml", "YAML");
    map.insert("sql", "SQL");
    map.insert("markdown", "Markdown");
    map.insert("md", "Markdown");
    map.insert("latex", "LaTeX");
    map.insert("tex", "LaTeX");
    map
}

fn find_syntax(language: &str) -> Option<&'static SyntaxReference> {
    let language = language.trim().to_lowercase();
    if language.is_empty() {
        return None;
    }
    let syntax = match get_syntax_mapping().get(language.as_str()) {
        Some(name) => SYNTAX_SET.find_syntax_by_name(name),
        None => SYNTAX_SET
            .find_syntax_by_name(&language)
            .or_else(|| SYNTAX_SET.find_syntax_by_token(&language)),
    }?;
    if syntax.name == "Plain Text" {
        None
    } else {
        Some(syntax)
    }
}

/// Whether `language` selects a known grammar.
pub fn is_supported(language: &str) -> bool {
    find_syntax(language).is_some()
}

fn theme() -> Option<&'static Theme> {
    THEME_SET
        .themes
        .get("InspiredGitHub")
        .or_else(|| THEME_SET.themes.values().next())
}

/// Highlights `code` line by line.
///
/// Returns one span list per `\n`-separated line, or `None` when the language
/// is unknown or highlighting fails, in which case the caller draws the code
/// in a single colour.
///
/// ```
/// use mathdown2pdf::highlighting::highlight_lines;
///
/// let lines = highlight_lines("fn main() {\n    println!(\"hi\");\n}", "rust").unwrap();
/// assert_eq!(lines.len(), 3);
/// assert!(lines[0].len() > 1);
/// ```
pub fn highlight_lines(code: &str, language: &str) -> Option<Vec<Vec<HighlightSpan>>> {
    let syntax = find_syntax(language)?;
    let theme = theme()?;
    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut lines = Vec::new();

    for line in LinesWithEndings::from(code) {
        let ranges = highlighter.highlight_line(line, &SYNTAX_SET).ok()?;
        let content_len = line.trim_end_matches(|c| c == '\n' || c == '\r').len();
        let mut spans = Vec::new();
        let mut offset = 0;
        for (style, text) in ranges {
            let start = offset;
            offset += text.len();
            let end = offset.min(content_len);
            if start >= end {
                continue;
            }
            let fg = style.foreground;
            // Near-white foregrounds vanish on the light block background.
            let color = if fg.r > 240 && fg.g > 240 && fg.b > 240 {
                Color::rgb(220, 220, 220)
            } else {
                Color::rgb(fg.r, fg.g, fg.b)
            };
            spans.push(HighlightSpan {
                range: start..end,
                color,
                bold: style.font_style.contains(FontStyle::BOLD),
            });
        }
        lines.push(spans);
    }
    if code.ends_with('\n') {
        lines.push(Vec::new());
    }
    Some(lines)
}
