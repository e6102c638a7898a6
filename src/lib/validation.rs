//! Pre-flight checks run by the CLI before an export.
//!
//! Nothing here is fatal: every problem becomes a human-readable warning and
//! the export may still go ahead.

use crate::latex::engine_available;
use crate::markdown;
use crate::metrics::is_winansi;
use std::path::Path;

/// Distinct unsupported characters listed before the message is truncated.
const MAX_LISTED_CHARS: usize = 8;

/// Returns warnings about `markdown` and the target `output_path`.
///
/// # Example
/// ```
/// use mathdown2pdf::validation::validate_conversion;
///
/// let warnings = validate_conversion("```rust\nfn main() {}\n", None);
/// assert!(warnings[0].contains("never closed"));
/// ```
pub fn validate_conversion(markdown: &str, output_path: Option<&str>) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Some(line) = unclosed_fence(markdown) {
        warnings.push(format!(
            "⚠️  Code fence opened on line {} is never closed; the rest of the document will render as code",
            line
        ));
    }

    let delimiters = display_delimiters(markdown);
    if delimiters % 2 != 0 {
        warnings.push(format!(
            "⚠️  Found {} `$$` delimiters; one display equation is not closed",
            delimiters
        ));
    }

    let unsupported = unsupported_chars(markdown);
    if !unsupported.is_empty() {
        let listed: Vec<String> = unsupported
            .iter()
            .take(MAX_LISTED_CHARS)
            .map(|c| format!("U+{:04X} ({})", *c as u32, c))
            .collect();
        let more = unsupported.len().saturating_sub(MAX_LISTED_CHARS);
        let suffix = if more > 0 {
            format!(" and {} more", more)
        } else {
            String::new()
        };
        warnings.push(format!(
            "⚠️  {} character(s) are outside the built-in fonts and will be transliterated: {}{}",
            unsupported.len(),
            listed.join(", "),
            suffix
        ));
    }

    if let Some(path) = output_path {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                warnings.push(format!(
                    "⚠️  Output directory does not exist: {}",
                    parent.display()
                ));
            }
        }
    }

    if !engine_available() {
        if let Ok(document) = markdown::parse(markdown) {
            let equations = document.equation_count();
            if equations > 0 {
                warnings.push(format!(
                    "⚠️  {} equation(s) will be printed as source text; rebuild with `--features latex` to typeset them",
                    equations
                ));
            }
        }
    }

    warnings
}

/// Line (1-based) of a fence opener that has no closing fence.
fn unclosed_fence(markdown: &str) -> Option<usize> {
    let mut open: Option<(char, usize, usize)> = None;
    for (i, line) in markdown.lines().enumerate() {
        let trimmed = line.trim_start();
        if line.len() - trimmed.len() > 3 {
            continue;
        }
        let Some(marker) = trimmed.chars().next().filter(|c| *c == '`' || *c == '~') else {
            continue;
        };
        let run = trimmed.chars().take_while(|c| *c == marker).count();
        if run < 3 {
            continue;
        }
        match open {
            None => open = Some((marker, run, i + 1)),
            Some((m, n, _)) if m == marker && run >= n && trimmed[run..].trim().is_empty() => {
                open = None
            }
            Some(_) => {}
        }
    }
    open.map(|(_, _, line)| line)
}

/// Counts `$$` runs outside fenced code and inline code spans.
fn display_delimiters(markdown: &str) -> usize {
    let mut count = 0;
    let mut fence: Option<(char, usize)> = None;
    for line in markdown.lines() {
        let trimmed = line.trim_start();
        let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~');
        let run = marker.map_or(0, |m| trimmed.chars().take_while(|c| *c == m).count());
        if let Some(m) = marker.filter(|_| run >= 3) {
            match fence {
                None => {
                    fence = Some((m, run));
                    continue;
                }
                Some((fm, n)) if fm == m && run >= n => {
                    fence = None;
                    continue;
                }
                Some(_) => {}
            }
        }
        if fence.is_some() {
            continue;
        }
        count += count_outside_code_spans(line);
    }
    count
}

fn count_outside_code_spans(line: &str) -> usize {
    let bytes = line.as_bytes();
    let mut count = 0;
    let mut in_code = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'`' => in_code = !in_code,
            b'\\' => i += 1,
            b'$' if !in_code && bytes.get(i + 1) == Some(&b'$') => {
                count += 1;
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    count
}

/// Distinct printable characters the WinAnsi fonts cannot show, in order of appearance.
fn unsupported_chars(markdown: &str) -> Vec<char> {
    let mut seen = Vec::new();
    for c in markdown.chars() {
        if c.is_control() || is_winansi(c) || seen.contains(&c) {
            continue;
        }
        seen.push(c);
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_document_has_no_warnings() {
        let md = "# Title\n\nSome text.\n\n```\ncode\n```\n";
        assert!(validate_conversion(md, None).is_empty());
    }

    #[test]
    fn detects_unclosed_fence_with_line_number() {
        assert_eq!(unclosed_fence("text\n\n~~~\ncode"), Some(3));
        assert_eq!(unclosed_fence("```\na\n```"), None);
        // A shorter run does not close a longer fence.
        assert_eq!(unclosed_fence("````\na\n```"), Some(1));
    }

    #[test]
    fn detects_unbalanced_display_math() {
        let warnings = validate_conversion("$$x = 1$$\n\n$$ y", None);
        assert_eq!(warnings.len(), 1 + usize::from(!engine_available()));
        assert!(warnings[0].contains("3 `$$`"));
    }

    #[test]
    fn dollars_in_code_are_ignored() {
        assert_eq!(display_delimiters("```sh\necho $$\n```\nuse `$$` here"), 0);
        assert_eq!(display_delimiters("\\$$ and $$x$$"), 2);
    }

    #[test]
    fn lists_unsupported_characters_once() {
        assert_eq!(unsupported_chars("αβα é “quote”"), vec!['α', 'β']);
        let warnings = validate_conversion("Greek: αβ", None);
        assert!(warnings[0].contains("U+03B1"));
    }

    #[test]
    fn missing_output_directory_is_reported() {
        let warnings = validate_conversion("text", Some("/no/such/dir/out.pdf"));
        assert!(warnings.iter().any(|w| w.contains("/no/such/dir")));
        assert!(validate_conversion("text", Some("out.pdf")).is_empty());
    }

    #[cfg(not(feature = "latex"))]
    #[test]
    fn equations_without_engine_are_reported() {
        let warnings = validate_conversion("Euler: $e^{i\\pi}$", None);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("1 equation(s)"));
    }
}
