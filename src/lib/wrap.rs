//! Greedy line wrapping shared by headings, code blocks and code spans.

use std::ops::Range;

/// Wraps `text` into lines no wider than `width`.
///
/// Words are packed greedily. A word that does not fit on an empty line is
/// split by characters; a single character wider than `width` still gets its
/// own line so the result always makes progress.
pub fn wrap_text<F>(text: &str, width: f32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if measure(&candidate) <= width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if measure(word) <= width {
            current = word.to_string();
        } else {
            let mut pieces = split_by_chars(word, width, &measure);
            if let Some(last) = pieces.pop() {
                lines.extend(pieces);
                current = last;
            }
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Wraps one literal line of code and returns the byte range of each
/// visual line.
///
/// Leading indentation is kept on the first visual line; continuation lines
/// start at the next non-space character. Breaks happen at spaces when
/// possible and fall back to characters otherwise.
pub fn wrap_code_line<F>(line: &str, width: f32, measure: F) -> Vec<Range<usize>>
where
    F: Fn(&str) -> f32,
{
    if measure(line) <= width {
        return vec![0..line.len()];
    }
    let mut ranges: Vec<Range<usize>> = Vec::new();
    let (mut start, mut end) = (0, 0);
    for token in split_keep_spaces(line) {
        if measure(&line[start..token.end]) <= width {
            end = token.end;
            continue;
        }
        if !line[start..end].trim().is_empty() {
            ranges.push(start..end);
        }
        let mut from = token.start;
        if !ranges.is_empty() {
            from += line[from..token.end].len() - line[from..token.end].trim_start().len();
        }
        if measure(&line[from..token.end]) <= width {
            start = from;
            end = token.end;
        } else {
            let mut pieces = split_range_by_chars(line, from..token.end, width, &measure);
            let last = pieces.pop().unwrap_or(from..token.end);
            ranges.extend(pieces);
            start = last.start;
            end = last.end;
        }
    }
    if end > start || ranges.is_empty() {
        ranges.push(start..end);
    }
    ranges
}

fn split_range_by_chars<F>(
    line: &str,
    range: Range<usize>,
    width: f32,
    measure: &F,
) -> Vec<Range<usize>>
where
    F: Fn(&str) -> f32,
{
    let mut pieces = Vec::new();
    let mut start = range.start;
    let mut end = range.start;
    for (offset, c) in line[range.clone()].char_indices() {
        let next = range.start + offset + c.len_utf8();
        if measure(&line[start..next]) > width && end > start {
            pieces.push(start..end);
            start = end;
        }
        end = next;
    }
    if end > start {
        pieces.push(start..end);
    }
    pieces
}

/// Splits `word` into consecutive pieces no wider than `width`.
pub fn split_by_chars<F>(word: &str, width: f32, measure: &F) -> Vec<String>
where
    F: Fn(&str) -> f32,
{
    let mut pieces = Vec::new();
    let mut current = String::new();
    for c in word.chars() {
        let mut candidate = current.clone();
        candidate.push(c);
        if measure(&candidate) > width && !current.is_empty() {
            pieces.push(std::mem::replace(&mut current, c.to_string()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

// "a  bc d" -> [0..1, 1..5, 5..7]
fn split_keep_spaces(line: &str) -> Vec<Range<usize>> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_word = false;
    for (i, c) in line.char_indices() {
        if c == ' ' {
            if in_word {
                tokens.push(start..i);
                start = i;
                in_word = false;
            }
        } else {
            in_word = true;
        }
    }
    if start < line.len() {
        tokens.push(start..line.len());
    }
    tokens
}
