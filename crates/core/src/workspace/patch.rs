//! Text-level edits applied to the C and Rust sources.
//!
//! Everything here is pure (`&str` in, `String` out) so the edits can be
//! checked without touching the filesystem.

use thiserror::Error;

use crate::model::{SourceSpan, Translation};

/// Single-line comment marker for the source dialect. C has no nested block
/// comments, so every line is commented individually.
pub const COMMENT_MARKER: &str = "// ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpanError {
    #[error("span {span} ends on line {line}, but the file has {lines} lines")]
    LineOutOfRange { span: SourceSpan, line: usize, lines: usize },
    #[error("span {span} has column {col} on line {line}, which is {len} bytes long")]
    ColumnOutOfRange { span: SourceSpan, line: usize, col: usize, len: usize },
    #[error("span {span} ends before it starts")]
    Inverted { span: SourceSpan },
    #[error("span {span} splits a multi-byte character on line {line}")]
    NotCharBoundary { span: SourceSpan, line: usize },
}

/// A physical line split into its text and its terminator (`\n`, `\r\n`, or
/// nothing on an unterminated last line).
struct Line<'a> {
    text: &'a str,
    eol: &'a str,
}

fn split_lines(content: &str) -> Vec<Line<'_>> {
    content
        .split_inclusive('\n')
        .map(|raw| {
            let text = raw.strip_suffix('\n').map(|t| t.strip_suffix('\r').unwrap_or(t));
            match text {
                Some(text) => Line { text, eol: &raw[text.len()..] },
                None => Line { text: raw, eol: "" },
            }
        })
        .collect()
}

/// Byte offsets of the span on its first and last line, after bounds checks.
/// Returns `(first_idx, start_off, last_idx, end_off)` with 0-indexed lines.
fn resolve(lines: &[Line<'_>], span: SourceSpan) -> Result<(usize, usize, usize, usize), SpanError> {
    if span.start_line == 0 {
        return Err(SpanError::LineOutOfRange { span, line: 0, lines: lines.len() });
    }
    if span.start_col == 0 {
        return Err(SpanError::ColumnOutOfRange {
            span,
            line: span.start_line,
            col: span.start_col,
            len: 0,
        });
    }
    if span.end_line < span.start_line {
        return Err(SpanError::Inverted { span });
    }
    if span.end_line > lines.len() {
        return Err(SpanError::LineOutOfRange { span, line: span.end_line, lines: lines.len() });
    }

    let first = span.start_line - 1;
    let last = span.end_line - 1;
    let start = span.start_col - 1;
    let end = span.end_col;

    let first_text = lines[first].text;
    if start > first_text.len() {
        return Err(SpanError::ColumnOutOfRange {
            span,
            line: span.start_line,
            col: span.start_col,
            len: first_text.len(),
        });
    }
    let last_text = lines[last].text;
    if end > last_text.len() {
        return Err(SpanError::ColumnOutOfRange {
            span,
            line: span.end_line,
            col: span.end_col,
            len: last_text.len(),
        });
    }
    if first == last && end < start {
        return Err(SpanError::Inverted { span });
    }
    if !first_text.is_char_boundary(start) {
        return Err(SpanError::NotCharBoundary { span, line: span.start_line });
    }
    if !last_text.is_char_boundary(end) {
        return Err(SpanError::NotCharBoundary { span, line: span.end_line });
    }
    Ok((first, start, last, end))
}

/// Return exactly the text covered by `span`.
pub fn extract_span(content: &str, span: SourceSpan) -> Result<String, SpanError> {
    let lines = split_lines(content);
    let (first, start, last, end) = resolve(&lines, span)?;

    if first == last {
        return Ok(lines[first].text[start..end].to_string());
    }

    let mut body = String::new();
    body.push_str(&lines[first].text[start..]);
    body.push_str(lines[first].eol);
    for line in &lines[first + 1..last] {
        body.push_str(line.text);
        body.push_str(line.eol);
    }
    body.push_str(&lines[last].text[..end]);
    Ok(body)
}

/// Comment out the text covered by `span`, leaving surrounding code live.
///
/// The marker goes in at the exact start column on the first line and at the
/// start of every following line. When code follows the span on its last
/// line, a line break is inserted so that code is not swallowed by the
/// comment. The only other change is the markers themselves.
pub fn comment_out_span(content: &str, span: SourceSpan) -> Result<String, SpanError> {
    let lines = split_lines(content);
    let (first, start, last, end) = resolve(&lines, span)?;

    let mut out = String::with_capacity(content.len() + (last - first + 2) * COMMENT_MARKER.len());
    for (idx, line) in lines.iter().enumerate() {
        if idx < first || idx > last {
            out.push_str(line.text);
            out.push_str(line.eol);
            continue;
        }

        let (head, body) = if idx == first {
            line.text.split_at(start)
        } else {
            ("", line.text)
        };
        out.push_str(head);
        out.push_str(COMMENT_MARKER);

        if idx == last {
            let split = if idx == first { end - start } else { end };
            let (inside, rest) = body.split_at(split);
            out.push_str(inside);
            if !rest.trim().is_empty() {
                out.push_str(if line.eol.is_empty() { "\n" } else { line.eol });
            }
            out.push_str(rest);
        } else {
            out.push_str(body);
        }
        out.push_str(line.eol);
    }
    Ok(out)
}

/// Insert `imports` after any leading inner attributes (`#![...]`), which may
/// span several lines and may be separated by blank lines.
pub fn insert_imports(content: &str, imports: &str) -> String {
    if imports.trim().is_empty() {
        return content.to_string();
    }

    let mut lines: Vec<&str> = content.split('\n').collect();
    let mut inside_attribute = false;
    let mut at = lines.len();
    for (idx, line) in lines.iter().enumerate() {
        if inside_attribute {
            if line.contains(']') {
                inside_attribute = false;
            }
            continue;
        }
        if line.starts_with("#!") {
            if !line.contains(']') {
                inside_attribute = true;
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        at = idx;
        break;
    }

    let imports = imports.trim_end_matches('\n');
    if at == lines.len() && lines.last().is_some_and(|l| l.is_empty()) {
        // Keep the file's trailing newline after the inserted block.
        lines.insert(at - 1, imports);
    } else {
        lines.insert(at, imports);
    }
    lines.join("\n")
}

/// Apply a translation to the Rust entry file: imports after the inner
/// attributes, function and wrapper appended at the end.
pub fn patch_target(content: &str, translation: &Translation) -> String {
    let mut out = insert_imports(content, &translation.imports);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out.push_str(translation.func.trim_end());
    out.push_str("\n\n");
    out.push_str(translation.wrapper.trim_end());
    out.push('\n');
    out
}
