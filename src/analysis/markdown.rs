//! Canonical on-disk form for generated markdown.

/// Soft wrap column for non-heading lines.
pub const WRAP_WIDTH: usize = 80;

const HEADING_MARKER: char = '#';

/// Normalizes generated text line by line.
///
/// Heading lines are emitted unchanged with a blank line before and after.
/// Every other line is reflowed at word boundaries to [`WRAP_WIDTH`]
/// columns; its leading indentation is kept on the first wrapped line and
/// runs of inner whitespace collapse to one space. Blank lines produce no
/// output. The result is the emitted lines joined with `\n`.
///
/// The function is idempotent. A continuation line never starts with the
/// heading marker, since that would turn it into a heading on the next
/// pass; such words stay attached to the preceding word instead.
pub fn normalize(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        // A lone trailing '\r' would become a line break after the join
        let line = line.trim_end_matches('\r');
        if line.starts_with(HEADING_MARKER) {
            lines.push(String::new());
            lines.push(line.to_string());
            lines.push(String::new());
        } else {
            lines.extend(wrap_line(line, WRAP_WIDTH));
        }
    }
    lines.join("\n")
}

/// Greedy word wrap of a single line.
fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let words: Vec<&str> = body.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let mut wrapped = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let prefix = if start == 0 { indent } else { "" };
        let end = line_end(&words, start, prefix.chars().count(), width);
        let mut out = String::from(prefix);
        out.push_str(&words[start..end].join(" "));
        wrapped.push(out);
        start = end;
    }
    wrapped
}

/// Returns the exclusive end index of the line that starts at `start`.
fn line_end(words: &[&str], start: usize, prefix_len: usize, width: usize) -> usize {
    let mut len = prefix_len + words[start].chars().count();
    let mut end = start + 1;
    while end < words.len() {
        let next = len + 1 + words[end].chars().count();
        if next > width {
            break;
        }
        len = next;
        end += 1;
    }
    if end == words.len() {
        return end;
    }

    // Move the break left past words that would open a line with '#'
    let mut brk = end;
    while brk > start + 1 && words[brk].starts_with(HEADING_MARKER) {
        brk -= 1;
    }
    if !words[brk].starts_with(HEADING_MARKER) {
        return brk;
    }

    // No legal break inside the budget; run on to the next legal one
    let mut brk = end;
    while brk < words.len() && words[brk].starts_with(HEADING_MARKER) {
        brk += 1;
    }
    brk
}
