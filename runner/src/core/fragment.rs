//! Line-fragment reconciliation over file contents.
//!
//! Each fragment owns exactly the lines its pattern matches. Lines matched by
//! no fragment are left untouched.

use regex::Regex;

/// More than one line matched the fragment's pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbiguousMatch {
    pub matches: usize,
}

/// True if `contents` already holds `line` verbatim.
pub fn contains_line(contents: &str, line: &str) -> bool {
    contents.lines().any(|existing| existing == line)
}

/// Bring `contents` in line with the fragment.
///
/// Returns `None` when nothing needs to change. A single line matching
/// `matcher` is replaced in place; otherwise `line` is added at the end of
/// the root table (before the first `[table]` header) so it stays a global
/// key. CRLF files stay CRLF.
pub fn reconcile(
    contents: &str,
    line: &str,
    matcher: &Regex,
) -> Result<Option<String>, AmbiguousMatch> {
    if contains_line(contents, line) {
        return Ok(None);
    }

    let mut lines: Vec<&str> = contents.lines().collect();
    let matching: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, existing)| matcher.is_match(existing))
        .map(|(idx, _)| idx)
        .collect();

    match matching.as_slice() {
        [] => {
            let at = first_table_header(&lines).unwrap_or(lines.len());
            lines.insert(at, line);
        }
        [idx] => lines[*idx] = line,
        many => return Err(AmbiguousMatch { matches: many.len() }),
    }

    let ending = if contents.contains("\r\n") { "\r\n" } else { "\n" };
    let mut out = lines.join(ending);
    out.push_str(ending);
    Ok(Some(out))
}

/// Index of the first `[table]` or `[[array]]` header outside any
/// multi-line root value.
fn first_table_header(lines: &[&str]) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, line) in lines.iter().enumerate() {
        if depth == 0 && is_table_header(line) {
            return Some(idx);
        }
        depth = bracket_depth_after(line, depth);
    }
    None
}

fn is_table_header(line: &str) -> bool {
    let code = strip_comment(line).trim();
    let inner = code
        .strip_prefix("[[")
        .and_then(|rest| rest.strip_suffix("]]"))
        .or_else(|| code.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')));
    inner.is_some_and(|key| !key.trim().is_empty() && !key.contains(['[', ']', '=', ',']))
}

/// Open brackets after `line`, ignoring quoted strings and comments.
fn bracket_depth_after(line: &str, mut depth: usize) -> usize {
    let mut quote = None;
    let mut escaped = false;
    for ch in line.chars() {
        match quote {
            Some('"') if escaped => escaped = false,
            Some('"') if ch == '\\' => escaped = true,
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '#' => break,
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                _ => {}
            },
        }
    }
    depth
}

fn strip_comment(line: &str) -> &str {
    line.split_once('#').map_or(line, |(code, _)| code)
}
