//! Attribute-selector scoping for component styles.
//!
//! Every compound selector of a style rule is qualified with the component's
//! scope attribute (`h1 p` becomes `h1[data-x] p[data-x]`), so the same CSS
//! can be applied globally when shadow DOM is not available. Rules nested in
//! conditional group at-rules are scoped recursively; other at-rules pass
//! through untouched.
//!
//! Structural characters are all ASCII, so byte offsets found while scanning
//! are always valid `str` boundaries.

/// At-rules whose blocks contain ordinary style rules.
const CONDITIONAL_AT_RULES: &[&str] = &[
    "@media",
    "@supports",
    "@document",
    "@-moz-document",
    "@layer",
    "@container",
];

const HOST_PSEUDO: &str = ":host";
const HOST_CONTEXT_PSEUDO: &str = ":host-context";

/// Scopes every style rule in `css`.
///
/// `scope_selector` qualifies content selectors, `host_selector` replaces
/// `:host` references.
pub fn scope_css(css: &str, scope_selector: &str, host_selector: &str) -> String {
    let mut out = String::with_capacity(css.len() + css.len() / 4);
    scope_rules(css, scope_selector, host_selector, &mut out);
    out
}

fn scope_rules(css: &str, scope: &str, host: &str, out: &mut String) {
    let bytes = css.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let Some((idx, delimiter)) = find_prelude_end(bytes, pos) else {
            out.push_str(&css[pos..]);
            return;
        };

        if delimiter != b'{' {
            // block-less at-rule such as `@import`, or a stray `}`
            out.push_str(&css[pos..=idx]);
            pos = idx + 1;
            continue;
        }

        let prelude = &css[pos..idx];
        let close = find_block_end(bytes, idx);
        let body = &css[idx + 1..close];

        let lead_len = leading_trivia_len(prelude.as_bytes());
        let (lead, rest) = prelude.split_at(lead_len);
        let selector = rest.trim_end();
        let trail = &rest[selector.len()..];

        out.push_str(lead);
        if selector.starts_with('@') {
            out.push_str(selector);
            out.push_str(trail);
            out.push('{');
            if is_conditional_at_rule(selector) {
                scope_rules(body, scope, host, out);
            } else {
                out.push_str(body);
            }
        } else {
            out.push_str(&scope_selector_list(selector, scope, host));
            out.push_str(trail);
            out.push('{');
            out.push_str(body);
        }

        if close < bytes.len() {
            out.push('}');
        }
        pos = close + 1;
    }
}

fn is_conditional_at_rule(prelude: &str) -> bool {
    let name_end = prelude
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(prelude.len());
    let name = prelude[..name_end].to_ascii_lowercase();
    CONDITIONAL_AT_RULES.contains(&name.as_str())
}

/// Position and kind of the first top-level `{`, `;` or `}` at or after `from`.
fn find_prelude_end(bytes: &[u8], from: usize) -> Option<(usize, u8)> {
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_comment(bytes, i),
            b'"' | b'\'' => i = skip_string(bytes, i),
            b @ (b'{' | b';' | b'}') => return Some((i, b)),
            _ => i += 1,
        }
    }
    None
}

/// Index of the `}` matching the `{` at `open`, or `bytes.len()` when unterminated.
fn find_block_end(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_comment(bytes, i);
                continue;
            }
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return i + 2;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Length of whitespace and comments before the selector text.
fn leading_trivia_len(bytes: &[u8]) -> usize {
    let mut i = 0;
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) == Some(&b'/') && bytes.get(i + 1) == Some(&b'*') {
            i = skip_comment(bytes, i);
        } else {
            return i;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELECTORS
// ═══════════════════════════════════════════════════════════════════════════════

fn scope_selector_list(list: &str, scope: &str, host: &str) -> String {
    split_top_level(list, b',')
        .into_iter()
        .map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                return part.to_string();
            }
            let lead = &part[..part.len() - part.trim_start().len()];
            let trail = &part[part.trim_end().len()..];
            format!("{}{}{}", lead, scope_complex_selector(trimmed, scope, host), trail)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn scope_complex_selector(selector: &str, scope: &str, host: &str) -> String {
    let bytes = selector.as_bytes();
    let mut out = String::with_capacity(selector.len() + scope.len() * 2);
    let mut depth = 0usize;
    let mut compound_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b if depth == 0 && is_combinator(b) => {
                if compound_start < i {
                    out.push_str(&scope_compound(&selector[compound_start..i], scope, host));
                }
                let mut end = i;
                while end < bytes.len() && is_combinator(bytes[end]) {
                    end += 1;
                }
                out.push_str(&selector[i..end]);
                compound_start = end;
                i = end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    if compound_start < bytes.len() {
        out.push_str(&scope_compound(&selector[compound_start..], scope, host));
    }
    out
}

fn is_combinator(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'>' || b == b'+' || b == b'~'
}

fn scope_compound(compound: &str, scope: &str, host: &str) -> String {
    if let Some((context, after)) = compound
        .strip_prefix(HOST_CONTEXT_PSEUDO)
        .and_then(pseudo_args)
    {
        return format!("{} {}{}", context, host, after);
    }
    if let Some(rest) = compound.strip_prefix(HOST_PSEUDO) {
        if !rest.starts_with(|c: char| c == '-' || c == '_' || c.is_ascii_alphanumeric()) {
            return scope_host(rest, host);
        }
    }

    // the attribute goes before any pseudo-class or pseudo-element
    let bytes = compound.as_bytes();
    let mut depth = 0usize;
    let mut insert_at = bytes.len();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b':' if depth == 0 => {
                insert_at = i;
                break;
            }
            _ => {}
        }
    }

    format!("{}{}{}", &compound[..insert_at], scope, &compound[insert_at..])
}

/// `rest` is whatever followed `:host` in the compound.
fn scope_host(rest: &str, host: &str) -> String {
    match pseudo_args(rest) {
        Some((inner, after)) => format!("{}{}{}", inner, host, after),
        None => format!("{}{}", host, rest),
    }
}

/// Splits `(<args>)<after>` into the trimmed arguments and what follows.
fn pseudo_args(rest: &str) -> Option<(&str, &str)> {
    let args = rest.strip_prefix('(')?;
    let inner = split_top_level(args, b')').into_iter().next()?;
    let after = &args[(inner.len() + 1).min(args.len())..];
    Some((inner.trim(), after))
}

/// Splits on `delimiter` outside parentheses, brackets and strings.
fn split_top_level(text: &str, delimiter: u8) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_string(bytes, i);
                continue;
            }
            b if b == delimiter && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}
