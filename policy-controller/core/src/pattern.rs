//! Glob-style matching of configured patterns against observed values.
//!
//! A pattern may contain `*` (any run of characters, including none), `?`
//! (exactly one character) and `[...]` character classes, negated with a
//! leading `!`. Everything else is compared literally and case-sensitively.

use regex::Regex;

/// Matches `value` against `pattern`.
///
/// An empty pattern is unconstrained and matches every value. A pattern
/// without wildcards requires exact equality. A pattern that cannot be
/// compiled, e.g. one with an unterminated class, is compared literally.
pub fn is_match(pattern: &str, value: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }

    if !has_wildcard(pattern) {
        return pattern == value;
    }

    match compile(pattern) {
        Some(re) => re.is_match(value),
        None => pattern == value,
    }
}

fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn compile(pattern: &str) -> Option<Regex> {
    let mut expr = String::with_capacity(pattern.len() * 2 + 6);
    expr.push_str("(?s)^");

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                // Consecutive stars are equivalent to one.
                while chars.peek() == Some(&'*') {
                    chars.next();
                }
                expr.push_str(".*");
            }
            '?' => expr.push('.'),
            '[' => {
                let mut class = Vec::new();
                loop {
                    match chars.next() {
                        Some(']') if !class.is_empty() => break,
                        Some(c) => class.push(c),
                        None => return None,
                    }
                }
                push_class(&mut expr, &class);
            }
            c => push_literal(&mut expr, c),
        }
    }

    expr.push('$');
    Regex::new(&expr).ok()
}

fn push_class(expr: &mut String, class: &[char]) {
    let (negated, members) = match class.split_first() {
        Some(('!', rest)) if !rest.is_empty() => (true, rest),
        _ => (false, class),
    };

    expr.push('[');
    if negated {
        expr.push('^');
    }
    for (i, c) in members.iter().enumerate() {
        let is_range = *c == '-' && i > 0 && i + 1 < members.len();
        if is_range {
            expr.push('-');
        } else {
            push_literal(expr, *c);
        }
    }
    expr.push(']');
}

fn push_literal(expr: &mut String, c: char) {
    let mut buf = [0u8; 4];
    expr.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}
