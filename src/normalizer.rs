//! Output normalization for verdict comparison
//!
//! Canonicalizes program output so that formatting-only differences
//! (stray whitespace, spacing inside brackets and around commas) do not
//! affect equality. This function defines what "equal output" means for
//! the whole judging pipeline, so its steps must not be reordered.

/// Reduce raw program output to its canonical comparable form.
///
/// Steps, in order:
/// 1. Trim the whole text.
/// 2. Split into lines.
/// 3. Per line: trim, drop whitespace just inside `[` and `]`, then
///    collapse whitespace around `,` to exactly `", "`.
/// 4. Drop empty lines.
/// 5. Rejoin with `\n`.
///
/// Pure and idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    raw.trim()
        .split('\n')
        .map(canonicalize_line)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn canonicalize_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.trim().chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '[' => {
                out.push('[');
                skip_whitespace(&mut chars);
            }
            ']' => {
                pop_trailing_whitespace(&mut out);
                out.push(']');
            }
            ',' => {
                pop_trailing_whitespace(&mut out);
                out.push_str(", ");
                skip_whitespace(&mut chars);
            }
            _ => out.push(c),
        }
    }

    out
}

fn skip_whitespace(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn pop_trailing_whitespace(out: &mut String) {
    while out.ends_with(|c: char| c.is_whitespace()) {
        out.pop();
    }
}
