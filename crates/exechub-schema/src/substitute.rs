//! Environment-style variable substitution applied to manifest text before parsing.
//!
//! Recognised forms: `${{ ENV.NAME }}`, `${NAME}` and `$NAME`. A doubled `$$`
//! produces a literal `$`. Every referenced variable must resolve. YAML
//! comments are copied through untouched.

use crate::manifest::ManifestError;
use regex::{Captures, Regex};
use std::sync::OnceLock;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"\$\$|\$\{\{\s*ENV\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)",
        )
        .expect("substitution pattern is valid")
    })
}

fn variable_name<'a>(caps: &'a Captures<'_>) -> Option<&'a str> {
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
}

/// Byte offset where a YAML comment begins on `line`, if any.
///
/// A `#` starts a comment at the start of the line or after whitespace, when
/// it is not inside a quoted scalar.
fn comment_start(line: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;
    for (i, c) in line.char_indices() {
        match quote {
            Some('"') if c == '"' && prev != Some('\\') => quote = None,
            Some('\'') if c == '\'' => quote = None,
            Some(_) => {}
            None if matches!(c, '"' | '\'') => {
                let opens = prev.map_or(true, |p| {
                    p.is_whitespace() || matches!(p, ':' | '[' | '{' | ',') || (c == '\'' && p == c)
                });
                if opens {
                    quote = Some(c);
                }
            }
            None if c == '#' && prev.map_or(true, char::is_whitespace) => return Some(i),
            None => {}
        }
        prev = Some(c);
    }
    None
}

fn expand_into<F>(out: &mut String, text: &str, lookup: &F) -> Result<(), ManifestError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut last = 0;
    for caps in pattern().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        match variable_name(&caps) {
            Some(name) => {
                let value =
                    lookup(name).ok_or_else(|| ManifestError::UndefinedVariable(name.to_owned()))?;
                out.push_str(&value);
            }
            None => out.push('$'),
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(())
}

/// Expand variables in `input`, resolving names through `lookup`.
pub fn substitute<F>(input: &str, lookup: F) -> Result<String, ManifestError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    for line in input.split_inclusive('\n') {
        match comment_start(line) {
            Some(at) => {
                expand_into(&mut out, &line[..at], &lookup)?;
                out.push_str(&line[at..]);
            }
            None => expand_into(&mut out, line, &lookup)?,
        }
    }
    Ok(out)
}

/// Expand variables from the process environment.
pub fn substitute_env(input: &str) -> Result<String, ManifestError> {
    substitute(input, |name| std::env::var(name).ok())
}
