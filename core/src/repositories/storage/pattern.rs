//! Glob-style key patterns, as understood by `KEYS`/`SCAN MATCH`.

use regex::Regex;

use crate::errors::{StorageError, StorageResult};

/// Compiled key pattern supporting `*`, `?`, `[...]`, `[^...]`/`[!...]` and `\` escapes
#[derive(Debug, Clone)]
pub struct KeyPattern {
    regex: Regex,
}

impl KeyPattern {
    /// Compiles a glob pattern
    pub fn new(glob: &str) -> StorageResult<Self> {
        let mut source = String::with_capacity(glob.len() * 2 + 6);
        // `*` and `?` match any byte on Redis, newlines included
        source.push_str("(?s)^");

        let mut chars = glob.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        source.push_str(&regex::escape(&escaped.to_string()));
                    }
                }
                '[' => {
                    source.push('[');
                    if matches!(chars.peek(), Some('!') | Some('^')) {
                        chars.next();
                        source.push('^');
                    }
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        match inner {
                            ']' => {
                                closed = true;
                                break;
                            }
                            '\\' | '[' | '&' | '~' => {
                                source.push('\\');
                                source.push(inner);
                            }
                            _ => source.push(inner),
                        }
                    }
                    if !closed {
                        return Err(invalid(glob, "unterminated character class"));
                    }
                    source.push(']');
                }
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }

        source.push('$');
        let regex = Regex::new(&source).map_err(|e| invalid(glob, &e.to_string()))?;
        Ok(Self { regex })
    }

    /// Escapes glob metacharacters so `literal` only matches itself
    pub fn escape(literal: &str) -> String {
        let mut escaped = String::with_capacity(literal.len());
        for c in literal.chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

fn invalid(glob: &str, reason: &str) -> StorageError {
    StorageError::Backend {
        message: format!("invalid key pattern '{}': {}", glob, reason),
    }
}
