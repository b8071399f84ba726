//! POSIX shell word splitting.
//!
//! Splits an interpreter line into argv the way `sh` would tokenise it:
//! whitespace separates words, single quotes are literal, double quotes
//! honour backslash escapes for `\`, `"`, `$` and backtick, and a
//! backslash outside quotes escapes the next character. There is no
//! globbing and no variable expansion; the placeholder resolver has
//! already produced literal text by the time this runs.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("unterminated single quote")]
    UnterminatedSingle,
    #[error("unterminated double quote")]
    UnterminatedDouble,
    #[error("trailing backslash")]
    TrailingBackslash,
}

pub fn split(input: &str) -> Result<Vec<String>, SplitError> {
    let mut words = Vec::new();
    let mut current = String::new();
    // a quoted empty string still produces a word
    let mut started = false;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match ch {
            c if c.is_whitespace() => {
                if started {
                    words.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            '\\' => {
                match chars.next() {
                    Some('\n') => {} // line continuation
                    Some(escaped) => {
                        current.push(escaped);
                        started = true;
                    }
                    None => return Err(SplitError::TrailingBackslash),
                }
            }
            '\'' => {
                started = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(SplitError::UnterminatedSingle),
                    }
                }
            }
            '"' => {
                started = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('\\' | '"' | '$' | '`')) => current.push(c),
                            Some('\n') => {}
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(SplitError::UnterminatedDouble),
                        },
                        Some(c) => current.push(c),
                        None => return Err(SplitError::UnterminatedDouble),
                    }
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }

    if started {
        words.push(current);
    }
    Ok(words)
}
