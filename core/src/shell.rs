//! POSIX shell word splitting.
//!
//! Used both to turn a command line into argv and to tokenize `lsblk -P`
//! output, where values are double-quoted and may contain spaces.

use crate::{BlkcryptError, Result};

/// Split `line` into words the way a POSIX shell would, without expansion.
///
/// Inside double quotes a backslash only escapes `"` and `\`; any other
/// backslash is kept as-is.
pub fn split(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err(unterminated(line)),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.peek() {
                            Some(&next) if next == '"' || next == '\\' => {
                                word.push(next);
                                chars.next();
                            }
                            Some(_) => word.push('\\'),
                            None => return Err(unterminated(line)),
                        },
                        Some(c) => word.push(c),
                        None => return Err(unterminated(line)),
                    }
                }
            }
            '\\' => match chars.next() {
                Some(c) => {
                    word.push(c);
                    in_word = true;
                }
                None => {
                    return Err(BlkcryptError::InvalidInput(format!(
                        "no escaped character in: {}",
                        line
                    )))
                }
            },
            c => {
                word.push(c);
                in_word = true;
            }
        }
    }

    if in_word {
        words.push(word);
    }

    Ok(words)
}

fn unterminated(line: &str) -> BlkcryptError {
    BlkcryptError::InvalidInput(format!("no closing quotation in: {}", line))
}
