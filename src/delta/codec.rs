//! Delta encoding and decoding.

use std::fmt::Write as _;
use std::iter::Peekable;
use std::str::CharIndices;

use super::matcher::Matcher;
use super::DeltaError;

/// One token of a delta string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `<start,end>`: copy the original up to `start`, then skip to `end`.
    Marker { start: usize, end: usize },
    /// Text inserted verbatim at the current position.
    Literal(String),
}

impl Token {
    fn write_to(&self, out: &mut String) {
        match self {
            Token::Marker { start, end } => {
                // Writing to a String cannot fail.
                let _ = write!(out, "<{},{}>", start, end);
            }
            Token::Literal(text) => {
                for c in text.chars() {
                    if c == '<' {
                        out.push('<');
                    }
                    out.push(c);
                }
            }
        }
    }
}

/// Computes the delta turning `original` into `target`.
///
/// Returns `None` when both strings are equal.
pub fn diff(original: &str, target: &str) -> Option<String> {
    if original == target {
        return None;
    }

    let a: Vec<char> = original.chars().collect();
    let b: Vec<char> = target.chars().collect();

    let mut out = String::new();
    let mut ends_with_literal = false;
    for edit in Matcher::new(&a, &b).edits() {
        Token::Marker {
            start: edit.a_start,
            end: edit.a_end,
        }
        .write_to(&mut out);

        ends_with_literal = !edit.is_insertion_empty();
        if ends_with_literal {
            Token::Literal(b[edit.b_start..edit.b_end].iter().collect()).write_to(&mut out);
        }
    }

    // Anchor the final copy so a trailing literal is always closed by a marker.
    if ends_with_literal {
        Token::Marker {
            start: a.len(),
            end: a.len(),
        }
        .write_to(&mut out);
    }

    Some(out)
}

/// Applies `delta` to `original`.
///
/// Markers must be well-formed, in range and in increasing order; anything
/// else is rejected rather than producing a partial result.
pub fn merge(original: &str, delta: &str) -> Result<String, DeltaError> {
    let source: Vec<char> = original.chars().collect();
    let mut out = String::with_capacity(original.len() + delta.len());
    let mut cursor = 0;

    for token in tokenize(delta) {
        match token? {
            Token::Marker { start, end } => {
                if start > end {
                    return Err(DeltaError::InvertedRange { start, end });
                }
                if end > source.len() {
                    return Err(DeltaError::OutOfBounds {
                        end,
                        len: source.len(),
                    });
                }
                if start < cursor {
                    return Err(DeltaError::OutOfOrder { start, cursor });
                }
                out.extend(&source[cursor..start]);
                cursor = end;
            }
            Token::Literal(text) => out.push_str(&text),
        }
    }
    out.extend(&source[cursor..]);

    Ok(out)
}

/// Splits a delta string into tokens, unescaping literal text.
pub fn tokenize(delta: &str) -> Tokens<'_> {
    Tokens {
        chars: delta.char_indices().peekable(),
        failed: false,
    }
}

/// Iterator returned by [`tokenize`]. Stops after the first error.
pub struct Tokens<'a> {
    chars: Peekable<CharIndices<'a>>,
    failed: bool,
}

impl Tokens<'_> {
    fn number(&mut self, tag_offset: usize) -> Result<usize, DeltaError> {
        let mut value: Option<usize> = None;
        while let Some(&(offset, c)) = self.chars.peek() {
            let Some(digit) = c.to_digit(10) else {
                break;
            };
            value = Some(
                value
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit as usize))
                    .ok_or(DeltaError::MalformedMarker { offset })?,
            );
            self.chars.next();
        }
        match (value, self.chars.peek()) {
            (Some(v), _) => Ok(v),
            (None, None) => Err(DeltaError::UnterminatedMarker { offset: tag_offset }),
            (None, Some(&(offset, _))) => Err(DeltaError::MalformedMarker { offset }),
        }
    }

    fn expect(&mut self, expected: char, tag_offset: usize) -> Result<(), DeltaError> {
        match self.chars.next() {
            Some((_, c)) if c == expected => Ok(()),
            Some((offset, _)) => Err(DeltaError::MalformedMarker { offset }),
            None => Err(DeltaError::UnterminatedMarker { offset: tag_offset }),
        }
    }

    fn marker(&mut self, tag_offset: usize) -> Result<Token, DeltaError> {
        let start = self.number(tag_offset)?;
        self.expect(',', tag_offset)?;
        let end = self.number(tag_offset)?;
        self.expect('>', tag_offset)?;
        Ok(Token::Marker { start, end })
    }
}

impl Iterator for Tokens<'_> {
    type Item = Result<Token, DeltaError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let mut literal = String::new();
        while let Some(&(offset, c)) = self.chars.peek() {
            if c != '<' {
                literal.push(c);
                self.chars.next();
                continue;
            }

            // "<<" is an escaped literal '<'
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if matches!(lookahead.peek(), Some(&(_, '<'))) {
                literal.push('<');
                self.chars.next();
                self.chars.next();
                continue;
            }

            if !literal.is_empty() {
                return Some(Ok(Token::Literal(literal)));
            }

            self.chars.next();
            let result = self.marker(offset);
            self.failed = result.is_err();
            return Some(result);
        }

        if literal.is_empty() {
            None
        } else {
            Some(Ok(Token::Literal(literal)))
        }
    }
}
