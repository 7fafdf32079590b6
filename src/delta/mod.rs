//! Text delta codec.
//!
//! A delta describes how to rebuild a target string from an original one as
//! a sequence of tokens:
//!
//! ```text
//! <3,3> quick<13,19>
//! ```
//!
//! - `<a,b>` copies the original from the current position up to `a`, then
//!   skips `original[a..b]`;
//! - any other text is inserted verbatim (a literal `<` is written `<<`);
//! - whatever follows the last marker's end is copied unchanged.
//!
//! Offsets count `char`s, not bytes. Equal runs are never transmitted.
//!
//! ```
//! use client_sync::delta;
//!
//! let d = delta::diff("The brown fox jumps", "The quick brown fox").unwrap();
//! assert_eq!(d, "<3,3> quick<13,19>");
//! assert_eq!(delta::merge("The brown fox jumps", &d).unwrap(), "The quick brown fox");
//! ```

mod codec;
mod matcher;

pub use codec::{diff, merge, tokenize, Token, Tokens};

/// A delta string that cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaError {
    /// A `<` opened a marker that the delta never closes.
    UnterminatedMarker { offset: usize },
    /// Unexpected character inside a marker, or a number that overflows.
    MalformedMarker { offset: usize },
    /// Marker with `start > end`.
    InvertedRange { start: usize, end: usize },
    /// Marker reaching past the end of the original.
    OutOfBounds { end: usize, len: usize },
    /// Marker starting before the end of the previous one.
    OutOfOrder { start: usize, cursor: usize },
}

impl std::fmt::Display for DeltaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeltaError::UnterminatedMarker { offset } => {
                write!(f, "Unterminated marker at byte {}", offset)
            }
            DeltaError::MalformedMarker { offset } => {
                write!(f, "Malformed marker at byte {}", offset)
            }
            DeltaError::InvertedRange { start, end } => {
                write!(f, "Marker <{},{}> has start after end", start, end)
            }
            DeltaError::OutOfBounds { end, len } => {
                write!(f, "Marker end {} is beyond original length {}", end, len)
            }
            DeltaError::OutOfOrder { start, cursor } => {
                write!(
                    f,
                    "Marker starting at {} overlaps previous marker ending at {}",
                    start, cursor
                )
            }
        }
    }
}

impl std::error::Error for DeltaError {}
