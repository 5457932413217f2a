//! Typed parse errors for the callgrind grammar.
//!
//! Every non-I/O variant carries the 1-based line number and the raw line
//! text, so a failure can be reported against the offending line of the dump.
//! Unknown informational lines (`cmd:`, `summary:`, comments) are *not*
//! errors - the classifier lets them fall through and the parser ignores
//! them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions that abort a parse at the offending line.
///
/// The parser commits nothing for the entry being assembled when one of
/// these is returned; callers can match on the variant to distinguish file
/// problems from grammar problems.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read `{path}`: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Cost or call data showed up before `positions:`/`events:` declared
    /// the axis layout, so the column split is unknowable.
    #[error("line {line}: missing positions:/events: header before cost data: `{text}`")]
    MissingHeader { line: u64, text: String },

    /// A position key outside the supported set (`cfe=` on the called axis).
    #[error("line {line}: unsupported position key `{key}`: `{text}`")]
    UnknownPositionKey {
        line: u64,
        key: String,
        text: String,
    },

    /// An aliased reference `(N)` with no prior `(N) name` definition.
    #[error("line {line}: cannot find compression ({index}) from the cache: `{text}`")]
    MissingCompression { line: u64, index: u64, text: String },

    /// A second naming definition for an already-bound alias index.
    #[error("line {line}: compression ({index}) defined twice: `{text}`")]
    DuplicateCompression { line: u64, index: u64, text: String },

    #[error("line {line}: malformed number `{token}`: `{text}`")]
    MalformedNumber {
        line: u64,
        token: String,
        text: String,
    },

    /// A cost line (or `calls=` sub-position group) with the wrong number of
    /// columns for the declared axes.
    #[error("line {line}: expected {expected} columns, found {found}: `{text}`")]
    WrongColumnCount {
        line: u64,
        expected: usize,
        found: usize,
        text: String,
    },

    /// Grammar violation: a line that cannot appear in the current parse
    /// state (e.g. a `calls=` line with no preceding call-position).
    #[error("line {line}: unexpected line: `{text}`")]
    UnexpectedLine { line: u64, text: String },
}

impl ParseError {
    /// 1-based line number of the offending line, if the error is tied to
    /// one (I/O errors are not).
    pub fn line(&self) -> Option<u64> {
        match self {
            ParseError::Io { .. } => None,
            ParseError::MissingHeader { line, .. }
            | ParseError::UnknownPositionKey { line, .. }
            | ParseError::MissingCompression { line, .. }
            | ParseError::DuplicateCompression { line, .. }
            | ParseError::MalformedNumber { line, .. }
            | ParseError::WrongColumnCount { line, .. }
            | ParseError::UnexpectedLine { line, .. } => Some(*line),
        }
    }
}
