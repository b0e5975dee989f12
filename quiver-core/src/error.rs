//! Error types shared across the workspace.
//!
//! The taxonomy distinguishes programmer errors (invalid kinds, arities,
//! sorts, cross-manager identifiers; surfaced as descriptive `Error` values
//! that abort the current operation and leave manager state unchanged) from
//! user input errors (unparsable literals, unknown option names). Resource
//! exhaustion and cancellation are not errors at all; they surface as
//! `Result::Unknown` from the solver. Internal invariant violations panic
//! and are never mapped to `Unknown`.

use thiserror::Error;

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the term manager, options and solver layers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A term or sort identifier from a different term manager was passed in.
    #[error("identifier belongs to a different term manager")]
    CrossManager,

    /// A kind was applied with the wrong number of arguments.
    #[error("kind {kind} expects {expected} arguments, got {got}")]
    ArityMismatch {
        kind: &'static str,
        expected: String,
        got: usize,
    },

    /// A kind was applied with the wrong number of indices.
    #[error("kind {kind} expects {expected} indices, got {got}")]
    IndexCountMismatch {
        kind: &'static str,
        expected: usize,
        got: usize,
    },

    /// Child sorts do not match what the kind demands.
    #[error("sort mismatch in {kind}: {details}")]
    SortMismatch { kind: &'static str, details: String },

    /// An indexed operation addressed bits outside the operand.
    #[error("index out of range in {kind}: {details}")]
    IndexOutOfRange { kind: &'static str, details: String },

    /// A numeric literal could not be parsed in the requested base.
    #[error("cannot parse bit-vector literal {literal:?} in base {base}")]
    ValueParse { literal: String, base: u32 },

    /// A numeric literal does not fit in the declared width.
    #[error("bit-vector literal {literal:?} does not fit in {width} bits")]
    ValueOverflow { literal: String, width: u64 },

    /// An unknown option name was used.
    #[error("unknown option {0:?}")]
    UnknownOption(String),

    /// An option was set to a value outside its declared range.
    #[error("value {value} out of range for option {option} ({min}..={max})")]
    OptionOutOfRange {
        option: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// A model/core query was made in the wrong solver state.
    #[error("invalid solver state: {0}")]
    InvalidState(String),

    /// A feature combination that is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
}
