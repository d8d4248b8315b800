//! Error types for the operation algebra.
//!
//! Only *misuse* is an error here: applying an operation to a document of the
//! wrong shape, handing `rot` a malformed operand, or decoding a mangled
//! encoded form. Semantic disagreement between concurrent operations is not
//! an error at all — rebase and atomic composition report "no result" through
//! their `Option` return channel and callers pick a fallback.

use thiserror::Error;

/// An operation was applied to (or inverted against) a document it cannot
/// transform.
///
/// These represent programmer errors: the algebra is total over well-typed
/// documents, so a `TypeError` means the caller paired an operation with a
/// document shape it was never meant for.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TypeError {
    /// The document's type does not match the operation (e.g. a splice on a
    /// number, or `add` on a string).
    #[error("{op} cannot be applied to a {kind} document")]
    WrongType {
        /// Tag of the operation that was applied.
        op: &'static str,
        /// Type name of the offending document.
        kind: &'static str,
    },

    /// A sequence operation addressed elements beyond the end of the
    /// document.
    #[error("{op} range {start}..{end} is out of bounds for length {len}")]
    OutOfRange {
        op: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },

    /// A replacement value was of a different sequence kind than the
    /// document (e.g. splicing an array into a string).
    #[error("replacement is a {found} but the document is a {expected}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A math operand failed validation (e.g. a `rot` operand that is not a
    /// pair of non-negative integers, or a zero modulus).
    #[error("{op} operand {operand} is malformed")]
    BadOperand { op: &'static str, operand: String },

    /// The operation has no inverse for this operand (e.g. `mult 0`).
    #[error("{op} {operand} is not invertible")]
    NotInvertible { op: &'static str, operand: String },

    /// Integer arithmetic overflowed while applying a math operation.
    #[error("arithmetic overflow applying {op}")]
    Overflow { op: &'static str },
}

/// An encoded operation could not be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// The encoded form is not a JSON object.
    #[error("encoded operation is not a JSON object")]
    NotAnObject,

    /// The `_ot` tag names no registered operation.
    #[error("unknown operation tag {0:?}")]
    UnknownTag(String),

    /// A declared field is absent.
    #[error("missing field {0:?}")]
    MissingField(&'static str),

    /// A declared field holds a value of the wrong shape.
    #[error("field {0:?} is malformed")]
    BadField(&'static str),
}
