//! Construction errors for the term layer.
//!
//! Terms are built through fallible smart constructors; a sort or
//! width violation is a construction-time bug in the caller, never a
//! recoverable runtime condition.

use crate::sort::Sort;
use thiserror::Error;

/// Errors raised while constructing terms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TermError {
    /// A bit-vector sort or constant was requested with width zero.
    #[error("bit-vector width must be at least 1")]
    ZeroWidth,

    /// Two operands were expected to share a sort but do not.
    #[error("sort mismatch: {left} vs {right}")]
    SortMismatch { left: Sort, right: Sort },

    /// A bit-vector operand was expected.
    #[error("expected a bit-vector, got {found}")]
    NotABitVector { found: Sort },

    /// A boolean operand was expected.
    #[error("expected a boolean, got {found}")]
    NotABoolean { found: Sort },

    /// An extraction or slice range is outside the operand width.
    #[error("invalid slice [{high}:{low}] on width {width}")]
    InvalidSlice { high: u32, low: u32, width: u32 },
}
