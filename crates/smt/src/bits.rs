//! Bit-precise value operations: casting, width alignment, and
//! sub-range (slice) assignment.
//!
//! These implement the P4 width rules: casts truncate high bits or
//! zero-extend (there is no sign-extension path), booleans convert
//! through a 1-bit vector, and a boolean is reconstituted by comparing
//! against the 1-bit constant one.

use crate::error::TermError;
use crate::sort::Sort;
use crate::term::Term;

/// Lower a boolean term to its 1-bit vector encoding (1 for true).
/// Bit-vector terms pass through unchanged.
fn bool_to_bv(val: Term) -> Result<Term, TermError> {
    if val.sort().is_bool() {
        return Term::ite(val, Term::bv(1, 1)?, Term::bv(0, 1)?);
    }
    Ok(val)
}

/// Resize a bit-vector to an exact width: truncate high bits when
/// narrowing, zero-extend when widening.
fn resize(val: Term, width: u32) -> Result<Term, TermError> {
    let current = match val.sort() {
        Sort::Bv(w) => w,
        other => return Err(TermError::NotABitVector { found: other }),
    };
    if width == 0 {
        return Err(TermError::ZeroWidth);
    }
    if current == width {
        Ok(val)
    } else if current > width {
        Term::extract(width - 1, 0, val)
    } else {
        Term::zero_ext(width - current, val)
    }
}

/// Cast a term to a target sort.
///
/// Booleans lower to width 1 before any resizing. Casting to `Bool`
/// compares the 1-bit truncation of the value against the 1-bit
/// constant one; this is the sole boolean-interpretation rule. Tuple
/// targets are rejected.
pub fn cast(val: Term, to: &Sort) -> Result<Term, TermError> {
    let val = bool_to_bv(val)?;
    match to {
        Sort::Bool => {
            let bit = resize(val, 1)?;
            Term::eq(bit, Term::bv(1, 1)?)
        }
        Sort::Bv(width) => resize(val, *width),
        Sort::Tuple(_) => Err(TermError::SortMismatch {
            left: to.clone(),
            right: val.sort(),
        }),
    }
}

/// Pad the narrower of two bit-vector operands to the wider width via
/// zero-extension. Operand pairs that are not both bit-vectors pass
/// through untouched.
pub fn align(a: Term, b: Term) -> Result<(Term, Term), TermError> {
    match (a.sort(), b.sort()) {
        (Sort::Bv(wa), Sort::Bv(wb)) if wa < wb => Ok((cast(a, &Sort::Bv(wb))?, b)),
        (Sort::Bv(wa), Sort::Bv(wb)) if wa > wb => {
            let b = cast(b, &Sort::Bv(wa))?;
            Ok((a, b))
        }
        _ => Ok((a, b)),
    }
}

/// Overwrite bits `[high:low]` of `container` with `rhs`, leaving the
/// remaining bits untouched.
///
/// A full-span slice elides the container entirely: the result is
/// `rhs` forced to the container width. Otherwise the result is
/// `high-segment ++ rhs ++ low-segment`, with `rhs` forced into
/// exactly `high - low + 1` bits.
pub fn slice_assign(container: Term, rhs: Term, high: u32, low: u32) -> Result<Term, TermError> {
    let width = match container.sort() {
        Sort::Bv(w) => w,
        other => return Err(TermError::NotABitVector { found: other }),
    };
    if high < low || high >= width {
        return Err(TermError::InvalidSlice { high, low, width });
    }
    let rhs = bool_to_bv(rhs)?;
    let top = width - 1;
    if high == top && low == 0 {
        return resize(rhs, width);
    }
    let mut result = resize(rhs, high - low + 1)?;
    if high < top {
        let upper = Term::extract(top, high + 1, container.clone())?;
        result = Term::concat(upper, result)?;
    }
    if low > 0 {
        let lower = Term::extract(low - 1, 0, container)?;
        result = Term::concat(result, lower)?;
    }
    Ok(result)
}
