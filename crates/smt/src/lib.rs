//! p4sym formula layer — sorts, terms, and bit-precise operations.
//!
//! This crate provides the solver-representable object language the
//! symbolic engine emits into:
//!
//! - [`Sort`] — boolean, fixed-width bit-vector, and tuple sorts
//! - [`Term`] — the closed term AST with fallible smart constructors
//! - [`bits`] — casting, width alignment, and slice assignment
//! - [`TermError`] — construction-time sort/width violations
//!
//! Terms are built once and never mutated; no simplification is
//! applied, and structural equality is the only equivalence offered.
//! Deciding satisfiability is the consumer's concern.
//!
//! # Usage
//!
//! ```
//! use p4sym_smt::{Sort, Term};
//!
//! let key = Term::var("key", Sort::Bv(8));
//! let wanted = Term::bv(5, 8).unwrap();
//! let hit = Term::eq(key, wanted).unwrap();
//! assert_eq!(hit.to_string(), "(= key (_ bv5 8))");
//! assert_eq!(hit.sort(), Sort::Bool);
//! ```

pub mod bits;
pub mod error;
pub mod sort;
pub mod term;

pub use error::TermError;
pub use sort::Sort;
pub use term::{BinaryOp, BoolOp, CmpOp, Term, UnaryOp};
