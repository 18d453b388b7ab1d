//! Engine error taxonomy.
//!
//! Every variant is a construction or translation defect surfaced to
//! the programmer; none is a recoverable runtime condition, and no
//! partial formula is ever returned alongside an error.

use p4sym_smt::TermError;
use thiserror::Error;

/// Errors raised during symbolic evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A name has no binding in the current state. Nothing is
    /// synthesized in its place.
    #[error("unresolved reference `{name}`")]
    UnresolvedReference { name: String },

    /// A value of the wrong kind reached a consumption site.
    #[error("unsupported value kind `{kind}` in {context}")]
    UnsupportedValue {
        context: &'static str,
        kind: &'static str,
    },

    /// Integer-literal division or remainder by zero during arithmetic
    /// preprocessing.
    #[error("integer division by zero")]
    DivisionByZero,

    /// A conditional was evaluated before its condition was set.
    #[error("conditional evaluated without a condition")]
    MissingCondition,

    /// A constant table entry's key tuple disagrees with the table's
    /// declared key count.
    #[error("constant entry has {found} keys, table `{table}` declares {declared}")]
    EntryKeyMismatch {
        table: String,
        declared: usize,
        found: usize,
    },

    /// A name resolved to something that cannot be invoked.
    #[error("`{name}` is not callable")]
    NotCallable { name: String },

    /// A table referenced an action that is not one.
    #[error("`{name}` is not an action")]
    NotAnAction { name: String },

    /// A switch case names an action the table does not declare.
    #[error("table `{table}` declares no action `{action}`")]
    UnknownAction { table: String, action: String },

    /// A named argument does not match any declared parameter.
    #[error("`{callable}` has no parameter `{name}`")]
    UnknownParameter { callable: String, name: String },

    /// More positional arguments than declared parameters.
    #[error("`{callable}` takes {declared} parameters, got {supplied}")]
    TooManyArguments {
        callable: String,
        declared: usize,
        supplied: usize,
    },

    /// An expression used where a storable location was required.
    #[error("expected an lvalue in {context}")]
    NotAnLValue { context: &'static str },

    /// Sort or width violation from the term layer.
    #[error(transparent)]
    Term(#[from] TermError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        assert_eq!(
            EvalError::UnresolvedReference {
                name: "hdr.eth".into()
            }
            .to_string(),
            "unresolved reference `hdr.eth`"
        );
        assert_eq!(
            EvalError::EntryKeyMismatch {
                table: "fwd".into(),
                declared: 2,
                found: 1
            }
            .to_string(),
            "constant entry has 1 keys, table `fwd` declares 2"
        );
    }
}
