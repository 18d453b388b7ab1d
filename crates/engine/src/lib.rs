//! p4sym symbolic execution engine.
//!
//! The engine walks an immutable node graph — expressions, statements,
//! callables, tables — and produces one closed-form formula over
//! fixed-width bit-vectors, booleans, and tuple aggregates describing
//! how an input packet/header state maps to an output state. It never
//! decides satisfiability and performs no I/O; solving and test
//! orchestration are the consumer's concern.
//!
//! - [`value`] — the symbolic value union and complex aggregates
//! - [`expr`] / [`stmt`] — the node taxonomies
//! - [`state`] — program state and the continuation driver
//! - [`callable`] — actions, functions, controls, parsers, externs
//! - [`table`] — the match-action table model
//! - [`registry`] — the global name registry the front-end populates
//!
//! # Usage
//!
//! ```
//! use std::rc::Rc;
//! use p4sym_engine::callable::{Callable, ControlDef, ControlKind, Direction, Parameter};
//! use p4sym_engine::expr::{CastTarget, Expr};
//! use p4sym_engine::stmt::{Block, Stmt};
//! use p4sym_engine::value::TypeSig;
//! use p4sym_engine::{evaluate_pipeline, Registry};
//!
//! let mut registry = Registry::new();
//! let body = Block::from_stmts(vec![Stmt::assign(
//!     Expr::name("port"),
//!     Expr::cast(Expr::Int(1), CastTarget::Bits(9)),
//! )]);
//! registry.register(Callable::Control(ControlDef::new(
//!     "ingress",
//!     ControlKind::Control,
//!     vec![Parameter::new(Direction::InOut, "port", TypeSig::Bits(9))],
//!     body,
//! )));
//!
//! let registry = Rc::new(registry);
//! let formula = evaluate_pipeline(&registry, "ingress").unwrap();
//! assert_eq!(formula.to_string(), "(ingress (_ bv1 9))");
//! ```
//!
//! # Free-variable naming
//!
//! Downstream consumers classify free variables by name, so the
//! conventions are stable: pipeline inputs are parameter-named (nested
//! fields dotted), match constants are `{table}_key_{index}`, the
//! action selector is `{table}_action`, placeholder action arguments
//! are `{table}_{param}`, and extern products are `{extern}_{param}`
//! and `{extern}_{digest}`.

pub mod callable;
pub mod error;
pub mod expr;
pub mod registry;
pub mod state;
pub mod stmt;
pub mod table;
pub mod value;

pub use error::EvalError;
pub use p4sym_smt::{Sort, Term};
pub use registry::Registry;
pub use state::{step, State};
pub use value::Value;

use callable::Callable;
use std::rc::Rc;

/// Evaluate a named top-level pipeline (a control or parser) with a
/// fresh input state and return its closed-form output formula.
///
/// Deterministic for a given node graph and registry. On error no
/// partial formula is returned.
pub fn evaluate_pipeline(registry: &Rc<Registry>, name: &str) -> Result<Term, EvalError> {
    let callable = registry
        .lookup(name)
        .ok_or_else(|| EvalError::UnresolvedReference {
            name: name.to_string(),
        })?;
    match &*callable {
        Callable::Control(control) => {
            let mut state = control.entry_state(Rc::clone(registry));
            step(&mut state)
        }
        _ => Err(EvalError::NotCallable {
            name: name.to_string(),
        }),
    }
}
