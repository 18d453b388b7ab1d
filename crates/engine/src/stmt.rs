//! Statement node taxonomy.
//!
//! Statements mutate or fork the evaluation state through the
//! continuation driver. A statement either continues (after pushing
//! any follow-on work onto the continuation front) or finishes
//! evaluation with a value — conditionals and switches finish, because
//! their branch formulas already cover everything downstream.

use crate::callable::CallOutcome;
use crate::error::EvalError;
use crate::expr::{eval_call, CallExpr, Expr};
use crate::state::{step, Frame, State};
use crate::table::Table;
use crate::value::Value;
use log::debug;
use p4sym_smt::Term;
use std::rc::Rc;

/// Result of executing one statement.
#[derive(Debug)]
pub(crate) enum Flow {
    /// Keep draining the continuation.
    Continue,
    /// Evaluation of this path is complete with this value.
    Done(Value),
}

/// An ordered statement sequence.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Rc<Stmt>>,
}

impl Block {
    pub fn new() -> Block {
        Block::default()
    }

    pub fn from_stmts(stmts: Vec<Stmt>) -> Block {
        Block {
            stmts: stmts.into_iter().map(Rc::new).collect(),
        }
    }

    pub fn push(&mut self, stmt: Stmt) {
        self.stmts.push(Rc::new(stmt));
    }
}

/// One arm of a switch-on-action-hit.
#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// Declared action name this arm fires on.
    pub action: String,
    pub block: Block,
}

/// Switch-arm dispatch, queued behind the table application it
/// scrutinizes.
#[derive(Debug)]
pub struct SwitchArms {
    pub(crate) table: Rc<Table>,
    pub(crate) cases: Vec<SwitchCase>,
    pub(crate) default: Block,
}

/// A statement node.
#[derive(Debug)]
pub enum Stmt {
    /// Declaration: stores the right-hand side unresolved, for lazy
    /// resolution at first use.
    Decl { name: String, value: Rc<Expr> },
    /// Assignment: resolves the right-hand side, then stores into the
    /// target lvalue (slice-aware).
    Assign { target: Expr, value: Expr },
    /// Method call whose result, if any, is discarded.
    MethodCall(CallExpr),
    Block(Block),
    /// Conditional. The condition is optional only because the
    /// front-end builds nodes incrementally; evaluating without one is
    /// fatal.
    If {
        cond: Option<Expr>,
        then_stmt: Rc<Stmt>,
        else_stmt: Option<Rc<Stmt>>,
    },
    /// Switch over an applied table's selected action.
    Switch {
        table: String,
        cases: Vec<SwitchCase>,
        default: Block,
    },
    /// Truncate evaluation of this path.
    Exit,
    /// Finish with an explicit value, or with the aggregate output.
    Return(Option<Expr>),
    Noop,
}

impl Stmt {
    pub fn decl(name: impl Into<String>, value: Expr) -> Stmt {
        Stmt::Decl {
            name: name.into(),
            value: Rc::new(value),
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Stmt {
        Stmt::Assign { target, value }
    }

    pub fn method_call(callee: impl Into<String>, args: Vec<Expr>) -> Stmt {
        Stmt::MethodCall(CallExpr {
            callee: callee.into(),
            args,
            named: Vec::new(),
        })
    }

    pub fn if_then(cond: Expr, then_stmt: Stmt) -> Stmt {
        Stmt::If {
            cond: Some(cond),
            then_stmt: Rc::new(then_stmt),
            else_stmt: None,
        }
    }

    pub fn if_then_else(cond: Expr, then_stmt: Stmt, else_stmt: Stmt) -> Stmt {
        Stmt::If {
            cond: Some(cond),
            then_stmt: Rc::new(then_stmt),
            else_stmt: Some(Rc::new(else_stmt)),
        }
    }

    /// Execute this statement against the state.
    pub(crate) fn exec(&self, state: &mut State) -> Result<Flow, EvalError> {
        match self {
            Stmt::Decl { name, value } => {
                debug!("declaring {name}");
                state.set_or_add_var(name, Value::Thunk(Rc::clone(value)))?;
                Ok(Flow::Continue)
            }
            Stmt::Assign { target, value } => {
                let resolved = state.resolve_expr(value)?;
                let (name, slice) = target.as_lvalue(state)?;
                debug!("assigning to {name}");
                state.write_lvalue(&name, slice, resolved)?;
                Ok(Flow::Continue)
            }
            Stmt::MethodCall(call) => {
                debug!("calling {}", call.callee);
                match eval_call(call, state)? {
                    CallOutcome::Value(_) | CallOutcome::Queued => Ok(Flow::Continue),
                    CallOutcome::Finished(term) => Ok(Flow::Done(Value::Term(term))),
                }
            }
            Stmt::Block(block) => {
                state.push_block_front(block);
                Ok(Flow::Continue)
            }
            Stmt::If {
                cond,
                then_stmt,
                else_stmt,
            } => {
                let cond = cond.as_ref().ok_or(EvalError::MissingCondition)?;
                let cond = state.resolve_condition(cond)?;
                // The then-branch runs against a deep fork; the
                // else-branch (or the plain fallthrough) consumes the
                // original state.
                let then_term = {
                    let mut fork = state.fork();
                    fork.push_frame_front(Frame::Stmt(Rc::clone(then_stmt)));
                    step(&mut fork)?
                };
                let else_term = match else_stmt {
                    Some(else_stmt) => {
                        state.push_frame_front(Frame::Stmt(Rc::clone(else_stmt)));
                        step(state)?
                    }
                    None => step(state)?,
                };
                Ok(Flow::Done(Value::Term(Term::ite(
                    cond, then_term, else_term,
                )?)))
            }
            Stmt::Switch {
                table,
                cases,
                default,
            } => {
                let resolved = state.resolve_reference(table)?;
                let resolved = state.resolve_value(resolved)?;
                let table_rc = match resolved {
                    Value::Callable(callable) => callable.as_table().ok_or_else(|| {
                        EvalError::NotCallable {
                            name: table.clone(),
                        }
                    })?,
                    other => {
                        return Err(EvalError::UnsupportedValue {
                            context: "switch scrutinee",
                            kind: other.kind(),
                        })
                    }
                };
                let arms = SwitchArms {
                    table: Rc::clone(&table_rc),
                    cases: cases.clone(),
                    default: default.clone(),
                };
                state.push_frame_front(Frame::Arms(Rc::new(arms)));
                state.push_frame_front(Frame::Apply(table_rc));
                Ok(Flow::Continue)
            }
            Stmt::Exit => {
                debug!("exit: truncating continuation");
                state.clear_chain();
                Ok(Flow::Continue)
            }
            Stmt::Return(expr) => match expr {
                None => Ok(Flow::Done(Value::Term(state.output_term()?))),
                Some(expr) => {
                    let value = state.resolve_expr(expr)?;
                    Ok(Flow::Done(value))
                }
            },
            Stmt::Noop => Ok(Flow::Continue),
        }
    }
}

impl SwitchArms {
    /// Build the nested arm formula. Arms fold right-to-left over the
    /// declaration order with the default case innermost, so the
    /// first-declared arm ends up checked outermost; the guards are
    /// mutually exclusive, and if overlapping guards were ever
    /// introduced the first-declared arm would win.
    pub(crate) fn dispatch(&self, state: &mut State) -> Result<Term, EvalError> {
        let selector = self.table.selector();
        let mut result = {
            let mut fork = state.fork();
            fork.push_block_front(&self.default);
            step(&mut fork)?
        };
        for case in self.cases.iter().rev() {
            let id = self.table.action_id(&case.action).ok_or_else(|| {
                EvalError::UnknownAction {
                    table: self.table.name().to_string(),
                    action: case.action.clone(),
                }
            })?;
            let guard = Term::eq(selector.clone(), Term::bv(u128::from(id), 32)?)?;
            let mut fork = state.fork();
            fork.push_block_front(&case.block);
            let arm = step(&mut fork)?;
            result = Term::ite(guard, arm, result)?;
        }
        Ok(result)
    }
}
