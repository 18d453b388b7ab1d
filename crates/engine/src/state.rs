//! Program state and the continuation driver.
//!
//! A [`State`] owns the variable bindings, the continuation (a
//! front-consumed deque of typed frames), a handle to the global
//! registry, and the ordered output member list its aggregate formula
//! is assembled from. Branch points fork the state by full clone;
//! forked copies never share mutable storage — the immutable node
//! graph and the registry are the only cross-fork sharing.
//!
//! [`step`] is the single sequencing primitive: it drains the
//! continuation front-to-back and terminates with the formula for the
//! state's output aggregate. Sequencing is expressed by pushing frames
//! rather than by host-call recursion, so "what happens next" can be
//! inserted in O(1) at any point (blocks, action bodies, table hits,
//! post-call restoration).

use crate::callable::Context;
use crate::error::EvalError;
use crate::expr::Expr;
use crate::registry::Registry;
use crate::stmt::{Block, Flow, Stmt, SwitchArms};
use crate::table::Table;
use crate::value::{TypeSig, Value};
use log::{debug, trace};
use p4sym_smt::{bits, Sort, Term};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// One unit of pending work on the continuation.
#[derive(Debug, Clone)]
pub enum Frame {
    /// A statement to execute.
    Stmt(Rc<Stmt>),
    /// A table application.
    Apply(Rc<Table>),
    /// Switch-arm dispatch over an applied table's action selector.
    Arms(Rc<SwitchArms>),
    /// Post-call context restoration.
    Restore(Box<Context>),
}

/// The mutable symbolic environment of one evaluation path.
#[derive(Debug, Clone)]
pub struct State {
    vars: HashMap<String, Value>,
    chain: VecDeque<Frame>,
    registry: Rc<Registry>,
    /// Aggregate name of the output tuple.
    name: String,
    /// Ordered output members (the scope's parameter set) with their
    /// declared signatures.
    outputs: Vec<(String, TypeSig)>,
}

impl State {
    /// Fresh state with no bindings and no outputs.
    pub fn new(registry: Rc<Registry>) -> State {
        State::scoped(registry, "state", Vec::new())
    }

    /// Fresh state scoped to a named output member list.
    pub fn scoped(
        registry: Rc<Registry>,
        name: impl Into<String>,
        outputs: Vec<(String, TypeSig)>,
    ) -> State {
        State {
            vars: HashMap::new(),
            chain: VecDeque::new(),
            registry,
            name: name.into(),
            outputs,
        }
    }

    /// Deep, fully independent copy — the sole forking mechanism.
    pub fn fork(&self) -> State {
        self.clone()
    }

    /// Handle to the global callable registry.
    pub fn registry(&self) -> &Rc<Registry> {
        &self.registry
    }

    pub(crate) fn pop_frame(&mut self) -> Option<Frame> {
        self.chain.pop_front()
    }

    /// Insert one unit of pending work at the continuation front.
    pub fn push_frame_front(&mut self, frame: Frame) {
        self.chain.push_front(frame);
    }

    /// Push a block's statements onto the continuation front, in order.
    pub fn push_block_front(&mut self, block: &Block) {
        for stmt in block.stmts.iter().rev() {
            self.chain.push_front(Frame::Stmt(Rc::clone(stmt)));
        }
    }

    pub(crate) fn take_chain(&mut self) -> VecDeque<Frame> {
        std::mem::take(&mut self.chain)
    }

    pub(crate) fn set_chain(&mut self, chain: VecDeque<Frame>) {
        self.chain = chain;
    }

    /// Truncate evaluation: drop every pending frame.
    pub(crate) fn clear_chain(&mut self) {
        self.chain.clear();
    }

    /// Exact-name binding lookup, no path descent, no forcing.
    pub(crate) fn get_var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Remove a binding entirely.
    pub fn del_var(&mut self, name: &str) {
        self.vars.remove(name);
    }

    /// Overwrite-or-insert a plain-name binding; no path descent.
    pub(crate) fn insert_var(&mut self, name: String, value: Value) {
        self.vars.insert(name, value);
    }

    /// Overwrite-or-insert a binding. Dotted names descend into
    /// complex values; the head of a dotted name must already be
    /// bound.
    pub fn set_or_add_var(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        trace!("binding {name} = {value:?}");
        let Some((head, rest)) = name.split_once('.') else {
            self.vars.insert(name.to_string(), value);
            return Ok(());
        };
        // Force a declaration thunk so the member write lands on a
        // concrete aggregate.
        if matches!(self.vars.get(head), Some(Value::Thunk(_))) {
            if let Some(thunk) = self.vars.get(head).cloned() {
                let forced = self.resolve_value(thunk)?;
                self.vars.insert(head.to_string(), forced);
            }
        }
        match self.vars.get_mut(head) {
            Some(Value::Complex(complex)) => complex.set_path(rest, value),
            Some(other) => Err(EvalError::UnsupportedValue {
                context: "member assignment",
                kind: other.kind(),
            }),
            None => Err(EvalError::UnresolvedReference {
                name: head.to_string(),
            }),
        }
    }

    /// Look a (possibly dotted) name up. Exact bindings win over path
    /// descent; bare names fall back to the registry's callables. The
    /// returned value is an independent copy.
    pub fn resolve_reference(&mut self, name: &str) -> Result<Value, EvalError> {
        if let Some(value) = self.vars.get(name) {
            return Ok(value.clone());
        }
        if let Some((head, rest)) = name.split_once('.') {
            let mut current = self.resolve_reference(head)?;
            for segment in rest.split('.') {
                current = self.resolve_value(current)?;
                match current {
                    Value::Complex(complex) => {
                        current = complex.get(segment).cloned().ok_or_else(|| {
                            EvalError::UnresolvedReference {
                                name: name.to_string(),
                            }
                        })?;
                    }
                    _ => {
                        return Err(EvalError::UnresolvedReference {
                            name: name.to_string(),
                        })
                    }
                }
            }
            return Ok(current);
        }
        if let Some(callable) = self.registry.lookup(name) {
            return Ok(Value::Callable(callable));
        }
        Err(EvalError::UnresolvedReference {
            name: name.to_string(),
        })
    }

    /// Fully resolve a value: force thunks, resolve containers
    /// element-wise, and return everything else as-is. Complex values
    /// are already independent copies by the time they get here.
    pub fn resolve_value(&mut self, value: Value) -> Result<Value, EvalError> {
        match value {
            Value::Thunk(expr) => {
                let forced = expr.eval(self)?;
                self.resolve_value(forced)
            }
            Value::List(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(self.resolve_value(item)?);
                }
                Ok(Value::List(resolved))
            }
            Value::Map(entries) => {
                let mut resolved = Vec::with_capacity(entries.len());
                for (name, item) in entries {
                    resolved.push((name, self.resolve_value(item)?));
                }
                Ok(Value::Map(resolved))
            }
            other => Ok(other),
        }
    }

    /// Resolve an expression node to a value: names look up through
    /// the resolver, everything else evaluates, and the result is
    /// fully resolved.
    pub fn resolve_expr(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        let value = expr.eval(self)?;
        self.resolve_value(value)
    }

    /// Store into an lvalue: a dotted name, optionally restricted to a
    /// bit range. A ranged write rebuilds the container via slice
    /// assignment, leaving untargeted bits intact.
    pub(crate) fn write_lvalue(
        &mut self,
        name: &str,
        slice: Option<(u32, u32)>,
        value: Value,
    ) -> Result<(), EvalError> {
        let Some((high, low)) = slice else {
            return self.set_or_add_var(name, value);
        };
        let container = self.resolve_reference(name)?;
        let container = self.resolve_value(container)?;
        let container = match container {
            // An integer container materializes at 64 bits.
            Value::Int(i) => Term::bv_signed(i, 64)?,
            Value::Term(t) => t,
            other => {
                return Err(EvalError::UnsupportedValue {
                    context: "slice assignment",
                    kind: other.kind(),
                })
            }
        };
        let replacement = match value {
            Value::Int(i) => Term::bv_signed(i, high - low + 1)?,
            Value::Term(t) => t,
            other => {
                return Err(EvalError::UnsupportedValue {
                    context: "slice assignment",
                    kind: other.kind(),
                })
            }
        };
        let merged = bits::slice_assign(container, replacement, high, low)?;
        self.set_or_add_var(name, Value::Term(merged))
    }

    /// The aggregate output formula: the named tuple of the output
    /// members' current values.
    pub fn output_term(&mut self) -> Result<Term, EvalError> {
        let outputs = self.outputs.clone();
        let mut members = Vec::with_capacity(outputs.len());
        for (name, sig) in &outputs {
            let value = self.resolve_reference(name)?;
            let value = self.resolve_value(value)?;
            members.push(value.to_term_as(sig)?);
        }
        Ok(Term::tuple(self.name.clone(), members))
    }

    /// Resolve an expression all the way to a boolean condition term.
    pub(crate) fn resolve_condition(&mut self, expr: &Expr) -> Result<Term, EvalError> {
        match self.resolve_expr(expr)? {
            Value::Term(t) if t.sort() == Sort::Bool => Ok(t),
            other => Err(EvalError::UnsupportedValue {
                context: "condition",
                kind: other.kind(),
            }),
        }
    }
}

/// Drain the continuation and return the value evaluation finishes
/// with: a statement's early result, or the aggregate output once the
/// chain is empty.
pub(crate) fn step_value(state: &mut State) -> Result<Value, EvalError> {
    loop {
        let Some(frame) = state.pop_frame() else {
            debug!("continuation drained, aggregating output");
            return Ok(Value::Term(state.output_term()?));
        };
        match frame {
            Frame::Stmt(stmt) => match stmt.exec(state)? {
                Flow::Continue => {}
                Flow::Done(value) => return Ok(value),
            },
            Frame::Apply(table) => return Ok(Value::Term(table.apply(state)?)),
            Frame::Arms(arms) => return Ok(Value::Term(arms.dispatch(state)?)),
            Frame::Restore(context) => context.restore(state)?,
        }
    }
}

/// Drain the continuation and return the closed-form formula for this
/// state's evaluation.
pub fn step(state: &mut State) -> Result<Term, EvalError> {
    let value = step_value(state)?;
    value.to_term()
}
