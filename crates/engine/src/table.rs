//! The match-action table model.
//!
//! A table combines three formulas when applied: the match predicate
//! (each key equated with a fresh match constant), the action-dispatch
//! nest, and the default action's effect on the unmatched path. Every
//! action effect runs the full invocation algorithm against its own
//! isolated fork of the state, so no two dispatch arms can observe
//! each other's mutations.

use crate::callable::{CallArg, CallOutcome, Callable};
use crate::error::EvalError;
use crate::expr::Expr;
use crate::state::{step, State};
use crate::value::Value;
use log::debug;
use p4sym_smt::{bits, Sort, Term};
use std::cell::Cell;

/// An action reference with the arguments an entry supplies.
#[derive(Debug, Clone)]
pub struct ActionCall {
    pub name: String,
    pub args: Vec<Expr>,
}

impl ActionCall {
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> ActionCall {
        ActionCall {
            name: name.into(),
            args,
        }
    }
}

/// One key position of a constant entry: a literal to match, or a
/// wildcard ("don't care").
#[derive(Debug, Clone)]
pub enum EntryKey {
    Value(Expr),
    Wildcard,
}

/// A constant entry: per-key literals bound to one action.
#[derive(Debug, Clone)]
struct ConstEntry {
    keys: Vec<EntryKey>,
    action: ActionCall,
}

/// A match-action table.
#[derive(Debug)]
pub struct Table {
    name: String,
    keys: Vec<Expr>,
    /// Declared actions in declaration order; ids are 1-based
    /// positions, id 0 is the default.
    actions: Vec<ActionCall>,
    default_action: Option<ActionCall>,
    const_entries: Vec<ConstEntry>,
    calls: Cell<u64>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Table {
        Table {
            name: name.into(),
            keys: Vec::new(),
            actions: Vec::new(),
            default_action: None,
            const_entries: Vec::new(),
            calls: Cell::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Diagnostic application count.
    pub fn call_count(&self) -> u64 {
        self.calls.get()
    }

    pub fn add_key(&mut self, key: Expr) {
        self.keys.push(key);
    }

    pub fn add_action(&mut self, action: ActionCall) {
        self.actions.push(action);
    }

    pub fn set_default(&mut self, action: ActionCall) {
        self.default_action = Some(action);
    }

    /// Add a constant entry. The entry's key tuple must match the
    /// declared key count exactly.
    pub fn add_const_entry(
        &mut self,
        keys: Vec<EntryKey>,
        action: ActionCall,
    ) -> Result<(), EvalError> {
        if keys.len() != self.keys.len() {
            return Err(EvalError::EntryKeyMismatch {
                table: self.name.clone(),
                declared: self.keys.len(),
                found: keys.len(),
            });
        }
        self.const_entries.push(ConstEntry { keys, action });
        Ok(())
    }

    /// Stable id of a declared action: 1-based declaration position.
    pub fn action_id(&self, name: &str) -> Option<u32> {
        self.actions
            .iter()
            .position(|a| a.name == name)
            .map(|index| index as u32 + 1)
    }

    /// The action-selector variable `{table}_action`.
    pub(crate) fn selector(&self) -> Term {
        Term::var(format!("{}_action", self.name), Sort::Bv(32))
    }

    /// Apply the table: `ite(match, dispatch, default)`.
    pub fn apply(&self, state: &mut State) -> Result<Term, EvalError> {
        self.calls.set(self.calls.get() + 1);
        debug!("applying table {}", self.name);
        let matched = self.match_predicate(state)?;
        let dispatch = self.dispatch(state)?;
        // The unmatched path falls through to the default action on
        // the live state.
        let default = self.eval_default(state)?;
        Ok(Term::ite(matched, dispatch, default)?)
    }

    /// Conjunction of `key_i == {table}_key_i` over the declared keys;
    /// constant false for a keyless table.
    fn match_predicate(&self, state: &mut State) -> Result<Term, EvalError> {
        if self.keys.is_empty() {
            return Ok(Term::bool_const(false));
        }
        let mut pairs = Vec::with_capacity(self.keys.len());
        for (index, key) in self.keys.iter().enumerate() {
            let value = state.resolve_expr(key)?;
            let term = value.to_term()?;
            let fresh = Term::var(format!("{}_key_{index}", self.name), term.sort());
            pairs.push(Term::eq(term, fresh)?);
        }
        Ok(Term::and_all(pairs)?)
    }

    /// Build the dispatch nest innermost-first: default effect, then
    /// constant entries in reverse declaration order, then declared
    /// actions in reverse declaration order. First-declared ends up
    /// outermost; the guards are mutually exclusive, and if
    /// overlapping guards were ever introduced the first-declared arm
    /// would win.
    fn dispatch(&self, state: &mut State) -> Result<Term, EvalError> {
        let mut expr = {
            let mut fork = state.fork();
            self.eval_default(&mut fork)?
        };
        for entry in self.const_entries.iter().rev() {
            let guard = self.entry_guard(state, entry)?;
            let effect = {
                let mut fork = state.fork();
                self.eval_action(&mut fork, &entry.action)?
            };
            expr = Term::ite(guard, effect, expr)?;
        }
        for (index, action) in self.actions.iter().enumerate().rev() {
            let id = index as u32 + 1;
            let guard = Term::eq(self.selector(), Term::bv(u128::from(id), 32)?)?;
            debug!("table {}: arm {} (id {id})", self.name, action.name);
            let effect = {
                let mut fork = state.fork();
                self.eval_action(&mut fork, action)?
            };
            expr = Term::ite(guard, effect, expr)?;
        }
        Ok(expr)
    }

    /// Conjunction of `key_i == literal_i` over an entry's
    /// non-wildcard key positions.
    fn entry_guard(&self, state: &mut State, entry: &ConstEntry) -> Result<Term, EvalError> {
        let mut pairs = Vec::new();
        for (key, entry_key) in self.keys.iter().zip(&entry.keys) {
            let EntryKey::Value(literal) = entry_key else {
                continue;
            };
            let key_term = state.resolve_expr(key)?.to_term()?;
            let literal_term = match state.resolve_expr(literal)? {
                Value::Int(i) => Term::bv_signed(i, key_term.width().unwrap_or(64))?,
                other => other.to_term()?,
            };
            let (key_term, literal_term) = bits::align(key_term, literal_term)?;
            pairs.push(Term::eq(key_term, literal_term)?);
        }
        Ok(Term::and_all(pairs)?)
    }

    /// Run one action's effect through the full invocation algorithm,
    /// with fresh `{table}_{param}` placeholders for parameters beyond
    /// what the entry supplies, then drain the state to its formula.
    fn eval_action(&self, state: &mut State, call: &ActionCall) -> Result<Term, EvalError> {
        let resolved = state.resolve_reference(&call.name)?;
        let resolved = state.resolve_value(resolved)?;
        let Value::Callable(callable) = resolved else {
            return Err(EvalError::NotAnAction {
                name: call.name.clone(),
            });
        };
        let Callable::Action(action) = &*callable else {
            return Err(EvalError::NotAnAction {
                name: call.name.clone(),
            });
        };
        let mut args: Vec<CallArg<'_>> = Vec::with_capacity(action.params.len());
        for (index, param) in action.params.iter().enumerate() {
            match call.args.get(index) {
                Some(expr) => args.push(CallArg::Expr(expr)),
                None => {
                    let placeholder = param.sig.fresh(&format!("{}_{}", self.name, param.name));
                    args.push(CallArg::Value(placeholder));
                }
            }
        }
        let CallOutcome::Queued = action.invoke(state, args, &[])? else {
            return Err(EvalError::NotAnAction {
                name: call.name.clone(),
            });
        };
        step(state)
    }

    /// The default action's effect, or the synthesized zero-argument
    /// no-op (id 0) when no default was declared.
    fn eval_default(&self, state: &mut State) -> Result<Term, EvalError> {
        match &self.default_action {
            Some(call) => {
                debug!("table {}: default action {}", self.name, call.name);
                self.eval_action(state, call)
            }
            None => step(state),
        }
    }
}
