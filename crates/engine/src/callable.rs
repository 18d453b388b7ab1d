//! The callable framework: actions, functions, controls, parsers,
//! externs, and the call-context save/restore discipline.
//!
//! All callables share one parameter-binding algorithm: positional
//! arguments bind to declared parameters in declaration order, named
//! arguments bind by name, and every bound pair keeps its declared
//! direction. Invocation snapshots the pre-call values of the
//! parameter names it is about to overwrite into a [`Context`]; the
//! context restores or propagates those values when the body finishes,
//! which is what makes a call's side effects locally reversible and
//! composable.

use crate::error::EvalError;
use crate::expr::Expr;
use crate::registry::Registry;
use crate::state::{step_value, Frame, State};
use crate::stmt::Block;
use crate::table::Table;
use crate::value::{TypeSig, Value};
use log::debug;
use p4sym_smt::Term;
use std::cell::Cell;
use std::rc::Rc;

/// Parameter direction across the call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Read-only: the callee sees the argument value, the caller's
    /// binding is untouched.
    In,
    /// Write-only: the callee starts from a fresh unconstrained value
    /// and the result propagates to the caller's target.
    Out,
    /// Read-write: the argument value flows in, the final value flows
    /// back out.
    InOut,
}

/// A declared callable parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub direction: Direction,
    pub name: String,
    pub sig: TypeSig,
}

impl Parameter {
    pub fn new(direction: Direction, name: impl Into<String>, sig: TypeSig) -> Parameter {
        Parameter {
            direction,
            name: name.into(),
            sig,
        }
    }
}

/// Whether a control-like callable is a control or a parser; the
/// evaluation semantics are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Control,
    Parser,
}

/// A registered callable.
#[derive(Debug)]
pub enum Callable {
    Action(ActionDef),
    Function(FunctionDef),
    Control(ControlDef),
    Extern(ExternDef),
    Table(Rc<Table>),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Action(a) => &a.name,
            Callable::Function(f) => &f.name,
            Callable::Control(c) => &c.name,
            Callable::Extern(e) => &e.name,
            Callable::Table(t) => t.name(),
        }
    }

    pub(crate) fn as_table(&self) -> Option<Rc<Table>> {
        match self {
            Callable::Table(t) => Some(Rc::clone(t)),
            _ => None,
        }
    }
}

/// An argument at a call site: an expression from the node graph, or
/// an already-computed value (table placeholder arguments).
#[derive(Debug)]
pub(crate) enum CallArg<'a> {
    Expr(&'a Expr),
    Value(Value),
}

/// What an invocation produced.
#[derive(Debug)]
pub(crate) enum CallOutcome {
    /// A value (functions, externs with a return type).
    Value(Value),
    /// Work was queued on the continuation; the driver carries on.
    Queued,
    /// The call consumed the rest of this path and finished with a
    /// formula (table application).
    Finished(Term),
}

/// Pre-call snapshot of one parameter binding.
#[derive(Debug, Clone)]
struct SavedParam {
    direction: Direction,
    name: String,
    /// Caller-side target lvalue for `out`/`inout` propagation.
    target: Option<(String, Option<(u32, u32)>)>,
    /// Pre-call value of the parameter name in the caller's scope;
    /// `None` is the delete-marker for a previously absent binding.
    saved: Option<Value>,
}

/// Post-call restoration unit, queued behind a callable's body.
#[derive(Debug, Clone)]
pub struct Context {
    saved: Vec<SavedParam>,
    /// Suspended caller state for control invocations.
    parent: Option<Box<State>>,
}

impl Context {
    pub(crate) fn empty() -> Context {
        Context {
            saved: Vec::new(),
            parent: None,
        }
    }

    /// Restore the caller's view after a body finished: read each
    /// `out`/`inout` parameter's final callee-scope value, switch back
    /// to a suspended parent (splicing the remaining continuation in),
    /// restore or delete the parameter-name bindings, and write the
    /// final values onto the caller-side targets.
    pub(crate) fn restore(self, state: &mut State) -> Result<(), EvalError> {
        let mut finals = Vec::with_capacity(self.saved.len());
        for sp in &self.saved {
            if matches!(sp.direction, Direction::Out | Direction::InOut) {
                let value = state.resolve_reference(&sp.name)?;
                finals.push(Some(state.resolve_value(value)?));
            } else {
                finals.push(None);
            }
        }
        if let Some(parent) = self.parent {
            debug!("control returned, resuming caller");
            let chain = state.take_chain();
            let mut parent = *parent;
            parent.set_chain(chain);
            *state = parent;
        }
        for (sp, final_value) in self.saved.into_iter().zip(finals) {
            match sp.saved {
                None => state.del_var(&sp.name),
                Some(value) => state.insert_var(sp.name.clone(), value),
            }
            if let (Some((name, slice)), Some(value)) = (sp.target, final_value) {
                debug!("copy-out {} -> {name}", sp.name);
                state.write_lvalue(&name, slice, value)?;
            }
        }
        Ok(())
    }
}

/// An action: binds in the caller's scope and queues body + restore.
#[derive(Debug)]
pub struct ActionDef {
    pub name: String,
    pub params: Vec<Parameter>,
    pub body: Block,
    calls: Cell<u64>,
}

impl ActionDef {
    pub fn new(name: impl Into<String>, params: Vec<Parameter>, body: Block) -> ActionDef {
        ActionDef {
            name: name.into(),
            params,
            body,
            calls: Cell::new(0),
        }
    }

    /// Diagnostic invocation count.
    pub fn call_count(&self) -> u64 {
        self.calls.get()
    }

    pub(crate) fn invoke(
        &self,
        state: &mut State,
        args: Vec<CallArg<'_>>,
        named: &[(String, Expr)],
    ) -> Result<CallOutcome, EvalError> {
        self.calls.set(self.calls.get() + 1);
        debug!("invoking action {}", self.name);
        let merged = merge_parameters(&self.name, &self.params, args, named)?;
        let saved = snapshot(state, &merged)?;
        let bindings = copy_in(state, &merged)?;
        for (name, value) in bindings {
            state.insert_var(name, value);
        }
        state.push_frame_front(Frame::Restore(Box::new(Context {
            saved,
            parent: None,
        })));
        state.push_block_front(&self.body);
        Ok(CallOutcome::Queued)
    }
}

/// A pure function with a declared return type: its body evaluates
/// against a discarded fork, so no state mutation survives the call.
#[derive(Debug)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_sig: TypeSig,
    pub body: Block,
    calls: Cell<u64>,
}

impl FunctionDef {
    pub fn new(
        name: impl Into<String>,
        params: Vec<Parameter>,
        return_sig: TypeSig,
        body: Block,
    ) -> FunctionDef {
        FunctionDef {
            name: name.into(),
            params,
            return_sig,
            body,
            calls: Cell::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.get()
    }

    pub(crate) fn invoke(
        &self,
        state: &mut State,
        args: Vec<CallArg<'_>>,
        named: &[(String, Expr)],
    ) -> Result<CallOutcome, EvalError> {
        self.calls.set(self.calls.get() + 1);
        debug!("invoking function {}", self.name);
        let merged = merge_parameters(&self.name, &self.params, args, named)?;
        let mut fork = state.fork();
        fork.clear_chain();
        let bindings = copy_in(&mut fork, &merged)?;
        for (name, value) in bindings {
            fork.insert_var(name, value);
        }
        fork.push_block_front(&self.body);
        let value = step_value(&mut fork)?;
        Ok(CallOutcome::Value(value))
    }
}

/// A control or parser: evaluation threads through a child state
/// scoped to the control's parameters, and the caller is suspended
/// inside the restore context until the body finishes.
#[derive(Debug)]
pub struct ControlDef {
    pub name: String,
    pub kind: ControlKind,
    pub params: Vec<Parameter>,
    pub body: Block,
    calls: Cell<u64>,
}

impl ControlDef {
    pub fn new(
        name: impl Into<String>,
        kind: ControlKind,
        params: Vec<Parameter>,
        body: Block,
    ) -> ControlDef {
        ControlDef {
            name: name.into(),
            kind,
            params,
            body,
            calls: Cell::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.get()
    }

    /// Child state scoped to this control's parameter set, every
    /// parameter bound to a fresh instance named after itself.
    fn fresh_child(&self, registry: Rc<Registry>) -> State {
        let outputs = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.sig.clone()))
            .collect();
        let mut child = State::scoped(registry, self.name.clone(), outputs);
        for param in &self.params {
            child.insert_var(param.name.clone(), param.sig.fresh(&param.name));
        }
        child
    }

    /// Entry state for a top-level pipeline evaluation: fresh child
    /// with the body and an empty restore queued.
    pub fn entry_state(&self, registry: Rc<Registry>) -> State {
        self.calls.set(self.calls.get() + 1);
        let mut state = self.fresh_child(registry);
        state.push_frame_front(Frame::Restore(Box::new(Context::empty())));
        state.push_block_front(&self.body);
        state
    }

    pub(crate) fn invoke(
        &self,
        state: &mut State,
        args: Vec<CallArg<'_>>,
        named: &[(String, Expr)],
    ) -> Result<CallOutcome, EvalError> {
        self.calls.set(self.calls.get() + 1);
        debug!("invoking {:?} {}", self.kind, self.name);
        let merged = merge_parameters(&self.name, &self.params, args, named)?;
        let saved = snapshot(state, &merged)?;
        let mut child = self.fresh_child(Rc::clone(state.registry()));
        let bindings = copy_in(state, &merged)?;
        for (name, value) in bindings {
            child.insert_var(name, value);
        }
        // Splice the caller's remaining continuation into the child,
        // then suspend the caller inside the restore context.
        child.set_chain(state.take_chain());
        let parent = std::mem::replace(state, child);
        state.push_frame_front(Frame::Restore(Box::new(Context {
            saved,
            parent: Some(Box::new(parent)),
        })));
        state.push_block_front(&self.body);
        Ok(CallOutcome::Queued)
    }
}

/// A black-box extern. Every `out`/`inout` argument is overwritten
/// with a fresh value named `{extern}_{param}`, and a declared return
/// type yields a fresh value whose name is a pure function of the
/// resolved arguments: identical arguments reproduce the same name,
/// different arguments differ.
#[derive(Debug)]
pub struct ExternDef {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_sig: Option<TypeSig>,
    calls: Cell<u64>,
}

impl ExternDef {
    pub fn new(
        name: impl Into<String>,
        params: Vec<Parameter>,
        return_sig: Option<TypeSig>,
    ) -> ExternDef {
        ExternDef {
            name: name.into(),
            params,
            return_sig,
            calls: Cell::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.get()
    }

    pub(crate) fn invoke(
        &self,
        state: &mut State,
        args: Vec<CallArg<'_>>,
        named: &[(String, Expr)],
    ) -> Result<CallOutcome, EvalError> {
        self.calls.set(self.calls.get() + 1);
        debug!("invoking extern {}", self.name);
        let merged = merge_parameters(&self.name, &self.params, args, named)?;
        let mut rendered = String::new();
        for (param, arg) in &merged {
            // Resolve before overwriting: the digest covers the
            // pre-call argument values.
            let value = arg_value(arg, state)?;
            rendered.push_str(&render_value(&value));
            rendered.push('|');
            if matches!(param.direction, Direction::Out | Direction::InOut) {
                let fresh = param.sig.fresh(&format!("{}_{}", self.name, param.name));
                let (name, slice) = arg_lvalue(arg, state)?;
                debug!("extern {} clobbers {name}", self.name);
                state.write_lvalue(&name, slice, fresh)?;
            }
        }
        match &self.return_sig {
            Some(sig) => {
                let digest = symbol_digest(&self.name, &rendered);
                Ok(CallOutcome::Value(
                    sig.fresh(&format!("{}_{digest}", self.name)),
                ))
            }
            None => Ok(CallOutcome::Queued),
        }
    }
}

/// Dispatch an invocation to the callable's own algorithm.
pub(crate) fn invoke<'a>(
    callable: &Rc<Callable>,
    state: &mut State,
    args: Vec<CallArg<'a>>,
    named: &'a [(String, Expr)],
) -> Result<CallOutcome, EvalError> {
    match &**callable {
        Callable::Action(action) => action.invoke(state, args, named),
        Callable::Function(function) => function.invoke(state, args, named),
        Callable::Control(control) => control.invoke(state, args, named),
        Callable::Extern(extern_def) => extern_def.invoke(state, args, named),
        Callable::Table(table) => Ok(CallOutcome::Finished(table.apply(state)?)),
    }
}

/// Bind positional then named arguments to declared parameters,
/// keeping each pair's declared direction.
fn merge_parameters<'a>(
    callable: &str,
    params: &'a [Parameter],
    args: Vec<CallArg<'a>>,
    named: &'a [(String, Expr)],
) -> Result<Vec<(&'a Parameter, CallArg<'a>)>, EvalError> {
    if args.len() > params.len() {
        return Err(EvalError::TooManyArguments {
            callable: callable.to_string(),
            declared: params.len(),
            supplied: args.len(),
        });
    }
    let mut merged: Vec<(&Parameter, CallArg)> = params.iter().zip(args).collect();
    for (arg_name, expr) in named {
        let param = params.iter().find(|p| &p.name == arg_name).ok_or_else(|| {
            EvalError::UnknownParameter {
                callable: callable.to_string(),
                name: arg_name.clone(),
            }
        })?;
        match merged.iter_mut().find(|(p, _)| &p.name == arg_name) {
            Some(slot) => slot.1 = CallArg::Expr(expr),
            None => merged.push((param, CallArg::Expr(expr))),
        }
    }
    Ok(merged)
}

/// Snapshot the pre-call state of every bound parameter name.
fn snapshot(
    state: &mut State,
    merged: &[(&Parameter, CallArg<'_>)],
) -> Result<Vec<SavedParam>, EvalError> {
    let mut saved = Vec::with_capacity(merged.len());
    for (param, arg) in merged {
        let target = match param.direction {
            Direction::In => None,
            Direction::Out | Direction::InOut => Some(arg_lvalue(arg, state)?),
        };
        saved.push(SavedParam {
            direction: param.direction,
            name: param.name.clone(),
            target,
            saved: state.get_var(&param.name).cloned(),
        });
    }
    Ok(saved)
}

/// Copy-in pass: compute the callee-scope bindings, overwriting
/// `out` targets in the caller with fresh values as a side effect.
fn copy_in(
    state: &mut State,
    merged: &[(&Parameter, CallArg<'_>)],
) -> Result<Vec<(String, Value)>, EvalError> {
    let mut bindings = Vec::with_capacity(merged.len());
    for (param, arg) in merged {
        match param.direction {
            Direction::Out => {
                let fresh = param.sig.fresh(&param.name);
                let (name, slice) = arg_lvalue(arg, state)?;
                debug!("copy-in (out): fresh {} -> {name}", param.name);
                state.write_lvalue(&name, slice, fresh.clone())?;
                bindings.push((param.name.clone(), fresh));
            }
            Direction::In | Direction::InOut => {
                let value = arg_value(arg, state)?;
                debug!("copy-in: {}", param.name);
                bindings.push((param.name.clone(), value));
            }
        }
    }
    Ok(bindings)
}

fn arg_value(arg: &CallArg<'_>, state: &mut State) -> Result<Value, EvalError> {
    match arg {
        CallArg::Expr(expr) => state.resolve_expr(expr),
        CallArg::Value(value) => state.resolve_value(value.clone()),
    }
}

fn arg_lvalue(
    arg: &CallArg<'_>,
    state: &mut State,
) -> Result<(String, Option<(u32, u32)>), EvalError> {
    match arg {
        CallArg::Expr(expr) => expr.as_lvalue(state),
        CallArg::Value(_) => Err(EvalError::NotAnLValue {
            context: "out argument",
        }),
    }
}

/// Canonical rendering of an argument value for the extern digest.
fn render_value(value: &Value) -> String {
    match value {
        Value::Term(t) => t.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Complex(c) => c.name.clone(),
        Value::List(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(","),
        Value::Map(entries) => entries
            .iter()
            .map(|(n, v)| format!("{n}={}", render_value(v)))
            .collect::<Vec<_>>()
            .join(","),
        Value::Thunk(_) => "<thunk>".to_string(),
        Value::Callable(c) => c.name().to_string(),
    }
}

/// Deterministic fresh-symbol digest from (extern identity, rendered
/// argument values).
fn symbol_digest(name: &str, rendered_args: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(name.as_bytes());
    hasher.update(rendered_args.as_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}
