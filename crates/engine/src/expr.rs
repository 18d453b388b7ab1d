//! Expression node taxonomy.
//!
//! Expressions are immutable trees evaluated against a [`State`];
//! every expression produces a [`Value`]. Binary evaluation is
//! left-operand-first, except logical and/or which short-circuit on a
//! constant left operand. Member and index access compose a dotted
//! textual reference interpreted by the state's name resolver.

use crate::callable::{invoke, CallArg, CallOutcome};
use crate::error::EvalError;
use crate::state::State;
use crate::value::Value;
use log::debug;
use p4sym_smt::{bits, BinaryOp, CmpOp, Sort, Term};

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Logical negation.
    Not,
    /// Bitwise complement.
    Complement,
    /// Arithmetic negation.
    Minus,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Unsigned division.
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    /// The `&&&` mask operator; bitwise-and on the operands.
    Mask,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    /// Short-circuiting logical and.
    LAnd,
    /// Short-circuiting logical or.
    LOr,
}

/// Cast target: the boolean sort or a bit-vector width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    Bool,
    Bits(u32),
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A (possibly dotted) name reference.
    Name(String),
    /// Machine integer literal.
    Int(i128),
    /// Boolean literal.
    Bool(bool),
    /// Sized bit-vector literal.
    BvLit { value: u128, width: u32 },
    Unary {
        op: UnOp,
        arg: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Bit slice `value[high:low]`.
    Slice {
        value: Box<Expr>,
        high: u32,
        low: u32,
    },
    Concat {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Member access `base.member`.
    Member {
        base: Box<Expr>,
        member: String,
    },
    /// Index access `base[index]`; the index must resolve to an
    /// integer literal.
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Cast {
        value: Box<Expr>,
        to: CastTarget,
    },
    /// Multiplexer (ternary conditional).
    Mux {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    /// Struct initializer: a fresh instance of a registered type with
    /// members overwritten from a list or key-value initializer.
    StructInit {
        type_name: String,
        value: Box<Expr>,
    },
    /// Ordered list initializer.
    ListInit(Vec<Expr>),
    /// Key-value initializer.
    MapInit(Vec<(String, Expr)>),
    /// Method call.
    Call(CallExpr),
}

/// A method call: callee name plus positional and named arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub callee: String,
    pub args: Vec<Expr>,
    pub named: Vec<(String, Expr)>,
}

impl Expr {
    pub fn name(name: impl Into<String>) -> Expr {
        Expr::Name(name.into())
    }

    pub fn member(base: Expr, member: impl Into<String>) -> Expr {
        Expr::Member {
            base: Box::new(base),
            member: member.into(),
        }
    }

    pub fn unary(op: UnOp, arg: Expr) -> Expr {
        Expr::Unary {
            op,
            arg: Box::new(arg),
        }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn slice(value: Expr, high: u32, low: u32) -> Expr {
        Expr::Slice {
            value: Box::new(value),
            high,
            low,
        }
    }

    pub fn cast(value: Expr, to: CastTarget) -> Expr {
        Expr::Cast {
            value: Box::new(value),
            to,
        }
    }

    pub fn mux(cond: Expr, then_value: Expr, else_value: Expr) -> Expr {
        Expr::Mux {
            cond: Box::new(cond),
            then_value: Box::new(then_value),
            else_value: Box::new(else_value),
        }
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call(CallExpr {
            callee: callee.into(),
            args,
            named: Vec::new(),
        })
    }

    /// Evaluate this expression against a state.
    pub fn eval(&self, state: &mut State) -> Result<Value, EvalError> {
        match self {
            Expr::Name(name) => state.resolve_reference(name),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Bool(b) => Ok(Value::Term(Term::bool_const(*b))),
            Expr::BvLit { value, width } => Ok(Value::Term(Term::bv(*value, *width)?)),
            Expr::Unary { op, arg } => {
                let value = state.resolve_expr(arg)?;
                apply_unary(*op, value)
            }
            Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, state),
            Expr::Slice { value, high, low } => {
                let term = match state.resolve_expr(value)? {
                    // An integer in slice position materializes at 64 bits.
                    Value::Int(i) => Term::bv_signed(i, 64)?,
                    Value::Term(t) => t,
                    other => {
                        return Err(EvalError::UnsupportedValue {
                            context: "slice",
                            kind: other.kind(),
                        })
                    }
                };
                Ok(Value::Term(Term::extract(*high, *low, term)?))
            }
            Expr::Concat { lhs, rhs } => {
                let l = term_operand(state.resolve_expr(lhs)?, "concatenation")?;
                let r = term_operand(state.resolve_expr(rhs)?, "concatenation")?;
                Ok(Value::Term(Term::concat(l, r)?))
            }
            Expr::Member { .. } | Expr::Index { .. } => {
                let path = self.as_reference(state)?;
                state.resolve_reference(&path)
            }
            Expr::Cast { value, to } => {
                let value = state.resolve_expr(value)?;
                apply_cast(value, *to)
            }
            Expr::Mux {
                cond,
                then_value,
                else_value,
            } => {
                let cond = state.resolve_condition(cond)?;
                let then_v = state.resolve_expr(then_value)?;
                let else_v = state.resolve_expr(else_value)?;
                let then_t = mux_operand(&then_v, &else_v)?;
                let else_t = mux_operand(&else_v, &then_v)?;
                Ok(Value::Term(Term::ite(cond, then_t, else_t)?))
            }
            Expr::StructInit { type_name, value } => {
                let value = state.resolve_expr(value)?;
                let mut instance = state.registry().instantiate(type_name)?;
                match value {
                    // A complete aggregate replaces the instance wholesale.
                    Value::Complex(c) => Ok(Value::Complex(c)),
                    Value::Map(entries) => {
                        for (member, v) in entries {
                            instance.set_path(&member, v)?;
                        }
                        Ok(Value::Complex(instance))
                    }
                    Value::List(items) => {
                        instance.set_list(items);
                        Ok(Value::Complex(instance))
                    }
                    other => Err(EvalError::UnsupportedValue {
                        context: "struct initializer",
                        kind: other.kind(),
                    }),
                }
            }
            Expr::ListInit(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(state.resolve_expr(item)?);
                }
                Ok(Value::List(values))
            }
            Expr::MapInit(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (name, item) in entries {
                    values.push((name.clone(), state.resolve_expr(item)?));
                }
                Ok(Value::Map(values))
            }
            Expr::Call(call) => {
                debug!("calling {} in expression position", call.callee);
                match eval_call(call, state)? {
                    CallOutcome::Value(value) => Ok(value),
                    CallOutcome::Queued | CallOutcome::Finished(_) => {
                        Err(EvalError::UnsupportedValue {
                            context: "expression-position call",
                            kind: "procedural callable",
                        })
                    }
                }
            }
        }
    }

    /// Compose the dotted textual reference this expression denotes.
    pub(crate) fn as_reference(&self, state: &mut State) -> Result<String, EvalError> {
        match self {
            Expr::Name(name) => Ok(name.clone()),
            Expr::Member { base, member } => {
                Ok(format!("{}.{member}", base.as_reference(state)?))
            }
            Expr::Index { base, index } => {
                let rendered = match state.resolve_expr(index)? {
                    Value::Int(i) => i.to_string(),
                    Value::Term(Term::BvConst { value, .. }) => value.to_string(),
                    other => {
                        return Err(EvalError::UnsupportedValue {
                            context: "index",
                            kind: other.kind(),
                        })
                    }
                };
                Ok(format!("{}.{rendered}", base.as_reference(state)?))
            }
            _ => Err(EvalError::NotAnLValue {
                context: "reference composition",
            }),
        }
    }

    /// Decompose this expression into a storable location: a dotted
    /// name plus an optional bit range. Nested slice-of-slice targets
    /// flatten by composing offsets.
    pub(crate) fn as_lvalue(
        &self,
        state: &mut State,
    ) -> Result<(String, Option<(u32, u32)>), EvalError> {
        match self {
            Expr::Slice { value, high, low } => {
                let (name, inner) = value.as_lvalue(state)?;
                let range = match inner {
                    None => (*high, *low),
                    Some((_, inner_low)) => (inner_low + high, inner_low + low),
                };
                Ok((name, Some(range)))
            }
            _ => Ok((self.as_reference(state)?, None)),
        }
    }
}

/// Resolve a call's callee and invoke it.
pub(crate) fn eval_call(call: &CallExpr, state: &mut State) -> Result<CallOutcome, EvalError> {
    let callee = state.resolve_reference(&call.callee)?;
    let callee = state.resolve_value(callee)?;
    let Value::Callable(callable) = callee else {
        return Err(EvalError::NotCallable {
            name: call.callee.clone(),
        });
    };
    let args: Vec<CallArg<'_>> = call.args.iter().map(CallArg::Expr).collect();
    invoke(&callable, state, args, &call.named)
}

fn term_operand(value: Value, context: &'static str) -> Result<Term, EvalError> {
    match value {
        Value::Term(t) => Ok(t),
        other => Err(EvalError::UnsupportedValue {
            context,
            kind: other.kind(),
        }),
    }
}

fn apply_unary(op: UnOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnOp::Not, Value::Term(t)) if t.sort() == Sort::Bool => {
            Ok(Value::Term(Term::not(t)?))
        }
        (UnOp::Complement, Value::Int(i)) => Ok(Value::Int(!i)),
        (UnOp::Complement, Value::Term(t)) => Ok(Value::Term(Term::bvnot(t)?)),
        (UnOp::Minus, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
        (UnOp::Minus, Value::Term(t)) => Ok(Value::Term(Term::bvneg(t)?)),
        (_, other) => Err(EvalError::UnsupportedValue {
            context: "unary operator",
            kind: other.kind(),
        }),
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, state: &mut State) -> Result<Value, EvalError> {
    let left = state.resolve_expr(lhs)?;
    // Short-circuit on a constant left operand: the right operand is
    // never evaluated, so none of its side effects happen.
    if op == BinOp::LAnd {
        if let Value::Term(t) = &left {
            if t.is_false() {
                return Ok(Value::Term(Term::bool_const(false)));
            }
        }
    }
    if op == BinOp::LOr {
        if let Value::Term(t) = &left {
            if t.is_true() {
                return Ok(Value::Term(Term::bool_const(true)));
            }
        }
    }
    let right = state.resolve_expr(rhs)?;
    apply_binary(op, left, right)
}

fn apply_binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_binary(op, a, b),
        (Value::Complex(a), Value::Complex(b)) if matches!(op, BinOp::Eq | BinOp::Ne) => {
            let cmp = if op == BinOp::Eq { CmpOp::Eq } else { CmpOp::Ne };
            Ok(Value::Term(Term::cmp(cmp, a.to_term()?, b.to_term()?)?))
        }
        (Value::Int(a), Value::Term(t)) => {
            let a = materialize_like(a, &t)?;
            term_binary(op, a, t)
        }
        (Value::Term(t), Value::Int(b)) => {
            let b = materialize_like(b, &t)?;
            term_binary(op, t, b)
        }
        (Value::Term(a), Value::Term(b)) => term_binary(op, a, b),
        (l, r) => {
            let kind = if matches!(l, Value::Term(_) | Value::Int(_)) {
                r.kind()
            } else {
                l.kind()
            };
            Err(EvalError::UnsupportedValue {
                context: "binary operator",
                kind,
            })
        }
    }
}

/// Materialize an integer literal at a term operand's width.
fn materialize_like(value: i128, term: &Term) -> Result<Term, EvalError> {
    let width = term.width().ok_or(EvalError::UnsupportedValue {
        context: "binary operator",
        kind: "integer",
    })?;
    Ok(Term::bv_signed(value, width)?)
}

fn int_binary(op: BinOp, a: i128, b: i128) -> Result<Value, EvalError> {
    let arith = |v: i128| Ok(Value::Int(v));
    let boolean = |v: bool| Ok(Value::Term(Term::bool_const(v)));
    match op {
        BinOp::Add => arith(a.wrapping_add(b)),
        BinOp::Sub => arith(a.wrapping_sub(b)),
        BinOp::Mul => arith(a.wrapping_mul(b)),
        BinOp::Div => a.checked_div(b).map_or(Err(EvalError::DivisionByZero), arith),
        BinOp::Mod => a.checked_rem(b).map_or(Err(EvalError::DivisionByZero), arith),
        BinOp::BitAnd | BinOp::Mask => arith(a & b),
        BinOp::BitOr => arith(a | b),
        BinOp::BitXor => arith(a ^ b),
        BinOp::Shl => arith(a.wrapping_shl((b & 127) as u32)),
        BinOp::Shr => arith(a.wrapping_shr((b & 127) as u32)),
        BinOp::Lt => boolean(a < b),
        BinOp::Le => boolean(a <= b),
        BinOp::Gt => boolean(a > b),
        BinOp::Ge => boolean(a >= b),
        BinOp::Eq => boolean(a == b),
        BinOp::Ne => boolean(a != b),
        BinOp::LAnd | BinOp::LOr => Err(EvalError::UnsupportedValue {
            context: "logical operator",
            kind: "integer",
        }),
    }
}

fn term_binary(op: BinOp, a: Term, b: Term) -> Result<Value, EvalError> {
    let (a, b) = bits::align(a, b)?;
    let term = match op {
        BinOp::Add => Term::binary(BinaryOp::Add, a, b)?,
        BinOp::Sub => Term::binary(BinaryOp::Sub, a, b)?,
        BinOp::Mul => Term::binary(BinaryOp::Mul, a, b)?,
        BinOp::Div => Term::binary(BinaryOp::UDiv, a, b)?,
        BinOp::Mod => Term::binary(BinaryOp::URem, a, b)?,
        BinOp::BitAnd | BinOp::Mask => Term::binary(BinaryOp::And, a, b)?,
        BinOp::BitOr => Term::binary(BinaryOp::Or, a, b)?,
        BinOp::BitXor => Term::binary(BinaryOp::Xor, a, b)?,
        BinOp::Shl => Term::binary(BinaryOp::Shl, a, b)?,
        BinOp::Shr => Term::binary(BinaryOp::LShr, a, b)?,
        BinOp::Lt => Term::cmp(CmpOp::ULt, a, b)?,
        BinOp::Le => Term::cmp(CmpOp::ULe, a, b)?,
        BinOp::Gt => Term::cmp(CmpOp::UGt, a, b)?,
        BinOp::Ge => Term::cmp(CmpOp::UGe, a, b)?,
        BinOp::Eq => Term::cmp(CmpOp::Eq, a, b)?,
        BinOp::Ne => Term::cmp(CmpOp::Ne, a, b)?,
        BinOp::LAnd => Term::and_all(vec![a, b])?,
        BinOp::LOr => Term::or_all(vec![a, b])?,
    };
    Ok(Value::Term(term))
}

fn apply_cast(value: Value, to: CastTarget) -> Result<Value, EvalError> {
    match (value, to) {
        // An integer literal materializes at the requested width.
        (Value::Int(i), CastTarget::Bits(width)) => {
            Ok(Value::Term(Term::bv_signed(i, width)?))
        }
        (Value::Int(i), CastTarget::Bool) => {
            Ok(Value::Term(Term::bool_const((i & 1) == 1)))
        }
        (Value::Term(t), CastTarget::Bits(width)) => {
            Ok(Value::Term(bits::cast(t, &Sort::Bv(width))?))
        }
        (Value::Term(t), CastTarget::Bool) => Ok(Value::Term(bits::cast(t, &Sort::Bool)?)),
        (other, _) => Err(EvalError::UnsupportedValue {
            context: "cast",
            kind: other.kind(),
        }),
    }
}

fn mux_operand(value: &Value, other: &Value) -> Result<Term, EvalError> {
    match value {
        Value::Term(t) => Ok(t.clone()),
        Value::Complex(c) => c.to_term(),
        Value::Int(i) => {
            let width = match other {
                Value::Term(t) => t.width().unwrap_or(64),
                _ => 64,
            };
            Ok(Term::bv_signed(*i, width)?)
        }
        other => Err(EvalError::UnsupportedValue {
            context: "multiplexer",
            kind: other.kind(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use std::rc::Rc;

    fn state() -> State {
        State::new(Rc::new(Registry::new()))
    }

    #[test]
    fn binary_aligns_operand_widths() {
        let mut st = state();
        st.set_or_add_var("a", Value::Term(Term::var("a", Sort::Bv(4))))
            .unwrap();
        st.set_or_add_var("b", Value::Term(Term::var("b", Sort::Bv(8))))
            .unwrap();
        let sum = Expr::binary(BinOp::Add, Expr::name("a"), Expr::name("b"));
        let Value::Term(t) = st.resolve_expr(&sum).unwrap() else {
            panic!("expected term");
        };
        assert_eq!(t.width(), Some(8));
    }

    #[test]
    fn integers_compute_natively() {
        let mut st = state();
        let e = Expr::binary(BinOp::Add, Expr::Int(2), Expr::Int(3));
        assert!(matches!(st.resolve_expr(&e).unwrap(), Value::Int(5)));
        let cmp = Expr::binary(BinOp::Lt, Expr::Int(2), Expr::Int(3));
        let Value::Term(t) = st.resolve_expr(&cmp).unwrap() else {
            panic!("expected term");
        };
        assert!(t.is_true());
    }

    #[test]
    fn integer_division_by_zero_is_fatal() {
        let mut st = state();
        let e = Expr::binary(BinOp::Div, Expr::Int(1), Expr::Int(0));
        assert!(matches!(
            st.resolve_expr(&e),
            Err(EvalError::DivisionByZero)
        ));
    }

    #[test]
    fn and_short_circuits_on_constant_false() {
        let mut st = state();
        // The right operand references an unbound name; it must never
        // be evaluated.
        let e = Expr::binary(BinOp::LAnd, Expr::Bool(false), Expr::name("unbound"));
        let Value::Term(t) = st.resolve_expr(&e).unwrap() else {
            panic!("expected term");
        };
        assert!(t.is_false());
    }

    #[test]
    fn or_short_circuits_on_constant_true() {
        let mut st = state();
        let e = Expr::binary(BinOp::LOr, Expr::Bool(true), Expr::name("unbound"));
        let Value::Term(t) = st.resolve_expr(&e).unwrap() else {
            panic!("expected term");
        };
        assert!(t.is_true());
    }

    #[test]
    fn nested_slices_flatten() {
        let mut st = state();
        let target = Expr::slice(Expr::slice(Expr::name("x"), 7, 4), 1, 0);
        let (name, range) = target.as_lvalue(&mut st).unwrap();
        assert_eq!(name, "x");
        assert_eq!(range, Some((5, 4)));
    }

    #[test]
    fn member_access_composes_dotted_path() {
        let mut st = state();
        let e = Expr::member(Expr::member(Expr::name("hdr"), "eth"), "dst");
        assert_eq!(e.as_reference(&mut st).unwrap(), "hdr.eth.dst");
    }

    #[test]
    fn index_requires_constant() {
        let mut st = state();
        st.set_or_add_var("i", Value::Term(Term::var("i", Sort::Bv(8))))
            .unwrap();
        let e = Expr::Index {
            base: Box::new(Expr::name("stack")),
            index: Box::new(Expr::name("i")),
        };
        assert!(matches!(
            e.as_reference(&mut st),
            Err(EvalError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn cast_bool_roundtrip() {
        let mut st = state();
        let to_bits = Expr::cast(Expr::Bool(true), CastTarget::Bits(8));
        let Value::Term(wide) = st.resolve_expr(&to_bits).unwrap() else {
            panic!("expected term");
        };
        assert_eq!(wide.width(), Some(8));
        st.set_or_add_var("w", Value::Term(wide)).unwrap();
        let back = Expr::cast(Expr::name("w"), CastTarget::Bool);
        let Value::Term(b) = st.resolve_expr(&back).unwrap() else {
            panic!("expected term");
        };
        assert_eq!(b.sort(), Sort::Bool);
    }
}
