//! Symbolic value representation.
//!
//! Values are what variable bindings hold during evaluation: raw
//! formula terms, machine integers awaiting bit-vector conversion,
//! struct-like complex values, transient initializer containers,
//! unevaluated declaration thunks, and callable references.

use crate::callable::Callable;
use crate::error::EvalError;
use crate::expr::Expr;
use p4sym_smt::{Sort, Term};
use std::rc::Rc;

/// A symbolic value.
///
/// Consumption sites match exhaustively on this union; a value of the
/// wrong kind is an [`EvalError::UnsupportedValue`], never an implicit
/// coercion.
#[derive(Debug, Clone)]
pub enum Value {
    /// A raw formula term (bit-vector or boolean).
    Term(Term),
    /// Machine integer literal, used only in arithmetic preprocessing
    /// before conversion to a bit-vector.
    Int(i128),
    /// Struct-like aggregate of named sub-values.
    Complex(ComplexValue),
    /// Ordered element container, transient during list initialization.
    List(Vec<Value>),
    /// Ordered name-value container, transient during struct
    /// initialization.
    Map(Vec<(String, Value)>),
    /// An unevaluated node stored by a declaration, forced on
    /// resolution.
    Thunk(Rc<Expr>),
    /// A resolved callable reference.
    Callable(Rc<Callable>),
}

impl Value {
    /// Short kind label used in error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Term(_) => "term",
            Value::Int(_) => "integer",
            Value::Complex(_) => "complex",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Thunk(_) => "thunk",
            Value::Callable(_) => "callable",
        }
    }

    /// Lower this value to a single formula term.
    ///
    /// Integers materialize at 64 bits; complex values lower to their
    /// tuple aggregate. Containers, thunks, and callables have no term
    /// representation.
    pub fn to_term(&self) -> Result<Term, EvalError> {
        match self {
            Value::Term(t) => Ok(t.clone()),
            Value::Int(i) => Ok(Term::bv_signed(*i, 64)?),
            Value::Complex(c) => c.to_term(),
            other => Err(EvalError::UnsupportedValue {
                context: "term conversion",
                kind: other.kind(),
            }),
        }
    }

    /// Lower to a term against a declared signature: integers
    /// materialize at the declared width rather than the 64-bit
    /// default, and complex values lower field-wise against the struct
    /// signature.
    pub fn to_term_as(&self, sig: &TypeSig) -> Result<Term, EvalError> {
        match (self, sig) {
            (Value::Int(i), TypeSig::Bits(width)) => Ok(Term::bv_signed(*i, *width)?),
            (Value::Int(i), TypeSig::Bool) => Ok(Term::bool_const((i & 1) == 1)),
            (Value::Complex(c), TypeSig::Struct(ty)) => {
                let mut members = Vec::with_capacity(ty.fields.len());
                for (field, field_sig) in &ty.fields {
                    let value = c.get(field).ok_or_else(|| EvalError::UnresolvedReference {
                        name: format!("{}.{field}", c.name),
                    })?;
                    members.push(value.to_term_as(field_sig)?);
                }
                Ok(Term::tuple(c.name.clone(), members))
            }
            _ => self.to_term(),
        }
    }
}

/// A struct-like aggregate: ordered named sub-values, each
/// independently typed and independently mutable.
#[derive(Debug, Clone)]
pub struct ComplexValue {
    /// Instance name; doubles as the naming prefix of fresh members.
    pub name: String,
    fields: Vec<(String, Value)>,
}

impl ComplexValue {
    /// Empty aggregate under a name.
    pub fn new(name: impl Into<String>) -> ComplexValue {
        ComplexValue {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Fresh instance of a struct type: every scalar leaf becomes a
    /// free variable named `{name}.{field}` (dotted through nesting).
    pub fn fresh(ty: &StructType, name: &str) -> ComplexValue {
        let fields = ty
            .fields
            .iter()
            .map(|(field, sig)| {
                let leaf = format!("{name}.{field}");
                (field.clone(), sig.fresh(&leaf))
            })
            .collect();
        ComplexValue {
            name: name.to_string(),
            fields,
        }
    }

    /// Member lookup.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    /// Overwrite-or-insert a member.
    pub fn set(&mut self, field: &str, value: Value) {
        match self.get_mut(field) {
            Some(slot) => *slot = value,
            None => self.fields.push((field.to_string(), value)),
        }
    }

    /// Overwrite-or-insert through a dotted member path. Intermediate
    /// segments must already be complex values.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), EvalError> {
        match path.split_once('.') {
            None => {
                self.set(path, value);
                Ok(())
            }
            Some((head, rest)) => match self.get_mut(head) {
                Some(Value::Complex(inner)) => inner.set_path(rest, value),
                Some(other) => Err(EvalError::UnsupportedValue {
                    context: "member assignment",
                    kind: other.kind(),
                }),
                None => Err(EvalError::UnresolvedReference {
                    name: format!("{}.{head}", self.name),
                }),
            },
        }
    }

    /// Overwrite members positionally from an ordered value list.
    pub fn set_list(&mut self, values: Vec<Value>) {
        for ((_, slot), value) in self.fields.iter_mut().zip(values) {
            *slot = value;
        }
    }

    /// Ordered members.
    pub fn members(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Lower to the tuple aggregate of the member terms.
    pub fn to_term(&self) -> Result<Term, EvalError> {
        let mut members = Vec::with_capacity(self.fields.len());
        for (_, value) in &self.fields {
            members.push(value.to_term()?);
        }
        Ok(Term::tuple(self.name.clone(), members))
    }
}

/// Declared type of a parameter or struct member.
#[derive(Debug, Clone)]
pub enum TypeSig {
    Bool,
    Bits(u32),
    Struct(Rc<StructType>),
}

/// A named struct type: ordered fields with their signatures.
#[derive(Debug, Clone)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<(String, TypeSig)>,
}

impl TypeSig {
    /// Fresh unconstrained instance of this signature under a name.
    pub fn fresh(&self, name: &str) -> Value {
        match self {
            TypeSig::Bool => Value::Term(Term::var(name, Sort::Bool)),
            TypeSig::Bits(width) => Value::Term(Term::var(name, Sort::Bv(*width))),
            TypeSig::Struct(ty) => Value::Complex(ComplexValue::fresh(ty, name)),
        }
    }

    /// The sort instances of this signature carry.
    pub fn sort(&self) -> Sort {
        match self {
            TypeSig::Bool => Sort::Bool,
            TypeSig::Bits(width) => Sort::Bv(*width),
            TypeSig::Struct(ty) => {
                Sort::Tuple(ty.fields.iter().map(|(_, sig)| sig.sort()).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_type() -> Rc<StructType> {
        Rc::new(StructType {
            name: "ethernet_t".into(),
            fields: vec![
                ("dst".into(), TypeSig::Bits(48)),
                ("src".into(), TypeSig::Bits(48)),
                ("valid".into(), TypeSig::Bool),
            ],
        })
    }

    #[test]
    fn fresh_instance_names_leaves() {
        let ty = header_type();
        let Value::Complex(c) = TypeSig::Struct(ty).fresh("hdr") else {
            panic!("expected a complex value");
        };
        match c.get("dst") {
            Some(Value::Term(t)) => assert_eq!(*t, Term::var("hdr.dst", Sort::Bv(48))),
            other => panic!("unexpected dst member: {other:?}"),
        }
        assert!(matches!(
            c.get("valid"),
            Some(Value::Term(Term::Var { sort: Sort::Bool, .. }))
        ));
    }

    #[test]
    fn set_overwrites_and_inserts() {
        let mut c = ComplexValue::new("h");
        c.set("f", Value::Int(1));
        c.set("f", Value::Int(2));
        c.set("g", Value::Int(3));
        assert!(matches!(c.get("f"), Some(Value::Int(2))));
        assert!(matches!(c.get("g"), Some(Value::Int(3))));
    }

    #[test]
    fn set_path_descends_nested_values() {
        let inner_ty = Rc::new(StructType {
            name: "inner_t".into(),
            fields: vec![("x".into(), TypeSig::Bits(8))],
        });
        let ty = Rc::new(StructType {
            name: "outer_t".into(),
            fields: vec![("inner".into(), TypeSig::Struct(inner_ty))],
        });
        let mut c = ComplexValue::fresh(&ty, "o");
        c.set_path("inner.x", Value::Int(7)).unwrap();
        let Some(Value::Complex(inner)) = c.get("inner") else {
            panic!("expected nested complex");
        };
        assert!(matches!(inner.get("x"), Some(Value::Int(7))));
    }

    #[test]
    fn set_path_rejects_scalar_intermediate() {
        let mut c = ComplexValue::new("h");
        c.set("f", Value::Int(1));
        assert!(matches!(
            c.set_path("f.g", Value::Int(2)),
            Err(EvalError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn to_term_aggregates_members() {
        let ty = header_type();
        let c = ComplexValue::fresh(&ty, "hdr");
        let t = c.to_term().unwrap();
        assert_eq!(
            t.sort(),
            Sort::Tuple(vec![Sort::Bv(48), Sort::Bv(48), Sort::Bool])
        );
    }

    #[test]
    fn integer_lowers_at_64_bits() {
        assert_eq!(
            Value::Int(5).to_term().unwrap(),
            Term::bv(5, 64).unwrap()
        );
    }
}
