//! Integration tests for the symbolic execution engine.
//!
//! Each test builds a small node graph (and usually a registry), runs
//! the continuation driver, and checks the resulting formula
//! structurally — the term layer performs no simplification, so
//! expected formulas can be constructed by hand.

use p4sym_engine::callable::{
    ActionDef, Callable, ControlDef, ControlKind, Direction, ExternDef, FunctionDef, Parameter,
};
use p4sym_engine::expr::{BinOp, CastTarget, Expr};
use p4sym_engine::state::Frame;
use p4sym_engine::stmt::{Block, Stmt, SwitchCase};
use p4sym_engine::table::{ActionCall, EntryKey, Table};
use p4sym_engine::value::{StructType, TypeSig};
use p4sym_engine::{evaluate_pipeline, step, EvalError, Registry, Sort, State, Term, Value};
use p4sym_smt::bits;
use std::rc::Rc;

// ============================================================
// Helper functions
// ============================================================

/// 8-bit cast of an integer literal.
fn bits8(value: i128) -> Expr {
    Expr::cast(Expr::Int(value), CastTarget::Bits(8))
}

/// 8-bit constant term.
fn bv8(value: u128) -> Term {
    Term::bv(value, 8).unwrap()
}

/// 8-bit free variable.
fn var8(name: &str) -> Term {
    Term::var(name, Sort::Bv(8))
}

/// State named `ig` with the given 8-bit output members, each bound
/// to a free variable of the same name suffixed `0`.
fn ig_state(registry: Rc<Registry>, outputs: &[&str]) -> State {
    let mut state = State::scoped(
        registry,
        "ig",
        outputs
            .iter()
            .map(|n| (n.to_string(), TypeSig::Bits(8)))
            .collect(),
    );
    for name in outputs {
        state
            .set_or_add_var(name, Value::Term(var8(&format!("{name}0"))))
            .unwrap();
    }
    state
}

/// Queue a single statement on a state.
fn queue(state: &mut State, stmt: Stmt) {
    state.push_frame_front(Frame::Stmt(Rc::new(stmt)));
}

/// True if the term mentions a free variable with this name.
fn contains_var(term: &Term, target: &str) -> bool {
    match term {
        Term::Var { name, .. } => name == target,
        Term::BvConst { .. } | Term::BoolConst(_) => false,
        Term::Unary { arg, .. } | Term::Extract { arg, .. } | Term::ZeroExt { arg, .. } => {
            contains_var(arg, target)
        }
        Term::Binary { lhs, rhs, .. } | Term::Cmp { lhs, rhs, .. } | Term::Concat { lhs, rhs } => {
            contains_var(lhs, target) || contains_var(rhs, target)
        }
        Term::Bool { args, .. } => args.iter().any(|a| contains_var(a, target)),
        Term::Ite {
            cond,
            then_term,
            else_term,
        } => {
            contains_var(cond, target)
                || contains_var(then_term, target)
                || contains_var(else_term, target)
        }
        Term::Tuple { fields, .. } => fields.iter().any(|f| contains_var(f, target)),
    }
}

fn ig_tuple(fields: Vec<Term>) -> Term {
    Term::tuple("ig", fields)
}

// ============================================================
// Pipelines
// ============================================================

#[test]
fn pipeline_evaluation_is_deterministic() {
    let mut registry = Registry::new();
    let body = Block::from_stmts(vec![Stmt::assign(Expr::name("port"), bits8(1))]);
    registry.register(Callable::Control(ControlDef::new(
        "ingress",
        ControlKind::Control,
        vec![Parameter::new(Direction::InOut, "port", TypeSig::Bits(8))],
        body,
    )));
    let registry = Rc::new(registry);

    let first = evaluate_pipeline(&registry, "ingress").unwrap();
    let second = evaluate_pipeline(&registry, "ingress").unwrap();
    assert_eq!(first, Term::tuple("ingress", vec![bv8(1)]));
    assert_eq!(first, second);
}

#[test]
fn pipeline_inputs_are_parameter_named() {
    let mut registry = Registry::new();
    registry.register(Callable::Control(ControlDef::new(
        "ingress",
        ControlKind::Control,
        vec![Parameter::new(Direction::InOut, "port", TypeSig::Bits(8))],
        Block::new(),
    )));
    let registry = Rc::new(registry);
    let formula = evaluate_pipeline(&registry, "ingress").unwrap();
    assert_eq!(formula, Term::tuple("ingress", vec![var8("port")]));
}

#[test]
fn unknown_pipeline_is_fatal() {
    let registry = Rc::new(Registry::new());
    assert!(matches!(
        evaluate_pipeline(&registry, "ghost"),
        Err(EvalError::UnresolvedReference { .. })
    ));
}

// ============================================================
// Conditionals and forking
// ============================================================

#[test]
fn branch_mutations_stay_isolated() {
    let mut state = ig_state(Rc::new(Registry::new()), &["x"]);
    state
        .set_or_add_var("c", Value::Term(Term::var("c", Sort::Bool)))
        .unwrap();
    queue(
        &mut state,
        Stmt::if_then_else(
            Expr::name("c"),
            Stmt::assign(Expr::name("x"), bits8(1)),
            Stmt::assign(Expr::name("x"), bits8(2)),
        ),
    );
    let formula = step(&mut state).unwrap();
    let expected = Term::ite(
        Term::var("c", Sort::Bool),
        ig_tuple(vec![bv8(1)]),
        ig_tuple(vec![bv8(2)]),
    )
    .unwrap();
    assert_eq!(formula, expected);
}

#[test]
fn then_branch_does_not_leak_into_fallthrough() {
    let mut state = ig_state(Rc::new(Registry::new()), &["x"]);
    state
        .set_or_add_var("c", Value::Term(Term::var("c", Sort::Bool)))
        .unwrap();
    // if (c) { x = 1 }  followed by  x = x + 3
    let follow = Stmt::assign(
        Expr::name("x"),
        Expr::binary(BinOp::Add, Expr::name("x"), bits8(3)),
    );
    queue(&mut state, follow);
    queue(
        &mut state,
        Stmt::if_then(Expr::name("c"), Stmt::assign(Expr::name("x"), bits8(1))),
    );
    let formula = step(&mut state).unwrap();

    let add = |lhs: Term| {
        Term::binary(p4sym_smt::BinaryOp::Add, lhs, bv8(3)).unwrap()
    };
    let expected = Term::ite(
        Term::var("c", Sort::Bool),
        ig_tuple(vec![add(bv8(1))]),
        ig_tuple(vec![add(var8("x0"))]),
    )
    .unwrap();
    assert_eq!(formula, expected);
}

#[test]
fn missing_condition_is_fatal() {
    let mut state = ig_state(Rc::new(Registry::new()), &["x"]);
    queue(
        &mut state,
        Stmt::If {
            cond: None,
            then_stmt: Rc::new(Stmt::Noop),
            else_stmt: None,
        },
    );
    assert!(matches!(step(&mut state), Err(EvalError::MissingCondition)));
}

#[test]
fn exit_truncates_remaining_work() {
    let mut state = ig_state(Rc::new(Registry::new()), &["x"]);
    queue(&mut state, Stmt::assign(Expr::name("x"), bits8(1)));
    queue(&mut state, Stmt::Exit);
    let formula = step(&mut state).unwrap();
    assert_eq!(formula, ig_tuple(vec![var8("x0")]));
}

#[test]
fn unresolved_reference_is_fatal() {
    let mut state = ig_state(Rc::new(Registry::new()), &["x"]);
    queue(&mut state, Stmt::assign(Expr::name("x"), Expr::name("ghost")));
    assert!(matches!(
        step(&mut state),
        Err(EvalError::UnresolvedReference { name }) if name == "ghost"
    ));
}

// ============================================================
// Declarations and struct values
// ============================================================

#[test]
fn declarations_resolve_lazily_at_use() {
    let mut state = ig_state(Rc::new(Registry::new()), &["c"]);
    // xx is declared before a and b exist; it resolves at use time.
    let stmts = vec![
        Stmt::decl(
            "xx",
            Expr::binary(BinOp::Add, Expr::name("a"), Expr::name("b")),
        ),
        Stmt::assign(Expr::name("a"), bits8(1)),
        Stmt::assign(Expr::name("b"), bits8(2)),
        Stmt::assign(Expr::name("c"), Expr::name("xx")),
    ];
    queue(&mut state, Stmt::Block(Block::from_stmts(stmts)));
    let formula = step(&mut state).unwrap();
    let sum = Term::binary(p4sym_smt::BinaryOp::Add, bv8(1), bv8(2)).unwrap();
    assert_eq!(formula, ig_tuple(vec![sum]));
}

#[test]
fn struct_reads_copy_not_alias() {
    let hdr_t = Rc::new(StructType {
        name: "hdr_t".into(),
        fields: vec![("f".into(), TypeSig::Bits(8))],
    });
    let registry = Rc::new(Registry::new());
    let mut state = State::scoped(
        registry,
        "ig",
        vec![("h2".into(), TypeSig::Struct(Rc::clone(&hdr_t)))],
    );
    state
        .set_or_add_var("h1", TypeSig::Struct(hdr_t).fresh("h1"))
        .unwrap();
    // h2 = h1, then mutate h1.f: h2 must keep the original member.
    queue(
        &mut state,
        Stmt::assign(Expr::member(Expr::name("h1"), "f"), bits8(5)),
    );
    queue(&mut state, Stmt::assign(Expr::name("h2"), Expr::name("h1")));
    let formula = step(&mut state).unwrap();
    assert_eq!(formula, Term::tuple("ig", vec![Term::tuple("h1", vec![var8("h1.f")])]));
}

// ============================================================
// Callables
// ============================================================

#[test]
fn in_parameter_round_trips_caller_binding() {
    let mut registry = Registry::new();
    registry.register(Callable::Action(ActionDef::new(
        "bump",
        vec![Parameter::new(Direction::In, "a", TypeSig::Bits(8))],
        Block::from_stmts(vec![Stmt::assign(
            Expr::name("a"),
            Expr::binary(BinOp::Add, Expr::name("a"), bits8(1)),
        )]),
    )));
    // Output both the untouched argument and the caller's own `a`,
    // which must survive the callee binding the parameter name.
    let mut state = State::scoped(
        Rc::new(registry),
        "ig",
        vec![
            ("x".into(), TypeSig::Bits(8)),
            ("a".into(), TypeSig::Bits(8)),
        ],
    );
    state.set_or_add_var("x", Value::Term(var8("x0"))).unwrap();
    state.set_or_add_var("a", Value::Int(42)).unwrap();
    queue(&mut state, Stmt::method_call("bump", vec![Expr::name("x")]));
    let formula = step(&mut state).unwrap();
    assert_eq!(formula, ig_tuple(vec![var8("x0"), bv8(42)]));
}

#[test]
fn out_parameter_propagates_to_target() {
    let mut registry = Registry::new();
    registry.register(Callable::Action(ActionDef::new(
        "emit",
        vec![Parameter::new(Direction::Out, "o", TypeSig::Bits(8))],
        Block::from_stmts(vec![Stmt::assign(Expr::name("o"), bits8(3))]),
    )));
    let mut state = ig_state(Rc::new(registry), &["y"]);
    queue(
        &mut state,
        Stmt::method_call("emit", vec![Expr::name("y")]),
    );
    let formula = step(&mut state).unwrap();
    assert_eq!(formula, ig_tuple(vec![bv8(3)]));
}

#[test]
fn out_parameter_slice_target_keeps_untargeted_bits() {
    let mut registry = Registry::new();
    registry.register(Callable::Action(ActionDef::new(
        "emit",
        vec![Parameter::new(Direction::Out, "o", TypeSig::Bits(8))],
        Block::from_stmts(vec![Stmt::assign(Expr::name("o"), bits8(3))]),
    )));
    let mut state = ig_state(Rc::new(registry), &["y"]);
    queue(
        &mut state,
        Stmt::method_call("emit", vec![Expr::slice(Expr::name("y"), 3, 0)]),
    );
    let formula = step(&mut state).unwrap();

    // Copy-in merges the fresh `o` into the low nibble; copy-out
    // merges the final value the same way.
    let after_copy_in = bits::slice_assign(var8("y0"), var8("o"), 3, 0).unwrap();
    let after_copy_out = bits::slice_assign(after_copy_in, bv8(3), 3, 0).unwrap();
    assert_eq!(formula, ig_tuple(vec![after_copy_out]));
}

#[test]
fn function_returns_value_and_leaks_nothing() {
    let mut registry = Registry::new();
    registry.register(Callable::Function(FunctionDef::new(
        "inc",
        vec![Parameter::new(Direction::In, "a", TypeSig::Bits(8))],
        TypeSig::Bits(8),
        Block::from_stmts(vec![Stmt::Return(Some(Expr::binary(
            BinOp::Add,
            Expr::name("a"),
            bits8(1),
        )))]),
    )));
    let registry = Rc::new(registry);
    let mut state = State::scoped(
        Rc::clone(&registry),
        "ig",
        vec![
            ("x".into(), TypeSig::Bits(8)),
            ("a".into(), TypeSig::Bits(8)),
        ],
    );
    state.set_or_add_var("x", Value::Term(var8("x0"))).unwrap();
    state.set_or_add_var("a", Value::Int(9)).unwrap();
    queue(
        &mut state,
        Stmt::assign(Expr::name("x"), Expr::call("inc", vec![Expr::name("x")])),
    );
    let formula = step(&mut state).unwrap();
    let sum = Term::binary(p4sym_smt::BinaryOp::Add, var8("x0"), bv8(1)).unwrap();
    // The function's parameter binding never reaches the caller.
    assert_eq!(formula, ig_tuple(vec![sum, bv8(9)]));
}

#[test]
fn control_child_state_copies_out() {
    let mut registry = Registry::new();
    registry.register(Callable::Control(ControlDef::new(
        "sub",
        ControlKind::Control,
        vec![Parameter::new(Direction::Out, "o", TypeSig::Bits(8))],
        Block::from_stmts(vec![Stmt::assign(Expr::name("o"), bits8(3))]),
    )));
    let mut state = ig_state(Rc::new(registry), &["y"]);
    queue(&mut state, Stmt::method_call("sub", vec![Expr::name("y")]));
    let formula = step(&mut state).unwrap();
    assert_eq!(formula, ig_tuple(vec![bv8(3)]));
}

#[test]
fn parser_shares_control_semantics() {
    let mut registry = Registry::new();
    registry.register(Callable::Control(ControlDef::new(
        "prs",
        ControlKind::Parser,
        vec![Parameter::new(Direction::InOut, "v", TypeSig::Bits(8))],
        Block::from_stmts(vec![Stmt::assign(Expr::name("v"), bits8(4))]),
    )));
    let mut state = ig_state(Rc::new(registry), &["y"]);
    queue(&mut state, Stmt::method_call("prs", vec![Expr::name("y")]));
    let formula = step(&mut state).unwrap();
    assert_eq!(formula, ig_tuple(vec![bv8(4)]));
}

// ============================================================
// Externs
// ============================================================

#[test]
fn extern_return_names_are_argument_keyed() {
    let mut registry = Registry::new();
    registry.register(Callable::Extern(ExternDef::new(
        "crc",
        vec![Parameter::new(Direction::In, "data", TypeSig::Bits(8))],
        Some(TypeSig::Bits(16)),
    )));
    let mut state = State::new(Rc::new(registry));

    let name_of = |state: &mut State, arg: Expr| -> String {
        match state.resolve_expr(&Expr::call("crc", vec![arg])).unwrap() {
            Value::Term(Term::Var { name, sort }) => {
                assert_eq!(sort, Sort::Bv(16));
                name
            }
            other => panic!("unexpected extern result: {other:?}"),
        }
    };

    let first = name_of(&mut state, bits8(5));
    let again = name_of(&mut state, bits8(5));
    let other = name_of(&mut state, bits8(6));
    assert_eq!(first, again);
    assert_ne!(first, other);
    assert!(first.starts_with("crc_"));
}

#[test]
fn extern_clobbers_by_reference_arguments() {
    let mut registry = Registry::new();
    registry.register(Callable::Extern(ExternDef::new(
        "rnd",
        vec![Parameter::new(Direction::InOut, "v", TypeSig::Bits(8))],
        None,
    )));
    let mut state = ig_state(Rc::new(registry), &["y"]);
    queue(&mut state, Stmt::method_call("rnd", vec![Expr::name("y")]));
    let formula = step(&mut state).unwrap();
    assert_eq!(formula, ig_tuple(vec![var8("rnd_v")]));
}

// ============================================================
// Tables
// ============================================================

/// Registry with the three actions the table scenarios use.
fn table_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(Callable::Action(ActionDef::new(
        "A",
        vec![Parameter::new(Direction::In, "v", TypeSig::Bits(8))],
        Block::from_stmts(vec![Stmt::assign(Expr::name("port"), Expr::name("v"))]),
    )));
    registry.register(Callable::Action(ActionDef::new(
        "B",
        vec![Parameter::new(Direction::In, "arg", TypeSig::Bits(8))],
        Block::from_stmts(vec![Stmt::assign(Expr::name("port"), Expr::name("arg"))]),
    )));
    registry.register(Callable::Action(ActionDef::new(
        "NoAction",
        vec![],
        Block::new(),
    )));
    registry
}

#[test]
fn keyless_table_always_takes_default() {
    let mut registry = table_registry();
    let mut table = Table::new("t0");
    table.set_default(ActionCall::new("NoAction", vec![]));
    registry.register_table(table);
    let mut state = ig_state(Rc::new(registry), &["port"]);
    queue(&mut state, Stmt::method_call("t0", vec![]));
    let formula = step(&mut state).unwrap();

    let fallthrough = ig_tuple(vec![var8("port0")]);
    let expected = Term::ite(
        Term::bool_const(false),
        fallthrough.clone(),
        fallthrough,
    )
    .unwrap();
    assert_eq!(formula, expected);
}

#[test]
fn constant_entry_table_scenario() {
    let mut registry = table_registry();
    let mut table = Table::new("t");
    table.add_key(Expr::name("k"));
    table.add_action(ActionCall::new("B", vec![]));
    table.set_default(ActionCall::new("NoAction", vec![]));
    table
        .add_const_entry(
            vec![EntryKey::Value(Expr::Int(5))],
            ActionCall::new("A", vec![Expr::Int(7)]),
        )
        .unwrap();
    registry.register_table(table);

    let mut state = ig_state(Rc::new(registry), &["port"]);
    state.set_or_add_var("k", Value::Term(var8("k"))).unwrap();
    queue(&mut state, Stmt::method_call("t", vec![]));
    let formula = step(&mut state).unwrap();

    let no_action = ig_tuple(vec![var8("port0")]);
    let a_effect = ig_tuple(vec![bv8(7)]);
    let b_effect = ig_tuple(vec![var8("t_arg")]);
    let entry_guard = Term::eq(var8("k"), bv8(5)).unwrap();
    let selector_guard = Term::eq(
        Term::var("t_action", Sort::Bv(32)),
        Term::bv(1, 32).unwrap(),
    )
    .unwrap();
    let dispatch = Term::ite(
        selector_guard,
        b_effect,
        Term::ite(entry_guard, a_effect, no_action.clone()).unwrap(),
    )
    .unwrap();
    let matched = Term::eq(var8("k"), var8("t_key_0")).unwrap();
    let expected = Term::ite(matched, dispatch, no_action).unwrap();
    assert_eq!(formula, expected);
}

#[test]
fn wildcard_entry_keys_are_dont_care() {
    let mut registry = table_registry();
    let mut table = Table::new("t");
    table.add_key(Expr::name("k"));
    table.set_default(ActionCall::new("NoAction", vec![]));
    table
        .add_const_entry(vec![EntryKey::Wildcard], ActionCall::new("A", vec![Expr::Int(7)]))
        .unwrap();
    registry.register_table(table);

    let mut state = ig_state(Rc::new(registry), &["port"]);
    state.set_or_add_var("k", Value::Term(var8("k"))).unwrap();
    queue(&mut state, Stmt::method_call("t", vec![]));
    let formula = step(&mut state).unwrap();

    // The all-wildcard entry guard collapses to constant true.
    let no_action = ig_tuple(vec![var8("port0")]);
    let a_effect = ig_tuple(vec![bv8(7)]);
    let dispatch = Term::ite(Term::bool_const(true), a_effect, no_action.clone()).unwrap();
    let matched = Term::eq(var8("k"), var8("t_key_0")).unwrap();
    assert_eq!(formula, Term::ite(matched, dispatch, no_action).unwrap());
}

#[test]
fn switch_dispatches_on_selected_action() {
    let mut registry = table_registry();
    let mut table = Table::new("t");
    table.add_action(ActionCall::new("NoAction", vec![]));
    table.set_default(ActionCall::new("NoAction", vec![]));
    registry.register_table(table);

    let mut state = ig_state(Rc::new(registry), &["port"]);
    queue(
        &mut state,
        Stmt::Switch {
            table: "t".into(),
            cases: vec![SwitchCase {
                action: "NoAction".into(),
                block: Block::from_stmts(vec![Stmt::assign(Expr::name("port"), bits8(1))]),
            }],
            default: Block::from_stmts(vec![Stmt::assign(Expr::name("port"), bits8(9))]),
        },
    );
    let formula = step(&mut state).unwrap();

    // Every arm formula is guarded by the table's action selector.
    assert!(contains_var(&formula, "t_action"));
    let guard = Term::eq(
        Term::var("t_action", Sort::Bv(32)),
        Term::bv(1, 32).unwrap(),
    )
    .unwrap();
    let arm = Term::ite(guard.clone(), ig_tuple(vec![bv8(1)]), ig_tuple(vec![bv8(9)])).unwrap();
    let dispatch = Term::ite(guard, arm.clone(), arm.clone()).unwrap();
    let expected = Term::ite(Term::bool_const(false), dispatch, arm).unwrap();
    assert_eq!(formula, expected);
}

#[test]
fn unknown_switch_case_is_fatal() {
    let mut registry = table_registry();
    let mut table = Table::new("t");
    table.set_default(ActionCall::new("NoAction", vec![]));
    registry.register_table(table);

    let mut state = ig_state(Rc::new(registry), &["port"]);
    queue(
        &mut state,
        Stmt::Switch {
            table: "t".into(),
            cases: vec![SwitchCase {
                action: "missing".into(),
                block: Block::new(),
            }],
            default: Block::new(),
        },
    );
    assert!(matches!(
        step(&mut state),
        Err(EvalError::UnknownAction { .. })
    ));
}

// ============================================================
// Properties
// ============================================================

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Declared actions get ids 1..=N in declaration order, for
        /// any declaration count.
        #[test]
        fn action_ids_are_dense_and_stable(count in 1usize..12) {
            let mut table = Table::new("t");
            for i in 0..count {
                table.add_action(ActionCall::new(format!("a{i}"), vec![]));
            }
            for i in 0..count {
                prop_assert_eq!(table.action_id(&format!("a{i}")), Some(i as u32 + 1));
            }
        }

        /// Exit leaves exactly the entry bindings in the output, no
        /// matter how much work was queued behind it.
        #[test]
        fn exit_discards_any_queued_suffix(n in 0usize..8) {
            let mut state = ig_state(Rc::new(Registry::new()), &["x"]);
            for _ in 0..n {
                queue(&mut state, Stmt::assign(Expr::name("x"), bits8(1)));
            }
            queue(&mut state, Stmt::Exit);
            let formula = step(&mut state).unwrap();
            prop_assert_eq!(formula, ig_tuple(vec![var8("x0")]));
        }
    }
}
