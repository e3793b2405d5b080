// End-to-end scenarios (spec.md §8): each test drives the real pipeline
// from typed IR through bytecode lowering to the interpreter, the same
// path a linked program would take, rather than asserting on any single
// module in isolation.

use fbler::bytecode::{CodeBlock, Instr};
use fbler::config::Config;
use fbler::env::Env;
use fbler::interp::Interpreter;
use fbler::io::NullIo;
use fbler::irgen::IrGen;
use fbler::profile::NullProfile;
use fbler::tc::{Tc, TcData, TcKind};
use fbler::types::{DataKind, Type, TypeData, TypeHeap};
use fbler::util::Loc;
use fbler::value::ValueData;
use std::rc::Rc;

/// All the Tc nodes in these scenarios are untyped as far as lowering
/// cares: `irgen.rs` only ever reads a node's `ty` field for
/// `TcKind::TypeValue`, which none of these scenarios use, so a single
/// placeholder type stands in for every node.
fn dummy_type(heap: &mut TypeHeap) -> Type {
    heap.new_type(TypeData::Data { kind: DataKind::Struct, fields: vec![] })
}

fn unit_tc(ty: Type) -> Tc {
    TcData::new(ty, Loc::synthetic(), TcKind::StructValue { fields: vec![] })
}

fn bool_tc(ty: Type, value: bool) -> Tc {
    TcData::new(ty, Loc::synthetic(), TcKind::UnionValue { tag: value as usize, field_count: 2, arg: unit_tc(ty) })
}

fn var_tc(ty: Type, name: &str) -> Tc {
    TcData::new(ty, Loc::synthetic(), TcKind::Var(name.to_string()))
}

fn select_bool(ty: Type, condition: Tc, on_false: Tc, on_true: Tc) -> Tc {
    TcData::new(ty, Loc::synthetic(), TcKind::UnionSelect { condition, arms: vec![on_false, on_true] })
}

/// An immediately-applied two-argument lambda with no outer captures —
/// the bool primitives below are all pure functions of their own
/// arguments, so this sidesteps building a standalone top-level module
/// per primitive.
fn apply2(ty: Type, params: (&str, &str), body: Tc, a: Tc, b: Tc) -> Tc {
    let func = TcData::new(
        ty,
        Loc::synthetic(),
        TcKind::FuncValue {
            arg_names: vec![params.0.to_string(), params.1.to_string()],
            captured: vec![],
            body,
        },
    );
    TcData::new(ty, Loc::synthetic(), TcKind::FuncApply { func, args: vec![a, b] })
}

fn xor_body(ty: Type) -> Tc {
    select_bool(
        ty,
        var_tc(ty, "p"),
        select_bool(ty, var_tc(ty, "q"), bool_tc(ty, false), bool_tc(ty, true)),
        select_bool(ty, var_tc(ty, "q"), bool_tc(ty, true), bool_tc(ty, false)),
    )
}

fn and_body(ty: Type) -> Tc {
    select_bool(ty, var_tc(ty, "p"), bool_tc(ty, false), var_tc(ty, "q"))
}

fn or_body(ty: Type) -> Tc {
    select_bool(ty, var_tc(ty, "p"), var_tc(ty, "q"), bool_tc(ty, true))
}

fn xor_call(ty: Type, a: Tc, b: Tc) -> Tc {
    apply2(ty, ("p", "q"), xor_body(ty), a, b)
}

fn and_call(ty: Type, a: Tc, b: Tc) -> Tc {
    apply2(ty, ("p", "q"), and_body(ty), a, b)
}

fn or_call(ty: Type, a: Tc, b: Tc) -> Tc {
    apply2(ty, ("p", "q"), or_body(ty), a, b)
}

/// `fn(a, b, cin) -> { sum: Bool, carry: Bool }`, built the way a real
/// full adder is: as a composition of two half-adders over `xor`/`and`/
/// `or`, never by hardcoding the truth table.
fn full_adder_tc(ty: Type) -> Tc {
    let bindings = vec![
        ("ab_xor".to_string(), xor_call(ty, var_tc(ty, "a"), var_tc(ty, "b"))),
        ("ab_and".to_string(), and_call(ty, var_tc(ty, "a"), var_tc(ty, "b"))),
        ("xc_and".to_string(), and_call(ty, var_tc(ty, "ab_xor"), var_tc(ty, "cin"))),
        ("carry".to_string(), or_call(ty, var_tc(ty, "ab_and"), var_tc(ty, "xc_and"))),
        ("sum".to_string(), xor_call(ty, var_tc(ty, "ab_xor"), var_tc(ty, "cin"))),
    ];
    let body = TcData::new(
        ty,
        Loc::synthetic(),
        TcKind::StructValue { fields: vec![var_tc(ty, "sum"), var_tc(ty, "carry")] },
    );
    TcData::new(ty, Loc::synthetic(), TcKind::Let { recursive: false, bindings, body })
}

fn full_adder_code(ty: Type) -> Rc<CodeBlock> {
    let args = vec!["a".to_string(), "b".to_string(), "cin".to_string()];
    IrGen::lower_function(&args, &Env::root(), &full_adder_tc(ty))
}

fn bool_tag(interp: &Interpreter<'_>, v: fbler::value::Value) -> usize {
    match interp.values.get(v) {
        ValueData::Union { tag, .. } => *tag,
        other => panic!("expected a bool union, got {:?}", other),
    }
}

#[test]
fn full_adder_computes_sum_and_carry() {
    // 1 + 1 + 0 = 0b10: sum false, carry true.
    let mut types = TypeHeap::new();
    let ty = dummy_type(&mut types);
    let fa = full_adder_code(ty);

    let mut code = CodeBlock::new(0, 0);
    let a = code.fresh_local();
    let unit = code.fresh_local();
    code.push(Instr::StructValue { args: vec![], dest: unit });
    code.push(Instr::UnionValue { tag: 1, arg: unit, dest: a });
    let b = code.fresh_local();
    code.push(Instr::UnionValue { tag: 1, arg: unit, dest: b });
    let cin = code.fresh_local();
    code.push(Instr::UnionValue { tag: 0, arg: unit, dest: cin });
    let func_slot = code.fresh_local();
    code.push(Instr::FuncValue { code: fa, captures: vec![], dest: func_slot });
    let result = code.fresh_local();
    code.push(Instr::Call { exit: true, func: func_slot, args: vec![a, b, cin], dest: result });
    code.push(Instr::Return { result });

    let mut profile = NullProfile;
    let mut io = NullIo;
    let mut interp = Interpreter::new(Config::default(), fbler::value_heap::ValueHeap::new(&Config::default()), &mut profile, &mut io);
    let result = interp.run(Rc::new(code)).expect("program completes");
    let (sum, carry) = match interp.values.get(result) {
        ValueData::Struct { fields } => (fields[0], fields[1]),
        other => panic!("expected a struct result, got {:?}", other),
    };
    assert_eq!(bool_tag(&interp, sum), 0, "sum bit");
    assert_eq!(bool_tag(&interp, carry), 1, "carry bit");
}

#[test]
fn four_bit_ripple_carry_adder_matches_integer_addition() {
    // 13 (1101) + 6 (0110) = 19 (10011), bits supplied and read LSB-first.
    let a_bits = [true, false, true, true];
    let b_bits = [false, true, true, false];
    let expected_sum = [true, true, false, false];
    let expected_carry_out = true;

    let mut types = TypeHeap::new();
    let ty = dummy_type(&mut types);
    let fa = full_adder_code(ty);

    let mut code = CodeBlock::new(0, 0);
    let func_slot = code.fresh_local();
    code.push(Instr::FuncValue { code: fa, captures: vec![], dest: func_slot });

    let unit = code.fresh_local();
    code.push(Instr::StructValue { args: vec![], dest: unit });
    let mut cin = code.fresh_local();
    code.push(Instr::UnionValue { tag: 0, arg: unit, dest: cin });

    let mut sum_slots = Vec::new();
    for (a_bit, b_bit) in a_bits.iter().zip(b_bits.iter()) {
        let a = code.fresh_local();
        code.push(Instr::UnionValue { tag: *a_bit as usize, arg: unit, dest: a });
        let b = code.fresh_local();
        code.push(Instr::UnionValue { tag: *b_bit as usize, arg: unit, dest: b });
        let step_result = code.fresh_local();
        code.push(Instr::Call { exit: false, func: func_slot, args: vec![a, b, cin], dest: step_result });
        let sum_bit = code.fresh_local();
        code.push(Instr::StructAccess { obj: step_result, tag: 0, dest: sum_bit });
        let next_cin = code.fresh_local();
        code.push(Instr::StructAccess { obj: step_result, tag: 1, dest: next_cin });
        sum_slots.push(sum_bit);
        cin = next_cin;
    }

    let mut out_fields = sum_slots;
    out_fields.push(cin);
    let dest = code.fresh_local();
    code.push(Instr::StructValue { args: out_fields, dest });
    code.push(Instr::Return { result: dest });

    let mut profile = NullProfile;
    let mut io = NullIo;
    let mut interp = Interpreter::new(Config::default(), fbler::value_heap::ValueHeap::new(&Config::default()), &mut profile, &mut io);
    let result = interp.run(Rc::new(code)).expect("program completes");
    let fields = match interp.values.get(result) {
        ValueData::Struct { fields } => fields.clone(),
        other => panic!("expected a struct result, got {:?}", other),
    };
    for (i, expected) in expected_sum.iter().enumerate() {
        assert_eq!(bool_tag(&interp, fields[i]) == 1, *expected, "sum bit {}", i);
    }
    assert_eq!(bool_tag(&interp, fields[4]) == 1, expected_carry_out, "carry out");
}

#[test]
fn recursive_let_ties_a_cyclic_struct_through_a_ref() {
    // let x = { self: x } in x — RefValue/RefDef closes the knot so that
    // the struct's own field and the let's bound name are the same value.
    let mut types = TypeHeap::new();
    let ty = dummy_type(&mut types);

    let self_struct = TcData::new(ty, Loc::synthetic(), TcKind::StructValue { fields: vec![var_tc(ty, "x")] });
    let program = TcData::new(
        ty,
        Loc::synthetic(),
        TcKind::Let {
            recursive: true,
            bindings: vec![("x".to_string(), self_struct)],
            body: var_tc(ty, "x"),
        },
    );
    let code = IrGen::lower_function(&[], &Env::root(), &program);

    let mut profile = NullProfile;
    let mut io = NullIo;
    let mut interp = Interpreter::new(Config::default(), fbler::value_heap::ValueHeap::new(&Config::default()), &mut profile, &mut io);
    let result = interp.run(code).expect("program completes");

    let inner = match interp.values.get(result) {
        ValueData::Ref(Some(v)) => *v,
        other => panic!("expected the unfolded Ref, got {:?}", other),
    };
    match interp.values.get(inner) {
        ValueData::Struct { fields } => assert_eq!(fields[0], result, "struct's field closes back on the ref itself"),
        other => panic!("expected a struct, got {:?}", other),
    }
}

#[test]
fn undefined_union_access_aborts_the_whole_program() {
    let mut code = CodeBlock::new(0, 0);
    let unit = code.fresh_local();
    let tagged = code.fresh_local();
    let access = code.fresh_local();
    code.push(Instr::StructValue { args: vec![], dest: unit });
    code.push(Instr::UnionValue { tag: 0, arg: unit, dest: tagged });
    code.push(Instr::UnionAccess { obj: tagged, tag: 1, dest: access });
    code.push(Instr::Return { result: access });

    let mut profile = NullProfile;
    let mut io = NullIo;
    let mut interp = Interpreter::new(Config::default(), fbler::value_heap::ValueHeap::new(&Config::default()), &mut profile, &mut io);
    assert_eq!(interp.run(Rc::new(code)), Err(fbler::interp::RuntimeError::Aborted));
}

#[test]
fn link_preserves_fifo_order_across_multiple_puts_and_gets() {
    let mut code = CodeBlock::new(0, 0);
    let get_port = code.fresh_local();
    let put_port = code.fresh_local();
    code.push(Instr::Link { get_dest: get_port, put_dest: put_port });

    let unit = code.fresh_local();
    code.push(Instr::StructValue { args: vec![], dest: unit });

    for tag in [0usize, 1, 0] {
        let v = code.fresh_local();
        code.push(Instr::UnionValue { tag, arg: unit, dest: v });
        let put_result = code.fresh_local();
        code.push(Instr::Put { port: put_port, arg: v, dest: put_result });
    }

    let mut got = Vec::new();
    for _ in 0..3 {
        let dest = code.fresh_local();
        code.push(Instr::Get { port: get_port, dest });
        got.push(dest);
    }

    let out = code.fresh_local();
    code.push(Instr::StructValue { args: got, dest: out });
    code.push(Instr::Return { result: out });

    let mut profile = NullProfile;
    let mut io = NullIo;
    let mut interp = Interpreter::new(Config::default(), fbler::value_heap::ValueHeap::new(&Config::default()), &mut profile, &mut io);
    let result = interp.run(Rc::new(code)).expect("program completes");
    let fields = match interp.values.get(result) {
        ValueData::Struct { fields } => fields.clone(),
        other => panic!("expected a struct result, got {:?}", other),
    };
    let tags: Vec<usize> = fields.iter().map(|v| bool_tag(&interp, *v)).collect();
    assert_eq!(tags, vec![0, 1, 0]);
}

/// A Peano-style "countdown" argument 10,000 deep, built directly on the
/// value heap: `Zero` or `Succ(n-1)`. Passing it through a tail-recursive
/// `countdown` function (below) exercises spec.md §4.5's tail-call frame
/// replacement at a depth that would overflow the native stack if calls
/// were not actually flattened.
fn build_countdown_value(heap: &mut fbler::value_heap::ValueHeap, depth: usize) -> fbler::value::Value {
    let unit = heap.new_value(ValueData::Struct { fields: vec![] });
    let mut v = heap.new_value(ValueData::Union { tag: 0, arg: unit });
    heap.release(unit);
    for _ in 0..depth {
        let next = heap.new_value(ValueData::Union { tag: 1, arg: v });
        heap.release(v);
        v = next;
    }
    v
}

/// `fn(n) -> Unit`: a self-recursive function, bound through a
/// recursive `Let` the same way `RefValue`/`RefDef` close any other
/// recursive binding, that tail-calls itself through `n`'s `Succ`
/// payload until it hits `Zero`. The whole thing is itself a
/// single-argument function so it can be lowered as one top-level
/// program and invoked with the pre-built countdown value as its sole
/// argument — no separate "bind, then call" step needed.
fn countdown_tc(ty: Type) -> Tc {
    let recurse = TcData::new(
        ty,
        Loc::synthetic(),
        TcKind::FuncApply {
            func: var_tc(ty, "countdown"),
            args: vec![TcData::new(
                ty,
                Loc::synthetic(),
                TcKind::DataAccess { object: var_tc(ty, "n"), field: 1, kind: DataKind::Union },
            )],
        },
    );
    let select = select_bool(ty, var_tc(ty, "n"), unit_tc(ty), recurse);
    let countdown_fn = TcData::new(
        ty,
        Loc::synthetic(),
        TcKind::FuncValue { arg_names: vec!["n".to_string()], captured: vec!["countdown".to_string()], body: select },
    );
    TcData::new(
        ty,
        Loc::synthetic(),
        TcKind::Let {
            recursive: true,
            bindings: vec![("countdown".to_string(), countdown_fn)],
            body: TcData::new(
                ty,
                Loc::synthetic(),
                TcKind::FuncApply { func: var_tc(ty, "countdown"), args: vec![var_tc(ty, "n")] },
            ),
        },
    )
}

#[test]
fn ten_thousand_deep_tail_recursion_completes_without_stack_growth() {
    let mut types = TypeHeap::new();
    let ty = dummy_type(&mut types);
    let code = IrGen::lower_function(&["n".to_string()], &Env::root(), &countdown_tc(ty));

    let mut values = fbler::value_heap::ValueHeap::new(&Config::default());
    let n = build_countdown_value(&mut values, 10_000);

    let mut profile = NullProfile;
    let mut io = NullIo;
    let mut interp = Interpreter::new(Config::default(), values, &mut profile, &mut io);
    let result = interp.run_with_args(code, vec![n]).expect("terminates");
    assert!(matches!(interp.values.get(result), ValueData::Struct { fields } if fields.is_empty()));
}
