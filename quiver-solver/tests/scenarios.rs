//! End-to-end solver scenarios.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::bv::BvValue;
use quiver_core::option::Options;
use quiver_core::rewrite::Rewriter;
use quiver_solver::{Solver, SolverResult};

fn solver(configure: impl FnOnce(&mut Options)) -> Solver {
    let mut options = Options::default();
    configure(&mut options);
    Solver::new(options)
}

/// Quickstart: mixed bit-vector, uninterpreted-function and array
/// constraints; the reported model satisfies the formula.
#[test]
fn quickstart_mixed_theories_is_sat() {
    let mut tm = TermManager::new();
    let mut solver = solver(|o| o.produce_models = true);

    let bv8 = tm.mk_bv_sort(8);
    let bv4 = tm.mk_bv_sort(4);
    let fun_sort = tm.mk_fun_sort(&[bv8, bv4], bv8).unwrap();
    let arr_sort = tm.mk_array_sort(bv8, bv8).unwrap();

    let x = tm.mk_const(bv8, Some("x")).unwrap();
    let y = tm.mk_const(bv8, Some("y")).unwrap();
    let f = tm.mk_const(fun_sort, Some("f")).unwrap();
    let a = tm.mk_const(arr_sort, Some("a")).unwrap();

    let two = tm.mk_bv_value_u64(bv8, 2).unwrap();
    let one = tm.mk_bv_one(bv8).unwrap();

    // distinct(extract[3:0](x sdiv 2), extract[3:0](y ashr 1))
    let sdiv = tm.mk_term(Kind::BvSdiv, &[x, two], &[]).unwrap();
    let lhs = tm.mk_term(Kind::BvExtract, &[sdiv], &[3, 0]).unwrap();
    let ashr = tm.mk_term(Kind::BvAshr, &[y, one], &[]).unwrap();
    let rhs = tm.mk_term(Kind::BvExtract, &[ashr], &[3, 0]).unwrap();
    let a1 = tm.mk_term(Kind::Distinct, &[lhs, rhs], &[]).unwrap();

    // f(x, extract[6:3](x)) = y
    let mid = tm.mk_term(Kind::BvExtract, &[x], &[6, 3]).unwrap();
    let app = tm.mk_apply(f, &[x, mid]).unwrap();
    let a2 = tm.mk_eq(app, y).unwrap();

    // select(a, x) = y
    let sel = tm.mk_term(Kind::Select, &[a, x], &[]).unwrap();
    let a3 = tm.mk_eq(sel, y).unwrap();

    for t in [a1, a2, a3] {
        solver.assert_formula(&tm, t).unwrap();
    }
    assert_eq!(solver.check_sat(&mut tm, &[]).unwrap(), SolverResult::Sat);

    let mx = solver.get_value(&mut tm, x).unwrap();
    let my = solver.get_value(&mut tm, y).unwrap();
    assert!(tm.bv_value(mx).is_some());
    assert!(tm.bv_value(my).is_some());
    let mf = solver.get_value(&mut tm, f).unwrap();
    assert_eq!(tm.kind(mf), Kind::Lambda);
    let ma = solver.get_value(&mut tm, a).unwrap();
    assert!(matches!(tm.kind(ma), Kind::Store | Kind::ConstArray));

    // re-evaluating the assertions under the model yields true
    let mut map = FxHashMap::default();
    map.insert(x, mx);
    map.insert(y, my);
    map.insert(f, mf);
    map.insert(a, ma);
    let mut rewriter = Rewriter::new(2);
    for t in [a1, a2, a3] {
        let grounded = tm.substitute_term(t, &map).unwrap();
        let value = rewriter.rewrite(&mut tm, grounded).unwrap();
        assert!(tm.is_true(value), "assertion {} evaluated to {}", tm.to_smt2(t), tm.to_smt2(value));
    }
}

/// Reassociated additions on both sides of an equality preprocess to true.
#[test]
fn normalization_discharges_reassociated_equality() {
    let mut tm = TermManager::new();
    let mut solver = solver(|_| {});
    let bv8 = tm.mk_bv_sort(8);
    let a = tm.mk_const(bv8, Some("a")).unwrap();
    let b = tm.mk_const(bv8, Some("b")).unwrap();
    let c = tm.mk_const(bv8, Some("c")).unwrap();
    let bc = tm.mk_term(Kind::BvAdd, &[b, c], &[]).unwrap();
    let lhs = tm.mk_term(Kind::BvAdd, &[a, bc], &[]).unwrap();
    let ca = tm.mk_term(Kind::BvAdd, &[c, a], &[]).unwrap();
    let rhs = tm.mk_term(Kind::BvAdd, &[ca, b], &[]).unwrap();
    let eq = tm.mk_eq(lhs, rhs).unwrap();
    solver.assert_formula(&tm, eq).unwrap();
    let simplified = solver.simplify(&mut tm).unwrap();
    assert!(simplified.iter().all(|&t| tm.is_true(t)));
}

/// Four additive chains over the same summands share one sub-sum after
/// preprocessing and the whole set stays satisfiable-checkable.
#[test]
fn shared_adders_still_solve() {
    let mut tm = TermManager::new();
    let mut solver = solver(|o| o.produce_models = true);
    let bv8 = tm.mk_bv_sort(8);
    let vars: Vec<TermId> = ["a", "b", "c", "d"]
        .iter()
        .map(|n| tm.mk_const(bv8, Some(n)).unwrap())
        .collect();
    let mut asserts = Vec::new();
    // same sum constrained against one constant, plus side constraints
    for (i, &k) in [9u64, 3, 200].iter().enumerate() {
        let mut sum = vars[i];
        for (j, &v) in vars.iter().enumerate() {
            if j != i {
                sum = tm.mk_term(Kind::BvAdd, &[sum, v], &[]).unwrap();
            }
        }
        let kv = tm.mk_bv_value_u64(bv8, k).unwrap();
        let cmp = tm.mk_term(Kind::BvUle, &[kv, sum], &[]).unwrap();
        asserts.push(cmp);
    }
    for t in &asserts {
        solver.assert_formula(&tm, *t).unwrap();
    }
    assert_eq!(solver.check_sat(&mut tm, &[]).unwrap(), SolverResult::Sat);
    // model satisfies every assertion
    let values: Vec<BvValue> = vars
        .iter()
        .map(|&v| solver.get_bv_value(&mut tm, v).unwrap())
        .collect();
    let total = values
        .iter()
        .fold(BvValue::zero(8), |acc, v| acc.bvadd(v));
    assert!(BvValue::from_u64(8, 200).ule(&total));
}

/// Incremental scopes with unsat cores (S4).
#[test]
fn incremental_core_and_recovery() {
    let mut tm = TermManager::new();
    let mut solver = solver(|o| {
        o.incremental = true;
        o.produce_unsat_cores = true;
        o.produce_models = true;
    });
    let bv8 = tm.mk_bv_sort(8);
    let x = tm.mk_const(bv8, Some("x")).unwrap();
    let zero = tm.mk_bv_zero(bv8).unwrap();
    let p = tm.mk_eq(x, zero).unwrap();
    let np = tm.mk_not(p).unwrap();

    solver.assert_formula(&tm, p).unwrap();
    solver.push(1).unwrap();
    solver.assert_formula(&tm, np).unwrap();
    assert_eq!(solver.check_sat(&mut tm, &[]).unwrap(), SolverResult::Unsat);
    let core = solver.get_unsat_core().unwrap();
    assert!(core.contains(&p));
    assert!(core.contains(&np));
    solver.pop(1).unwrap();
    assert_eq!(solver.check_sat(&mut tm, &[]).unwrap(), SolverResult::Sat);
    assert_eq!(
        solver.get_bv_value(&mut tm, x).unwrap(),
        BvValue::zero(8)
    );
}

/// ∃x. ∀y. x + y = y is sat with x = 0 (S5).
#[test]
fn exists_forall_has_zero_model() {
    let mut tm = TermManager::new();
    let mut solver = solver(|o| o.produce_models = true);
    let bv8 = tm.mk_bv_sort(8);
    let x = tm.mk_var(bv8, Some("x")).unwrap();
    let y = tm.mk_var(bv8, Some("y")).unwrap();
    let sum = tm.mk_term(Kind::BvAdd, &[x, y], &[]).unwrap();
    let eq = tm.mk_eq(sum, y).unwrap();
    let forall = tm.mk_forall(y, eq).unwrap();
    let exists = tm.mk_exists(x, forall).unwrap();
    solver.assert_formula(&tm, exists).unwrap();
    assert_eq!(solver.check_sat(&mut tm, &[]).unwrap(), SolverResult::Sat);
    let model = solver.get_value(&mut tm, x).unwrap();
    assert_eq!(tm.bv_value(model), Some(&BvValue::zero(8)));
}

/// ∀x. ∃y. y = x ∧ y ≠ x is unsat, with and without the dual worker (S6).
#[test]
fn forall_contradiction_is_unsat() {
    for dual in [false, true] {
        let mut tm = TermManager::new();
        let mut solver = solver(|o| o.quant_dual_solver = dual);
        let bv4 = tm.mk_bv_sort(4);
        let x = tm.mk_var(bv4, Some("x")).unwrap();
        let y = tm.mk_var(bv4, Some("y")).unwrap();
        let eq = tm.mk_eq(y, x).unwrap();
        let ne = tm.mk_not(eq).unwrap();
        let body = tm.mk_and2(eq, ne).unwrap();
        let exists = tm.mk_exists(y, body).unwrap();
        let forall = tm.mk_forall(x, exists).unwrap();
        solver.assert_formula(&tm, forall).unwrap();
        assert_eq!(
            solver.check_sat(&mut tm, &[]).unwrap(),
            SolverResult::Unsat,
            "dual = {dual}"
        );
    }
}

/// Division and remainder by zero follow the SMT-LIB totalization at the
/// solver level, not just in the value layer.
#[test]
fn division_by_zero_totalization_end_to_end() {
    let mut tm = TermManager::new();
    let mut solver = solver(|o| o.produce_models = true);
    let bv8 = tm.mk_bv_sort(8);
    let x = tm.mk_const(bv8, Some("x")).unwrap();
    let zero = tm.mk_bv_zero(bv8).unwrap();
    let ones = tm.mk_bv_ones(bv8).unwrap();
    // x udiv 0 = ones  and  x urem 0 = x must both be valid
    let udiv = tm.mk_term(Kind::BvUdiv, &[x, zero], &[]).unwrap();
    let urem = tm.mk_term(Kind::BvUrem, &[x, zero], &[]).unwrap();
    let c1 = tm.mk_eq(udiv, ones).unwrap();
    let c2 = tm.mk_eq(urem, x).unwrap();
    let both = tm.mk_and2(c1, c2).unwrap();
    let neg = tm.mk_not(both).unwrap();
    solver.assert_formula(&tm, neg).unwrap();
    assert_eq!(solver.check_sat(&mut tm, &[]).unwrap(), SolverResult::Unsat);
}

/// extract[w-1:0] is the identity through the whole stack.
#[test]
fn full_width_extract_is_identity() {
    let mut tm = TermManager::new();
    let mut solver = solver(|_| {});
    let bv8 = tm.mk_bv_sort(8);
    let x = tm.mk_const(bv8, Some("x")).unwrap();
    let ext = tm.mk_term(Kind::BvExtract, &[x], &[7, 0]).unwrap();
    let eq = tm.mk_eq(ext, x).unwrap();
    let ne = tm.mk_not(eq).unwrap();
    solver.assert_formula(&tm, ne).unwrap();
    assert_eq!(solver.check_sat(&mut tm, &[]).unwrap(), SolverResult::Unsat);
}

/// The termination callback turns every outcome into unknown, even for
/// quantified problems.
#[test]
fn cancellation_is_soft() {
    let mut tm = TermManager::new();
    let mut solver = solver(|_| {});
    let bv8 = tm.mk_bv_sort(8);
    let x = tm.mk_var(bv8, Some("x")).unwrap();
    let y = tm.mk_var(bv8, Some("y")).unwrap();
    let sum = tm.mk_term(Kind::BvAdd, &[x, y], &[]).unwrap();
    let eq = tm.mk_eq(sum, y).unwrap();
    let forall = tm.mk_forall(y, eq).unwrap();
    let exists = tm.mk_exists(x, forall).unwrap();
    solver.assert_formula(&tm, exists).unwrap();
    solver.set_termination_callback(Arc::new(|| true));
    assert_eq!(
        solver.check_sat(&mut tm, &[]).unwrap(),
        SolverResult::Unknown
    );
}

/// Rewriter soundness, differentially against the ground solver: asserting
/// `t != rewrite(t)` must be unsat for a mix of operator shapes.
#[test]
fn rewriter_is_semantics_preserving_differentially() {
    let mut tm = TermManager::new();
    let bv4 = tm.mk_bv_sort(4);
    let x = tm.mk_const(bv4, Some("x")).unwrap();
    let y = tm.mk_const(bv4, Some("y")).unwrap();
    let three = tm.mk_bv_value_u64(bv4, 3).unwrap();
    let zero = tm.mk_bv_zero(bv4).unwrap();

    let shapes: Vec<TermId> = {
        let add = tm.mk_term(Kind::BvAdd, &[x, zero], &[]).unwrap();
        let sub = tm.mk_term(Kind::BvSub, &[x, y], &[]).unwrap();
        let mul = tm.mk_term(Kind::BvMul, &[sub, three], &[]).unwrap();
        let nand = tm.mk_term(Kind::BvNand, &[mul, y], &[]).unwrap();
        let inc = tm.mk_term(Kind::BvInc, &[nand], &[]).unwrap();
        let shl = tm.mk_term(Kind::BvShl, &[inc, three], &[]).unwrap();
        let rol = tm.mk_term(Kind::BvRol, &[shl, three], &[]).unwrap();
        let smod = tm.mk_term(Kind::BvSmod, &[rol, y], &[]).unwrap();
        vec![add, sub, mul, nand, inc, shl, rol, smod]
    };

    let mut rewriter = Rewriter::new(2);
    for t in shapes {
        let r = rewriter.rewrite(&mut tm, t).unwrap();
        let eq = tm.mk_eq(t, r).unwrap();
        let ne = tm.mk_not(eq).unwrap();
        let mut s = solver(|_| {});
        s.assert_formula(&tm, ne).unwrap();
        assert_eq!(
            s.check_sat(&mut tm, &[]).unwrap(),
            SolverResult::Unsat,
            "rewrite changed the meaning of {}",
            tm.to_smt2(t)
        );
    }
}

/// Value parsing round-trips through printing in every base.
#[test]
fn value_text_round_trip() {
    let mut tm = TermManager::new();
    let bv8 = tm.mk_bv_sort(8);
    for v in [0u64, 1, 2, 127, 128, 200, 255] {
        let direct = tm.mk_bv_value_u64(bv8, v).unwrap();
        for base in [2u32, 10, 16] {
            let text = tm.bv_value(direct).unwrap().to_string_radix(base);
            let parsed = tm.mk_bv_value(bv8, &text, base).unwrap();
            assert_eq!(parsed, direct);
        }
    }
}
