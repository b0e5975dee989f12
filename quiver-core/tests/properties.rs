//! Property-style tests over the term layer and rewriter.

use proptest::prelude::*;
use rustc_hash::FxHashMap;

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::bv::BvValue;
use quiver_core::rewrite::Rewriter;

/// Build a term over `x`, `y` and constants from an opcode script. Every
/// byte picks an operation applied to the two most recent subterms.
fn build_term(tm: &mut TermManager, script: &[u8]) -> TermId {
    let bv8 = tm.mk_bv_sort(8);
    let x = tm.mk_const(bv8, Some("x")).unwrap();
    let y = tm.mk_const(bv8, Some("y")).unwrap();
    let mut stack = vec![x, y];
    for &op in script {
        let a = stack[stack.len() - 1];
        let b = stack[stack.len() - 2];
        let t = match op % 12 {
            0 => tm.mk_term(Kind::BvAdd, &[a, b], &[]).unwrap(),
            1 => tm.mk_term(Kind::BvSub, &[a, b], &[]).unwrap(),
            2 => tm.mk_term(Kind::BvMul, &[a, b], &[]).unwrap(),
            3 => tm.mk_term(Kind::BvAnd, &[a, b], &[]).unwrap(),
            4 => tm.mk_term(Kind::BvOr, &[a, b], &[]).unwrap(),
            5 => tm.mk_term(Kind::BvXor, &[a, b], &[]).unwrap(),
            6 => tm.mk_term(Kind::BvNot, &[a], &[]).unwrap(),
            7 => tm.mk_term(Kind::BvNeg, &[a], &[]).unwrap(),
            8 => tm.mk_term(Kind::BvShl, &[a, b], &[]).unwrap(),
            9 => tm.mk_bv_value_u64(tm.sort_of(a), u64::from(op)).unwrap(),
            10 => tm.mk_term(Kind::BvUdiv, &[a, b], &[]).unwrap(),
            _ => tm.mk_term(Kind::BvConcat, &[a, b], &[]).unwrap(),
        };
        stack.push(t);
    }
    *stack.last().unwrap()
}

proptest! {
    /// Constructing the same tuple twice yields the same identifier.
    #[test]
    fn hash_consing_is_deterministic(script in proptest::collection::vec(any::<u8>(), 0..12)) {
        let mut tm = TermManager::new();
        let t1 = build_term(&mut tm, &script);
        let t2 = build_term(&mut tm, &script);
        prop_assert_eq!(t1, t2);
    }

    /// `rewrite(rewrite(t)) == rewrite(t)` for every generated shape and
    /// every level.
    #[test]
    fn rewriting_is_idempotent(script in proptest::collection::vec(any::<u8>(), 0..12), level in 0u8..=3) {
        let mut tm = TermManager::new();
        let t = build_term(&mut tm, &script);
        let mut rw = Rewriter::new(level);
        let once = rw.rewrite(&mut tm, t).unwrap();
        let twice = rw.rewrite(&mut tm, once).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// The identity substitution maps every term to itself.
    #[test]
    fn identity_substitution(script in proptest::collection::vec(any::<u8>(), 0..12)) {
        let mut tm = TermManager::new();
        let t = build_term(&mut tm, &script);
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let mut map = FxHashMap::default();
        map.insert(x, x);
        prop_assert_eq!(tm.substitute_term(t, &map).unwrap(), t);
    }

    /// Values survive a print/parse round trip in every base.
    #[test]
    fn value_round_trip(v in any::<u8>(), base in prop_oneof![Just(2u32), Just(10), Just(16)]) {
        let mut tm = TermManager::new();
        let bv8 = tm.mk_bv_sort(8);
        let direct = tm.mk_bv_value_u64(bv8, u64::from(v)).unwrap();
        let text = tm.bv_value(direct).unwrap().to_string_radix(base);
        let parsed = tm.mk_bv_value(bv8, &text, base).unwrap();
        prop_assert_eq!(parsed, direct);
    }

    /// Rewriting preserves semantics under random assignments (checked with
    /// the bit-vector value layer as the reference).
    #[test]
    fn rewriting_preserves_evaluation(
        script in proptest::collection::vec(any::<u8>(), 0..10),
        vx in any::<u8>(),
        vy in any::<u8>(),
    ) {
        let mut tm = TermManager::new();
        let t = build_term(&mut tm, &script);
        let mut rw = Rewriter::new(2);
        let r = rw.rewrite(&mut tm, t).unwrap();

        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let y = tm.mk_const(bv8, Some("y")).unwrap();
        let mut map = FxHashMap::default();
        map.insert(x, tm.mk_bv_val(BvValue::from_u64(8, u64::from(vx))));
        map.insert(y, tm.mk_bv_val(BvValue::from_u64(8, u64::from(vy))));

        let gt = tm.substitute_term(t, &map).unwrap();
        let gr = tm.substitute_term(r, &map).unwrap();
        // both sides fold to the same value
        let vt = rw.rewrite(&mut tm, gt).unwrap();
        let vr = rw.rewrite(&mut tm, gr).unwrap();
        prop_assert!(tm.is_value(vt), "did not fold: {}", tm.to_smt2(vt));
        prop_assert_eq!(vt, vr);
    }
}
