//! Pass: eliminate constants defined by top-level equalities.
//!
//! An assertion `x = t` (or a bare Boolean constant / its negation) defines
//! `x` when `x` does not occur in `t`. Definitions are closed under each
//! other with an occurs check, substituted through the whole assertion set
//! and recorded so model queries see through them.

use rustc_hash::FxHashMap;

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::error::Result;

use super::{occurs, AssertionView, PassContext};

pub(crate) fn apply(
    tm: &mut TermManager,
    view: &mut AssertionView<'_>,
    ctx: &mut PassContext<'_>,
) -> Result<bool> {
    // collect candidate definitions, first writer wins
    let mut candidates: FxHashMap<TermId, TermId> = FxHashMap::default();
    for i in 0..view.len() {
        let t = view.get(i);
        match tm.kind(t) {
            Kind::Equal => {
                let (a, b) = (tm.child(t, 0), tm.child(t, 1));
                if tm.is_const(a) && !ctx.substitutions.contains_key(&a) && !occurs(tm, a, b) {
                    candidates.entry(a).or_insert(b);
                } else if tm.is_const(b) && !ctx.substitutions.contains_key(&b) && !occurs(tm, b, a)
                {
                    candidates.entry(b).or_insert(a);
                }
            }
            Kind::Const if tm.sort(tm.sort_of(t)).is_bool() => {
                let true_term = tm.mk_true();
                candidates.entry(t).or_insert(true_term);
            }
            Kind::Not if tm.is_const(tm.child(t, 0)) => {
                let false_term = tm.mk_false();
                candidates.entry(tm.child(t, 0)).or_insert(false_term);
            }
            _ => {}
        }
    }
    if candidates.is_empty() {
        return Ok(false);
    }

    // accept definitions one by one, keeping the map idempotent: accepted
    // values never contain accepted keys, and a definition that would close
    // a cycle is skipped
    let mut keys: Vec<TermId> = candidates.keys().copied().collect();
    keys.sort();
    let mut resolved: FxHashMap<TermId, TermId> = FxHashMap::default();
    for &x in &keys {
        let def = tm.substitute_term(candidates[&x], &resolved)?;
        if occurs(tm, x, def) {
            continue;
        }
        let single: FxHashMap<TermId, TermId> = std::iter::once((x, def)).collect();
        for v in resolved.values_mut() {
            *v = tm.substitute_term(*v, &single)?;
        }
        resolved.insert(x, def);
    }
    if resolved.is_empty() {
        return Ok(false);
    }

    let mut changed = false;
    for i in 0..view.len() {
        let t = view.get(i);
        let s = tm.substitute_term(t, &resolved)?;
        if view.replace(i, s) {
            changed = true;
        }
    }
    for (x, def) in &resolved {
        ctx.substitutions.insert(*x, *def);
        ctx.stats.incr("preprocess::variable_substitution::num_substituted");
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::super::super::Preprocessor;
    use quiver_core::ast::{Kind, TermManager};
    use quiver_core::option::Options;

    #[test]
    fn definition_substitutes_globally() {
        let mut tm = TermManager::new();
        let options = Options::default();
        let mut pp = Preprocessor::new(options.rewrite_level);
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let y = tm.mk_const(bv8, Some("y")).unwrap();
        let one = tm.mk_bv_one(bv8).unwrap();
        let y1 = tm.mk_term(Kind::BvAdd, &[y, one], &[]).unwrap();
        let def = tm.mk_eq(x, y1).unwrap();
        let use_x = {
            let xx = tm.mk_term(Kind::BvAdd, &[x, one], &[]).unwrap();
            let two = tm.mk_bv_value_u64(bv8, 2).unwrap();
            let y2 = tm.mk_term(Kind::BvAdd, &[y, two], &[]).unwrap();
            tm.mk_eq(xx, y2).unwrap()
        };
        pp.assert_formula(def);
        pp.assert_formula(use_x);
        pp.preprocess(&mut tm, &options).unwrap();
        // both assertions collapse once x is replaced by y + 1
        for a in pp.assertions() {
            assert!(tm.is_true(a.current), "{}", tm.to_smt2(a.current));
        }
    }

    #[test]
    fn cyclic_definitions_are_skipped() {
        let mut tm = TermManager::new();
        let options = Options::default();
        let mut pp = Preprocessor::new(options.rewrite_level);
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let y = tm.mk_const(bv8, Some("y")).unwrap();
        let one = tm.mk_bv_one(bv8).unwrap();
        let y1 = tm.mk_term(Kind::BvAdd, &[y, one], &[]).unwrap();
        let x1 = tm.mk_term(Kind::BvAdd, &[x, one], &[]).unwrap();
        let d1 = tm.mk_eq(x, y1).unwrap();
        let d2 = tm.mk_eq(y, x1).unwrap();
        pp.assert_formula(d1);
        pp.assert_formula(d2);
        // must terminate; the pair x = y+1, y = x+1 is unsatisfiable and the
        // ground solver decides it, but preprocessing alone must not loop
        pp.preprocess(&mut tm, &options).unwrap();
    }
}
