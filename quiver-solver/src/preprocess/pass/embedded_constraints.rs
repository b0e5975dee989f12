//! Pass: substitute asserted Boolean terms where they re-occur as subterms.
//!
//! A term asserted at the top level holds in every model of the assertion
//! set, so any other occurrence of it (as a proper subterm) can be replaced
//! by `true`.

use rustc_hash::{FxHashMap, FxHashSet};

use quiver_core::ast::{TermId, TermManager};
use quiver_core::error::Result;

use super::{AssertionView, PassContext};

pub(crate) fn apply(
    tm: &mut TermManager,
    view: &mut AssertionView<'_>,
    ctx: &mut PassContext<'_>,
) -> Result<bool> {
    let mut asserted: FxHashSet<TermId> = FxHashSet::default();
    for i in 0..view.len() {
        let t = view.get(i);
        if !tm.is_value(t) {
            asserted.insert(t);
        }
    }
    if asserted.is_empty() {
        return Ok(false);
    }
    let true_term = tm.mk_true();
    let map: FxHashMap<TermId, TermId> =
        asserted.iter().map(|&t| (t, true_term)).collect();

    let mut changed = false;
    let mut num = 0u64;
    for i in 0..view.len() {
        let t = view.get(i);
        // replace only proper subterm occurrences: substitute the children,
        // not the assertion root itself
        let children: Vec<TermId> = tm.children(t).to_vec();
        if children.is_empty() {
            continue;
        }
        let new_children = tm.substitute_terms(&children, &map)?;
        if new_children != children {
            let rebuilt = tm.rebuild(t, &new_children)?;
            if view.replace(i, rebuilt) {
                num += 1;
                changed = true;
            }
        }
    }
    ctx.stats.add("preprocess::embedded_constraints::num_substituted", num);
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::super::super::Preprocessor;
    use quiver_core::ast::{Kind, TermManager};
    use quiver_core::option::Options;

    #[test]
    fn asserted_subterm_becomes_true_elsewhere() {
        let mut tm = TermManager::new();
        let options = Options::default();
        let mut pp = Preprocessor::new(options.rewrite_level);
        let bv8 = tm.mk_bv_sort(8);
        let b = tm.mk_bool_sort();
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let zero = tm.mk_bv_zero(bv8).unwrap();
        let q = tm.mk_const(b, Some("q")).unwrap();
        let ult = tm.mk_term(Kind::BvUlt, &[zero, x], &[]).unwrap();
        // assert `ult`, and `ult => q`; the second reduces to `q`
        let imp = tm.mk_implies(ult, q).unwrap();
        pp.assert_formula(ult);
        pp.assert_formula(imp);
        pp.preprocess(&mut tm, &options).unwrap();
        assert!(pp
            .assertions()
            .iter()
            .any(|a| a.current == q || tm.is_true(a.current)));
    }
}
