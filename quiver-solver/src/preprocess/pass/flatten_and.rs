//! Pass: split top-level conjunctions into separate assertions.
//!
//! Splitting keeps the origin of every conjunct so unsat cores still point
//! at the user assertion it came from.

use quiver_core::ast::{Kind, TermId, TermManager};
use quiver_core::error::Result;

use super::{AssertionView, PassContext};

pub(crate) fn apply(
    tm: &mut TermManager,
    view: &mut AssertionView<'_>,
    ctx: &mut PassContext<'_>,
) -> Result<bool> {
    let mut changed = false;
    let mut num = 0u64;
    let mut i = 0;
    while i < view.len() {
        let t = view.get(i);
        if tm.kind(t) == Kind::And {
            let mut conjuncts = Vec::new();
            flatten(tm, t, &mut conjuncts);
            let origin = view.origin(i);
            view.replace(i, conjuncts[0]);
            for &c in &conjuncts[1..] {
                view.push_derived(c, origin);
            }
            num += 1;
            changed = true;
        }
        i += 1;
    }
    ctx.stats.add("preprocess::flatten_and::num_flattened", num);
    Ok(changed)
}

fn flatten(tm: &TermManager, t: TermId, out: &mut Vec<TermId>) {
    if tm.kind(t) == Kind::And {
        for &c in tm.children(t) {
            flatten(tm, c, out);
        }
    } else {
        out.push(t);
    }
}

#[cfg(test)]
mod tests {
    use super::super::super::Preprocessor;
    use quiver_core::ast::TermManager;
    use quiver_core::option::Options;

    #[test]
    fn nested_conjunction_splits_with_origins() {
        let mut tm = TermManager::new();
        let options = Options::default();
        let mut pp = Preprocessor::new(options.rewrite_level);
        let b = tm.mk_bool_sort();
        let p = tm.mk_const(b, Some("p")).unwrap();
        let q = tm.mk_const(b, Some("q")).unwrap();
        let r = tm.mk_const(b, Some("r")).unwrap();
        let inner = tm.mk_and2(q, r).unwrap();
        let root = tm.mk_and2(p, inner).unwrap();
        pp.assert_formula(root);
        pp.preprocess(&mut tm, &options).unwrap();
        assert!(pp.assertions().len() >= 3);
        for a in pp.assertions() {
            assert_eq!(a.origin, Some(root));
        }
    }
}
