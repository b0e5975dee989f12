//! Pass: apply the structural rewriter to every assertion.

use quiver_core::ast::TermManager;
use quiver_core::error::Result;

use super::{AssertionView, PassContext};

pub(crate) fn apply(
    tm: &mut TermManager,
    view: &mut AssertionView<'_>,
    ctx: &mut PassContext<'_>,
) -> Result<bool> {
    let mut changed = false;
    for i in 0..view.len() {
        let t = view.get(i);
        let r = ctx.rewriter.rewrite(tm, t)?;
        if view.replace(i, r) {
            ctx.stats.incr("preprocess::rewrite::num_rewrites");
            changed = true;
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::super::super::Preprocessor;
    use quiver_core::ast::{Kind, TermManager};
    use quiver_core::option::Options;

    #[test]
    fn rewrites_every_assertion() {
        let mut tm = TermManager::new();
        let mut options = Options::default();
        // isolate this pass
        options.passes = quiver_core::option::PassEnables {
            rewrite: true,
            contradicting_ands: false,
            elim_lambda: false,
            elim_uninterpreted: false,
            embedded_constraints: false,
            variable_substitution: false,
            flatten_and: false,
            skeleton_preproc: false,
            normalize: false,
        };
        let mut pp = Preprocessor::new(options.rewrite_level);
        let bv8 = tm.mk_bv_sort(8);
        let x = tm.mk_const(bv8, Some("x")).unwrap();
        let zero = tm.mk_bv_zero(bv8).unwrap();
        let add = tm.mk_term(Kind::BvAdd, &[x, zero], &[]).unwrap();
        let eq = tm.mk_eq(add, x).unwrap();
        pp.assert_formula(eq);
        pp.preprocess(&mut tm, &options).unwrap();
        assert!(tm.is_true(pp.assertions()[0].current));
    }
}
